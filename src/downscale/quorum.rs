//! Quorum safety for master-eligible node removal.
//!
//! Before master-eligible members leave, the cluster must stop counting them
//! towards quorum. Legacy (pre-7.0) discovery needs its minimum master count
//! lowered when going from 2 masters to 1. Voting exclusions are added for
//! every leaving master.

use semver::Version;
use tracing::{info, warn};

use crate::controller::error::{Error, Result};
use crate::controller::node_group::NodeGroup;
use crate::downscale::plan::DownscaleOperation;
use crate::downscale::{DownscaleContext, DownscaleResults};

/// First version using the voting-based discovery protocol.
pub const VOTING_PROTOCOL_VERSION: Version = Version::new(7, 0, 0);

/// Reason of the event recorded on an unsafe 2 to 1 master transition.
pub const UNSAFE_DOWNSCALE_REASON: &str = "UnsafeMasterDownscale";

/// Whether `version` predates the voting-based discovery protocol.
///
/// Accepts versions with or without a patch component ("6.8" or "6.8.23").
pub fn is_legacy_version(version: &str) -> Result<bool> {
    let trimmed = version.trim().trim_start_matches('v');
    let parsed = Version::parse(trimmed)
        .or_else(|_| Version::parse(&format!("{}.0", trimmed)))
        .map_err(|e| Error::Validation(format!("invalid version {:?}: {}", version, e)))?;
    Ok(parsed < VOTING_PROTOCOL_VERSION)
}

/// Prepare quorum settings before `performable` is applied.
///
/// Does nothing for groups that are not master-eligible or that lose no
/// member. Any failure aborts the downscale of this group.
pub async fn update_quorum_for_downscale(
    ctx: &DownscaleContext<'_>,
    performable: &DownscaleOperation,
    actual: &[NodeGroup],
    results: &mut DownscaleResults,
) -> Result<()> {
    if !performable.group.is_master_eligible() {
        return Ok(());
    }
    let leaving = performable.leaving_nodes();
    if leaving.is_empty() {
        return Ok(());
    }

    maybe_update_legacy_quorum(ctx, actual, results).await?;

    info!(
        group = %performable.group.key,
        nodes = ?leaving,
        "Adding voting config exclusions"
    );
    ctx.voting.add_voting_config_exclusions(&leaving).await?;
    Ok(())
}

/// Lower the legacy minimum master count to 1 when exactly 2 masters remain.
///
/// Removing one of two masters without this would leave the survivor unable
/// to form a quorum on its own.
async fn maybe_update_legacy_quorum(
    ctx: &DownscaleContext<'_>,
    actual: &[NodeGroup],
    results: &mut DownscaleResults,
) -> Result<()> {
    if !ctx.store.any_member_on_legacy_protocol(actual).await? {
        return Ok(());
    }
    let masters = ctx.store.master_pods().await?;
    if masters.len() != 2 {
        return Ok(());
    }

    let message = "Downscaling from 2 to 1 master nodes: unsafe operation";
    warn!(cluster = %ctx.cluster, "{}", message);
    results.record_warning(UNSAFE_DOWNSCALE_REASON, "Downscaling", message);
    ctx.legacy_quorum.set_minimum_master_nodes(1).await?;
    Ok(())
}
