//! Resource naming and labelling.
//!
//! ## Resources per node set
//!
//! | Resource | Name |
//! |----------|------|
//! | StatefulSet | `<cluster>-<nodeset>` |
//! | Headless Service | `<statefulset>-headless` |
//! | ConfigMap | `<statefulset>-config` |
//! | Pod | `<statefulset>-<ordinal>` |
//! | HTTP Service | `<cluster>-http` |

pub mod common;

pub use common::{
    config_name, headless_service_name, http_service_name, pod_name, statefulset_name,
};
