//! Resource descriptors, typed status views and readiness predicates.

mod descriptor;
mod readiness;
mod status;

pub use descriptor::{
    NamespaceDescriptor, ObjectKey, ObjectKind, ReaperDescriptor, ReaperDescriptorBuilder,
    ResourceSpec, StorageType,
};
pub use readiness::{datacenter_ready, deployment_ready, reaper_ready};
pub use status::{
    clean_for_kubernetes, CassandraDatacenterSpec, CassandraDatacenterStatus,
    CassandraDatacenterView, ReaperStatus, ReaperView, StatusCondition,
};
