//! Vela aggregate: views joining several object stores

#![forbid(unsafe_code)]

mod derived;
mod join;
mod metrics;
mod overview;
mod status;

pub use derived::Derived;
pub use join::{pods_by_owner, select};
pub use metrics::{
    interval_from_env, nodes_request, pods_request, pvc_request, workloads_request, MetricQuery, MetricsError,
    MetricsPoller, MetricsProvider, MetricsRequest, MetricsResponse, PodNamePattern,
};
pub use overview::{WorkloadOverview, WorkloadStores};
pub use status::{pod_statuses, statuses, StatusCounts, WorkloadStatus};
