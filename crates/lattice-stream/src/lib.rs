//! Background chunk streaming: bounded load, mesh and save stages drained by
//! small worker pools, with the main thread applying results at its own pace.

mod config;
mod failures;
mod jobs;
mod planner;
mod queue;
mod service;
mod throttle;
mod worker;

pub use config::StreamingConfig;
pub use failures::{FailureAction, FailureTracker};
pub use jobs::{JobError, LoadJob, LoadResult, MeshJob, MeshResult, Priority, ReadyMesh, SaveJob, SaveResult};
pub use planner::StreamingPlanner;
pub use queue::{EnqueueError, JobQueue, Rejected, Stage};
pub use service::{ChunkStreamingService, PipelineStats, RequestSummary, ShutdownReport};
pub use throttle::SaveThrottle;
