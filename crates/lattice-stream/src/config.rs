//! Tuning knobs for the streaming service.

use std::time::Duration;

/// Tuning for [`ChunkStreamingService`](crate::ChunkStreamingService).
///
/// There is always exactly one save worker, so writes of the same chunk are
/// never reordered.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamingConfig {
    pub load_workers: usize,
    /// Meshing is the most CPU-heavy stage; keep this below `load_workers`
    /// so I/O-bound loading is not starved.
    pub mesh_workers: usize,
    pub load_queue_capacity: usize,
    pub mesh_queue_capacity: usize,
    pub save_queue_capacity: usize,
    /// Slots in each stage's urgent lane.
    pub urgent_queue_capacity: usize,
    /// Rate limit for non-urgent saves. Zero disables the limit.
    pub max_saves_per_second: usize,
    /// Consecutive mesh failures before a chunk gets a placeholder.
    pub mesh_retry_limit: u32,
    /// Outstanding work with no drained result for this long is stuck.
    pub stuck_timeout: Duration,
    /// Worker sleep when its queue is empty.
    pub idle_poll: Duration,
    /// How long `shutdown` waits for workers before abandoning them.
    pub shutdown_timeout: Duration,
    /// Enqueue a mesh job for every chunk that finishes loading.
    pub auto_mesh: bool,
    pub use_mesh_cache: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            load_workers: 4,
            mesh_workers: 2,
            load_queue_capacity: 256,
            mesh_queue_capacity: 256,
            save_queue_capacity: 512,
            urgent_queue_capacity: 64,
            max_saves_per_second: 20,
            mesh_retry_limit: 3,
            stuck_timeout: Duration::from_secs(10),
            idle_poll: Duration::from_millis(2),
            shutdown_timeout: Duration::from_secs(2),
            auto_mesh: true,
            use_mesh_cache: true,
        }
    }
}
