//! Main-thread side of the chunk pipeline.
//!
//! [`ChunkStreamingService`] owns the worker pools and tracks, per chunk,
//! which stage it currently occupies. Callers submit work with the
//! `request_*` methods, which never block, and pull finished work each frame
//! with the `process_*` methods, each bounded by a max-items budget.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use lattice_mesh::{ChunkMesh, GreedyMesher, MeshCache, MeshMode};
use lattice_voxel::{BlockId, ChunkCoord, VoxelChunkData, VoxelWorld, WorldError};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, info, trace, warn};

use crate::config::StreamingConfig;
use crate::failures::{FailureAction, FailureTracker};
use crate::jobs::{LoadJob, LoadResult, MeshJob, MeshResult, Priority, ReadyMesh, SaveJob, SaveResult};
use crate::queue::{EnqueueError, JobQueue, Rejected, Stage};
use crate::throttle::SaveThrottle;
use crate::worker::{Shared, spawn_workers};

/// Outcome of a batch of load requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestSummary {
    pub queued: usize,
    /// Already loaded, already loading, outside the world, or waiting on an
    /// eviction save.
    pub skipped: usize,
    /// Not accepted because the queue was full.
    pub rejected: usize,
}

/// Point-in-time view of the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub load_queued: usize,
    pub mesh_queued: usize,
    pub save_queued: usize,
    pub load_in_flight: usize,
    pub mesh_in_flight: usize,
    pub save_in_flight: usize,
    /// Mesh jobs waiting for room in the mesh queue.
    pub deferred_meshes: usize,
    /// Non-urgent saves waiting on the throttle.
    pub pending_saves: usize,
    /// Chunks showing a placeholder after repeated mesh failures.
    pub excluded: usize,
    pub loaded_chunks: usize,
}

/// What [`ChunkStreamingService::shutdown`] managed to do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub joined: usize,
    pub abandoned: usize,
    pub flushed: usize,
    pub flush_errors: usize,
}

/// Drives loading, meshing and saving of chunks on worker threads.
pub struct ChunkStreamingService {
    config: StreamingConfig,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,

    load_results: Receiver<LoadResult>,
    mesh_results: Receiver<MeshResult>,
    save_results: Receiver<SaveResult>,

    /// Queued or running load jobs.
    loading: FxHashSet<ChunkCoord>,
    /// Queued or running mesh jobs, keyed to the job's ticket.
    meshing: FxHashMap<ChunkCoord, u64>,
    next_ticket: u64,
    /// Remesh requests that arrived while a job for the chunk was running.
    mesh_again: FxHashMap<ChunkCoord, Priority>,
    /// Mesh jobs that found the queue full.
    deferred: FxHashMap<ChunkCoord, Priority>,
    /// Queued or running saves of loaded chunks.
    saving: FxHashSet<ChunkCoord>,
    /// Queued or running saves of evicted snapshots. Such chunks may not be
    /// reloaded until the write lands.
    evicting: FxHashSet<ChunkCoord>,
    save_backlog: VecDeque<ChunkCoord>,
    in_backlog: FxHashSet<ChunkCoord>,

    failures: FailureTracker,
    throttle: SaveThrottle,
    last_progress: Instant,
    stopped: bool,
}

impl ChunkStreamingService {
    /// Spawns the worker pools. Without a `mesh_cache` (or with
    /// `use_mesh_cache` off) every mesh is built from scratch.
    pub fn start(
        world: Arc<VoxelWorld>,
        mesher: GreedyMesher,
        mesh_cache: Option<MeshCache>,
        config: StreamingConfig,
    ) -> io::Result<Self> {
        let (load_tx, load_rx) = unbounded();
        let (mesh_tx, mesh_rx) = unbounded();
        let (save_tx, save_rx) = unbounded();
        let urgent = config.urgent_queue_capacity;

        let shared = Arc::new(Shared {
            world,
            mesher,
            mesh_cache: mesh_cache.filter(|_| config.use_mesh_cache),
            running: AtomicBool::new(true),
            idle_poll: config.idle_poll,
            load_queue: JobQueue::new(Stage::Load, config.load_queue_capacity, urgent),
            mesh_queue: JobQueue::new(Stage::Mesh, config.mesh_queue_capacity, urgent),
            save_queue: JobQueue::new(Stage::Save, config.save_queue_capacity, urgent),
            load_results: load_tx,
            mesh_results: mesh_tx,
            save_results: save_tx,
            load_in_flight: AtomicUsize::new(0),
            mesh_in_flight: AtomicUsize::new(0),
            save_in_flight: AtomicUsize::new(0),
        });

        let mut workers = Vec::new();
        let spawned = spawn_workers(&shared, Stage::Load, config.load_workers.max(1), &mut workers)
            .and_then(|()| spawn_workers(&shared, Stage::Mesh, config.mesh_workers.max(1), &mut workers))
            .and_then(|()| spawn_workers(&shared, Stage::Save, 1, &mut workers));
        if let Err(e) = spawned {
            shared.running.store(false, Ordering::Release);
            return Err(e);
        }
        info!(
            load_workers = config.load_workers.max(1),
            mesh_workers = config.mesh_workers.max(1),
            mesh_cache = shared.mesh_cache.is_some(),
            "chunk streaming started"
        );

        Ok(Self {
            failures: FailureTracker::new(config.mesh_retry_limit),
            throttle: SaveThrottle::new(config.max_saves_per_second),
            config,
            shared,
            workers,
            load_results: load_rx,
            mesh_results: mesh_rx,
            save_results: save_rx,
            loading: FxHashSet::default(),
            meshing: FxHashMap::default(),
            next_ticket: 0,
            mesh_again: FxHashMap::default(),
            deferred: FxHashMap::default(),
            saving: FxHashSet::default(),
            evicting: FxHashSet::default(),
            save_backlog: VecDeque::new(),
            in_backlog: FxHashSet::default(),
            last_progress: Instant::now(),
            stopped: false,
        })
    }

    /// The world the workers load into and mesh from.
    pub fn world(&self) -> &Arc<VoxelWorld> {
        &self.shared.world
    }

    /// Settings the service was started with.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    // -- Loading ----------------------------------------------------------

    /// Queues `coord` for loading. Returns `Ok(false)` when there is nothing
    /// to do and fails fast when the load queue is full.
    pub fn request_load(&mut self, coord: ChunkCoord, priority: Priority) -> Result<bool, EnqueueError> {
        let world = &self.shared.world;
        if !world.meta().contains_chunk(coord)
            || self.loading.contains(&coord)
            || self.evicting.contains(&coord)
            || world.is_loaded(coord)
        {
            return Ok(false);
        }
        self.note_submit();
        self.shared
            .load_queue
            .try_push(LoadJob { coord, priority }, priority.is_tier0())
            .map_err(|r| r.error)?;
        self.loading.insert(coord);
        Ok(true)
    }

    /// Queues many loads, stopping at the first full queue.
    pub fn request_chunks(&mut self, wanted: &[(ChunkCoord, Priority)]) -> RequestSummary {
        let mut summary = RequestSummary::default();
        for (i, &(coord, priority)) in wanted.iter().enumerate() {
            match self.request_load(coord, priority) {
                Ok(true) => summary.queued += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    summary.rejected = wanted.len() - i;
                    trace!(error = %e, rejected = summary.rejected, "load requests rejected");
                    break;
                }
            }
        }
        summary
    }

    /// Applies up to `max_items` finished loads. With `auto_mesh` on, each
    /// loaded chunk is handed to the mesh stage, along with every loaded face
    /// neighbor whose seam faces the new chunk made stale.
    pub fn process_load_results(&mut self, max_items: usize) -> Vec<LoadResult> {
        let mut drained = Vec::new();
        while drained.len() < max_items {
            let Ok(result) = self.load_results.try_recv() else {
                break;
            };
            self.last_progress = Instant::now();
            self.loading.remove(&result.coord);
            if result.outcome.is_ok() && self.config.auto_mesh {
                self.enqueue_mesh(result.coord, result.priority);
                self.remesh_neighbors(result.coord);
            }
            drained.push(result);
        }
        self.pump_deferred();
        drained
    }

    fn remesh_neighbors(&mut self, coord: ChunkCoord) {
        for neighbor in coord.face_neighbors() {
            // A neighbor with its own load result pending is meshed when that
            // result is applied.
            if self.loading.contains(&neighbor) || self.failures.is_excluded(neighbor) {
                continue;
            }
            if self.shared.world.with_chunk(neighbor, |c| c.is_dirty()) == Some(true) {
                trace!(coord = ?neighbor, loaded = ?coord, "remeshing neighbor of loaded chunk");
                self.enqueue_mesh(neighbor, Priority::NORMAL);
            }
        }
    }

    // -- Meshing ----------------------------------------------------------

    /// Queues a mesh of a loaded chunk. Tier-0 priorities mesh in fast mode
    /// through the urgent lane. Returns `Ok(false)` for unloaded or
    /// failure-excluded chunks and fails fast when the mesh queue is full.
    pub fn request_mesh(&mut self, coord: ChunkCoord, priority: Priority) -> Result<bool, EnqueueError> {
        if self.failures.is_excluded(coord) || !self.shared.world.is_loaded(coord) {
            return Ok(false);
        }
        if self.meshing.contains_key(&coord) {
            merge_priority(&mut self.mesh_again, coord, priority);
            return Ok(true);
        }
        self.push_mesh(coord, priority).map_err(|r| r.error)?;
        Ok(true)
    }

    /// Drains up to `max_items` mesh results and returns the meshes ready
    /// for upload.
    ///
    /// A mesh built from a version that has since changed is discarded and
    /// rebuilt. A result for a job issued before its chunk was unloaded is
    /// dropped. A fast mesh is followed by a full one. After
    /// `mesh_retry_limit` consecutive failures the chunk gets an empty
    /// placeholder and is left alone until its contents change.
    pub fn process_mesh_results(&mut self, max_items: usize) -> Vec<ReadyMesh> {
        self.pump_deferred();
        let mut ready = Vec::new();
        for _ in 0..max_items {
            let Ok(result) = self.mesh_results.try_recv() else {
                break;
            };
            self.last_progress = Instant::now();
            self.apply_mesh_result(result, &mut ready);
        }
        self.pump_deferred();
        ready
    }

    fn apply_mesh_result(&mut self, result: MeshResult, ready: &mut Vec<ReadyMesh>) {
        let coord = result.coord;
        if self.meshing.get(&coord) != Some(&result.ticket) {
            trace!(coord = ?coord, ticket = result.ticket, "dropping mesh of evicted chunk");
            return;
        }
        self.meshing.remove(&coord);
        let again = self.mesh_again.remove(&coord);
        let world = Arc::clone(&self.shared.world);
        if !world.is_loaded(coord) {
            trace!(coord = ?coord, "dropping mesh of unloaded chunk");
            return;
        }

        match result.outcome {
            Ok(mesh) => {
                if !world.mark_meshed(coord, result.mesh_version) {
                    trace!(coord = ?coord, mesh_version = result.mesh_version, "mesh superseded");
                    self.enqueue_mesh(coord, again.unwrap_or(result.priority));
                    return;
                }
                self.failures.record_success(coord);
                match again {
                    Some(priority) => self.enqueue_mesh(coord, priority),
                    None if result.mode == MeshMode::Fast => self.enqueue_mesh(coord, Priority::NORMAL),
                    None => {}
                }
                ready.push(ReadyMesh {
                    coord,
                    mode: result.mode,
                    mesh,
                    placeholder: false,
                    from_cache: result.from_cache,
                });
            }
            Err(e) => match self.failures.record_failure(coord) {
                FailureAction::Retry(attempt) => {
                    debug!(coord = ?coord, attempt, error = %e, "retrying mesh");
                    self.enqueue_mesh(coord, again.unwrap_or(result.priority));
                }
                FailureAction::GiveUp => {
                    error!(coord = ?coord, error = %e, "giving up on chunk mesh, using placeholder");
                    if let Some(mesh_version) = world.with_chunk(coord, |c| c.mesh_version()) {
                        world.mark_meshed(coord, mesh_version);
                    }
                    ready.push(ReadyMesh {
                        coord,
                        mode: result.mode,
                        mesh: ChunkMesh::placeholder(coord),
                        placeholder: true,
                        from_cache: false,
                    });
                }
            },
        }
    }

    /// Queues a mesh, deferring it when the queue is full and coalescing
    /// with a job already in flight.
    fn enqueue_mesh(&mut self, coord: ChunkCoord, priority: Priority) {
        if self.meshing.contains_key(&coord) {
            merge_priority(&mut self.mesh_again, coord, priority);
            return;
        }
        if self.deferred.contains_key(&coord) {
            merge_priority(&mut self.deferred, coord, priority);
            return;
        }
        if let Err(Rejected { error, .. }) = self.push_mesh(coord, priority) {
            match error {
                EnqueueError::Full { .. } => {
                    self.deferred.insert(coord, priority);
                }
                EnqueueError::Closed(_) => warn!(coord = ?coord, "mesh queue closed"),
            }
        }
    }

    fn push_mesh(&mut self, coord: ChunkCoord, priority: Priority) -> Result<(), Rejected<MeshJob>> {
        self.note_submit();
        let ticket = self.next_ticket;
        let job = MeshJob {
            coord,
            priority,
            mode: priority.mesh_mode(),
            ticket,
        };
        self.shared.mesh_queue.try_push(job, priority.is_tier0())?;
        self.next_ticket += 1;
        self.meshing.insert(coord, ticket);
        Ok(())
    }

    /// Moves deferred mesh jobs into the queue, most urgent first, until it
    /// fills up again.
    fn pump_deferred(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        let mut pending: Vec<(ChunkCoord, Priority)> = self.deferred.drain().collect();
        pending.sort_unstable_by_key(|&(coord, priority)| (priority, coord));

        let mut rest = pending.into_iter();
        for (coord, priority) in rest.by_ref() {
            if self.failures.is_excluded(coord) || !self.shared.world.is_loaded(coord) {
                continue;
            }
            if self.meshing.contains_key(&coord) {
                merge_priority(&mut self.mesh_again, coord, priority);
                continue;
            }
            if self.push_mesh(coord, priority).is_err() {
                self.deferred.insert(coord, priority);
                break;
            }
        }
        self.deferred.extend(rest);
    }

    // -- Editing ----------------------------------------------------------

    /// Writes a block and schedules the follow-up work: a tier-0 remesh of
    /// every affected chunk and a throttled save of the edited one.
    ///
    /// Loads the target chunk on the calling thread if it is not resident.
    /// Fails with [`WorldError::Evicted`] while the chunk's eviction save is
    /// still pending.
    pub fn edit_block(&mut self, wx: i32, wy: i32, wz: i32, block: BlockId) -> Result<Vec<ChunkCoord>, WorldError> {
        let target = ChunkCoord::from_block(wx, wy, wz);
        if self.evicting.contains(&target) {
            return Err(WorldError::Evicted(target));
        }
        let affected = self.shared.world.set_block(wx, wy, wz, block)?;
        for &coord in &affected {
            self.failures.clear(coord);
            self.enqueue_mesh(coord, Priority::INTERACTION);
        }
        if let Some(&edited) = affected.first() {
            self.request_save(edited, false);
        }
        Ok(affected)
    }

    // -- Saving -----------------------------------------------------------

    /// Schedules a save of a loaded chunk. Urgent saves skip the throttle and
    /// go straight to the urgent lane; others wait their turn in the
    /// backlog. Returns `false` if an urgent save could not be queued.
    pub fn request_save(&mut self, coord: ChunkCoord, urgent: bool) -> bool {
        if !urgent {
            if self.in_backlog.insert(coord) {
                self.save_backlog.push_back(coord);
            }
            self.pump_saves();
            return true;
        }
        if self.saving.contains(&coord) {
            return true;
        }
        self.note_submit();
        let job = SaveJob { coord, evicted: None };
        match self.shared.save_queue.try_push(job, true) {
            Ok(()) => {
                self.saving.insert(coord);
                true
            }
            Err(r) => {
                warn!(coord = ?coord, error = %r.error, "urgent save rejected");
                false
            }
        }
    }

    /// Schedules a save of every chunk with unsaved changes. Returns how
    /// many were scheduled.
    pub fn flush_dirty(&mut self, urgent: bool) -> usize {
        let dirty = self.shared.world.dirty_for_save();
        dirty
            .into_iter()
            .filter(|&coord| self.request_save(coord, urgent))
            .count()
    }

    fn pump_saves(&mut self) {
        let now = Instant::now();
        let mut kept = VecDeque::new();
        while let Some(coord) = self.save_backlog.pop_front() {
            if self.saving.contains(&coord) {
                // Picked up again once the running save completes.
                kept.push_back(coord);
                continue;
            }
            let dirty = self
                .shared
                .world
                .with_chunk(coord, |c| c.needs_save())
                .unwrap_or(false);
            if !dirty {
                self.in_backlog.remove(&coord);
                continue;
            }
            if self.throttle.available(now) == 0 {
                kept.push_back(coord);
                break;
            }
            self.note_submit();
            if self
                .shared
                .save_queue
                .try_push(SaveJob { coord, evicted: None }, false)
                .is_err()
            {
                kept.push_back(coord);
                break;
            }
            self.throttle.try_acquire(now);
            self.in_backlog.remove(&coord);
            self.saving.insert(coord);
        }
        kept.append(&mut self.save_backlog);
        self.save_backlog = kept;
    }

    /// Applies up to `max_items` finished saves, then feeds the backlog.
    pub fn process_save_results(&mut self, max_items: usize) -> Vec<SaveResult> {
        let mut drained = Vec::new();
        while drained.len() < max_items {
            let Ok(mut result) = self.save_results.try_recv() else {
                break;
            };
            self.last_progress = Instant::now();
            let coord = result.coord;
            if result.evicted {
                self.evicting.remove(&coord);
                if let Some(chunk) = result.retained.take() {
                    self.restore_evicted(chunk);
                }
            } else {
                self.saving.remove(&coord);
            }
            drained.push(result);
        }
        self.pump_saves();
        drained
    }

    /// Puts back a chunk whose eviction save failed so the edits survive.
    fn restore_evicted(&mut self, chunk: VoxelChunkData) {
        let coord = chunk.coord();
        if self.shared.world.is_loaded(coord) {
            error!(coord = ?coord, "eviction save failed and chunk was reloaded; edits lost");
            return;
        }
        warn!(coord = ?coord, "eviction save failed, keeping chunk resident");
        self.shared.world.insert_chunk(chunk);
    }

    // -- Unloading --------------------------------------------------------

    /// Unloads every chunk not in `keep`. Dirty chunks are saved through the
    /// urgent lane, or synchronously if it is full. Pending mesh work for the
    /// removed chunks is forgotten; a job already running finishes and its
    /// result is dropped.
    pub fn unload_outside(&mut self, keep: &FxHashSet<ChunkCoord>) -> Vec<ChunkCoord> {
        let mut evicted = Vec::new();
        let removed = self.shared.world.unload_chunks(keep, |chunk| evicted.push(chunk));
        for coord in &removed {
            self.failures.clear(*coord);
            self.meshing.remove(coord);
            self.mesh_again.remove(coord);
            self.deferred.remove(coord);
        }

        for chunk in evicted {
            let coord = chunk.coord();
            self.note_submit();
            let job = SaveJob {
                coord,
                evicted: Some(chunk),
            };
            match self.shared.save_queue.try_push(job, true) {
                Ok(()) => {
                    self.evicting.insert(coord);
                }
                Err(Rejected { job, error }) => {
                    debug!(coord = ?coord, error = %error, "save queue full, saving evicted chunk inline");
                    if let Some(chunk) = job.evicted {
                        self.save_inline(chunk);
                    }
                }
            }
        }
        removed
    }

    fn save_inline(&mut self, chunk: VoxelChunkData) {
        let Some(store) = self.shared.world.store() else {
            return;
        };
        if let Err(e) = store.save(&chunk) {
            error!(coord = ?chunk.coord(), error = %e, "inline save failed");
            self.restore_evicted(chunk);
        }
    }

    // -- Health -----------------------------------------------------------

    fn outstanding(&self) -> usize {
        self.loading.len() + self.meshing.len() + self.saving.len() + self.evicting.len()
    }

    /// Restarts the progress clock when work arrives at an idle pipeline.
    fn note_submit(&mut self) {
        if self.outstanding() == 0 {
            self.last_progress = Instant::now();
        }
    }

    /// `true` when jobs are outstanding but no result has been drained for
    /// longer than `stuck_timeout`.
    pub fn is_stuck(&self) -> bool {
        self.outstanding() > 0 && self.last_progress.elapsed() > self.config.stuck_timeout
    }

    /// Time since the last drained result.
    pub fn since_progress(&self) -> Duration {
        self.last_progress.elapsed()
    }

    /// `true` when nothing is queued, running, deferred or waiting to save.
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0 && self.deferred.is_empty() && self.save_backlog.is_empty()
    }

    pub fn stats(&self) -> PipelineStats {
        let shared = &self.shared;
        PipelineStats {
            load_queued: shared.load_queue.len(),
            mesh_queued: shared.mesh_queue.len(),
            save_queued: shared.save_queue.len(),
            load_in_flight: shared.in_flight(Stage::Load),
            mesh_in_flight: shared.in_flight(Stage::Mesh),
            save_in_flight: shared.in_flight(Stage::Save),
            deferred_meshes: self.deferred.len(),
            pending_saves: self.save_backlog.len(),
            excluded: self.failures.excluded_count(),
            loaded_chunks: shared.world.loaded_count(),
        }
    }

    // -- Shutdown ---------------------------------------------------------

    /// Stops the workers, waits up to `shutdown_timeout` for them, then
    /// writes every dirty chunk on the calling thread. Jobs still running at
    /// the deadline are abandoned. Calling it again does nothing.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.stopped {
            return report;
        }
        self.stopped = true;
        self.shared.running.store(false, Ordering::Release);

        let deadline = Instant::now() + self.config.shutdown_timeout;
        let mut pending = std::mem::take(&mut self.workers);
        loop {
            let (finished, running): (Vec<_>, Vec<_>) = pending.into_iter().partition(|h| h.is_finished());
            for handle in finished {
                let name = handle.thread().name().map(str::to_owned);
                if handle.join().is_err() {
                    warn!(worker = ?name, "worker thread panicked");
                }
                report.joined += 1;
            }
            pending = running;
            if pending.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                report.abandoned = pending.len();
                warn!(abandoned = report.abandoned, "workers did not stop in time");
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        // Evicted snapshots exist nowhere else; write the unprocessed ones here.
        while let Ok(result) = self.save_results.try_recv() {
            if let Some(chunk) = result.retained {
                self.save_inline(chunk);
            }
        }
        while let Some(job) = self.shared.save_queue.try_pop() {
            if let Some(chunk) = job.evicted {
                self.save_inline(chunk);
            }
        }

        for coord in self.shared.world.dirty_for_save() {
            match self.shared.world.save_chunk_now(coord) {
                Ok(true) => report.flushed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(coord = ?coord, error = %e, "final save failed");
                    report.flush_errors += 1;
                }
            }
        }
        info!(
            joined = report.joined,
            abandoned = report.abandoned,
            flushed = report.flushed,
            "chunk streaming stopped"
        );
        report
    }
}

impl Drop for ChunkStreamingService {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
    }
}

fn merge_priority(map: &mut FxHashMap<ChunkCoord, Priority>, coord: ChunkCoord, priority: Priority) {
    map.entry(coord)
        .and_modify(|p| *p = (*p).min(priority))
        .or_insert(priority);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_mesh::{CustomModels, FaceDirection, GridAtlas, TextureAtlas};
    use lattice_voxel::{BlockRegistry, ChunkFileStore, ChunkGenerator, WorldMeta};

    const SETTLE: Duration = Duration::from_secs(10);

    fn floor(coord: ChunkCoord) -> VoxelChunkData {
        let mut chunk = VoxelChunkData::new(coord);
        if coord.y == 0 {
            for x in 0..16 {
                for z in 0..16 {
                    chunk.set_raw(x, 0, z, BlockId::STONE);
                }
            }
        }
        chunk
    }

    fn test_config() -> StreamingConfig {
        StreamingConfig {
            idle_poll: Duration::from_millis(1),
            max_saves_per_second: 0,
            ..StreamingConfig::default()
        }
    }

    /// A 4x2x4-chunk world.
    fn world_with(store: Option<ChunkFileStore>, generator: Arc<dyn ChunkGenerator>) -> Arc<VoxelWorld> {
        Arc::new(VoxelWorld::new(WorldMeta::new(1, 64, 32, 64), store, generator))
    }

    fn floor_world(store: Option<ChunkFileStore>) -> Arc<VoxelWorld> {
        world_with(store, Arc::new(floor))
    }

    fn start(world: Arc<VoxelWorld>, config: StreamingConfig) -> ChunkStreamingService {
        ChunkStreamingService::start(world, GreedyMesher::with_defaults(), None, config).expect("spawn workers")
    }

    /// Drains every stage until nothing is outstanding.
    fn settle(svc: &mut ChunkStreamingService) -> Vec<ReadyMesh> {
        let deadline = Instant::now() + SETTLE;
        let mut ready = Vec::new();
        loop {
            svc.process_load_results(64);
            ready.extend(svc.process_mesh_results(64));
            svc.process_save_results(64);
            if svc.is_idle() {
                return ready;
            }
            assert!(Instant::now() < deadline, "pipeline did not settle: {:?}", svc.stats());
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// A generator that blocks until the returned sender is dropped.
    fn gated() -> (crossbeam_channel::Sender<()>, Arc<dyn ChunkGenerator>) {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let generator: Arc<dyn ChunkGenerator> = Arc::new(move |coord: ChunkCoord| {
            let _ = gate_rx.recv_timeout(SETTLE);
            VoxelChunkData::new(coord)
        });
        (gate_tx, generator)
    }

    #[test]
    fn test_load_then_mesh() {
        let mut svc = start(floor_world(None), test_config());
        let coord = ChunkCoord::new(0, 0, 0);
        assert_eq!(svc.request_load(coord, Priority::NORMAL), Ok(true));
        assert_eq!(svc.request_load(coord, Priority::NORMAL), Ok(false), "already loading");

        let ready = settle(&mut svc);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].coord, coord);
        assert_eq!(ready[0].mode, MeshMode::Full);
        assert!(!ready[0].placeholder);
        assert!(ready[0].mesh.quad_count() > 0);
        assert!(svc.world().is_loaded(coord));
        assert_eq!(svc.request_load(coord, Priority::NORMAL), Ok(false), "already loaded");
    }

    #[test]
    fn test_request_chunks_skips_duplicates_and_outside() {
        let mut svc = start(floor_world(None), test_config());
        let c = ChunkCoord::new(1, 0, 1);
        let summary = svc.request_chunks(&[
            (c, Priority::NORMAL),
            (c, Priority::NORMAL),
            (ChunkCoord::new(-1, 0, 0), Priority::NORMAL),
        ]);
        assert_eq!(
            summary,
            RequestSummary {
                queued: 1,
                skipped: 2,
                rejected: 0
            }
        );
        settle(&mut svc);
    }

    #[test]
    fn test_full_load_queue_fails_fast() {
        let (gate, generator) = gated();
        let config = StreamingConfig {
            load_workers: 1,
            load_queue_capacity: 2,
            auto_mesh: false,
            ..test_config()
        };
        let mut svc = start(world_with(None, generator), config);

        let begin = Instant::now();
        let mut accepted = 0;
        let mut rejected = 0;
        for i in 0..10 {
            match svc.request_load(ChunkCoord::new(i % 4, 0, i / 4), Priority::NORMAL) {
                Ok(true) => accepted += 1,
                Err(EnqueueError::Full { stage, capacity }) => {
                    assert_eq!(stage, Stage::Load);
                    assert_eq!(capacity, 2);
                    rejected += 1;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(begin.elapsed() < Duration::from_secs(1), "enqueue must not block");
        assert!((2..=3).contains(&accepted), "accepted {accepted}");
        assert_eq!(accepted + rejected, 10);

        drop(gate);
        settle(&mut svc);
        assert_eq!(svc.world().loaded_count(), accepted);
    }

    #[test]
    fn test_stuck_pipeline_reported() {
        let (gate, generator) = gated();
        let config = StreamingConfig {
            stuck_timeout: Duration::from_millis(30),
            auto_mesh: false,
            ..test_config()
        };
        let mut svc = start(world_with(None, generator), config);
        assert!(!svc.is_stuck(), "idle is not stuck");
        svc.request_load(ChunkCoord::new(0, 0, 0), Priority::NORMAL).unwrap();
        thread::sleep(Duration::from_millis(80));
        assert!(svc.is_stuck());

        drop(gate);
        settle(&mut svc);
        assert!(!svc.is_stuck());
    }

    struct NoGlassAtlas(GridAtlas);

    impl TextureAtlas for NoGlassAtlas {
        fn face_uv_rect(&self, block: BlockId, face: FaceDirection) -> [[f32; 2]; 4] {
            assert_ne!(block, BlockId::GLASS, "no texture for glass");
            self.0.face_uv_rect(block, face)
        }
    }

    #[test]
    fn test_repeated_mesh_failure_gives_placeholder() {
        let generator = |coord: ChunkCoord| {
            let mut chunk = floor(coord);
            chunk.set_raw(5, 5, 5, BlockId::GLASS);
            chunk
        };
        let atlas = GridAtlas::with_defaults();
        let mesher = GreedyMesher::new(
            Arc::new(BlockRegistry::with_defaults()),
            Arc::new(NoGlassAtlas(atlas.clone())),
            Arc::new(CustomModels::with_defaults(&atlas)),
        );
        let world = world_with(None, Arc::new(generator));
        let mut svc = ChunkStreamingService::start(world, mesher, None, test_config()).expect("spawn workers");
        let coord = ChunkCoord::new(1, 0, 1);
        svc.request_load(coord, Priority::NORMAL).unwrap();

        let ready = settle(&mut svc);
        assert_eq!(ready.len(), 1, "only the placeholder is published");
        assert!(ready[0].placeholder);
        assert!(ready[0].mesh.is_empty());
        assert_eq!(svc.stats().excluded, 1);
        assert_eq!(svc.request_mesh(coord, Priority::NORMAL), Ok(false), "excluded");

        // Removing the glass lifts the exclusion.
        svc.edit_block(21, 5, 21, BlockId::AIR).unwrap();
        let ready = settle(&mut svc);
        assert!(ready.iter().any(|r| r.coord == coord && !r.placeholder));
        assert_eq!(svc.stats().excluded, 0);
    }

    #[test]
    fn test_loading_neighbor_remeshes_seam() {
        let mut svc = start(floor_world(None), test_config());
        let a = ChunkCoord::new(0, 0, 0);
        let b = ChunkCoord::new(1, 0, 0);
        svc.request_load(a, Priority::NORMAL).unwrap();
        let first = settle(&mut svc);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].mesh.quad_count(), 6, "floor slab alone");

        svc.request_load(b, Priority::NORMAL).unwrap();
        let ready = settle(&mut svc);
        let latest_a = ready.iter().rev().find(|r| r.coord == a).expect("a remeshed");
        assert_eq!(latest_a.mesh.quad_count(), 5, "+x side now hidden by b");
        let latest_b = ready.iter().rev().find(|r| r.coord == b).expect("b meshed");
        assert_eq!(latest_b.mesh.quad_count(), 5);
        assert_eq!(svc.world().with_chunk(a, |c| c.is_dirty()), Some(false));
    }

    #[test]
    fn test_loading_air_chunk_leaves_neighbor_alone() {
        let mut svc = start(floor_world(None), test_config());
        let a = ChunkCoord::new(0, 0, 0);
        svc.request_load(a, Priority::NORMAL).unwrap();
        settle(&mut svc);

        svc.request_load(ChunkCoord::new(0, 1, 0), Priority::NORMAL).unwrap();
        let ready = settle(&mut svc);
        assert!(ready.iter().all(|r| r.coord != a));
    }

    /// Blocks the mesher on the first glass face until the gate sender drops.
    struct GateAtlas {
        inner: GridAtlas,
        entered: crossbeam_channel::Sender<()>,
        gate: crossbeam_channel::Receiver<()>,
    }

    impl TextureAtlas for GateAtlas {
        fn face_uv_rect(&self, block: BlockId, face: FaceDirection) -> [[f32; 2]; 4] {
            if block == BlockId::GLASS {
                let _ = self.entered.try_send(());
                let _ = self.gate.recv_timeout(SETTLE);
            }
            self.inner.face_uv_rect(block, face)
        }
    }

    #[test]
    fn test_mesh_from_before_eviction_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkFileStore::open(dir.path()).unwrap();
        let generator = |coord: ChunkCoord| {
            let mut chunk = floor(coord);
            chunk.set_raw(5, 5, 5, BlockId::GLASS);
            chunk
        };
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let atlas = GridAtlas::with_defaults();
        let mesher = GreedyMesher::new(
            Arc::new(BlockRegistry::with_defaults()),
            Arc::new(GateAtlas {
                inner: atlas.clone(),
                entered: entered_tx,
                gate: gate_rx,
            }),
            Arc::new(CustomModels::with_defaults(&atlas)),
        );
        let config = StreamingConfig {
            mesh_workers: 1,
            ..test_config()
        };
        let world = world_with(Some(store), Arc::new(generator));
        let mut svc = ChunkStreamingService::start(world, mesher, None, config).expect("spawn workers");

        let coord = ChunkCoord::new(0, 0, 0);
        svc.request_load(coord, Priority::NORMAL).unwrap();
        let deadline = Instant::now() + SETTLE;
        while svc.process_load_results(64).is_empty() {
            assert!(Instant::now() < deadline, "load did not finish");
            thread::sleep(Duration::from_millis(1));
        }
        entered_rx.recv_timeout(SETTLE).expect("mesh job started");

        // Edit behind the service's back, then evict. The running job still
        // holds the glass.
        svc.world().set_block(5, 5, 5, BlockId::AIR).unwrap();
        assert_eq!(svc.unload_outside(&FxHashSet::default()), vec![coord]);
        assert_eq!(svc.stats().mesh_in_flight, 1);
        settle(&mut svc);

        svc.request_load(coord, Priority::NORMAL).unwrap();
        let deadline = Instant::now() + SETTLE;
        while svc.process_load_results(64).is_empty() {
            assert!(Instant::now() < deadline, "reload did not finish");
            thread::sleep(Duration::from_millis(1));
        }
        drop(gate_tx);

        let ready: Vec<ReadyMesh> = settle(&mut svc).into_iter().filter(|r| r.coord == coord).collect();
        assert_eq!(ready.len(), 1, "only the reloaded chunk's mesh is published");
        assert_eq!(ready[0].mesh.quad_count(), 6, "glass is gone");
        assert_eq!(svc.world().with_chunk(coord, |c| c.is_dirty()), Some(false));
    }

    #[test]
    fn test_edit_meshes_fast_then_full() {
        let mut svc = start(floor_world(None), test_config());
        let coord = ChunkCoord::new(0, 0, 0);
        svc.request_load(coord, Priority::NORMAL).unwrap();
        settle(&mut svc);

        let affected = svc.edit_block(5, 1, 5, BlockId::STONE).unwrap();
        assert_eq!(affected, vec![coord]);
        let modes: Vec<MeshMode> = settle(&mut svc)
            .into_iter()
            .filter(|r| r.coord == coord)
            .map(|r| r.mode)
            .collect();
        assert_eq!(modes, vec![MeshMode::Fast, MeshMode::Full]);
    }

    #[test]
    fn test_edit_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkFileStore::open(dir.path().join("chunks")).unwrap();
        let mut svc = start(floor_world(Some(store.clone())), test_config());
        let coord = ChunkCoord::new(0, 0, 0);
        svc.request_load(coord, Priority::NORMAL).unwrap();
        settle(&mut svc);

        svc.edit_block(5, 1, 5, BlockId::GLASS).unwrap();
        settle(&mut svc);
        let saved = store.load(coord).unwrap().expect("chunk file");
        assert_eq!(saved.get(5, 1, 5), BlockId::GLASS);
        assert!(svc.world().dirty_for_save().is_empty());
    }

    #[test]
    fn test_non_urgent_saves_are_throttled() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkFileStore::open(dir.path()).unwrap();
        let config = StreamingConfig {
            max_saves_per_second: 2,
            auto_mesh: false,
            ..test_config()
        };
        let mut svc = start(floor_world(Some(store.clone())), config);
        for x in 0..4 {
            svc.request_load(ChunkCoord::new(x, 0, 0), Priority::NORMAL).unwrap();
        }
        settle(&mut svc);

        assert_eq!(svc.flush_dirty(false), 4);
        assert_eq!(svc.stats().pending_saves, 2, "two saves wait for the next window");
        settle(&mut svc);
        for x in 0..4 {
            assert!(store.exists(ChunkCoord::new(x, 0, 0)));
        }
    }

    #[test]
    fn test_unload_saves_dirty_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkFileStore::open(dir.path()).unwrap();
        let mut svc = start(floor_world(Some(store.clone())), test_config());
        let keep = ChunkCoord::new(0, 0, 0);
        let gone = ChunkCoord::new(1, 0, 0);
        svc.request_load(keep, Priority::NORMAL).unwrap();
        svc.request_load(gone, Priority::NORMAL).unwrap();
        settle(&mut svc);

        let removed = svc.unload_outside(&[keep].into_iter().collect());
        assert_eq!(removed, vec![gone]);
        assert_eq!(
            svc.request_load(gone, Priority::NORMAL),
            Ok(false),
            "reload waits for the eviction save"
        );
        settle(&mut svc);
        assert!(store.exists(gone));
        assert!(!store.exists(keep), "kept chunk is not saved by unloading");
        assert_eq!(svc.request_load(gone, Priority::NORMAL), Ok(true));
        settle(&mut svc);
    }

    #[test]
    fn test_mesh_cache_write_through_and_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkFileStore::open(dir.path().join("chunks")).unwrap();
        let cache = MeshCache::open(dir.path().join("meshes")).unwrap();
        let world = floor_world(Some(store));
        let mut svc =
            ChunkStreamingService::start(world, GreedyMesher::with_defaults(), Some(cache.clone()), test_config())
                .expect("spawn workers");

        let coord = ChunkCoord::new(0, 0, 0);
        for c in [coord, ChunkCoord::new(1, 0, 0), ChunkCoord::new(0, 1, 0), ChunkCoord::new(0, 0, 1)] {
            svc.request_load(c, Priority::NORMAL).unwrap();
        }
        settle(&mut svc);
        assert!(!cache.path(coord).exists(), "unsaved chunks are not cached");

        svc.flush_dirty(true);
        settle(&mut svc);
        svc.request_mesh(coord, Priority::NORMAL).unwrap();
        let built = settle(&mut svc);
        assert_eq!(built.len(), 1);
        assert!(!built[0].from_cache);
        assert!(cache.path(coord).exists());

        svc.request_mesh(coord, Priority::NORMAL).unwrap();
        let cached = settle(&mut svc);
        assert!(cached[0].from_cache);
        assert_eq!(cached[0].mesh.opaque, built[0].mesh.opaque);
        assert_eq!(cached[0].mesh.bounds, built[0].mesh.bounds);
    }

    #[test]
    fn test_shutdown_joins_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkFileStore::open(dir.path()).unwrap();
        let mut svc = start(floor_world(Some(store.clone())), test_config());
        let a = ChunkCoord::new(0, 0, 0);
        let b = ChunkCoord::new(0, 1, 0);
        svc.request_load(a, Priority::NORMAL).unwrap();
        svc.request_load(b, Priority::NORMAL).unwrap();
        settle(&mut svc);

        let report = svc.shutdown();
        assert_eq!(report.joined, 7);
        assert_eq!(report.abandoned, 0);
        assert_eq!(report.flushed, 2);
        assert!(store.exists(a) && store.exists(b));
        assert_eq!(svc.shutdown(), ShutdownReport::default(), "second call is a no-op");
    }
}
