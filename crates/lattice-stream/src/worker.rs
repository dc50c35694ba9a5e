//! Worker threads for the load, mesh and save stages.
//!
//! Workers poll their queue without blocking and sleep briefly when it is
//! empty, so clearing `running` stops them within one poll interval. Every
//! job runs under `catch_unwind`; a panic becomes a failed result and the
//! loop carries on.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::Sender;
use lattice_mesh::{ChunkMesh, ChunkNeighborhood, GreedyMesher, MeshCache, MeshMode};
use lattice_voxel::{ChunkCoord, ChunkFileStore, VoxelWorld};
use tracing::{debug, trace, warn};

use crate::jobs::{JobError, LoadJob, LoadResult, MeshJob, MeshResult, SaveJob, SaveResult};
use crate::queue::{JobQueue, Stage};

/// State shared by the service and all of its workers.
pub(crate) struct Shared {
    pub world: Arc<VoxelWorld>,
    pub mesher: GreedyMesher,
    pub mesh_cache: Option<MeshCache>,
    pub running: AtomicBool,
    pub idle_poll: Duration,

    pub load_queue: JobQueue<LoadJob>,
    pub mesh_queue: JobQueue<MeshJob>,
    pub save_queue: JobQueue<SaveJob>,

    pub load_results: Sender<LoadResult>,
    pub mesh_results: Sender<MeshResult>,
    pub save_results: Sender<SaveResult>,

    pub load_in_flight: AtomicUsize,
    pub mesh_in_flight: AtomicUsize,
    pub save_in_flight: AtomicUsize,
}

impl Shared {
    pub fn in_flight(&self, stage: Stage) -> usize {
        self.counter(stage).load(Ordering::Relaxed)
    }

    fn counter(&self, stage: Stage) -> &AtomicUsize {
        match stage {
            Stage::Load => &self.load_in_flight,
            Stage::Mesh => &self.mesh_in_flight,
            Stage::Save => &self.save_in_flight,
        }
    }
}

/// Spawns `count` named workers for `stage`.
pub(crate) fn spawn_workers(
    shared: &Arc<Shared>,
    stage: Stage,
    count: usize,
    handles: &mut Vec<JoinHandle<()>>,
) -> io::Result<()> {
    for i in 0..count {
        let shared = Arc::clone(shared);
        let handle = thread::Builder::new()
            .name(format!("lattice-{stage}-{i}"))
            .spawn(move || match stage {
                Stage::Load => poll_loop(&shared, stage, |s| s.load_queue.try_pop(), run_load),
                Stage::Mesh => poll_loop(&shared, stage, |s| s.mesh_queue.try_pop(), run_mesh),
                Stage::Save => poll_loop(&shared, stage, |s| s.save_queue.try_pop(), run_save),
            })?;
        handles.push(handle);
    }
    Ok(())
}

fn poll_loop<J>(
    shared: &Shared,
    stage: Stage,
    pop: impl Fn(&Shared) -> Option<J>,
    run: impl Fn(&Shared, J),
) {
    trace!(%stage, "worker started");
    while shared.running.load(Ordering::Acquire) {
        match pop(shared) {
            Some(job) => {
                let counter = shared.counter(stage);
                counter.fetch_add(1, Ordering::Relaxed);
                run(shared, job);
                counter.fetch_sub(1, Ordering::Relaxed);
            }
            None => thread::sleep(shared.idle_poll),
        }
    }
    trace!(%stage, "worker stopped");
}

/// Runs `f`, turning a panic into [`JobError::Panicked`].
fn guarded<T>(f: impl FnOnce() -> Result<T, JobError>) -> Result<T, JobError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(JobError::from_panic(payload)))
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

fn run_load(shared: &Shared, job: LoadJob) {
    let start = Instant::now();
    let outcome = guarded(|| Ok(shared.world.get_or_create_chunk(job.coord)?));
    if let Err(e) = &outcome {
        warn!(coord = ?job.coord, error = %e, "chunk load failed");
    }
    // The receiver lives as long as `Shared`; a send can only fail during teardown.
    let _ = shared.load_results.send(LoadResult {
        coord: job.coord,
        priority: job.priority,
        outcome,
        elapsed: start.elapsed(),
    });
}

// ---------------------------------------------------------------------------
// Mesh
// ---------------------------------------------------------------------------

/// A neighborhood snapshot plus what is needed to decide cacheability.
struct MeshInputs {
    hood: ChunkNeighborhood,
    /// Versions of the centre and every loaded face neighbor at capture time.
    footprint: Vec<(ChunkCoord, u64)>,
    /// No unsaved edits anywhere in the footprint and no in-world neighbor
    /// missing, so the result matches what is on disk.
    matches_disk: bool,
}

fn capture_inputs(world: &VoxelWorld, coord: ChunkCoord) -> Option<MeshInputs> {
    let meta = world.meta();
    world.read(|chunks| {
        let hood = ChunkNeighborhood::capture_in(chunks, coord)?;
        let mut footprint = vec![(coord, hood.center().version())];
        let mut matches_disk = !hood.center().needs_save();
        for neighbor in coord.face_neighbors() {
            match chunks.get(&neighbor) {
                Some(chunk) => {
                    matches_disk &= !chunk.needs_save();
                    footprint.push((neighbor, chunk.version()));
                }
                None => matches_disk &= !meta.contains_chunk(neighbor),
            }
        }
        Some(MeshInputs {
            hood,
            footprint,
            matches_disk,
        })
    })
}

/// The newest write time among the chunk files a mesh of `coord` depends on.
fn newest_source(store: Option<&ChunkFileStore>, coord: ChunkCoord) -> Option<SystemTime> {
    let store = store?;
    std::iter::once(coord)
        .chain(coord.face_neighbors())
        .filter_map(|c| store.modified(c))
        .max()
}

fn footprint_unchanged(world: &VoxelWorld, footprint: &[(ChunkCoord, u64)]) -> bool {
    world.read(|chunks| {
        footprint.iter().all(|(coord, version)| {
            chunks
                .get(coord)
                .is_some_and(|c| c.version() == *version && !c.needs_save())
        })
    })
}

fn run_mesh(shared: &Shared, job: MeshJob) {
    let start = Instant::now();
    let mut mesh_version = 0;
    let mut from_cache = false;
    let outcome = guarded(|| {
        let inputs = capture_inputs(&shared.world, job.coord).ok_or(JobError::NotLoaded(job.coord))?;
        mesh_version = inputs.hood.center().mesh_version();

        let cache = shared
            .mesh_cache
            .as_ref()
            .filter(|_| job.mode == MeshMode::Full && inputs.matches_disk);
        if let Some(cache) = cache {
            let source = newest_source(shared.world.store(), job.coord);
            if let Some(mesh) = cache.try_load_fresh(job.coord, source) {
                from_cache = true;
                return Ok(mesh);
            }
        }

        let mesh = shared.mesher.build(&inputs.hood, job.mode);
        if let Some(cache) = cache {
            store_in_cache(shared, cache, &mesh, &inputs.footprint);
        }
        Ok(mesh)
    });

    match &outcome {
        Ok(mesh) => debug!(
            coord = ?job.coord,
            mode = ?job.mode,
            quads = mesh.quad_count(),
            from_cache,
            elapsed_us = start.elapsed().as_micros() as u64,
            "meshed chunk"
        ),
        Err(e) => warn!(coord = ?job.coord, mode = ?job.mode, error = %e, "meshing failed"),
    }
    let _ = shared.mesh_results.send(MeshResult {
        coord: job.coord,
        priority: job.priority,
        mode: job.mode,
        ticket: job.ticket,
        mesh_version,
        outcome,
        from_cache,
        elapsed: start.elapsed(),
    });
}

fn store_in_cache(shared: &Shared, cache: &MeshCache, mesh: &ChunkMesh, footprint: &[(ChunkCoord, u64)]) {
    // An edit landing mid-build would leave a cache entry newer than the
    // chunk file but older than its contents.
    if !footprint_unchanged(&shared.world, footprint) {
        trace!(coord = ?mesh.coord, "skipping mesh cache write, chunk changed");
        return;
    }
    if let Err(e) = cache.store(mesh) {
        warn!(coord = ?mesh.coord, error = %e, "mesh cache write failed");
    }
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

fn run_save(shared: &Shared, job: SaveJob) {
    let coord = job.coord;
    let evicted = job.evicted.is_some();
    let mut retained = None;
    let outcome = match job.evicted {
        Some(chunk) => {
            let result = guarded(|| match shared.world.store() {
                Some(store) => {
                    store.save(&chunk)?;
                    Ok(true)
                }
                None => Ok(false),
            });
            if result.is_err() {
                retained = Some(chunk);
            }
            result
        }
        None => guarded(|| Ok(shared.world.save_chunk_now(coord)?)),
    };

    match &outcome {
        Ok(true) => trace!(coord = ?coord, evicted, "saved chunk"),
        Ok(false) => {}
        Err(e) => warn!(coord = ?coord, evicted, error = %e, "chunk save failed"),
    }
    let _ = shared.save_results.send(SaveResult {
        coord,
        outcome,
        retained,
        evicted,
    });
}
