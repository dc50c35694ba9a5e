//! Headless frame loop around [`ChunkStreamingService`].
//!
//! Stands in for a game client: a viewpoint walks across the world surface,
//! chunks around it are requested and evicted, finished meshes are "uploaded"
//! into a resident set, blocks are edited now and then, and dirty chunks are
//! autosaved. Everything runs on the calling thread except the service's
//! workers.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lattice_config::{Config, StreamingSettings};
use lattice_mesh::{GreedyMesher, MeshCache};
use lattice_stream::{ChunkStreamingService, ShutdownReport, StreamingConfig, StreamingPlanner};
use lattice_terrain::TerrainGenerator;
use lattice_voxel::{BlockId, ChunkCoord, ChunkFileStore, ChunkGenerator, VoxelWorld, WorldMeta, WorldMetaError};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

/// Chunk files live in `<world_dir>/chunks`.
pub const CHUNKS_DIR: &str = "chunks";
/// Cached meshes live in `<world_dir>/meshes`.
pub const MESHES_DIR: &str = "meshes";

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    WorldMeta(#[from] WorldMetaError),
    #[error("failed to open {what} at {path}: {source}")]
    Open {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start streaming workers: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Maps the on-disk settings onto the service's tuning.
pub fn streaming_config(settings: &StreamingSettings) -> StreamingConfig {
    StreamingConfig {
        load_workers: settings.load_workers,
        mesh_workers: settings.mesh_workers,
        load_queue_capacity: settings.load_queue_capacity,
        mesh_queue_capacity: settings.mesh_queue_capacity,
        save_queue_capacity: settings.save_queue_capacity,
        urgent_queue_capacity: settings.urgent_queue_capacity,
        max_saves_per_second: settings.max_saves_per_second,
        mesh_retry_limit: settings.mesh_retry_limit,
        stuck_timeout: Duration::from_millis(settings.stuck_timeout_ms),
        idle_poll: Duration::from_millis(settings.idle_poll_ms),
        shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
        auto_mesh: true,
        use_mesh_cache: settings.use_mesh_cache,
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

/// Frame loop tuning.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub frames: u32,
    /// Sleep between frames.
    pub frame_time: Duration,
    /// Viewpoint speed along X.
    pub blocks_per_frame: f32,
    /// Results drained per stage per frame.
    pub drain_budget: usize,
    /// Place a block every this many frames. 0 disables edits.
    pub edit_every: u32,
    /// Queue every dirty chunk for a throttled save this often. 0 disables.
    pub autosave_every: u32,
    /// After the last frame, keep draining until idle or this long passes.
    pub settle_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            frames: 600,
            frame_time: Duration::from_millis(16),
            blocks_per_frame: 0.5,
            drain_budget: 32,
            edit_every: 120,
            autosave_every: 300,
            settle_timeout: Duration::from_secs(5),
        }
    }
}

/// What a mesh upload would hand the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResidentMesh {
    vertices: usize,
    placeholder: bool,
}

/// Totals reported when the driver finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u32,
    pub chunks_loaded: usize,
    pub load_failures: usize,
    pub meshes_uploaded: usize,
    pub mesh_cache_hits: usize,
    pub placeholders: usize,
    /// Meshes still resident when the loop ended.
    pub resident_meshes: usize,
    pub resident_vertices: usize,
    pub edits: usize,
    pub chunks_saved: usize,
    pub save_failures: usize,
    pub chunks_unloaded: usize,
    pub stuck_episodes: usize,
    pub shutdown: ShutdownReport,
}

pub struct Driver {
    service: ChunkStreamingService,
    planner: StreamingPlanner,
    terrain: Arc<TerrainGenerator>,
    resident: FxHashMap<ChunkCoord, ResidentMesh>,
    summary: SessionSummary,
    viewpoint: [f32; 3],
    heading: f32,
    last_center: Option<ChunkCoord>,
    replan: bool,
    stuck: bool,
}

impl Driver {
    /// Opens (or creates) the configured world and starts streaming.
    pub fn open(config: &Config) -> Result<Self, DriverError> {
        let world_dir = config.world.world_dir();
        let w = &config.world;
        let fresh = WorldMeta::new(w.seed.unwrap_or_else(clock_seed), w.width, w.height, w.depth);
        let meta = WorldMeta::load_or_create(&world_dir, fresh)?;

        let chunks_dir = world_dir.join(CHUNKS_DIR);
        let store = ChunkFileStore::open(&chunks_dir).map_err(|source| DriverError::Open {
            what: "chunk store",
            path: chunks_dir,
            source,
        })?;
        let mesh_cache = if config.streaming.use_mesh_cache {
            let meshes_dir = world_dir.join(MESHES_DIR);
            Some(MeshCache::open(&meshes_dir).map_err(|source| DriverError::Open {
                what: "mesh cache",
                path: meshes_dir,
                source,
            })?)
        } else {
            None
        };

        let terrain = Arc::new(TerrainGenerator::new(&meta));
        let generator: Arc<dyn ChunkGenerator> = terrain.clone();
        let spawn = meta.spawn;
        let world = Arc::new(VoxelWorld::new(meta, Some(store), generator));

        let streaming = streaming_config(&config.streaming);
        if streaming.load_workers + streaming.mesh_workers + 1 > num_cpus::get() {
            debug!(
                cpus = num_cpus::get(),
                load_workers = streaming.load_workers,
                mesh_workers = streaming.mesh_workers,
                "more streaming workers than CPUs"
            );
        }
        let service = ChunkStreamingService::start(world, GreedyMesher::with_defaults(), mesh_cache, streaming)
            .map_err(DriverError::Spawn)?;

        let mut driver = Self {
            service,
            planner: StreamingPlanner::new(config.streaming.view_radius, config.streaming.unload_radius),
            terrain,
            resident: FxHashMap::default(),
            summary: SessionSummary::default(),
            viewpoint: [spawn[0] as f32, 0.0, spawn[2] as f32],
            heading: 1.0,
            last_center: None,
            replan: true,
            stuck: false,
        };
        driver.viewpoint[1] = driver.eye_height(spawn[0], spawn[2]) as f32;
        info!(
            world = %world_dir.display(),
            seed = driver.meta().seed,
            view_radius = driver.planner.view_radius(),
            "world opened"
        );
        Ok(driver)
    }

    pub fn meta(&self) -> &WorldMeta {
        self.service.world().meta()
    }

    pub fn service(&self) -> &ChunkStreamingService {
        &self.service
    }

    /// A few blocks above the terrain surface, clamped to the world.
    fn eye_height(&self, wx: i32, wz: i32) -> i32 {
        let top = self.meta().height as i32 - 1;
        (self.terrain.columns().sample(wx, wz).height + 2).clamp(0, top)
    }

    fn block_pos(&self) -> [i32; 3] {
        self.viewpoint.map(|v| v.floor() as i32)
    }

    /// Runs the frame loop, settles and shuts the service down.
    pub fn run(mut self, options: &DriverOptions) -> SessionSummary {
        let start = Instant::now();
        for frame in 0..options.frames {
            self.frame(frame, options);
            thread::sleep(options.frame_time);
        }
        self.summary.frames = options.frames;

        let deadline = Instant::now() + options.settle_timeout;
        while !self.service.is_idle() && Instant::now() < deadline {
            self.drain(options.drain_budget);
            thread::sleep(Duration::from_millis(1));
        }
        self.finish(start.elapsed())
    }

    fn frame(&mut self, frame: u32, options: &DriverOptions) {
        self.advance(options.blocks_per_frame);
        self.update_requests();
        self.drain(options.drain_budget);

        if options.edit_every > 0 && frame % options.edit_every == options.edit_every - 1 {
            self.place_marker();
        }
        if options.autosave_every > 0 && frame % options.autosave_every == options.autosave_every - 1 {
            let queued = self.service.flush_dirty(false);
            debug!(frame, queued, "autosave");
        }
        self.check_health();
    }

    /// Moves along X and turns around at the world edge.
    fn advance(&mut self, speed: f32) {
        let max_x = (self.meta().width - 1) as f32;
        let mut x = self.viewpoint[0] + self.heading * speed;
        if x <= 0.0 || x >= max_x {
            self.heading = -self.heading;
            x = x.clamp(0.0, max_x);
        }
        self.viewpoint[0] = x;
        let [wx, _, wz] = self.block_pos();
        self.viewpoint[1] = self.eye_height(wx, wz) as f32;
    }

    fn update_requests(&mut self) {
        let [x, y, z] = self.block_pos();
        let center = ChunkCoord::from_block(x, y, z);
        if !self.replan && self.last_center == Some(center) {
            return;
        }

        let meta = self.service.world().meta().clone();
        let wanted = self.planner.plan(center, &meta);
        let requested = self.service.request_chunks(&wanted);
        // A full queue rejects the rest; ask again next frame.
        self.replan = requested.rejected > 0;

        let evicted = self.service.unload_outside(&self.planner.keep_set(center, &meta));
        for coord in &evicted {
            self.resident.remove(coord);
        }
        self.summary.chunks_unloaded += evicted.len();
        if self.last_center != Some(center) {
            debug!(
                ?center,
                queued = requested.queued,
                rejected = requested.rejected,
                evicted = evicted.len(),
                "viewpoint entered chunk"
            );
        }
        self.last_center = Some(center);
    }

    fn drain(&mut self, budget: usize) {
        for loaded in self.service.process_load_results(budget) {
            match loaded.outcome {
                Ok(_) => self.summary.chunks_loaded += 1,
                Err(_) => self.summary.load_failures += 1,
            }
        }

        for ready in self.service.process_mesh_results(budget) {
            self.summary.meshes_uploaded += 1;
            self.summary.mesh_cache_hits += usize::from(ready.from_cache);
            self.summary.placeholders += usize::from(ready.placeholder);
            self.resident.insert(
                ready.coord,
                ResidentMesh {
                    vertices: ready.mesh.vertex_count(),
                    placeholder: ready.placeholder,
                },
            );
        }

        for saved in self.service.process_save_results(budget) {
            match saved.outcome {
                Ok(true) => self.summary.chunks_saved += 1,
                Ok(false) => {}
                Err(_) => self.summary.save_failures += 1,
            }
        }
    }

    /// Drops a glass block just above the ground under the viewpoint.
    fn place_marker(&mut self) {
        let [x, _, z] = self.block_pos();
        let y = self.terrain.columns().sample(x, z).solid_top() + 1;
        if !self.meta().contains_block(x, y, z) {
            return;
        }
        match self.service.edit_block(x, y, z, BlockId::GLASS) {
            Ok(touched) => {
                self.summary.edits += 1;
                debug!(x, y, z, touched = touched.len(), "placed marker");
            }
            Err(e) => debug!(x, y, z, error = %e, "marker not placed"),
        }
    }

    /// Warns once per stuck episode.
    fn check_health(&mut self) {
        let stuck = self.service.is_stuck();
        if stuck && !self.stuck {
            let stats = self.service.stats();
            warn!(
                since_progress_ms = self.service.since_progress().as_millis() as u64,
                load_queued = stats.load_queued,
                mesh_queued = stats.mesh_queued,
                save_queued = stats.save_queued,
                "chunk pipeline appears stuck"
            );
            self.summary.stuck_episodes += 1;
        }
        self.stuck = stuck;
    }

    fn finish(mut self, elapsed: Duration) -> SessionSummary {
        self.summary.shutdown = self.service.shutdown();
        self.summary.resident_meshes = self.resident.len();
        self.summary.resident_vertices = self.resident.values().map(|m| m.vertices).sum();
        let resident_placeholders = self.resident.values().filter(|m| m.placeholder).count();
        info!(
            frames = self.summary.frames,
            elapsed_ms = elapsed.as_millis() as u64,
            loaded = self.summary.chunks_loaded,
            meshes = self.summary.meshes_uploaded,
            cache_hits = self.summary.mesh_cache_hits,
            resident = self.summary.resident_meshes,
            resident_placeholders,
            saved = self.summary.chunks_saved,
            flushed = self.summary.shutdown.flushed,
            abandoned = self.summary.shutdown.abandoned,
            "session finished"
        );
        self.summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_voxel::world_meta::WORLD_META_FILE;

    fn small_config(saves_dir: &std::path::Path, seed: u64) -> Config {
        let mut config = Config::default();
        config.world.saves_dir = saves_dir.to_path_buf();
        config.world.world_name = "test".to_string();
        config.world.seed = Some(seed);
        config.world.width = 64;
        config.world.height = 32;
        config.world.depth = 64;
        config.streaming.view_radius = 2;
        config.streaming.unload_radius = 3;
        config.streaming.max_saves_per_second = 0;
        config.streaming.idle_poll_ms = 1;
        config
    }

    fn quick_options(frames: u32) -> DriverOptions {
        DriverOptions {
            frames,
            frame_time: Duration::from_millis(2),
            blocks_per_frame: 1.0,
            drain_budget: 64,
            edit_every: 10,
            autosave_every: 25,
            settle_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_streaming_config_maps_settings() {
        let mut settings = StreamingSettings::default();
        settings.stuck_timeout_ms = 1500;
        settings.use_mesh_cache = false;
        let config = streaming_config(&settings);
        assert_eq!(config.load_workers, 4);
        assert_eq!(config.mesh_workers, 2);
        assert_eq!(config.max_saves_per_second, 20);
        assert_eq!(config.stuck_timeout, Duration::from_millis(1500));
        assert!(!config.use_mesh_cache);
        assert!(config.auto_mesh);
    }

    #[test]
    fn test_session_streams_meshes_and_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let config = small_config(tmp.path(), 7);
        let world_dir = config.world.world_dir();

        let summary = Driver::open(&config).unwrap().run(&quick_options(60));

        assert_eq!(summary.frames, 60);
        assert!(summary.chunks_loaded > 0);
        assert!(summary.meshes_uploaded > 0);
        assert!(summary.resident_meshes > 0);
        assert_eq!(summary.load_failures, 0);
        assert_eq!(summary.shutdown.abandoned, 0);
        assert!(world_dir.join(WORLD_META_FILE).exists());
        let chunk_files = std::fs::read_dir(world_dir.join(CHUNKS_DIR)).unwrap().count();
        assert!(chunk_files > 0);
    }

    #[test]
    fn test_reopen_keeps_seed() {
        let tmp = tempfile::tempdir().unwrap();
        let first = Driver::open(&small_config(tmp.path(), 7)).unwrap();
        assert_eq!(first.meta().seed, 7);
        first.run(&quick_options(5));

        let second = Driver::open(&small_config(tmp.path(), 99)).unwrap();
        assert_eq!(second.meta().seed, 7);
        second.run(&quick_options(5));
    }

    #[test]
    fn test_viewpoint_turns_at_world_edge() {
        let tmp = tempfile::tempdir().unwrap();
        let mut driver = Driver::open(&small_config(tmp.path(), 3)).unwrap();
        for _ in 0..200 {
            driver.advance(1.0);
            let [x, y, _] = driver.block_pos();
            assert!((0..64).contains(&x));
            assert!((0..32).contains(&y));
        }
        driver.run(&quick_options(0));
    }
}
