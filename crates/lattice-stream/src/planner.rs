//! Which chunks to stream in around a viewpoint, and which to keep.
//!
//! Loading uses `view_radius`; unloading uses the larger `unload_radius`, so a
//! viewpoint hovering on a chunk border does not thrash chunks in and out.

use rustc_hash::FxHashSet;

use lattice_voxel::{ChunkCoord, WorldMeta};

use crate::jobs::Priority;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamingPlanner {
    view_radius: u32,
    unload_radius: u32,
}

impl StreamingPlanner {
    /// `unload_radius` is raised to `view_radius` if smaller.
    pub fn new(view_radius: u32, unload_radius: u32) -> Self {
        Self {
            view_radius,
            unload_radius: unload_radius.max(view_radius),
        }
    }

    pub fn view_radius(&self) -> u32 {
        self.view_radius
    }

    pub fn unload_radius(&self) -> u32 {
        self.unload_radius
    }

    /// In-world chunks within `view_radius` of `center`, nearest first, each
    /// with its distance priority.
    pub fn plan(&self, center: ChunkCoord, meta: &WorldMeta) -> Vec<(ChunkCoord, Priority)> {
        let mut wanted: Vec<(u64, ChunkCoord)> = sphere(center, self.view_radius)
            .filter(|&c| meta.contains_chunk(c))
            .map(|c| (c.distance_sq(center), c))
            .collect();
        wanted.sort_unstable();
        wanted
            .into_iter()
            .map(|(d, c)| (c, Priority::from_distance_sq(d)))
            .collect()
    }

    /// Chunks that must stay loaded while the viewpoint is at `center`.
    pub fn keep_set(&self, center: ChunkCoord, meta: &WorldMeta) -> FxHashSet<ChunkCoord> {
        sphere(center, self.unload_radius)
            .filter(|&c| meta.contains_chunk(c))
            .collect()
    }
}

fn sphere(center: ChunkCoord, radius: u32) -> impl Iterator<Item = ChunkCoord> {
    let r = radius.min(i32::MAX as u32) as i32;
    let r_sq = u64::from(radius) * u64::from(radius);
    (-r..=r).flat_map(move |dx| {
        (-r..=r).flat_map(move |dy| {
            (-r..=r).filter_map(move |dz| {
                let c = center.offset(dx, dy, dz);
                (c.distance_sq(center) <= r_sq).then_some(c)
            })
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> WorldMeta {
        WorldMeta::new(7, 256, 64, 256)
    }

    #[test]
    fn test_plan_is_nearest_first() {
        let planner = StreamingPlanner::new(3, 5);
        let center = ChunkCoord::new(8, 2, 8);
        let plan = planner.plan(center, &meta());
        assert_eq!(plan[0].0, center);
        for pair in plan.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "{pair:?}");
        }
        assert!(plan.iter().all(|(c, _)| c.distance_sq(center) <= 9));
    }

    #[test]
    fn test_plan_clipped_to_world() {
        let planner = StreamingPlanner::new(2, 2);
        let m = meta();
        let plan = planner.plan(ChunkCoord::new(0, 0, 0), &m);
        assert!(!plan.is_empty());
        assert!(plan.iter().all(|(c, _)| m.contains_chunk(*c)));
        assert!(plan.iter().all(|(c, _)| c.x >= 0 && c.y >= 0 && c.z >= 0));
    }

    #[test]
    fn test_keep_set_has_hysteresis() {
        let planner = StreamingPlanner::new(2, 4);
        let center = ChunkCoord::new(8, 2, 8);
        let keep = planner.keep_set(center, &meta());
        for (c, _) in planner.plan(center, &meta()) {
            assert!(keep.contains(&c));
        }
        assert!(keep.contains(&center.offset(3, 0, 0)));
        assert!(!keep.contains(&center.offset(5, 0, 0)));
    }

    #[test]
    fn test_unload_radius_never_below_view() {
        let planner = StreamingPlanner::new(5, 1);
        assert_eq!(planner.unload_radius(), 5);
    }
}
