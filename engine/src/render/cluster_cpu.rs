//! CPU Cluster Pipeline
//!
//! Software path of the clustered lighting passes, used when compute shaders
//! are unavailable and as the reference the GPU output is checked against.
//! Each pass mirrors its WGSL kernel: rayon supplies the parallel work items
//! and `AtomicU32` supplies the same fetch-and-add / store semantics as the
//! shader atomics.
//!
//! Per-frame order (every step completes before the next starts):
//! clear flags → mark active → reset unique list → compact → indirect args →
//! reset index list + grid → assign lights over the compacted set.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use super::atomic_list::AtomicAppendList;
use super::cluster_bounds::ClusterBoundsTracker;
use super::cluster_buffers::{ClusterAabb, IndirectArgs, LightGridEntry};
use super::cluster_config::ClusterSettings;
use super::cluster_dims::GridDimensions;
use super::depth_buffer::DepthBuffer;
use super::frame_report::{CapacityWarning, ClusterFrameReport};
use super::point_lights::{LightSnapshot, PointLight};
use crate::camera::ClusterCamera;
use crate::error::{ClusterError, Result};

/// A light sphere moved into view space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Transform the snapshot's world-space lights by the view matrix.
pub fn lights_to_view_space(snapshot: &LightSnapshot, view: &Mat4) -> Vec<ViewSphere> {
    let mut spheres = Vec::with_capacity(snapshot.lights.len());
    lights_to_view_space_into(snapshot, view, &mut spheres);
    spheres
}

/// [`lights_to_view_space`] into a caller-owned buffer, replacing its contents.
pub fn lights_to_view_space_into(snapshot: &LightSnapshot, view: &Mat4, out: &mut Vec<ViewSphere>) {
    out.clear();
    out.extend(snapshot.lights.iter().map(|light| {
        let [x, y, z, radius] = light.position_radius;
        ViewSphere {
            center: view.transform_point3(Vec3::new(x, y, z)),
            radius,
        }
    }));
}

/// One light grid entry, written concurrently by the assignment pass.
#[derive(Debug, Default)]
pub struct GridCell {
    offset: AtomicU32,
    count: AtomicU32,
}

impl GridCell {
    #[inline]
    pub fn store(&self, entry: LightGridEntry) {
        self.offset.store(entry.offset, Ordering::Relaxed);
        self.count.store(entry.count, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> LightGridEntry {
        LightGridEntry::new(
            self.offset.load(Ordering::Relaxed),
            self.count.load(Ordering::Relaxed),
        )
    }
}

/// Sphere-AABB intersection matching `sphere_intersects_aabb` in
/// cluster_assign.wgsl: clamp the centre to the box, compare the squared
/// distance to the squared radius.
#[inline]
pub fn sphere_intersects_aabb(center: Vec3, radius: f32, aabb: &ClusterAabb) -> bool {
    let closest = center.clamp(aabb.min3(), aabb.max3());
    center.distance_squared(closest) <= radius * radius
}

/// Set the flag of every cluster touched by a non-background depth sample.
///
/// Concurrent stores of `1` to the same flag are idempotent.
pub fn mark_active_clusters(
    dims: &GridDimensions,
    inverse_projection: &Mat4,
    depth: &DepthBuffer,
    flags: &[AtomicU32],
) {
    (0..depth.height()).into_par_iter().for_each(|py| {
        for px in 0..depth.width() {
            let Some(view_depth) = depth.view_depth_at(inverse_projection, px, py) else {
                continue;
            };
            let cluster = dims.cluster_index_for(px as f32 + 0.5, py as f32 + 0.5, view_depth);
            if let Some(flag) = flags.get(cluster as usize) {
                flag.store(1, Ordering::Relaxed);
            }
        }
    });
}

/// Append the index of every flagged cluster to `unique`.
///
/// Entry order depends on scheduling; the set of entries does not.
pub fn find_unique_clusters(flags: &[AtomicU32], unique: &AtomicAppendList) {
    flags.par_iter().enumerate().for_each(|(index, flag)| {
        if flag.load(Ordering::Relaxed) != 0 {
            unique.push(index as u32);
        }
    });
}

/// Assign lights to each cluster in `unique`.
///
/// Every work item counts its hits, reserves that many consecutive slots in
/// `indices` with one atomic update, then walks the lights again to write the
/// hit light indices in light order. The cluster's entry goes to its `grid`
/// cell; the entry's count only covers indices actually written.
pub fn assign_lights_to_clusters(
    unique: &AtomicAppendList,
    aabbs: &[ClusterAabb],
    lights: &[ViewSphere],
    indices: &AtomicAppendList,
    grid: &[GridCell],
) {
    (0..unique.len()).into_par_iter().for_each(|slot| {
        let Some(cluster) = unique.get(slot) else {
            return;
        };
        let (Some(aabb), Some(cell)) = (aabbs.get(cluster as usize), grid.get(cluster as usize)) else {
            return;
        };
        let hits = |light: &ViewSphere| sphere_intersects_aabb(light.center, light.radius, aabb);

        let count = lights.iter().filter(|light| hits(*light)).count() as u32;
        let (start, writable) = indices.reserve(count);
        let hit_indices = lights
            .iter()
            .enumerate()
            .filter(|(_, light)| hits(*light))
            .take(writable as usize);
        for (n, (light_index, _)) in hit_indices.enumerate() {
            indices.write(start + n as u32, light_index as u32);
        }
        cell.store(LightGridEntry::new(start, writable));
    });
}

/// CPU implementation of the full per-frame cluster pipeline.
///
/// Buffers are sized when the grid is (re)dimensioned and reused in place
/// every frame after that. The light snapshot and view-space scratch only
/// grow when more lights arrive than any earlier frame had.
pub struct CpuClusterPipeline {
    settings: ClusterSettings,
    tracker: ClusterBoundsTracker,
    flags: Vec<AtomicU32>,
    unique: AtomicAppendList,
    grid_cells: Vec<GridCell>,
    light_grid: Vec<LightGridEntry>,
    light_indices: AtomicAppendList,
    indirect: IndirectArgs,
    snapshot: LightSnapshot,
    view_lights: Vec<ViewSphere>,
}

impl CpuClusterPipeline {
    pub fn new(settings: ClusterSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            tracker: ClusterBoundsTracker::new(),
            flags: Vec::new(),
            unique: AtomicAppendList::with_capacity(0),
            grid_cells: Vec::new(),
            light_grid: Vec::new(),
            light_indices: AtomicAppendList::with_capacity(0),
            indirect: IndirectArgs::default(),
            snapshot: LightSnapshot::default(),
            view_lights: Vec::new(),
        })
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    /// Redimension and rebuild cluster bounds if the camera intrinsics
    /// changed, reallocating the per-cluster buffers. Returns `true` when a
    /// rebuild happened.
    pub fn prepare(&mut self, camera: &ClusterCamera) -> Result<bool> {
        let rebuilt = self
            .tracker
            .update(camera, self.settings.block_size, self.settings.max_clusters)?;
        if rebuilt {
            let count = self.tracker.aabbs().len() as u32;
            self.flags = (0..count).map(|_| AtomicU32::new(0)).collect();
            self.unique = AtomicAppendList::with_capacity(count);
            self.grid_cells = (0..count).map(|_| GridCell::default()).collect();
            self.light_grid = vec![LightGridEntry::default(); count as usize];
            self.light_indices =
                AtomicAppendList::with_capacity(self.settings.light_index_capacity(count));
        }
        Ok(rebuilt)
    }

    /// Run one frame over `depth` and the scene's `lights`.
    pub fn run_frame(
        &mut self,
        camera: &ClusterCamera,
        depth: &DepthBuffer,
        lights: &[PointLight],
    ) -> Result<ClusterFrameReport> {
        if depth.resolution() != (camera.width, camera.height) {
            return Err(ClusterError::DepthBufferMismatch {
                expected: (camera.width, camera.height),
                actual: depth.resolution(),
            });
        }
        self.prepare(camera)?;
        let dims = *self.tracker.dims().ok_or(ClusterError::StaleBounds)?;

        let mut warnings = Vec::new();
        self.snapshot.recapture(lights, self.settings.max_lights);
        if let Some(warning) = self.snapshot.warning() {
            warnings.push(warning);
        }

        // Active clusters
        self.flags
            .par_iter()
            .for_each(|flag| flag.store(0, Ordering::Relaxed));
        mark_active_clusters(&dims, &camera.inverse_projection(), depth, &self.flags);

        // Compaction
        self.unique.reset();
        find_unique_clusters(&self.flags, &self.unique);
        let active_clusters = self.unique.len();
        self.indirect = IndirectArgs::from_unique_count(active_clusters);

        // Assignment
        self.light_indices.reset();
        self.grid_cells
            .par_iter()
            .for_each(|cell| cell.store(LightGridEntry::default()));
        lights_to_view_space_into(&self.snapshot, &camera.view_matrix(), &mut self.view_lights);
        assign_lights_to_clusters(
            &self.unique,
            self.tracker.aabbs(),
            &self.view_lights,
            &self.light_indices,
            &self.grid_cells,
        );
        self.light_grid
            .par_iter_mut()
            .zip(self.grid_cells.par_iter())
            .for_each(|(entry, cell)| *entry = cell.load());

        let dropped = self.light_indices.overflow();
        if dropped > 0 {
            let warning = CapacityWarning::LightIndexOverflow {
                dropped,
                capacity: self.light_indices.capacity(),
            };
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        let report = ClusterFrameReport {
            active_clusters,
            light_count: self.snapshot.len(),
            light_assignments: self.light_indices.len(),
            max_lights_per_cluster: self.light_grid.iter().map(|e| e.count).max().unwrap_or(0),
            warnings,
        };
        log::debug!(
            "Cluster frame: {} active clusters, {} lights, {} assignments (max {} per cluster)",
            report.active_clusters,
            report.light_count,
            report.light_assignments,
            report.max_lights_per_cluster
        );
        Ok(report)
    }

    /// Grid of the last prepared camera.
    pub fn dims(&self) -> Option<&GridDimensions> {
        self.tracker.dims()
    }

    pub fn aabbs(&self) -> &[ClusterAabb] {
        self.tracker.aabbs()
    }

    pub fn is_active(&self, cluster: u32) -> bool {
        self.flags
            .get(cluster as usize)
            .is_some_and(|flag| flag.load(Ordering::Relaxed) != 0)
    }

    /// Flag value per cluster (0 or 1).
    pub fn flags(&self) -> Vec<u32> {
        self.flags.iter().map(|f| f.load(Ordering::Relaxed)).collect()
    }

    /// The compacted active-cluster list of the last frame.
    pub fn unique_clusters(&self) -> Vec<u32> {
        self.unique.to_vec()
    }

    pub fn light_grid(&self) -> &[LightGridEntry] {
        &self.light_grid
    }

    /// The whole light index list written last frame.
    pub fn light_index_list(&self) -> Vec<u32> {
        self.light_indices.to_vec()
    }

    /// Light indices assigned to one cluster.
    pub fn light_indices_for(&self, cluster: u32) -> Vec<u32> {
        let Some(entry) = self.light_grid.get(cluster as usize) else {
            return Vec::new();
        };
        (entry.offset..entry.offset + entry.count)
            .filter_map(|slot| self.light_indices.get(slot))
            .collect()
    }

    pub fn light_index_capacity(&self) -> u32 {
        self.light_indices.capacity()
    }

    pub fn indirect_args(&self) -> IndirectArgs {
        self.indirect
    }

    pub fn snapshot(&self) -> &LightSnapshot {
        &self.snapshot
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> ClusterAabb {
        ClusterAabb::new(Vec3::ZERO, Vec3::splat(10.0))
    }

    fn unique_list(clusters: &[u32]) -> AtomicAppendList {
        let list = AtomicAppendList::with_capacity(clusters.len() as u32);
        for &cluster in clusters {
            list.push(cluster);
        }
        list
    }

    fn grid_cells(count: usize) -> Vec<GridCell> {
        (0..count).map(|_| GridCell::default()).collect()
    }

    #[test]
    fn test_sphere_aabb_intersect_inside() {
        assert!(sphere_intersects_aabb(Vec3::splat(5.0), 1.0, &unit_box()));
    }

    #[test]
    fn test_sphere_aabb_intersect_touching() {
        assert!(sphere_intersects_aabb(Vec3::new(11.0, 5.0, 5.0), 1.0, &unit_box()));
    }

    #[test]
    fn test_sphere_aabb_intersect_miss() {
        assert!(!sphere_intersects_aabb(Vec3::new(15.0, 5.0, 5.0), 1.0, &unit_box()));
    }

    #[test]
    fn test_sphere_aabb_intersect_corner() {
        // Distance from (11,11,11) to corner (10,10,10) is sqrt(3)
        let d = 3.0_f32.sqrt();
        assert!(!sphere_intersects_aabb(Vec3::splat(11.0), d - 0.01, &unit_box()));
        assert!(sphere_intersects_aabb(Vec3::splat(11.0), d + 0.01, &unit_box()));
    }

    #[test]
    fn test_find_unique_clusters() {
        let flags: Vec<AtomicU32> = [0, 1, 0, 1, 1, 0]
            .iter()
            .map(|v| AtomicU32::new(*v))
            .collect();
        let unique = AtomicAppendList::with_capacity(6);
        find_unique_clusters(&flags, &unique);

        let mut listed = unique.to_vec();
        listed.sort_unstable();
        assert_eq!(listed, vec![1, 3, 4]);
    }

    #[test]
    fn test_assign_contiguous_ranges() {
        let aabbs = vec![
            ClusterAabb::new(Vec3::ZERO, Vec3::ONE),
            ClusterAabb::new(Vec3::splat(10.0), Vec3::splat(11.0)),
        ];
        let lights = vec![
            ViewSphere { center: Vec3::splat(0.5), radius: 0.1 },
            ViewSphere { center: Vec3::splat(10.5), radius: 0.1 },
            ViewSphere { center: Vec3::splat(5.0), radius: 100.0 },
        ];
        let indices = AtomicAppendList::with_capacity(16);
        let grid = grid_cells(2);
        assign_lights_to_clusters(&unique_list(&[0, 1]), &aabbs, &lights, &indices, &grid);

        let written = indices.to_vec();
        assert_eq!(written.len(), 4);
        for (cluster, expected) in [(0usize, [0u32, 2]), (1, [1, 2])] {
            let entry = grid[cluster].load();
            assert_eq!(entry.count, 2);
            assert_eq!(&written[entry.range()], &expected);
        }
    }

    #[test]
    fn test_assign_overflow_clamps_count() {
        let aabbs = vec![ClusterAabb::new(Vec3::ZERO, Vec3::ONE)];
        let lights = vec![ViewSphere { center: Vec3::splat(0.5), radius: 1.0 }; 5];
        let indices = AtomicAppendList::with_capacity(3);
        let grid = grid_cells(1);
        assign_lights_to_clusters(&unique_list(&[0]), &aabbs, &lights, &indices, &grid);

        assert_eq!(grid[0].load(), LightGridEntry::new(0, 3));
        assert_eq!(indices.overflow(), 2);
        assert_eq!(indices.to_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn test_assign_into_full_list_keeps_earlier_ranges() {
        let aabbs = vec![ClusterAabb::new(Vec3::ZERO, Vec3::ONE)];
        let lights = vec![ViewSphere { center: Vec3::splat(0.5), radius: 1.0 }; 3];
        let indices = AtomicAppendList::with_capacity(8);
        let (start, granted) = indices.reserve(3);
        for slot in start..start + granted {
            indices.write(slot, 77);
        }
        // Large enough to wrap a plain u32 cursor back to slot 0
        indices.reserve(u32::MAX - 2);

        let grid = grid_cells(1);
        assign_lights_to_clusters(&unique_list(&[0]), &aabbs, &lights, &indices, &grid);

        assert_eq!(grid[0].load(), LightGridEntry::new(8, 0));
        assert_eq!(&indices.to_vec()[..3], &[77u32, 77, 77]);
        assert_eq!(indices.overflow(), (u32::MAX - 7) + 3);
    }

    #[test]
    fn test_lights_to_view_space_into_reuses_buffer() {
        let snapshot = LightSnapshot::capture(&[PointLight::at([1.0, 2.0, 3.0], 4.0); 4], 4);
        let mut spheres = Vec::with_capacity(4);
        let ptr = spheres.as_ptr();
        lights_to_view_space_into(&snapshot, &Mat4::IDENTITY, &mut spheres);
        lights_to_view_space_into(&snapshot, &Mat4::IDENTITY, &mut spheres);

        assert_eq!(spheres.len(), 4);
        assert_eq!(spheres.as_ptr(), ptr);
        assert_eq!(spheres[0], ViewSphere { center: Vec3::new(1.0, 2.0, 3.0), radius: 4.0 });
    }

    #[test]
    fn test_frames_reuse_light_storage() {
        let mut pipeline = CpuClusterPipeline::new(ClusterSettings::default()).unwrap();
        let camera = ClusterCamera::default().with_resolution(64, 64);
        let mut depth = DepthBuffer::new(64, 64);
        depth.fill_view_depth(&camera, 10.0);
        let lights = vec![PointLight::at([0.0, 0.0, -10.0], 5.0); 8];

        pipeline.run_frame(&camera, &depth, &lights).unwrap();
        let snapshot_ptr = pipeline.snapshot.lights.as_ptr();
        let view_ptr = pipeline.view_lights.as_ptr();
        let first = pipeline.light_grid().to_vec();

        pipeline.run_frame(&camera, &depth, &lights[..6]).unwrap();
        assert_eq!(pipeline.snapshot.lights.as_ptr(), snapshot_ptr);
        assert_eq!(pipeline.view_lights.as_ptr(), view_ptr);
        assert_eq!(pipeline.snapshot().len(), 6);
        assert!(first.iter().any(|e| e.count == 8));
        assert!(pipeline.light_grid().iter().all(|e| e.count <= 6));
    }

    #[test]
    fn test_pipeline_rejects_depth_mismatch() {
        let mut pipeline = CpuClusterPipeline::new(ClusterSettings::default()).unwrap();
        let camera = ClusterCamera::default().with_resolution(64, 64);
        let depth = DepthBuffer::new(32, 32);
        let err = pipeline.run_frame(&camera, &depth, &[]).unwrap_err();
        assert!(matches!(err, ClusterError::DepthBufferMismatch { .. }));
    }

    #[test]
    fn test_pipeline_rejects_bad_settings() {
        let settings = ClusterSettings {
            average_overlap: 0,
            ..Default::default()
        };
        assert!(CpuClusterPipeline::new(settings).is_err());
    }

    #[test]
    fn test_empty_depth_marks_nothing() {
        let mut pipeline = CpuClusterPipeline::new(ClusterSettings::default()).unwrap();
        let camera = ClusterCamera::default().with_resolution(64, 64);
        let depth = DepthBuffer::new(64, 64);
        let lights = [PointLight::at([0.0, 0.0, 0.0], 5.0)];
        let report = pipeline.run_frame(&camera, &depth, &lights).unwrap();

        assert_eq!(report.active_clusters, 0);
        assert_eq!(report.light_assignments, 0);
        assert_eq!(pipeline.indirect_args().dispatch.x, 0);
        assert!(pipeline.light_grid().iter().all(|e| e.count == 0));
    }
}
