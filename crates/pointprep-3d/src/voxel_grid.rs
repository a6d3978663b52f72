use crate::pointcloud::PointCloud;
use glam::DVec3;
use std::collections::BTreeMap;

/// Error types for the voxel grid.
#[derive(Debug, thiserror::Error)]
pub enum VoxelGridError {
    /// The leaf size is not strictly positive and finite in every dimension.
    #[error("Leaf size must be positive and finite in all dimensions, got {0:?}")]
    InvalidLeafSize([f64; 3]),

    /// A point falls outside of the addressable voxel range.
    #[error("Voxel index out of range for point {0:?}, increase the leaf size")]
    IndexOutOfRange([f64; 3]),
}

/// Accumulated data of a single voxel.
#[derive(Default)]
struct VoxelData {
    point_sum: DVec3,
    color_sum: [u64; 3],
    normal_sum: DVec3,
    count: usize,
}

/// A 3D voxel grid for downsampling point clouds.
///
/// The grid is anchored half a leaf below the minimum bound of the input cloud, every
/// occupied voxel yields the centroid of its points.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    /// The size of the voxel (leaf) in x, y, z dimensions.
    leaf_size: DVec3,
    /// Minimum number of points required per voxel.
    min_points_per_voxel: usize,
    /// Whether to downsample all data (points, colors, normals) or just points.
    downsample_all_data: bool,
}

impl VoxelGrid {
    /// Creates a new `VoxelGrid` with the specified leaf size.
    ///
    /// # Arguments
    /// * `leaf_size` - The size of the voxel in x, y, z dimensions.
    ///
    /// # Errors
    /// Returns an error if any dimension of `leaf_size` is non-positive or not finite.
    pub fn new(leaf_size: DVec3) -> Result<Self, VoxelGridError> {
        check_leaf_size(leaf_size)?;
        Ok(VoxelGrid {
            leaf_size,
            min_points_per_voxel: 1,
            downsample_all_data: true,
        })
    }

    /// Downsamples the input point cloud by grouping points into voxels and computing centroids.
    ///
    /// # Arguments
    /// * `point_cloud` - The input point cloud to downsample.
    ///
    /// # Returns
    /// A new `PointCloud` containing the downsampled points, and optionally colors and
    /// normals, ordered by voxel index.
    pub fn downsample(&self, point_cloud: &PointCloud) -> Result<PointCloud, VoxelGridError> {
        if point_cloud.is_empty() {
            log::warn!("VoxelGrid::downsample: input point cloud is empty");
            return Ok(PointCloud::default());
        }

        let origin = point_cloud.get_min_bound() - self.leaf_size * 0.5;
        let colors = point_cloud.colors().filter(|_| self.downsample_all_data);
        let normals = point_cloud.normals().filter(|_| self.downsample_all_data);

        // group points into voxels, the ordered map keeps the output deterministic
        let mut grid: BTreeMap<[i64; 3], VoxelData> = BTreeMap::new();
        for (i, point) in point_cloud.points().iter().enumerate() {
            let key = self.voxel_index_from(origin, point)?;
            let entry = grid.entry(key).or_default();
            entry.point_sum += DVec3::from_array(*point);
            entry.count += 1;

            if let Some(color) = colors.and_then(|c| c.get(i)) {
                for (acc, &c) in entry.color_sum.iter_mut().zip(color.iter()) {
                    *acc += c as u64;
                }
            }
            if let Some(normal) = normals.and_then(|n| n.get(i)) {
                entry.normal_sum += DVec3::from_array(*normal);
            }
        }

        let mut out_points = Vec::with_capacity(grid.len());
        let mut out_colors = colors.map(|_| Vec::with_capacity(grid.len()));
        let mut out_normals = normals.map(|_| Vec::with_capacity(grid.len()));

        for voxel in grid.values() {
            if voxel.count < self.min_points_per_voxel {
                continue;
            }
            let inv_count = 1.0 / voxel.count as f64;
            out_points.push((voxel.point_sum * inv_count).to_array());

            if let Some(out_colors) = out_colors.as_mut() {
                out_colors.push(
                    voxel
                        .color_sum
                        .map(|c| (c as f64 * inv_count).round().min(255.0) as u8),
                );
            }
            if let Some(out_normals) = out_normals.as_mut() {
                // opposite normals cancel out, keep the zero vector in that case
                let normal = voxel.normal_sum * inv_count;
                out_normals.push(normal.try_normalize().unwrap_or(normal).to_array());
            }
        }

        log::debug!(
            "VoxelGrid::downsample: {} points into {} voxels",
            point_cloud.len(),
            out_points.len()
        );

        Ok(PointCloud::new(out_points, out_colors, out_normals))
    }

    /// Computes the voxel index of a point for a grid anchored at `origin`.
    ///
    /// # Arguments
    /// * `origin` - The corner of the voxel `[0, 0, 0]`.
    /// * `point` - The input point as `[x, y, z]`.
    pub fn get_voxel_index(&self, origin: DVec3, point: &[f64; 3]) -> Option<[i64; 3]> {
        let index = ((DVec3::from_array(*point) - origin) / self.leaf_size).floor();
        if index.is_finite() && index.abs().max_element() < i64::MAX as f64 {
            Some([index.x as i64, index.y as i64, index.z as i64])
        } else {
            None
        }
    }

    fn voxel_index_from(&self, origin: DVec3, point: &[f64; 3]) -> Result<[i64; 3], VoxelGridError> {
        self.get_voxel_index(origin, point)
            .ok_or(VoxelGridError::IndexOutOfRange(*point))
    }

    /// Sets the voxel grid leaf size.
    ///
    /// # Errors
    /// Returns an error if any dimension of `leaf_size` is non-positive or not finite.
    pub fn set_leaf_size(&mut self, leaf_size: DVec3) -> Result<(), VoxelGridError> {
        check_leaf_size(leaf_size)?;
        self.leaf_size = leaf_size;
        Ok(())
    }

    /// Gets the voxel grid leaf size.
    pub fn get_leaf_size(&self) -> DVec3 {
        self.leaf_size
    }

    /// Sets the minimum number of points required per voxel.
    pub fn set_min_points_per_voxel(&mut self, min_points: usize) {
        self.min_points_per_voxel = min_points;
    }

    /// Gets the minimum number of points required per voxel.
    pub fn get_min_points_per_voxel(&self) -> usize {
        self.min_points_per_voxel
    }

    /// Sets whether to downsample all data (points, colors, normals) or just points.
    ///
    /// # Arguments
    /// * `downsample` - If `true`, downsample all data; if `false`, only points.
    pub fn set_downsample_all_data(&mut self, downsample: bool) {
        self.downsample_all_data = downsample;
    }

    /// Gets whether all data (points, colors, normals) is downsampled.
    pub fn get_downsample_all_data(&self) -> bool {
        self.downsample_all_data
    }
}

fn check_leaf_size(leaf_size: DVec3) -> Result<(), VoxelGridError> {
    if leaf_size.is_finite() && leaf_size.min_element() > 0.0 {
        Ok(())
    } else {
        Err(VoxelGridError::InvalidLeafSize(leaf_size.to_array()))
    }
}

/// Downsample a point cloud with a cubic voxel of side `voxel_size`.
///
/// Shorthand for a [`VoxelGrid`] with the default settings.
///
/// Example:
/// ```
/// use pointprep_3d::{pointcloud::PointCloud, voxel_grid::voxel_down_sample};
///
/// let cloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [0.01, 0.0, 0.0], [2.0, 0.0, 0.0]], None, None);
/// let downsampled = voxel_down_sample(&cloud, 0.5).unwrap();
/// assert_eq!(downsampled.len(), 2);
/// ```
pub fn voxel_down_sample(
    point_cloud: &PointCloud,
    voxel_size: f64,
) -> Result<PointCloud, VoxelGridError> {
    VoxelGrid::new(DVec3::splat(voxel_size))?.downsample(point_cloud)
}
