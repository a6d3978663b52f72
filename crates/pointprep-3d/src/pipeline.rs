//! The preprocessing pipeline: recentering, statistical outlier removal, voxel
//! downsampling, normal estimation and, optionally, multi plane segmentation.

use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::filter::{remove_statistical_outlier, FilterError};
use crate::io::{read_point_cloud, ReadPointCloudError};
use crate::kdtree::KdTreeSearchParam;
use crate::normals::estimate_normals;
use crate::ops::{compute_nearest_neighbor_distance, mean};
use crate::pointcloud::PointCloud;
use crate::segmentation::{segment_planes, PlaneSegment, SegmentationError, SegmentationParams};
use crate::voxel_grid::{voxel_down_sample, VoxelGridError};

/// Color of the points rejected by the outlier removal.
pub const OUTLIER_COLOR: [u8; 3] = [255, 0, 0];

/// Color of the downsampled cloud.
pub const DOWNSAMPLED_COLOR: [u8; 3] = [153, 153, 153];

/// Error types for the preprocessing pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to load the input point cloud
    #[error("Failed to load the point cloud")]
    Read(#[from] ReadPointCloudError),

    /// Statistical outlier removal failed
    #[error("Outlier removal failed")]
    Filter(#[from] FilterError),

    /// Voxel downsampling failed
    #[error("Voxel downsampling failed")]
    VoxelGrid(#[from] VoxelGridError),

    /// Plane segmentation failed
    #[error("Plane segmentation failed")]
    Segmentation(#[from] SegmentationError),

    /// The input holds too few points to be processed
    #[error("The point cloud needs at least 2 points, got {0}")]
    NotEnoughPoints(usize),

    /// A pipeline parameter is out of its valid range
    #[error("Invalid pipeline parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Parameters of the preprocessing pipeline.
///
/// Every field has a default, so a partial JSON document only overrides what it lists:
///
/// ```
/// use pointprep_3d::pipeline::PreprocessParams;
///
/// let params: PreprocessParams = serde_json::from_str(r#"{ "voxel_size": 0.05 }"#).unwrap();
/// assert_eq!(params.voxel_size, 0.05);
/// assert_eq!(params.nb_neighbors, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Number of neighbours of the statistical outlier removal.
    pub nb_neighbors: usize,
    /// Standard deviation multiplier of the statistical outlier removal.
    pub std_ratio: f64,
    /// Side of the downsampling voxels.
    pub voxel_size: f64,
    /// Normal search radius, as a multiple of the mean nearest neighbour distance.
    pub normal_radius_factor: f64,
    /// Maximum number of neighbours of the normal estimation.
    pub normal_max_nn: usize,
    /// Use the closed form eigen solver for the normals.
    pub fast_normal_computation: bool,
    /// Plane segmentation, disabled when unset.
    pub segmentation: Option<SegmentationParams>,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            nb_neighbors: 16,
            std_ratio: 10.0,
            voxel_size: 0.01,
            normal_radius_factor: 4.0,
            normal_max_nn: 16,
            fast_normal_computation: true,
            segmentation: None,
        }
    }
}

/// Result of the preprocessing pipeline.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    /// Centroid of the input cloud, subtracted from every point.
    pub center: DVec3,
    /// Points rejected by the outlier removal, painted with [`OUTLIER_COLOR`].
    pub outliers: PointCloud,
    /// Downsampled inliers with normals, painted with [`DOWNSAMPLED_COLOR`].
    pub downsampled: PointCloud,
    /// Mean nearest neighbour distance of the centered input cloud.
    pub mean_nn_distance: f64,
    /// Radius used for the normal estimation.
    pub normal_radius: f64,
    /// Extracted planes, empty when segmentation is disabled.
    pub segments: Vec<PlaneSegment>,
    /// Points not assigned to any plane, `None` when segmentation is disabled.
    pub rest: Option<PointCloud>,
}

impl PreprocessParams {
    fn validate(&self) -> Result<(), PipelineError> {
        if !(self.normal_radius_factor.is_finite() && self.normal_radius_factor > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "normal_radius_factor",
                reason: format!("must be a positive number, got {}", self.normal_radius_factor),
            });
        }
        if self.normal_max_nn == 0 {
            return Err(PipelineError::InvalidParameter {
                name: "normal_max_nn",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Run the preprocessing pipeline on an in-memory point cloud.
///
/// The cloud is moved to its centroid, the statistical outliers are split off and painted
/// red, the inliers are voxel downsampled and get their normals estimated with a hybrid
/// search whose radius is `normal_radius_factor` times the mean nearest neighbour distance
/// of the centered cloud. When segmentation is enabled, planes are extracted from the
/// centered cloud before any filtering.
pub fn preprocess(
    mut pointcloud: PointCloud,
    params: &PreprocessParams,
) -> Result<PreprocessOutput, PipelineError> {
    params.validate()?;
    if pointcloud.len() < 2 {
        return Err(PipelineError::NotEnoughPoints(pointcloud.len()));
    }

    let center = pointcloud.get_center();
    pointcloud.translate(-center);
    log::info!(
        "centered {} points, center {:?}",
        pointcloud.len(),
        center.to_array()
    );

    let (filtered, inliers) =
        remove_statistical_outlier(&pointcloud, params.nb_neighbors, params.std_ratio)?;
    let mut outliers = pointcloud.select_by_index(&inliers, true);
    outliers.paint_uniform_color(OUTLIER_COLOR);
    log::info!(
        "outlier removal: {} inliers, {} outliers",
        filtered.len(),
        outliers.len()
    );

    let mut downsampled = voxel_down_sample(&filtered, params.voxel_size)?;
    log::info!(
        "voxel downsampling ({}): {} -> {} points",
        params.voxel_size,
        filtered.len(),
        downsampled.len()
    );

    // neighbour spacing of the full centered cloud, as before filtering
    let mean_nn_distance = mean(&compute_nearest_neighbor_distance(&pointcloud)).unwrap_or(0.0);
    let normal_radius = mean_nn_distance * params.normal_radius_factor;
    if normal_radius <= 0.0 {
        log::warn!("mean nearest neighbour distance is zero, normals fall back to the default");
    }

    estimate_normals(
        &mut downsampled,
        KdTreeSearchParam::Hybrid {
            radius: normal_radius,
            max_nn: params.normal_max_nn,
        },
        params.fast_normal_computation,
    );
    downsampled.paint_uniform_color(DOWNSAMPLED_COLOR);
    log::info!(
        "normal estimation: mean nn distance {mean_nn_distance:.6}, radius {normal_radius:.6}"
    );

    let (segments, rest) = match &params.segmentation {
        Some(segmentation) => {
            let (segments, rest) = segment_planes(&pointcloud, segmentation)?;
            log::info!(
                "segmentation: {} planes, {} points left",
                segments.len(),
                rest.len()
            );
            (segments, Some(rest))
        }
        None => (Vec::new(), None),
    };

    Ok(PreprocessOutput {
        center,
        outliers,
        downsampled,
        mean_nn_distance,
        normal_radius,
        segments,
        rest,
    })
}

/// Load a point cloud file and run [`preprocess`] on it.
pub fn run(path: impl AsRef<Path>, params: &PreprocessParams) -> Result<PreprocessOutput, PipelineError> {
    let pointcloud = read_point_cloud(path)?;
    preprocess(pointcloud, params)
}
