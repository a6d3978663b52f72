use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::linalg::{compute_mean_and_covariance, symmetric_eigen_jacobi};
use crate::pointcloud::PointCloud;

/// Confidence used to stop the RANSAC loop once enough samples were drawn.
const RANSAC_PROBABILITY: f64 = 0.999_999_99;

/// The `tab20` categorical palette, used to paint the extracted planes.
pub const TAB20: [[u8; 3]; 20] = [
    [31, 119, 180],
    [174, 199, 232],
    [255, 127, 14],
    [255, 187, 120],
    [44, 160, 44],
    [152, 223, 138],
    [214, 39, 40],
    [255, 152, 150],
    [148, 103, 189],
    [197, 176, 213],
    [140, 86, 75],
    [196, 156, 148],
    [227, 119, 194],
    [247, 182, 210],
    [127, 127, 127],
    [199, 199, 199],
    [188, 189, 34],
    [219, 219, 141],
    [23, 190, 207],
    [158, 218, 229],
];

/// Error types for the plane segmentation.
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    /// A segmentation parameter is out of its valid range.
    #[error("Invalid segmentation parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The point cloud holds fewer points than a single RANSAC sample.
    #[error("Not enough points to fit a plane, got {got} but need at least {need}")]
    NotEnoughPoints {
        /// Number of points in the cloud.
        got: usize,
        /// Number of points of a sample.
        need: usize,
    },

    /// Every sample drawn was degenerate (collinear or coincident points).
    #[error("No plane could be fitted to the point cloud")]
    NoPlaneFound,
}

/// A plane `a * x + b * y + c * z + d = 0` with unit normal `(a, b, c)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneModel {
    /// x component of the normal.
    pub a: f64,
    /// y component of the normal.
    pub b: f64,
    /// z component of the normal.
    pub c: f64,
    /// Offset of the plane.
    pub d: f64,
}

impl PlaneModel {
    /// Create a plane from a normal and a point lying on it.
    ///
    /// Returns `None` if the normal has zero or non finite length.
    pub fn from_normal_and_point(normal: DVec3, point: DVec3) -> Option<Self> {
        let n = normal.try_normalize()?;
        Some(Self {
            a: n.x,
            b: n.y,
            c: n.z,
            d: -n.dot(point),
        })
    }

    /// Fit a plane to a subset of points.
    ///
    /// Three points define the plane through their cross product, more points are fitted in
    /// the least squares sense. Returns `None` for collinear or coincident points.
    pub fn from_points(points: &[[f64; 3]], indices: &[usize]) -> Option<Self> {
        match indices {
            [i0, i1, i2] => {
                let p0 = DVec3::from_array(points[*i0]);
                let v1 = DVec3::from_array(points[*i1]) - p0;
                let v2 = DVec3::from_array(points[*i2]) - p0;
                let normal = v1.cross(v2);
                // relative test, the cross product scales with the sample size
                if normal.length_squared() <= 1e-20 * v1.length_squared() * v2.length_squared() {
                    return None;
                }
                Self::from_normal_and_point(normal, p0)
            }
            _ if indices.len() > 3 => {
                let (centroid, covariance) = compute_mean_and_covariance(points, indices)?;
                let (eigenvalues, eigenvectors) = symmetric_eigen_jacobi(&covariance);
                // a line has two vanishing eigenvalues, the plane is undefined
                if eigenvalues[1] <= f64::EPSILON * eigenvalues[2].abs() {
                    return None;
                }
                Self::from_normal_and_point(eigenvectors[0], centroid)
            }
            _ => None,
        }
    }

    /// The unit normal of the plane.
    pub fn normal(&self) -> DVec3 {
        DVec3::new(self.a, self.b, self.c)
    }

    /// Signed distance from a point to the plane, positive on the side of the normal.
    #[inline]
    pub fn signed_distance(&self, point: &[f64; 3]) -> f64 {
        self.a * point[0] + self.b * point[1] + self.c * point[2] + self.d
    }

    /// Absolute distance from a point to the plane.
    #[inline]
    pub fn distance(&self, point: &[f64; 3]) -> f64 {
        self.signed_distance(point).abs()
    }

    /// The coefficients as `[a, b, c, d]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.a, self.b, self.c, self.d]
    }
}

/// A plane extracted from a point cloud together with its inlier points.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneSegment {
    /// The fitted plane.
    pub model: PlaneModel,
    /// The inlier points, painted with the segment color.
    pub cloud: PointCloud,
}

/// Parameters of the multi plane extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationParams {
    /// Maximum number of planes to extract.
    pub max_planes: usize,
    /// Maximum point to plane distance of an inlier.
    pub distance_threshold: f64,
    /// Number of points of a RANSAC sample.
    pub ransac_n: usize,
    /// Maximum number of RANSAC iterations per plane.
    pub num_iterations: usize,
    /// Seed of the random generator, random when unset.
    pub seed: Option<u64>,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            max_planes: 6,
            distance_threshold: 0.02,
            ransac_n: 3,
            num_iterations: 1000,
            seed: None,
        }
    }
}

/// Fit a single plane to the point cloud with RANSAC.
///
/// Each iteration draws `ransac_n` distinct points, fits a plane and counts the points
/// within `distance_threshold`. The model with the most inliers wins, ties are broken by
/// the lowest inlier RMSE. The winner is finally refitted by least squares on its inliers.
///
/// # Arguments
///
/// * `pointcloud` - The input point cloud.
/// * `distance_threshold` - Maximum point to plane distance of an inlier.
/// * `ransac_n` - Number of points of a sample, at least 3.
/// * `num_iterations` - Maximum number of iterations.
/// * `rng` - The random generator used to draw the samples.
///
/// # Returns
///
/// The plane and the ascending indices of its inliers.
pub fn segment_plane<R: Rng + ?Sized>(
    pointcloud: &PointCloud,
    distance_threshold: f64,
    ransac_n: usize,
    num_iterations: usize,
    rng: &mut R,
) -> Result<(PlaneModel, Vec<usize>), SegmentationError> {
    if ransac_n < 3 {
        return Err(SegmentationError::InvalidParameter {
            name: "ransac_n",
            reason: format!("a plane needs at least 3 points, got {ransac_n}"),
        });
    }
    if !(distance_threshold.is_finite() && distance_threshold > 0.0) {
        return Err(SegmentationError::InvalidParameter {
            name: "distance_threshold",
            reason: format!("must be a positive number, got {distance_threshold}"),
        });
    }
    if num_iterations == 0 {
        return Err(SegmentationError::InvalidParameter {
            name: "num_iterations",
            reason: "must be at least 1".to_string(),
        });
    }

    let points = pointcloud.points();
    let num_points = points.len();
    if num_points < ransac_n {
        return Err(SegmentationError::NotEnoughPoints {
            got: num_points,
            need: ransac_n,
        });
    }

    let mut best: Option<(PlaneModel, usize, f64)> = None;
    let mut break_iteration = num_iterations;
    let mut iteration = 0;

    while iteration < break_iteration {
        iteration += 1;

        let sample = rand::seq::index::sample(rng, num_points, ransac_n).into_vec();
        let Some(model) = PlaneModel::from_points(points, &sample) else {
            continue;
        };

        let (num_inliers, rmse) = evaluate_model(points, &model, distance_threshold);
        let is_better = match best {
            None => num_inliers > 0,
            Some((_, best_inliers, best_rmse)) => {
                num_inliers > best_inliers || (num_inliers == best_inliers && rmse < best_rmse)
            }
        };
        if !is_better {
            continue;
        }
        best = Some((model, num_inliers, rmse));

        // enough samples drawn to hit an all inlier one with high probability
        let inlier_ratio = num_inliers as f64 / num_points as f64;
        let needed = if inlier_ratio >= 1.0 {
            0.0
        } else {
            (1.0 - RANSAC_PROBABILITY).ln() / (1.0 - inlier_ratio.powi(ransac_n as i32)).ln()
        };
        if needed.is_finite() {
            break_iteration = break_iteration.min(needed.ceil().max(0.0) as usize);
        }
    }

    let (model, num_inliers, rmse) = best.ok_or(SegmentationError::NoPlaneFound)?;
    let inliers = select_inliers(points, &model, distance_threshold);

    // least squares refinement on the consensus set
    let (model, inliers) = match PlaneModel::from_points(points, &inliers) {
        Some(refined) => {
            let refined_inliers = select_inliers(points, &refined, distance_threshold);
            if refined_inliers.len() >= inliers.len() {
                (refined, refined_inliers)
            } else {
                (model, inliers)
            }
        }
        None => (model, inliers),
    };

    log::debug!(
        "segment_plane: {:?} after {iteration} iterations, {num_inliers} sample inliers (rmse {rmse:.6}), {} final inliers",
        model.to_array(),
        inliers.len()
    );

    Ok((model, inliers))
}

/// Extract up to `params.max_planes` planes from the point cloud.
///
/// Planes are fitted one after the other on the points left over by the previous ones.
/// The `i`-th segment is painted with `TAB20[i % 20]`. The extraction stops early when
/// fewer than `ransac_n` points remain or no plane can be fitted anymore.
///
/// # Returns
///
/// The extracted segments and the remaining points.
pub fn segment_planes(
    pointcloud: &PointCloud,
    params: &SegmentationParams,
) -> Result<(Vec<PlaneSegment>, PointCloud), SegmentationError> {
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let mut segments = Vec::with_capacity(params.max_planes);
    let mut rest = pointcloud.clone();

    for i in 0..params.max_planes {
        if rest.len() < params.ransac_n {
            log::debug!(
                "segment_planes: stopping after {i} planes, {} points left",
                rest.len()
            );
            break;
        }

        let (model, inliers) = match segment_plane(
            &rest,
            params.distance_threshold,
            params.ransac_n,
            params.num_iterations,
            &mut rng,
        ) {
            Ok(result) => result,
            Err(SegmentationError::NoPlaneFound) => {
                log::warn!("segment_planes: no plane found in the {} remaining points", rest.len());
                break;
            }
            Err(e) => return Err(e),
        };

        let mut cloud = rest.select_by_index(&inliers, false);
        cloud.paint_uniform_color(TAB20[i % TAB20.len()]);
        rest = rest.select_by_index(&inliers, true);

        log::info!(
            "segment_planes: plane {i} {:?} with {} points, {} points left",
            model.to_array(),
            cloud.len(),
            rest.len()
        );

        segments.push(PlaneSegment { model, cloud });
    }

    Ok((segments, rest))
}

fn evaluate_model(points: &[[f64; 3]], model: &PlaneModel, threshold: f64) -> (usize, f64) {
    let (count, sq_sum) = points
        .iter()
        .map(|p| model.distance(p))
        .filter(|&d| d <= threshold)
        .fold((0usize, 0.0f64), |(count, sum), d| (count + 1, sum + d * d));

    let rmse = if count > 0 {
        (sq_sum / count as f64).sqrt()
    } else {
        f64::INFINITY
    };
    (count, rmse)
}

fn select_inliers(points: &[[f64; 3]], model: &PlaneModel, threshold: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| model.distance(p) <= threshold)
        .map(|(i, _)| i)
        .collect()
}
