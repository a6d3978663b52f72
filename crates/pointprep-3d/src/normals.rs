use glam::DVec3;

use crate::kdtree::{KdTree, KdTreeSearchParam};
use crate::linalg::{
    compute_mean_and_covariance, smallest_eigenvector_closed_form, symmetric_eigen_jacobi,
};
use crate::pointcloud::PointCloud;

/// Normal assigned to the points whose neighbourhood is too small to define a plane.
pub const DEFAULT_NORMAL: [f64; 3] = [0.0, 0.0, 1.0];

/// Minimum neighbourhood size, the query point included, to fit a local plane.
const MIN_NEIGHBORS: usize = 3;

/// Estimate the surface normal of every point of the cloud.
///
/// For each point the neighbourhood described by `search_param` is collected, and the
/// eigenvector of the smallest eigenvalue of its covariance matrix becomes the normal. With
/// `fast_normal_computation` the eigenvector is computed in closed form, otherwise with
/// Jacobi iterations which are slower but robust to nearly isotropic neighbourhoods.
///
/// Points with less than three neighbours get [`DEFAULT_NORMAL`]. When the cloud already
/// carries normals, every new normal is flipped to agree with the previous one; otherwise
/// the sign of the normals is arbitrary.
///
/// # Arguments
///
/// * `pointcloud` - The point cloud, its normals are replaced.
/// * `search_param` - The neighbourhood definition.
/// * `fast_normal_computation` - Use the closed form eigen solver.
pub fn estimate_normals(
    pointcloud: &mut PointCloud,
    search_param: KdTreeSearchParam,
    fast_normal_computation: bool,
) {
    if pointcloud.is_empty() {
        log::warn!("estimate_normals: input point cloud is empty");
        pointcloud.set_normals(Vec::new());
        return;
    }

    let points = pointcloud.points();
    let kdtree = KdTree::new(points);
    let previous = pointcloud.normals();

    let mut num_degenerate = 0usize;
    let normals = points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let (indices, _) = kdtree.search(point, &search_param);
            let normal = match local_normal(points, &indices, fast_normal_computation) {
                Some(normal) => normal,
                None => {
                    num_degenerate += 1;
                    DVec3::from_array(DEFAULT_NORMAL)
                }
            };

            match previous.and_then(|p| p.get(i)) {
                Some(prev) if normal.dot(DVec3::from_array(*prev)) < 0.0 => (-normal).to_array(),
                _ => normal.to_array(),
            }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "estimate_normals: {} normals with {:?}, {} neighbourhoods too small",
        normals.len(),
        search_param,
        num_degenerate
    );

    pointcloud.set_normals(normals);
}

fn local_normal(points: &[[f64; 3]], indices: &[usize], fast: bool) -> Option<DVec3> {
    if indices.len() < MIN_NEIGHBORS {
        return None;
    }

    let (_, covariance) = compute_mean_and_covariance(points, indices)?;
    let normal = if fast {
        smallest_eigenvector_closed_form(&covariance)
    } else {
        let (_, eigenvectors) = symmetric_eigen_jacobi(&covariance);
        eigenvectors[0]
    };

    normal.try_normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn jitter() -> f64 {
        (rand::random::<f64>() - 0.5) * 1e-6
    }

    fn xy_plane_cloud(grid_size: usize, spacing: f64) -> PointCloud {
        let mut points = Vec::with_capacity(grid_size * grid_size);
        for i in 0..grid_size {
            for j in 0..grid_size {
                points.push([
                    i as f64 * spacing + jitter(),
                    j as f64 * spacing + jitter(),
                    jitter(),
                ]);
            }
        }
        PointCloud::new(points, None, None)
    }

    // fibonacci lattice, roughly uniform spacing over the unit sphere
    fn sphere_cloud(num_points: usize) -> PointCloud {
        let golden_angle = std::f64::consts::PI * (3.0 - 5.0f64.sqrt());
        let points = (0..num_points)
            .map(|i| {
                let z = 1.0 - 2.0 * (i as f64 + 0.5) / num_points as f64;
                let r = (1.0 - z * z).sqrt();
                let phi = golden_angle * i as f64;
                [r * phi.cos(), r * phi.sin(), z]
            })
            .collect();
        PointCloud::new(points, None, None)
    }

    #[test]
    fn test_normals_of_xy_plane() {
        for fast in [true, false] {
            let mut cloud = xy_plane_cloud(15, 0.1);
            estimate_normals(
                &mut cloud,
                KdTreeSearchParam::Hybrid {
                    radius: 0.25,
                    max_nn: 16,
                },
                fast,
            );

            let normals = cloud.normals().unwrap();
            assert_eq!(normals.len(), cloud.len());
            for n in normals {
                assert!(n[2].abs() > 0.999, "normal {n:?} is not along Z");
            }
        }
    }

    #[test]
    fn test_normals_of_exact_grid() {
        for fast in [true, false] {
            let points = (0..40)
                .flat_map(|i| (0..40).map(move |j| [i as f64 * 0.01, j as f64 * 0.01, 0.0]))
                .collect::<Vec<_>>();
            let mut cloud = PointCloud::new(points, None, None);
            estimate_normals(
                &mut cloud,
                KdTreeSearchParam::Hybrid {
                    radius: 0.025,
                    max_nn: 16,
                },
                fast,
            );

            let normals = cloud.normals().unwrap();
            assert_eq!(normals.len(), 1600);
            for n in normals {
                assert!(n[2].abs() > 0.999, "normal {n:?} is not along Z");
            }
        }
    }

    #[test]
    fn test_normals_of_sphere() {
        for fast in [true, false] {
            let mut cloud = sphere_cloud(800);
            estimate_normals(&mut cloud, KdTreeSearchParam::Knn { knn: 10 }, fast);

            for (p, n) in cloud.points().iter().zip(cloud.normals().unwrap()) {
                let radial = DVec3::from_array(*p).normalize();
                let alignment = radial.dot(DVec3::from_array(*n)).abs();
                assert!(alignment > 0.95, "normal {n:?} not radial at {p:?}");
            }
        }
    }

    #[test]
    fn test_normals_are_unit_length() {
        let points = (0..200)
            .map(|_| [rand::random::<f64>(), rand::random::<f64>(), rand::random::<f64>()])
            .collect::<Vec<_>>();
        let mut cloud = PointCloud::new(points, None, None);
        estimate_normals(
            &mut cloud,
            KdTreeSearchParam::Hybrid {
                radius: 0.2,
                max_nn: 16,
            },
            true,
        );

        for n in cloud.normals().unwrap() {
            assert_relative_eq!(DVec3::from_array(*n).length(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_small_neighbourhoods_get_default_normal() {
        let mut cloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [0.01, 0.0, 0.0], [5.0, 0.0, 0.0]],
            None,
            None,
        );
        estimate_normals(&mut cloud, KdTreeSearchParam::Radius { radius: 0.1 }, false);
        assert_eq!(cloud.normals(), Some(&[DEFAULT_NORMAL; 3][..]));
    }

    #[test]
    fn test_orientation_follows_previous_normals() {
        let mut cloud = xy_plane_cloud(10, 0.1);
        cloud.set_normals(vec![[0.0, 0.0, -1.0]; cloud.len()]);

        estimate_normals(&mut cloud, KdTreeSearchParam::Knn { knn: 8 }, true);

        for n in cloud.normals().unwrap() {
            assert!(n[2] < -0.999);
        }
    }

    #[test]
    fn test_empty_cloud() {
        let mut cloud = PointCloud::default();
        estimate_normals(&mut cloud, KdTreeSearchParam::Knn { knn: 8 }, true);
        assert_eq!(cloud.normals().map(|n| n.len()), Some(0));
    }
}
