use crate::kdtree::KdTree;
use crate::pointcloud::PointCloud;

/// Utility function to compute the Euclidean distance between two points.
///
/// # Arguments
///
/// * `a` - A point in 3D space.
/// * `b` - Another point in 3D space.
///
/// # Returns
///
/// The Euclidean distance between the two points.
///
/// Example:
/// ```
/// use pointprep_3d::ops::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 5.0, 6.0];
/// let dst = euclidean_distance(&a, &b);
/// ```
pub fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Compute, for every point, the distance to its closest other point.
///
/// # Arguments
///
/// * `pointcloud` - The input point cloud.
///
/// # Returns
///
/// One distance per point. Empty if the cloud holds fewer than two points.
///
/// Example:
/// ```
/// use pointprep_3d::{ops::compute_nearest_neighbor_distance, pointcloud::PointCloud};
///
/// let cloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [0.0, 0.0, 2.0]], None, None);
/// assert_eq!(compute_nearest_neighbor_distance(&cloud), vec![2.0, 2.0]);
/// ```
pub fn compute_nearest_neighbor_distance(pointcloud: &PointCloud) -> Vec<f64> {
    if pointcloud.len() < 2 {
        return Vec::new();
    }

    let kdtree = KdTree::new(pointcloud.points());

    pointcloud
        .points()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            // the query point is part of the tree, skip the self match
            let (indices, distances) = kdtree.knn(p, 2);
            indices
                .iter()
                .zip(distances.iter())
                .find(|&(&j, _)| j != i)
                .map(|(_, &d)| d)
                .unwrap_or(0.0)
        })
        .collect()
}

/// Arithmetic mean of a slice of values, `None` when the slice is empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_relative_eq!(euclidean_distance(&a, &b), 5.196152, epsilon = 1e-6);
    }

    #[test]
    fn test_nearest_neighbor_distance() {
        let cloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [3.0, 0.0, 0.0], [3.5, 0.0, 0.0]],
            None,
            None,
        );
        let distances = compute_nearest_neighbor_distance(&cloud);
        assert_eq!(distances.len(), 4);
        assert_relative_eq!(distances[0], 1.0);
        assert_relative_eq!(distances[1], 1.0);
        assert_relative_eq!(distances[2], 0.5);
        assert_relative_eq!(distances[3], 0.5);
    }

    #[test]
    fn test_nearest_neighbor_distance_duplicates() {
        let cloud = PointCloud::new(vec![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]], None, None);
        assert_eq!(compute_nearest_neighbor_distance(&cloud), vec![0.0, 0.0]);
    }

    #[test]
    fn test_nearest_neighbor_distance_small_clouds() {
        assert!(compute_nearest_neighbor_distance(&PointCloud::default()).is_empty());
        let single = PointCloud::new(vec![[1.0, 2.0, 3.0]], None, None);
        assert!(compute_nearest_neighbor_distance(&single).is_empty());
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
    }
}
