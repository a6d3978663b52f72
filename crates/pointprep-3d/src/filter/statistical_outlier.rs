use super::FilterError;
use crate::kdtree::KdTree;
use crate::pointcloud::PointCloud;

/// Remove the points that are further away from their neighbours than the rest of the cloud.
///
/// For every point the mean distance to its `nb_neighbors` nearest neighbours is computed;
/// the point itself counts as its first neighbour. A point is an outlier when this mean
/// exceeds `mean + std_ratio * stddev`, where `mean` and `stddev` (sample standard deviation)
/// are taken over all the points of the cloud.
///
/// # Arguments
///
/// * `pointcloud` - The input point cloud.
/// * `nb_neighbors` - Number of neighbours used for the mean distance. Must be positive.
/// * `std_ratio` - Standard deviation multiplier of the threshold. Must be positive.
///
/// # Returns
///
/// The filtered point cloud and the ascending indices of the inliers in the input cloud.
/// The outliers can be recovered with `pointcloud.select_by_index(&inliers, true)`.
///
/// Example:
/// ```
/// use pointprep_3d::{filter::remove_statistical_outlier, pointcloud::PointCloud};
///
/// let cloud = PointCloud::new(
///     vec![[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.0, 0.1, 0.0], [0.1, 0.1, 0.0], [50.0, 50.0, 50.0]],
///     None,
///     None,
/// );
/// let (filtered, inliers) = remove_statistical_outlier(&cloud, 3, 1.0).unwrap();
/// assert_eq!(inliers, vec![0, 1, 2, 3]);
/// assert_eq!(filtered.len(), 4);
/// ```
pub fn remove_statistical_outlier(
    pointcloud: &PointCloud,
    nb_neighbors: usize,
    std_ratio: f64,
) -> Result<(PointCloud, Vec<usize>), FilterError> {
    if nb_neighbors == 0 {
        return Err(FilterError::InvalidParameter {
            name: "nb_neighbors",
            reason: "must be at least 1".to_string(),
        });
    }

    if !(std_ratio.is_finite() && std_ratio > 0.0) {
        return Err(FilterError::InvalidParameter {
            name: "std_ratio",
            reason: format!("must be a positive number, got {std_ratio}"),
        });
    }

    if pointcloud.is_empty() {
        log::warn!("remove_statistical_outlier: input point cloud is empty");
        return Ok((PointCloud::default(), Vec::new()));
    }

    let kdtree = KdTree::new(pointcloud.points());

    // mean distance to the neighbours, `None` for points without neighbours (non finite)
    let avg_distances = pointcloud
        .points()
        .iter()
        .map(|p| {
            let (_, distances) = kdtree.knn(p, nb_neighbors);
            if distances.is_empty() {
                None
            } else {
                Some(distances.iter().sum::<f64>() / distances.len() as f64)
            }
        })
        .collect::<Vec<_>>();

    let valid = avg_distances.iter().flatten().copied().collect::<Vec<_>>();
    if valid.is_empty() {
        log::warn!("remove_statistical_outlier: no point has valid neighbours");
        return Ok((PointCloud::default(), Vec::new()));
    }

    let num_valid = valid.len() as f64;
    let cloud_mean = valid.iter().sum::<f64>() / num_valid;
    let std_dev = if valid.len() > 1 {
        let sq_sum = valid.iter().map(|d| (d - cloud_mean).powi(2)).sum::<f64>();
        (sq_sum / (num_valid - 1.0)).sqrt()
    } else {
        0.0
    };
    let distance_threshold = cloud_mean + std_ratio * std_dev;

    let inliers = avg_distances
        .iter()
        .enumerate()
        .filter(|(_, avg)| avg.is_some_and(|d| d <= distance_threshold))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    log::debug!(
        "remove_statistical_outlier: mean {cloud_mean:.6} stddev {std_dev:.6} threshold {distance_threshold:.6}, removed {} of {} points",
        pointcloud.len() - inliers.len(),
        pointcloud.len()
    );

    Ok((pointcloud.select_by_index(&inliers, false), inliers))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_cube(num_points: usize) -> Vec<[f64; 3]> {
        (0..num_points)
            .map(|_| {
                [
                    rand::random::<f64>(),
                    rand::random::<f64>(),
                    rand::random::<f64>(),
                ]
            })
            .collect()
    }

    #[test]
    fn test_removes_far_point() -> Result<(), FilterError> {
        let mut points = vec![
            [0.0, 0.0, 0.0],
            [0.1, 0.1, 0.1],
            [-0.1, -0.1, -0.1],
            [0.05, 0.05, 0.05],
            [-0.05, -0.05, -0.05],
        ];
        points.push([100.0, 100.0, 100.0]);
        let cloud = PointCloud::new(points, Some(vec![[10, 20, 30]; 6]), None);

        let (filtered, inliers) = remove_statistical_outlier(&cloud, 4, 1.0)?;

        assert_eq!(inliers, vec![0, 1, 2, 3, 4]);
        assert_eq!(filtered.len(), 5);
        assert_eq!(filtered.colors().map(|c| c.len()), Some(5));
        for p in filtered.points() {
            assert!(p.iter().all(|v| v.abs() <= 0.2));
        }
        Ok(())
    }

    #[test]
    fn test_inliers_and_outliers_partition_the_cloud() -> Result<(), FilterError> {
        let mut points = random_cube(300);
        points.extend([[5.0, 5.0, 5.0], [-4.0, 6.0, 0.0]]);
        let cloud = PointCloud::new(points, None, None);

        let (filtered, inliers) = remove_statistical_outlier(&cloud, 8, 2.0)?;
        let outliers = cloud.select_by_index(&inliers, true);

        assert_eq!(filtered.len() + outliers.len(), cloud.len());
        assert!(inliers.windows(2).all(|w| w[0] < w[1]));

        let mut all = inliers.clone();
        all.extend(
            (0..cloud.len()).filter(|i| inliers.binary_search(i).is_err()),
        );
        all.sort_unstable();
        assert_eq!(all, (0..cloud.len()).collect::<Vec<_>>());

        assert!(outliers.points().contains(&[5.0, 5.0, 5.0]));
        assert!(outliers.points().contains(&[-4.0, 6.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_uniform_spacing_keeps_everything() -> Result<(), FilterError> {
        let cloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]], None, None);
        let (filtered, inliers) = remove_statistical_outlier(&cloud, 2, 1.0)?;
        assert_eq!(inliers, vec![0, 1]);
        assert_eq!(filtered, cloud);
        Ok(())
    }

    #[test]
    fn test_empty_cloud() -> Result<(), FilterError> {
        let (filtered, inliers) = remove_statistical_outlier(&PointCloud::default(), 16, 10.0)?;
        assert!(filtered.is_empty());
        assert!(inliers.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_parameters() {
        let cloud = PointCloud::new(random_cube(10), None, None);
        assert!(matches!(
            remove_statistical_outlier(&cloud, 0, 1.0),
            Err(FilterError::InvalidParameter { name: "nb_neighbors", .. })
        ));
        assert!(matches!(
            remove_statistical_outlier(&cloud, 4, -1.0),
            Err(FilterError::InvalidParameter { name: "std_ratio", .. })
        ));
        assert!(remove_statistical_outlier(&cloud, 4, f64::NAN).is_err());
    }
}
