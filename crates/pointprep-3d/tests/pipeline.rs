use std::io::Write;

use approx::assert_relative_eq;
use glam::DVec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

use pointprep_3d::{
    filter::remove_statistical_outlier,
    pipeline::{self, PreprocessParams, OUTLIER_COLOR},
    pointcloud::PointCloud,
    segmentation::SegmentationParams,
};

const FAR_POINT: [f64; 3] = [50.0, 50.0, 50.0];

fn unit_cube_with_far_point(seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = (0..1000)
        .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
        .collect::<Vec<_>>();
    points.push(FAR_POINT);
    PointCloud::new(points, None, None)
}

#[test]
fn far_point_is_the_only_outlier() -> Result<(), Box<dyn std::error::Error>> {
    let cloud = unit_cube_with_far_point(3);

    let (filtered, inliers) = remove_statistical_outlier(&cloud, 16, 10.0)?;
    assert_eq!(inliers, (0..1000).collect::<Vec<_>>());
    assert_eq!(filtered.len(), 1000);

    let outliers = cloud.select_by_index(&inliers, true);
    assert_eq!(outliers.points(), &[FAR_POINT]);
    Ok(())
}

#[test]
fn preprocess_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let cloud = unit_cube_with_far_point(11);
    let params = PreprocessParams {
        voxel_size: 0.1,
        ..Default::default()
    };

    let output = pipeline::preprocess(cloud.clone(), &params)?;

    // the centroid is removed from every point
    let expected_center = cloud
        .points()
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p))
        / cloud.len() as f64;
    assert!((output.center - expected_center).length() < 1e-9);

    assert_eq!(output.outliers.len(), 1);
    assert_eq!(output.outliers.colors(), Some(&[OUTLIER_COLOR][..]));
    let outlier = DVec3::from_array(output.outliers.points()[0]);
    assert!((outlier - (DVec3::from_array(FAR_POINT) - output.center)).length() < 1e-9);

    assert!(!output.downsampled.is_empty());
    assert!(output.downsampled.len() <= 1000);
    let normals = output.downsampled.normals().ok_or("normals are missing")?;
    assert_eq!(normals.len(), output.downsampled.len());
    for n in normals {
        assert_relative_eq!(DVec3::from_array(*n).length(), 1.0, epsilon = 1e-9);
    }
    assert_relative_eq!(output.normal_radius, 4.0 * output.mean_nn_distance);
    Ok(())
}

#[test]
fn preprocess_recenters_the_cloud() -> Result<(), Box<dyn std::error::Error>> {
    let mut cloud = unit_cube_with_far_point(5);
    cloud.translate(DVec3::new(100.0, -20.0, 7.0));

    let output = pipeline::preprocess(cloud.clone(), &PreprocessParams::default())?;

    let mut centered = cloud.clone();
    centered.translate(-output.center);
    assert!(centered.get_center().length() < 1e-9);

    // every downsampled point lies within the recentered bounds
    let (min, max) = (centered.get_min_bound(), centered.get_max_bound());
    for p in output.downsampled.points() {
        let p = DVec3::from_array(*p);
        assert!(p.cmpge(min - 1e-9).all() && p.cmple(max + 1e-9).all());
    }
    Ok(())
}

#[test]
fn segmentation_extracts_two_planes() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(21);
    let mut jitter = || (rng.random::<f64>() - 0.5) * 1e-4;

    let mut points = Vec::new();
    // floor, z = 0
    for i in 0..30 {
        for j in 0..30 {
            points.push([i as f64 * 0.04 + jitter(), j as f64 * 0.04 + jitter(), jitter()]);
        }
    }
    // wall, x = -0.2
    for i in 0..20 {
        for j in 0..20 {
            points.push([-0.2 + jitter(), i as f64 * 0.04 + jitter(), 0.2 + j as f64 * 0.04 + jitter()]);
        }
    }
    let cloud = PointCloud::new(points, None, None);

    let params = PreprocessParams {
        voxel_size: 0.05,
        segmentation: Some(SegmentationParams {
            max_planes: 3,
            seed: Some(1234),
            ..Default::default()
        }),
        ..Default::default()
    };
    let output = pipeline::preprocess(cloud.clone(), &params)?;

    assert!(output.segments.len() >= 2);
    let floor = &output.segments[0];
    let wall = &output.segments[1];
    assert_eq!(floor.cloud.len(), 900);
    assert_eq!(wall.cloud.len(), 400);
    assert!(floor.model.normal().z.abs() > 0.999);
    assert!(wall.model.normal().x.abs() > 0.999);
    assert_ne!(floor.cloud.colors(), wall.cloud.colors());

    // every point ends up in exactly one segment or in the rest
    let rest = output.rest.ok_or("segmentation did not run")?;
    let assigned = output.segments.iter().map(|s| s.cloud.len()).sum::<usize>();
    assert_eq!(assigned + rest.len(), cloud.len());
    Ok(())
}

#[test]
fn run_reads_a_pcd_file() -> Result<(), Box<dyn std::error::Error>> {
    let cloud = unit_cube_with_far_point(8);

    let mut file = tempfile::Builder::new().suffix(".pcd").tempfile()?;
    writeln!(file, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(file, "VERSION 0.7")?;
    writeln!(file, "FIELDS x y z")?;
    writeln!(file, "SIZE 4 4 4")?;
    writeln!(file, "TYPE F F F")?;
    writeln!(file, "COUNT 1 1 1")?;
    writeln!(file, "WIDTH {}", cloud.len())?;
    writeln!(file, "HEIGHT 1")?;
    writeln!(file, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(file, "POINTS {}", cloud.len())?;
    writeln!(file, "DATA binary")?;
    for p in cloud.points() {
        for v in p {
            file.write_all(&(*v as f32).to_le_bytes())?;
        }
    }
    file.flush()?;

    let output = pipeline::run(file.path(), &PreprocessParams::default())?;
    assert_eq!(output.outliers.len(), 1);
    assert!(!output.downsampled.is_empty());
    Ok(())
}
