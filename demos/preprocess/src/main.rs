use argh::FromArgs;
use std::path::PathBuf;

use pointprep::k3d;
use pointprep::k3d::pipeline::{PreprocessOutput, PreprocessParams};
use pointprep::k3d::pointcloud::PointCloud;
use pointprep::k3d::segmentation::SegmentationParams;

#[derive(FromArgs)]
/// Preprocess a point cloud and visualize the result with Rerun
struct Args {
    /// path to the point cloud file (.pcd or .ply)
    #[argh(option, short = 'i', default = "PathBuf::from(\"box_filter2.pcd\")")]
    input: PathBuf,

    /// path to a JSON file with the pipeline parameters
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// side of the downsampling voxels
    #[argh(option)]
    voxel_size: Option<f64>,

    /// number of neighbours of the outlier removal
    #[argh(option)]
    nb_neighbors: Option<usize>,

    /// standard deviation multiplier of the outlier removal
    #[argh(option)]
    std_ratio: Option<f64>,

    /// extract planes from the centered cloud
    #[argh(switch)]
    segment: bool,

    /// log the estimated normals as arrows
    #[argh(switch)]
    show_normals: bool,

    /// write the recording to a .rrd file instead of spawning the viewer
    #[argh(option)]
    save: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut params = match &args.config {
        Some(path) => serde_json::from_reader(std::fs::File::open(path)?)?,
        None => PreprocessParams::default(),
    };
    if let Some(voxel_size) = args.voxel_size {
        params.voxel_size = voxel_size;
    }
    if let Some(nb_neighbors) = args.nb_neighbors {
        params.nb_neighbors = nb_neighbors;
    }
    if let Some(std_ratio) = args.std_ratio {
        params.std_ratio = std_ratio;
    }
    if args.segment && params.segmentation.is_none() {
        params.segmentation = Some(SegmentationParams::default());
    }
    log::debug!("parameters: {params:?}");

    let output = k3d::pipeline::run(&args.input, &params)?;
    println!(
        "Outliers: #{} points, downsampled: #{} points",
        output.outliers.len(),
        output.downsampled.len()
    );

    // create a Rerun recording stream
    let builder = rerun::RecordingStreamBuilder::new("pointprep");
    let rec = match &args.save {
        Some(path) => builder.save(path)?,
        None => builder.spawn()?,
    };

    log_output(&rec, &output, args.show_normals)?;

    Ok(())
}

fn log_output(
    rec: &rerun::RecordingStream,
    output: &PreprocessOutput,
    show_normals: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    log_pointcloud(rec, "downsampled", &output.downsampled)?;
    log_pointcloud(rec, "outliers", &output.outliers)?;

    if show_normals {
        log_normals(rec, "normals", &output.downsampled, output.mean_nn_distance)?;
    }

    for (i, segment) in output.segments.iter().enumerate() {
        println!("Plane #{i}: {:?}, #{} points", segment.model.to_array(), segment.cloud.len());
        log_pointcloud(rec, &format!("planes/{i}"), &segment.cloud)?;
    }
    if let Some(rest) = &output.rest {
        log_pointcloud(rec, "rest", rest)?;
    }

    Ok(())
}

fn log_pointcloud(
    rec: &rerun::RecordingStream,
    name: &str,
    pointcloud: &PointCloud,
) -> Result<(), Box<dyn std::error::Error>> {
    let points = pointcloud
        .points()
        .iter()
        .map(|p| rerun::Position3D::new(p[0] as f32, p[1] as f32, p[2] as f32))
        .collect::<Vec<_>>();

    let colors = pointcloud.colors().map_or(vec![], |colors| {
        colors
            .iter()
            .map(|c| rerun::Color::from_rgb(c[0], c[1], c[2]))
            .collect()
    });

    rec.log(name, &rerun::Points3D::new(points).with_colors(colors))?;

    Ok(())
}

fn log_normals(
    rec: &rerun::RecordingStream,
    name: &str,
    pointcloud: &PointCloud,
    length: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(normals) = pointcloud.normals() else {
        return Ok(());
    };

    let origins = pointcloud
        .points()
        .iter()
        .map(|p| rerun::Position3D::new(p[0] as f32, p[1] as f32, p[2] as f32))
        .collect::<Vec<_>>();
    let vectors = normals
        .iter()
        .map(|n| {
            [
                (n[0] * length) as f32,
                (n[1] * length) as f32,
                (n[2] * length) as f32,
            ]
        })
        .collect::<Vec<_>>();

    rec.log(
        name,
        &rerun::Arrows3D::from_vectors(vectors).with_origins(origins),
    )?;

    Ok(())
}
