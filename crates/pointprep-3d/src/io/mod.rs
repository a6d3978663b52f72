use std::path::Path;

use crate::pointcloud::PointCloud;

/// PCD reader module.
pub mod pcd;

/// PLY reader module.
pub mod ply;

/// Error types for [`read_point_cloud`].
#[derive(Debug, thiserror::Error)]
pub enum ReadPointCloudError {
    /// Failed to read a PCD file
    #[error(transparent)]
    Pcd(#[from] pcd::PcdError),

    /// Failed to read a PLY file
    #[error(transparent)]
    Ply(#[from] ply::PlyError),

    /// The file extension does not match any supported format
    #[error("Unsupported point cloud file extension. Got:{0}")]
    UnsupportedExtension(String),
}

/// Read a point cloud file, the reader is chosen from the file extension.
///
/// Supported extensions are `.pcd` and `.ply`, case insensitive.
pub fn read_point_cloud(path: impl AsRef<Path>) -> Result<PointCloud, ReadPointCloudError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let pointcloud = match extension.as_str() {
        "pcd" => pcd::read_pcd(path)?,
        "ply" => ply::read_ply(path)?,
        _ => return Err(ReadPointCloudError::UnsupportedExtension(extension)),
    };

    log::info!(
        "read_point_cloud: {} points from {}",
        pointcloud.len(),
        path.display()
    );

    Ok(pointcloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn dispatches_on_extension() -> Result<(), Box<dyn std::error::Error>> {
        let mut pcd = tempfile::Builder::new().suffix(".PCD").tempfile()?;
        pcd.write_all(b"FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS 1\nDATA ascii\n1 2 3\n")?;
        assert_eq!(read_point_cloud(pcd.path())?.points(), &[[1.0, 2.0, 3.0]]);

        let mut ply = tempfile::Builder::new().suffix(".ply").tempfile()?;
        ply.write_all(
            b"ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nend_header\n4 5 6\n",
        )?;
        assert_eq!(read_point_cloud(ply.path())?.points(), &[[4.0, 5.0, 6.0]]);
        Ok(())
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(matches!(
            read_point_cloud("cloud.xyz"),
            Err(ReadPointCloudError::UnsupportedExtension(ext)) if ext == "xyz"
        ));
        assert!(matches!(
            read_point_cloud("no_extension"),
            Err(ReadPointCloudError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            read_point_cloud("/nonexistent/box_filter2.pcd"),
            Err(ReadPointCloudError::Pcd(pcd::PcdError::Io(_)))
        ));
    }
}
