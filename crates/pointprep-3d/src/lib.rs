#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Point cloud filters.
pub mod filter;

/// I/O utilities for reading point cloud files.
pub mod io;

/// Spatial index for neighbour queries.
pub mod kdtree;

/// Linear algebra utilities.
pub mod linalg;

/// Surface normal estimation.
pub mod normals;

/// Operations on 3D data processing.
pub mod ops;

/// Preprocessing pipeline.
pub mod pipeline;

/// Point cloud type.
pub mod pointcloud;

/// Plane segmentation algorithms.
pub mod segmentation;

/// Voxel grid downsampling.
pub mod voxel_grid;
