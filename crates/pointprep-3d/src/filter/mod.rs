mod statistical_outlier;

pub use statistical_outlier::remove_statistical_outlier;

/// Error types for the point cloud filters.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// A filter parameter is out of its valid range.
    #[error("Invalid filter parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
