use thiserror::Error;

/// A result type for parameter space operations
pub type Result<T> = std::result::Result<T, SpaceError>;

/// An error raised when building or using a [`BoundedParameterSpace`](crate::BoundedParameterSpace)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    /// When a dimension has lower > upper or non finite bounds
    #[error("Invalid bounds for dimension {index}: [{lower}, {upper}]")]
    InvalidBounds {
        /// Index of the offending dimension
        index: usize,
        /// Given lower bound
        lower: f64,
        /// Given upper bound
        upper: f64,
    },
    /// When bounds matrix or names do not have the expected shape
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
    /// When a vector does not match the space dimension
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Space dimension
        expected: usize,
        /// Vector length
        found: usize,
    },
}
