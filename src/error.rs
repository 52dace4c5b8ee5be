use thiserror::Error;

/// Error types for the tarfit-rs library.
#[derive(Error, Debug)]
pub enum TarFitError {
    /// The model, parameters and data do not fit together. Raised while a
    /// problem is constructed, before any numerical work.
    #[error("Model validation failed: {0}")]
    ModelValidation(String),

    /// A megacomplex produced a contribution of the wrong shape.
    #[error("Matrix shape error: {0}")]
    MatrixShape(String),

    /// Error indicating a mismatch in array dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error for parameter-related problems.
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<crate::parameters::ParameterError> for TarFitError {
    fn from(err: crate::parameters::ParameterError) -> Self {
        TarFitError::Parameter(err.to_string())
    }
}

impl From<crate::parameters::SerializationError> for TarFitError {
    fn from(err: crate::parameters::SerializationError) -> Self {
        match err {
            crate::parameters::SerializationError::IoError(e) => TarFitError::Io(e),
            crate::parameters::SerializationError::JsonError(e) => TarFitError::Json(e),
        }
    }
}

/// Result type alias for tarfit-rs operations.
pub type Result<T> = std::result::Result<T, TarFitError>;
