use thiserror::Error;

/// A result type for high-score optimization errors
pub type Result<T> = std::result::Result<T, HsoError>;

/// An error for the high-score bootstrap optimizer
#[derive(Error, Debug)]
pub enum HsoError {
    /// When configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfigError(String),
    /// When too many consecutive candidate evaluations fail
    #[error("Evaluation error: {0}")]
    EvaluationError(String),
    /// When a persisted run does not match the current problem or configuration
    #[error("Resume mismatch: {0}")]
    ResumeMismatchError(String),
    /// When an invalid value is encountered
    #[error("Value error: {0}")]
    InvalidValue(String),
    /// When parameter space definition fails
    #[error(transparent)]
    SpaceError(#[from] hiscore_space::SpaceError),
    /// When IO fails
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    /// When json (de)serialization fails
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// When numpy array write fails
    #[error("IO error")]
    WriteNpyError(#[from] ndarray_npy::WriteNpyError),
    /// When an Argmin framework is raised
    #[error(transparent)]
    ArgminError(#[from] argmin::core::Error),
}

impl HsoError {
    /// Recovers the optimizer error wrapped by argmin, if any
    pub(crate) fn from_argmin(err: argmin::core::Error) -> Self {
        match err.downcast::<HsoError>() {
            Ok(err) => err,
            Err(err) => HsoError::ArgminError(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmin_error_unwrapped() {
        let err: argmin::core::Error = HsoError::ResumeMismatchError("bounds".to_string()).into();
        assert!(matches!(
            HsoError::from_argmin(err),
            HsoError::ResumeMismatchError(msg) if msg == "bounds"
        ));

        let err = argmin::core::Error::msg("other");
        assert!(matches!(HsoError::from_argmin(err), HsoError::ArgminError(_)));
    }
}
