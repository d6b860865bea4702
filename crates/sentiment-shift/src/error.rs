use thiserror::Error;

/// Errors from the sentiment shift engine.
#[derive(Debug, Error)]
pub enum ShiftError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{model} fit failed: {reason}")]
    ModelFit { model: String, reason: String },

    #[error("non-finite score: {0}")]
    NonFiniteScore(f64),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for ShiftError {
    fn from(e: serde_json::Error) -> Self {
        ShiftError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for ShiftError {
    fn from(e: std::io::Error) -> Self {
        ShiftError::Io(e.to_string())
    }
}

/// Convenience type alias for engine results.
pub type ShiftResult<T> = Result<T, ShiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = ShiftError::ModelFit {
            model: "isolation_forest".into(),
            reason: "no samples".into(),
        };
        assert_eq!(e.to_string(), "isolation_forest fit failed: no samples");

        let e = ShiftError::InvalidConfig("capacity must be at least 2".into());
        assert!(e.to_string().contains("capacity"));

        let e = ShiftError::NonFiniteScore(f64::NAN);
        assert!(e.to_string().contains("NaN"));
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: ShiftError = io_err.into();
        assert!(matches!(err, ShiftError::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: ShiftError = json_err.into();
        assert!(matches!(err, ShiftError::Serialization(_)));
    }
}
