//! CLI error types

use thiserror::Error;

/// CLI error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] sentiment_shift::ShiftError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert() {
        let err: CliError = sentiment_shift::ShiftError::InvalidConfig("bad".into()).into();
        assert!(matches!(err, CliError::Engine(_)));
        assert_eq!(err.to_string(), "Engine error: invalid configuration: bad");
    }

    #[test]
    fn toml_errors_convert() {
        let parse = toml::from_str::<toml::Value>("threshold = ").unwrap_err();
        let err: CliError = parse.into();
        assert!(err.to_string().starts_with("TOML error"));
    }
}
