use thiserror::Error;

/// Errors raised by the module discovery pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// A stage was invoked before the state it depends on exists,
    /// or the inputs form an invalid combination
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Structurally invalid input
    #[error("validation error: {0}")]
    Validation(String),

    /// Unrecognized or malformed input file
    #[error("format error: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
