use admin::AdminError;
use bundle::BundleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// Bad or missing arguments, detected before any request is made.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        CliError::Usage(message.into())
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, CliError::Usage(_) | CliError::Regex(_))
    }
}

pub type CliResult<T> = Result<T, CliError>;
