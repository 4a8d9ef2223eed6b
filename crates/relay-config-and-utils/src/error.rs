use thiserror::Error;

/// Errors loading settings or preparing the relay home directory.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting is present but unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
