use thiserror::Error;

/// Failures on the relay's TCP wire.
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("relay I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer sent something valid as JSON but wrong for the exchange.
    #[error("unexpected reply: {0}")]
    Protocol(String),

    /// Binding or connecting failed.
    #[error("{0}")]
    Socket(String),

    #[error("peer closed the connection")]
    ConnectionClosed,
}

pub type IpcResult<T> = Result<T, IpcError>;
