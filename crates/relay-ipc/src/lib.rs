//! Wire transport for the robot relay.
//!
//! This crate provides:
//! - TCP server speaking newline-delimited JSON
//! - JSON-RPC-like request/response protocol plus pushed events
//! - `TcpTransport`, the relay's `Transport` over live sockets
//! - `IpcClient` for one-shot calls and `RobotConnection` for robots

mod error;
mod protocol;
mod server;
mod transport;

pub use error::{IpcError, IpcResult};
pub use protocol::{
    error_codes, Frame, IdentifyParams, Method, OutboxStatusParams, Request, Response,
    SendParams, ShutdownParams, SmsParams,
};
pub use server::{HandlerFn, IpcClient, IpcServer, RobotConnection};
pub use transport::TcpTransport;
