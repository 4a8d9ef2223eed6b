//! IPC handler wiring.

pub mod handlers;
mod register;

pub use register::register_handlers;
