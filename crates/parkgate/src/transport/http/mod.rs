//! HTTP status and reservation API.

mod routes;
mod server;

pub use routes::{MessageResponse, ReserveRequest, StatusResponse, routes};
pub use server::{ServerConfig, serve, serve_on, shutdown_signal};
