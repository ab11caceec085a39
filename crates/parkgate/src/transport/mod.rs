//! Transport layer for the gate controller.
//!
//! Provides the HTTP status API via axum.

pub mod http;

pub use http::{ServerConfig, serve, shutdown_signal};
