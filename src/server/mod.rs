//! HTTP server
//!
//! Serves the tuner's stream at a single path. Every request attaches one
//! listener; the response body is the listener's chunk stream.

pub mod config;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use handler::router;
pub use listener::RadioServer;
