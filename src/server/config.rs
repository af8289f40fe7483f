//! Server configuration

use std::net::SocketAddr;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default stream path
pub const DEFAULT_STREAM_PATH: &str = "/radio.ts";

/// MPEG transport stream content type
pub const MPEG_TS_CONTENT_TYPE: &str = "video/MP2T";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent listeners (0 = unlimited)
    pub max_listeners: usize,

    /// Path the stream is served on
    pub stream_path: String,

    /// Content type of the stream response
    pub content_type: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_listeners: 0, // Unlimited
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            content_type: MPEG_TS_CONTENT_TYPE.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum listeners
    pub fn max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    /// Set the stream path; a leading `/` is added if missing
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.stream_path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    /// Set the response content type
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}
