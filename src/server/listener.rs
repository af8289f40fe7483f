//! HTTP server listener
//!
//! Binds the TCP listener and serves the stream router until shutdown.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::pipeline::{PipelineLauncher, ProcessLauncher};
use crate::server::config::ServerConfig;
use crate::server::handler;
use crate::tuner::Tuner;

/// Radio HTTP server
pub struct RadioServer<L: PipelineLauncher = ProcessLauncher> {
    config: ServerConfig,
    tuner: Tuner<L>,
}

impl<L: PipelineLauncher> RadioServer<L> {
    /// Create a new server for `tuner`
    pub fn new(config: ServerConfig, tuner: Tuner<L>) -> Self {
        Self { config, tuner }
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    ///
    /// When `shutdown` completes the tuner is shut down, which ends every
    /// open stream, and the server returns once those connections close.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            path = %self.config.stream_path,
            frequency = %self.tuner.config().frequency,
            "Radio server listening"
        );

        let app = handler::router(self.tuner.clone(), &self.config);
        let tuner = self.tuner.clone();

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            tuner.shutdown().await;
        })
        .await?;

        tracing::info!("Radio server stopped");
        Ok(())
    }
}
