//! Streamable HTTP transport: shared state, router and the sweep lifecycle.

use crate::api;
use crate::config::ServerConfig;
use crate::session::{Clock, SessionStore, SweepTask, SystemClock};
use crate::stream::StreamManager;
use anyhow::Result;
use axum::Router;
use ragbridge_mcp::Dispatcher;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// State shared by every request handler
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionStore>,
    pub streams: StreamManager,
}

/// Owns the session store and the background sweep for one server instance
pub struct HttpTransport {
    state: Arc<AppState>,
    sweep_interval: Duration,
    sweeper: Option<SweepTask>,
}

impl HttpTransport {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &ServerConfig) -> Self {
        Self::with_clock(dispatcher, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        dispatcher: Arc<Dispatcher>,
        config: &ServerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(
            config.session.ttl(),
            config.session.max_buffered_events,
            clock,
        ));
        let streams = StreamManager::new(sessions.clone(), config.stream.keepalive());

        Self {
            state: Arc::new(AppState {
                dispatcher,
                sessions,
                streams,
            }),
            sweep_interval: config.session.sweep_interval(),
            sweeper: None,
        }
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        self.state.sessions.clone()
    }

    pub fn router(&self) -> Router {
        api::create_router(self.state.clone())
    }

    /// Start the TTL sweep. Does nothing if it is already running.
    pub fn start(&mut self) {
        if self.sweeper.is_none() {
            self.sweeper = Some(SweepTask::spawn(
                self.state.sessions.clone(),
                self.sweep_interval,
            ));
            tracing::debug!("Session sweep started (every {:?})", self.sweep_interval);
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Stop the TTL sweep and wait for it to exit.
    pub async fn stop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop().await;
        }
    }

    /// Serve on `addr` until `shutdown` resolves
    pub async fn serve<F>(self, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("MCP HTTP transport listening on {}", addr);
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// Once `shutdown` fires every session is closed, which ends standing GET
    /// streams so the connection drain can complete.
    pub async fn serve_on<F>(mut self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sessions = self.sessions();
        let shutdown = async move {
            shutdown.await;
            let closed = sessions.close_all().await;
            tracing::info!("Closed {} MCP session(s) for shutdown", closed);
        };

        self.start();
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        self.stop().await;

        result?;
        tracing::info!("MCP HTTP transport stopped");
        Ok(())
    }
}
