use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::session::registry::SessionRegistry;
use crate::session::sweeper::spawn_sweeper;
use crate::transport::tcp::serve_connection;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_timeout_error;

/// How often shutdown re-checks the number of open connections.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Relay server: one listener, one session registry, one sweep task.
///
/// # Example
/// ```no_run
/// use captcha_relay::config::ServerConfig;
/// use captcha_relay::service::server::RelayServer;
///
/// # async fn run() -> captcha_relay::error::Result<()> {
/// let server = RelayServer::bind(&ServerConfig::default()).await?;
/// server.run().await
/// # }
/// ```
pub struct RelayServer {
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
}

/// Decrements the open connection count when a connection task ends.
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        global_metrics().connection_established();
        Self { active }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        global_metrics().connection_closed();
    }
}

impl RelayServer {
    /// Bind the configured address. Port 0 picks a free port, see [`Self::local_addr`].
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let registry = Arc::new(SessionRegistry::from_config(config));
        Self::bind_with_registry(config, registry).await
    }

    /// Bind with an existing registry, e.g. one shared with an admin surface.
    pub async fn bind_with_registry(
        config: &ServerConfig,
        registry: Arc<SessionRegistry>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        Ok(Self {
            listener,
            config: config.clone(),
            registry,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Token that stops the server when cancelled, as an alternative to the
    /// shutdown channel.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until CTRL+C.
    pub async fn run(self) -> Result<()> {
        self.run_until_signal(tokio::signal::ctrl_c()).await
    }

    /// Run until `signal` resolves with `Ok`. A failed signal listener is
    /// logged and leaves the server running.
    pub(crate) async fn run_until_signal<S>(self, signal: S) -> Result<()>
    where
        S: Future<Output = std::io::Result<()>> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        // The outer sender keeps the channel open if the signal handler fails.
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            match signal.await {
                Ok(()) => {
                    info!("Received CTRL+C signal, shutting down");
                    let _ = shutdown_tx_clone.send(()).await;
                }
                Err(e) => warn!(error = %e, "Failed to listen for CTRL+C"),
            }
        });

        let result = self.run_with_shutdown(shutdown_rx).await;
        drop(shutdown_tx);
        result
    }

    /// Run until a message arrives on `shutdown_rx`, every sender is dropped,
    /// or the [`shutdown_token`](Self::shutdown_token) is cancelled.
    #[instrument(skip_all, fields(address = %self.config.address))]
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(address = %local_addr, "Server started on {}", local_addr);

        let sweeper = spawn_sweeper(
            self.registry.clone(),
            self.config.sweep_interval,
            self.shutdown.child_token(),
        );
        let dispatcher = Dispatcher::new(self.registry.clone());
        let active_connections = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = self.shutdown.cancelled() => break,

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            if active_connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!(peer = %peer, limit = self.config.max_connections, "Connection limit reached, refusing");
                                global_metrics().connection_rejected();
                                drop(stream);
                                continue;
                            }

                            info!(peer = %peer, "New connection established");
                            let guard = ConnectionGuard::new(active_connections.clone());
                            let dispatcher = dispatcher.clone();
                            let read_timeout = self.config.read_timeout;
                            let shutdown = self.shutdown.child_token();

                            tokio::spawn(async move {
                                let _guard = guard;
                                if let Err(e) = serve_connection(stream, peer, dispatcher, read_timeout, shutdown).await {
                                    debug!(peer = %peer, error = %e, "Connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            global_metrics().connection_error();
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }

        info!("Shutting down server. Waiting for connections to close...");
        self.shutdown.cancel();

        let deadline = tokio::time::sleep(self.config.shutdown_timeout);
        tokio::pin!(deadline);

        loop {
            let connections = active_connections.load(Ordering::SeqCst);
            if connections == 0 {
                info!("All connections closed, shutting down");
                break;
            }
            tokio::select! {
                _ = &mut deadline => {
                    warn!(connections, "Shutdown timeout reached, forcing exit");
                    break;
                }
                _ = tokio::time::sleep(SHUTDOWN_POLL) => {
                    debug!(connections, "Waiting for connections to close");
                }
            }
        }

        let sweeper_done = async {
            sweeper
                .await
                .map_err(|e| ProtocolError::Io(std::io::Error::other(e)))
        };
        if let Err(e) = with_timeout_error(sweeper_done, SHUTDOWN_POLL).await {
            error!(error = %e, "Session sweeper did not stop cleanly");
        }
        global_metrics().log_metrics();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::core::packet::Packet;
    use crate::transport::tcp;
    use futures::{SinkExt, StreamExt};

    fn config() -> ServerConfig {
        ServerConfig {
            address: "127.0.0.1:0".to_string(),
            shutdown_timeout: Duration::from_secs(1),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failed_signal_listener_keeps_serving() {
        let server = RelayServer::bind(&config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let stop = server.shutdown_token();
        let handle = tokio::spawn(
            server.run_until_signal(async {
                Err::<(), _>(std::io::Error::other("signals unavailable"))
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished(), "server stopped when the signal listener failed");

        let mut framed = tcp::connect(addr, Duration::from_secs(5)).await.unwrap();
        framed.send(Packet::KeepAlive).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), framed.next())
            .await
            .expect("reply in time")
            .unwrap()
            .unwrap();
        assert_eq!(reply, Packet::KeepAlive);

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server stops in time")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_signal_stops_server() {
        let server = RelayServer::bind(&config()).await.unwrap();
        let handle = tokio::spawn(server.run_until_signal(async { Ok::<(), std::io::Error>(()) }));

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server stops in time")
            .unwrap()
            .unwrap();
    }
}
