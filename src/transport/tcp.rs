use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::codec::PacketCodec;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::utils::metrics::global_metrics;

/// A TCP stream framed with the relay codec.
pub type RelayFramed = Framed<TcpStream, PacketCodec>;

/// Open a framed TCP connection, giving up after `connect_timeout`.
#[instrument(skip(addr), level = "debug")]
pub async fn connect<A: ToSocketAddrs>(addr: A, connect_timeout: Duration) -> Result<RelayFramed> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProtocolError::ConnectionTimeout)??;
    stream.set_nodelay(true)?;
    Ok(Framed::new(stream, PacketCodec::new()))
}

/// Serve one accepted connection until the peer leaves, the read timeout
/// fires, a framing error occurs or `shutdown` is cancelled.
///
/// Requests are handled strictly in arrival order; a response is written
/// before the next request is read.
#[instrument(skip(stream, dispatcher, shutdown), fields(peer = %peer))]
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    read_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, PacketCodec::new());
    let metrics = global_metrics();

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Server shutting down, closing connection");
                return Ok(());
            }
            next = tokio::time::timeout(read_timeout, framed.next()) => next,
        };

        let packet = match next {
            Ok(Some(Ok(packet))) => packet,
            Ok(Some(Err(e))) => {
                if e.is_framing() {
                    metrics.protocol_error();
                } else {
                    metrics.connection_error();
                }
                warn!(error = %e, "Dropping connection after read failure");
                return Err(e);
            }
            Ok(None) => {
                info!("Connection closed by peer");
                return Ok(());
            }
            Err(_) => {
                metrics.read_timeout();
                info!(timeout_ms = read_timeout.as_millis() as u64, "Read timed out, closing connection");
                return Err(ProtocolError::ConnectionTimeout);
            }
        };

        metrics.packet_received();
        let kind = packet.kind();
        debug!(kind = %kind, "Packet received");

        if let Some(response) = dispatcher.dispatch(packet) {
            framed.send(response).await?;
            metrics.packet_sent();
        }
    }
}
