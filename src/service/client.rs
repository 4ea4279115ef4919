use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ClientConfig;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::protocol::event::ClientEvent;
use crate::transport::tcp::{self, RelayFramed};
use crate::utils::metrics::global_metrics;

/// Connection state guarded by one short, non-async lock.
///
/// `outbound` is only replaced while the lock is held, and activation drains
/// `pending` into the new channel before publishing it, so queued packets
/// always precede packets submitted afterwards.
#[derive(Default)]
struct ConnectionState {
    address: Option<String>,
    outbound: Option<mpsc::UnboundedSender<Packet>>,
    pending: VecDeque<Packet>,
    supervising: bool,
    disconnected: bool,
}

struct Inner {
    config: ClientConfig,
    state: Mutex<ConnectionState>,
    events: mpsc::UnboundedSender<ClientEvent>,
    shutdown: CancellationToken,
}

/// Auto-reconnecting relay client.
///
/// Packets can be sent at any time. While no connection is up they are queued
/// and flushed, in submission order, as soon as one is established. Inbound
/// traffic and connection changes arrive as [`ClientEvent`]s on the receiver
/// returned by [`RelayClient::new`].
///
/// After a connection attempt fails or an established connection drops, the
/// client waits `reconnect_delay` and tries again, until [`disconnect`]
/// is called or the client is dropped.
///
/// [`disconnect`]: RelayClient::disconnect
pub struct RelayClient {
    inner: Arc<Inner>,
}

impl RelayClient {
    /// Create an idle client. Nothing is dialed until [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(ConnectionState::default()),
            events,
            shutdown: CancellationToken::new(),
        });
        (Self { inner }, receiver)
    }

    /// Start connecting to the configured address.
    pub fn connect(&self) -> Result<()> {
        let address = self.inner.config.address.clone();
        self.connect_to(address)
    }

    /// Start connecting to `address` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// * [`ProtocolError::Disconnected`] - the client was disconnected
    /// * [`ProtocolError::AlreadyConnected`] - a connection loop is already running
    pub fn connect_to(&self, address: impl Into<String>) -> Result<()> {
        let address = address.into();
        {
            let mut state = self.inner.state.lock();
            if state.disconnected {
                return Err(ProtocolError::Disconnected);
            }
            if state.supervising {
                return Err(ProtocolError::AlreadyConnected);
            }
            state.supervising = true;
            state.address = Some(address.clone());
        }

        tokio::spawn(supervise(self.inner.clone(), address));
        Ok(())
    }

    /// Hand `packet` to the live connection, or queue it while offline.
    /// Never blocks. Packets sent after [`disconnect`](Self::disconnect) are dropped.
    pub fn send_packet(&self, packet: Packet) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if state.disconnected {
            state.pending.clear();
            trace!(kind = %packet.kind(), "Client disconnected, dropping packet");
            return;
        }

        match &state.outbound {
            Some(outbound) => {
                if let Err(mpsc::error::SendError(packet)) = outbound.send(packet) {
                    state.pending.push_back(packet);
                }
            }
            None => {
                trace!(kind = %packet.kind(), queued = state.pending.len() + 1, "Offline, queueing packet");
                state.pending.push_back(packet);
            }
        }
    }

    pub fn request_new_code(&self) {
        self.send_packet(Packet::NewCodeRequest);
    }

    pub fn complete_ticket(&self, code: impl Into<Bytes>, ticket: impl Into<Bytes>) {
        self.send_packet(Packet::complete(code, ticket));
    }

    pub fn query_ticket(&self, code: impl Into<Bytes>) {
        self.send_packet(Packet::query_status(code));
    }

    pub fn update_captcha_info(
        &self,
        code: impl Into<Bytes>,
        captcha_type: u16,
        captcha_data: Option<Bytes>,
    ) {
        self.send_packet(Packet::code_info_update(code, captcha_type, captcha_data));
    }

    pub fn refresh_code(&self, code: impl Into<Bytes>) {
        self.send_packet(Packet::code_info_refresh(code));
    }

    pub fn query_captcha_info(&self, code: impl Into<Bytes>) {
        self.send_packet(Packet::code_info_query(code));
    }

    pub fn keepalive(&self) {
        self.send_packet(Packet::KeepAlive);
    }

    /// Stop for good: close the live connection, drop queued packets and
    /// cancel any pending reconnect. Idempotent.
    pub fn disconnect(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.disconnected {
                return;
            }
            state.disconnected = true;
            state.outbound = None;
            state.pending.clear();
        }
        self.inner.shutdown.cancel();
        info!("Client disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().outbound.is_some()
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.state.lock().disconnected
    }

    /// Packets waiting for the next connection.
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Address passed to the last successful `connect` call.
    pub fn address(&self) -> Option<String> {
        self.inner.state.lock().address.clone()
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RelayClient")
            .field("address", &state.address)
            .field("connected", &state.outbound.is_some())
            .field("pending", &state.pending.len())
            .field("disconnected", &state.disconnected)
            .finish()
    }
}

/// Connect, serve, wait, repeat. Exits only on shutdown.
#[instrument(skip(inner), level = "debug")]
async fn supervise(inner: Arc<Inner>, address: String) {
    let mut attempt: u64 = 0;

    loop {
        if attempt > 0 {
            global_metrics().reconnect_attempt();
        }
        attempt += 1;

        let connected = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            result = tcp::connect(address.as_str(), inner.config.connect_timeout) => result,
        };

        match connected {
            Ok(framed) => {
                info!(address = %address, attempt, "Connected to relay server");
                inner.run_connection(framed).await;
            }
            Err(e) => {
                global_metrics().connection_error();
                warn!(address = %address, attempt, error = %e, "Connection attempt failed");
            }
        }

        if inner.shutdown.is_cancelled() {
            break;
        }

        debug!(delay_ms = inner.config.reconnect_delay.as_millis() as u64, "Scheduling reconnect");
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
        }
    }

    debug!("Connection supervisor stopped");
}

impl Inner {
    /// Publish a fresh channel for `framed`, drive it until it closes, then
    /// move anything it did not write back to the front of the queue.
    async fn run_connection(&self, mut framed: RelayFramed) {
        let (outbound, mut rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock();
            if state.disconnected {
                return;
            }
            let flushed = state.pending.len();
            for packet in state.pending.drain(..) {
                // rx is alive, so this cannot fail.
                let _ = outbound.send(packet);
            }
            state.outbound = Some(outbound);
            debug!(flushed, "Connection active");
        }

        global_metrics().connection_established();
        let _ = self.events.send(ClientEvent::Connected);

        let result = self.drive(&mut framed, &mut rx).await;

        {
            let mut state = self.state.lock();
            state.outbound = None;
            rx.close();

            let mut unsent = Vec::new();
            while let Ok(packet) = rx.try_recv() {
                unsent.push(packet);
            }
            if !state.disconnected {
                for packet in unsent.into_iter().rev() {
                    state.pending.push_front(packet);
                }
            }
        }

        global_metrics().connection_closed();
        match result {
            Ok(()) => debug!("Connection closed"),
            Err(e) => warn!(error = %e, "Connection lost"),
        }
        let _ = self.events.send(ClientEvent::ConnectionLost);
    }

    /// I/O loop for one connection. Keepalives start one period in and stop
    /// with the loop.
    async fn drive(
        &self,
        framed: &mut RelayFramed,
        rx: &mut mpsc::UnboundedReceiver<Packet>,
    ) -> Result<()> {
        let metrics = global_metrics();
        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let read_deadline = tokio::time::sleep(self.config.read_timeout);
        tokio::pin!(read_deadline);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),

                _ = &mut read_deadline => {
                    metrics.read_timeout();
                    return Err(ProtocolError::ConnectionTimeout);
                }

                _ = keepalive.tick() => {
                    framed.send(Packet::KeepAlive).await?;
                    metrics.packet_sent();
                }

                outbound = rx.recv() => match outbound {
                    Some(packet) => {
                        trace!(kind = %packet.kind(), "Writing packet");
                        framed.send(packet).await?;
                        metrics.packet_sent();
                    }
                    None => return Ok(()),
                },

                inbound = framed.next() => match inbound {
                    Some(Ok(packet)) => {
                        read_deadline
                            .as_mut()
                            .reset(Instant::now() + self.config.read_timeout);
                        metrics.packet_received();
                        trace!(kind = %packet.kind(), "Packet received");
                        if let Some(event) = ClientEvent::from_packet(packet) {
                            let _ = self.events.send(event);
                        }
                    }
                    Some(Err(e)) => {
                        if e.is_framing() {
                            metrics.protocol_error();
                        }
                        return Err(e);
                    }
                    None => return Err(ProtocolError::ConnectionClosed),
                },
            }
        }
    }
}
