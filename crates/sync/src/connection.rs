use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::protocol::OutboundMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Lifecycle and stream events surfaced to the sync event loop.
#[derive(Debug)]
pub enum ConnectionEvent {
    Up,
    Down,
    Frame(String),
}

/// Owns the telemetry stream connection for the whole session: connect,
/// forward frames, and on any close or error retry after a fixed delay,
/// forever. The single task structure guarantees at most one pending
/// reconnect attempt and never a second concurrent socket.
pub struct Connector {
    url: String,
    reconnect_delay: Duration,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    outbound_rx: mpsc::Receiver<OutboundMessage>,
    stop: watch::Receiver<bool>,
}

impl Connector {
    pub fn new(
        url: String,
        reconnect_delay: Duration,
        state_tx: watch::Sender<ConnectionState>,
        events_tx: mpsc::Sender<ConnectionEvent>,
        outbound_rx: mpsc::Receiver<OutboundMessage>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            url,
            reconnect_delay,
            state_tx,
            events_tx,
            outbound_rx,
            stop,
        }
    }

    pub async fn run(self) {
        let Connector {
            url,
            reconnect_delay,
            state_tx,
            events_tx,
            mut outbound_rx,
            mut stop,
        } = self;

        'session: loop {
            if *stop.borrow() {
                break;
            }

            state_tx.send_replace(ConnectionState::Connecting);
            tracing::info!(url = %url, "Connecting to telemetry stream");

            let connect = tokio_tungstenite::connect_async(url.as_str());
            tokio::pin!(connect);
            let attempt = loop {
                tokio::select! {
                    result = &mut connect => break result,
                    _ = async { let _ = stop.wait_for(|stopped| *stopped).await; } => break 'session,
                    // Only an open stream may carry sends; the attempt
                    // window rejects them like the disconnected wait does.
                    Some(message) = outbound_rx.recv() => reject_send(&message),
                }
            };

            match attempt {
                Ok((socket, _response)) => {
                    state_tx.send_replace(ConnectionState::Connected);
                    tracing::info!("Telemetry stream connected");
                    if events_tx.send(ConnectionEvent::Up).await.is_err() {
                        break 'session;
                    }

                    drive(socket, &events_tx, &mut outbound_rx, &mut stop).await;

                    state_tx.send_replace(ConnectionState::Disconnected);
                    if events_tx.send(ConnectionEvent::Down).await.is_err() {
                        break 'session;
                    }
                }
                Err(e) => {
                    state_tx.send_replace(ConnectionState::Disconnected);
                    tracing::warn!(error = %e, "Connection attempt failed");
                }
            }

            if *stop.borrow() {
                break;
            }

            tracing::info!(
                delay_ms = reconnect_delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            let retry = tokio::time::sleep(reconnect_delay);
            tokio::pin!(retry);
            loop {
                tokio::select! {
                    _ = &mut retry => break,
                    _ = async { let _ = stop.wait_for(|stopped| *stopped).await; } => break 'session,
                    // Sends requested while disconnected are rejected, not queued.
                    Some(message) = outbound_rx.recv() => reject_send(&message),
                }
            }
        }

        state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!("Connection manager stopped");
    }
}

/// Reported no-op for a send requested while the stream is not connected.
fn reject_send(message: &OutboundMessage) {
    tracing::error!(
        msg_type = %message.msg_type,
        "Cannot send, telemetry stream is not connected, dropping message"
    );
}

/// Pump one established socket until it closes, errors, or the session is
/// stopped. Transport failures are never fatal here; returning hands
/// control back to the reconnect loop.
async fn drive(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events_tx: &mpsc::Sender<ConnectionEvent>,
    outbound_rx: &mut mpsc::Receiver<OutboundMessage>,
    stop: &mut watch::Receiver<bool>,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if events_tx
                        .send(ConnectionEvent::Frame(text.as_str().to_owned()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("Telemetry stream closed by peer");
                    return;
                }
                // Binary frames and ping/pong carry nothing to route.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Telemetry stream error");
                    return;
                }
                None => {
                    tracing::info!("Telemetry stream ended");
                    return;
                }
            },
            Some(message) = outbound_rx.recv() => {
                match message.to_json() {
                    Ok(json) => {
                        if let Err(e) = write.send(Message::Text(json.into())).await {
                            tracing::warn!(error = %e, "Send failed, dropping connection");
                            return;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode outbound message"),
                }
            },
            _ = async { let _ = stop.wait_for(|stopped| *stopped).await; } => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
        }
    }
}
