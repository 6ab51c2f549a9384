//! WebSocket client transport.
//!
//! A background task owns the socket, reconnecting with exponential
//! backoff. Every successful (re)connection is announced with
//! [`ClientEvent::Connected`] and followed by the server's `init` snapshot,
//! which resynchronizes the view from scratch.

use bustrack_protocol::{codec, ClientFrame};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::traits::{ClientEvent, Outbound, TransportError};

/// Base delay between reconnection attempts.
const RECONNECT_BASE_DELAY_SECS: u64 = 2;

/// Maximum delay between reconnection attempts.
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// Capacity of the event queue handed to the caller.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Delay before reconnection attempt number `attempt` (1-based).
#[must_use]
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let secs = RECONNECT_BASE_DELAY_SECS.saturating_mul(1u64 << exponent);
    Duration::from_secs(secs.min(MAX_RECONNECT_DELAY_SECS))
}

/// Handle to a persistent connection.
///
/// Dropping the handle stops the connection task.
pub struct WsClient {
    url: String,
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WsClient {
    /// Start connecting to `url` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(url: impl Into<String>) -> (Self, mpsc::Receiver<ClientEvent>) {
        let url = url.into();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(connection_loop(
            url.clone(),
            event_tx,
            outbound_rx,
            Arc::clone(&connected),
        ));

        let client = Self {
            url,
            outbound,
            connected,
            task,
        };
        (client, event_rx)
    }

    /// The endpoint this client connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop the connection task.
    pub fn shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Outbound for WsClient {
    fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        let text = codec::encode_client(&frame)?;
        self.outbound
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

async fn connection_loop(
    url: String,
    events: mpsc::Sender<ClientEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
) {
    let mut attempts = 0u32;

    loop {
        let result = run_connection(&url, &events, &mut outbound, &connected).await;
        let was_connected = connected.swap(false, Ordering::SeqCst);

        let error = match result {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };
        if was_connected {
            attempts = 0;
        }
        attempts += 1;

        if events.send(ClientEvent::Disconnected { error }).await.is_err() {
            debug!("Event receiver dropped, stopping connection loop");
            break;
        }

        let delay = reconnect_delay(attempts);
        debug!(url = %url, attempt = attempts, delay_secs = delay.as_secs(), "Reconnecting");
        tokio::time::sleep(delay).await;
    }
}

async fn run_connection(
    url: &str,
    events: &mpsc::Sender<ClientEvent>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    connected: &AtomicBool,
) -> Result<(), TransportError> {
    let (stream, _response) = connect_async(url).await?;
    let (mut sink, mut source) = stream.split();

    // Anything queued while disconnected is stale.
    while outbound.try_recv().is_ok() {}

    connected.store(true, Ordering::SeqCst);
    info!(url = %url, "Connected");
    if events.send(ClientEvent::Connected).await.is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            Some(text) = outbound.recv() => {
                sink.send(Message::Text(text)).await?;
            }

            msg = source.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Ignoring non-UTF-8 frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        sink.send(Message::Pong(data)).await?;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(url = %url, "Connection closed by server");
                        return Ok(());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };

                match codec::decode_server(&text) {
                    Ok(frame) => {
                        if events.send(ClientEvent::Frame(frame)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => warn!(error = %e, "Ignoring malformed server frame"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_backoff() {
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(2), Duration::from_secs(4));
        assert_eq!(reconnect_delay(3), Duration::from_secs(8));
        assert_eq!(reconnect_delay(10), Duration::from_secs(60));
        assert_eq!(reconnect_delay(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let (client, _events) = WsClient::connect("ws://127.0.0.1:9");
        assert!(!client.is_open());
        assert!(matches!(
            client.send(ClientFrame::request("bus1")),
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_disconnect() {
        let (_client, mut events) = WsClient::connect("ws://127.0.0.1:9");
        match events.recv().await {
            Some(ClientEvent::Disconnected { error }) => assert!(error.is_some()),
            other => panic!("Expected Disconnected, got {:?}", other),
        }
    }
}
