//! Reconnecting Dispatch Bus client
//!
//! Device runtimes talk to the server over one WebSocket carrying JSON
//! [`BusEvent`]s. The client keeps reconnecting with capped exponential backoff,
//! publishes a connectivity flag, and asks for a fresh `session_state` on every
//! (re)connect so devices never infer phase locally while disconnected.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::election::{ElectionMessage, SiblingChannel};
use crate::events::BusEvent;
use crate::{Error, Result};

/// Reconnect behaviour
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Inbound broadcast capacity
    pub capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            capacity: 256,
        }
    }
}

/// Handle to the background connection task
///
/// Inbound events other than election traffic are fanned out on a broadcast
/// channel, followed by local `connection_status` events whenever the link goes
/// up or down. Election messages go to [`BusClient::siblings`] instead.
pub struct BusClient {
    outbound: mpsc::UnboundedSender<BusEvent>,
    inbound: broadcast::Sender<BusEvent>,
    election: broadcast::Sender<ElectionMessage>,
    connected: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl BusClient {
    /// Spawn the connection task
    ///
    /// Returns the client plus a receiver subscribed before the first connect
    /// attempt, so the initial `session_state` cannot be missed.
    pub fn connect(url: String, options: ClientOptions) -> (Self, broadcast::Receiver<BusEvent>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, first_rx) = broadcast::channel(options.capacity);
        let (election, _) = broadcast::channel(options.capacity);
        let (connected_tx, connected) = watch::channel(false);

        let task = tokio::spawn(run(
            url,
            options,
            outbound_rx,
            inbound.clone(),
            election.clone(),
            connected_tx,
        ));

        (
            Self {
                outbound,
                inbound,
                election,
                connected,
                task,
            },
            first_rx,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.inbound.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch receiver over the connectivity flag
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Send an event to the server
    ///
    /// Fails without queueing while disconnected; events are never replayed
    /// after a reconnect.
    pub fn send(&self, event: BusEvent) -> Result<()> {
        send_event(&self.outbound, &self.connected, event)
    }

    /// Sibling channel for the master election, riding on this bus
    pub fn siblings(&self) -> BusSiblings {
        BusSiblings {
            outbound: self.outbound.clone(),
            connected: self.connected.clone(),
            election: self.election.clone(),
        }
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Outbound half of a device runtime
///
/// Implemented by [`BusClient`] and by a plain mpsc sender, which tests use to
/// capture what a runtime emits.
pub trait EventSink: Send {
    fn send(&self, event: BusEvent) -> Result<()>;
}

impl EventSink for BusClient {
    fn send(&self, event: BusEvent) -> Result<()> {
        BusClient::send(self, event)
    }
}

impl EventSink for mpsc::UnboundedSender<BusEvent> {
    fn send(&self, event: BusEvent) -> Result<()> {
        mpsc::UnboundedSender::send(self, event)
            .map_err(|_| Error::Transport("sink closed".to_string()))
    }
}

fn send_event(
    outbound: &mpsc::UnboundedSender<BusEvent>,
    connected: &watch::Receiver<bool>,
    event: BusEvent,
) -> Result<()> {
    if matches!(event, BusEvent::ConnectionStatus { .. }) {
        return Err(Error::InvalidInput(
            "connection_status is local only".to_string(),
        ));
    }

    if !*connected.borrow() {
        warn!("Bus disconnected, dropping outbound {}", event.event_type());
        return Err(Error::Transport("not connected".to_string()));
    }

    outbound
        .send(event)
        .map_err(|_| Error::Transport("connection task stopped".to_string()))
}

/// Election messages relayed through the server to sibling tabs
#[derive(Clone)]
pub struct BusSiblings {
    outbound: mpsc::UnboundedSender<BusEvent>,
    connected: watch::Receiver<bool>,
    election: broadcast::Sender<ElectionMessage>,
}

impl SiblingChannel for BusSiblings {
    fn post(&self, message: ElectionMessage) {
        if let Err(e) = send_event(&self.outbound, &self.connected, BusEvent::Election { message }) {
            debug!("Election message not sent: {}", e);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ElectionMessage> {
        self.election.subscribe()
    }
}

async fn run(
    url: String,
    options: ClientOptions,
    mut outbound: mpsc::UnboundedReceiver<BusEvent>,
    inbound: broadcast::Sender<BusEvent>,
    election: broadcast::Sender<ElectionMessage>,
    connected: watch::Sender<bool>,
) {
    let mut backoff = options.initial_backoff;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!("Connected to Dispatch Bus at {}", url);
                backoff = options.initial_backoff;

                // Anything queued while the link was down is stale
                while outbound.try_recv().is_ok() {}

                let closed =
                    serve_connection(stream, &mut outbound, &inbound, &election, &connected).await;

                if *connected.borrow() {
                    connected.send_replace(false);
                    let _ = inbound.send(BusEvent::ConnectionStatus { connected: false });
                    warn!("Dispatch Bus connection lost");
                }
                if closed {
                    return;
                }
            }
            Err(e) => {
                debug!("Dispatch Bus connect to {} failed: {}", url, e);
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(options.max_backoff);
    }
}

/// Pump one connection until it drops; returns `true` once the client is gone
async fn serve_connection<S>(
    stream: S,
    outbound: &mut mpsc::UnboundedReceiver<BusEvent>,
    inbound: &broadcast::Sender<BusEvent>,
    election: &broadcast::Sender<ElectionMessage>,
    connected: &watch::Sender<bool>,
) -> bool
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = stream.split();

    let hello = match serde_json::to_string(&BusEvent::GetSession) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode get_session: {}", e);
            return false;
        }
    };
    if let Err(e) = write.send(Message::Text(hello.into())).await {
        warn!("Dispatch Bus handshake failed: {}", e);
        return false;
    }

    connected.send_replace(true);
    let _ = inbound.send(BusEvent::ConnectionStatus { connected: true });

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => dispatch(text.as_str(), inbound, election),
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Err(e)) => {
                        warn!("Dispatch Bus read error: {}", e);
                        return false;
                    }
                    _ => {}
                }
            }

            event = outbound.recv() => {
                let Some(event) = event else {
                    let _ = write.send(Message::Close(None)).await;
                    return true;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if write.send(Message::Text(json.into())).await.is_err() {
                            return false;
                        }
                    }
                    Err(e) => warn!("Failed to encode {}: {}", event.event_type(), e),
                }
            }
        }
    }
}

fn dispatch(
    text: &str,
    inbound: &broadcast::Sender<BusEvent>,
    election: &broadcast::Sender<ElectionMessage>,
) {
    match serde_json::from_str::<BusEvent>(text) {
        Ok(BusEvent::Election { message }) => {
            let _ = election.send(message);
        }
        Ok(BusEvent::ConnectionStatus { .. }) => {
            debug!("Ignoring connection_status received over the wire");
        }
        Ok(event) => {
            debug!("Bus event received: {}", event.event_type());
            let _ = inbound.send(event);
        }
        Err(e) => warn!("Unparseable bus message ignored: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Phase;

    #[test]
    fn test_dispatch_routes_election_traffic_separately() {
        let (inbound, mut events) = broadcast::channel(8);
        let (election, mut messages) = broadcast::channel(8);

        dispatch(
            r#"{"type":"phase_changed","phase":"COMMON_FLOW"}"#,
            &inbound,
            &election,
        );
        dispatch(
            r#"{"type":"election","message":{"kind":"alive","tabId":"00000000-0000-0000-0000-000000000000"}}"#,
            &inbound,
            &election,
        );
        dispatch("not json", &inbound, &election);

        assert_eq!(
            events.try_recv().unwrap(),
            BusEvent::PhaseChanged {
                phase: Phase::CommonFlow
            }
        );
        assert!(events.try_recv().is_err());
        assert!(matches!(
            messages.try_recv().unwrap(),
            ElectionMessage::Alive { .. }
        ));
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        // Nothing listens on port 9; the client stays disconnected
        let (client, _rx) = BusClient::connect(
            "ws://127.0.0.1:9/bus?role=table".to_string(),
            ClientOptions::default(),
        );

        assert!(!client.is_connected());
        assert!(matches!(
            client.send(BusEvent::AudioPause),
            Err(Error::Transport(_))
        ));
        assert!(matches!(
            client.send(BusEvent::ConnectionStatus { connected: true }),
            Err(Error::InvalidInput(_))
        ));
    }
}
