//! Mirror device runtime

use std::future::Future;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pran_common::client::EventSink;
use pran_common::BusEvent;

use crate::director::{Action, Director, Input};

pub struct MirrorRuntime<K> {
    director: Director,
    sink: K,
    reveal_tx: mpsc::UnboundedSender<u64>,
    reveal_rx: mpsc::UnboundedReceiver<u64>,
    timers: Vec<JoinHandle<()>>,
}

impl<K: EventSink> MirrorRuntime<K> {
    pub fn new(image_display: Duration, sink: K) -> Self {
        let (reveal_tx, reveal_rx) = mpsc::unbounded_channel();
        Self {
            director: Director::new(image_display),
            sink,
            reveal_tx,
            reveal_rx,
            timers: Vec::new(),
        }
    }

    /// Run until `shutdown` resolves or the bus goes away
    pub async fn run<F>(mut self, mut inbound: broadcast::Receiver<BusEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Mirror runtime started: {}", self.director.visual());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Mirror runtime stopping");
                    break;
                }

                event = inbound.recv() => {
                    match event {
                        Ok(BusEvent::ConnectionStatus { connected }) => {
                            if connected {
                                info!("Bus connected");
                            } else {
                                warn!("Bus disconnected; keeping last visual state");
                            }
                        }
                        Ok(event) => self.apply(Input::Bus(event)),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Mirror lagged {} bus events, requesting snapshot", n);
                            self.send(BusEvent::GetSession);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                Some(token) = self.reveal_rx.recv() => {
                    self.apply(Input::RevealElapsed { token });
                }
            }
        }

        self.cancel_timers();
    }

    fn apply(&mut self, input: Input) {
        for action in self.director.advance(input) {
            match action {
                Action::Show(visual) => info!("Mirror: {}", visual),
                Action::ScheduleReveal { delay, token } => {
                    self.timers.retain(|t| !t.is_finished());
                    let tx = self.reveal_tx.clone();
                    self.timers.push(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(token);
                    }));
                }
                Action::CancelTimers => self.cancel_timers(),
                Action::Emit(event) => self.send(event),
            }
        }
    }

    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }

    fn send(&self, event: BusEvent) {
        let kind = event.event_type();
        if let Err(e) = self.sink.send(event) {
            warn!("Failed to send {}: {}", kind, e);
        }
    }
}
