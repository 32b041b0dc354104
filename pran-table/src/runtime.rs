//! Table device runtime
//!
//! Glues the pure [`Scheduler`] to the outside world: inbound bus events, the
//! audio output, timers and catalog fetches are multiplexed in one select loop,
//! and the resulting actions are executed in order. Every tab runs the full
//! scheduler; only the elected master is audible and allowed to emit.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use pran_common::catalog::{AudioClip, ClipCategory};
use pran_common::client::EventSink;
use pran_common::BusEvent;

use crate::ambience::AmbienceLane;
use crate::catalog_client::ClipSource;
use crate::error::Result;
use crate::output::{AudioOutput, OutputEvent};
use crate::scheduler::{Action, Input, Scheduler, SchedulerConfig};
use crate::timers::{TimerEvent, Timers};

/// Files for the two ambience lanes
#[derive(Debug, Clone)]
pub struct AmbiencePaths {
    pub intro: String,
    pub closing: String,
}

impl AmbiencePaths {
    fn for_lane(&self, lane: AmbienceLane) -> &str {
        match lane {
            AmbienceLane::Intro => &self.intro,
            AmbienceLane::Closing => &self.closing,
        }
    }
}

type LoadResult = (ClipCategory, Result<Vec<AudioClip>>);

pub struct TableRuntime<S, O, K> {
    scheduler: Scheduler,
    ambience: AmbiencePaths,
    source: Arc<S>,
    output: O,
    output_events: mpsc::UnboundedReceiver<OutputEvent>,
    sink: K,
    timers: Timers,
    timer_events: mpsc::UnboundedReceiver<TimerEvent>,
    loads_tx: mpsc::UnboundedSender<LoadResult>,
    loads_rx: mpsc::UnboundedReceiver<LoadResult>,
    master: watch::Receiver<bool>,
}

impl<S, O, K> TableRuntime<S, O, K>
where
    S: ClipSource,
    O: AudioOutput,
    K: EventSink,
{
    pub fn new(
        config: SchedulerConfig,
        ambience: AmbiencePaths,
        source: S,
        output: O,
        output_events: mpsc::UnboundedReceiver<OutputEvent>,
        sink: K,
        master: watch::Receiver<bool>,
    ) -> Self {
        let (timers, timer_events) = Timers::new();
        let (loads_tx, loads_rx) = mpsc::unbounded_channel();

        Self {
            scheduler: Scheduler::new(config),
            ambience,
            source: Arc::new(source),
            output,
            output_events,
            sink,
            timers,
            timer_events,
            loads_tx,
            loads_rx,
            master,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn is_master(&self) -> bool {
        *self.master.borrow()
    }

    /// Run until `shutdown` resolves or the bus goes away
    pub async fn run<F>(mut self, mut inbound: broadcast::Receiver<BusEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let master = self.is_master();
        self.output.set_muted(!master);
        info!("Table runtime started (master={})", master);
        let mut election_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Table runtime stopping");
                    break;
                }

                event = inbound.recv() => {
                    match event {
                        Ok(event) => {
                            if let Some(input) = self.translate(event) {
                                self.apply(input);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Table lagged {} bus events, requesting snapshot", n);
                            self.emit(BusEvent::GetSession, true);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("Bus closed, table runtime stopping");
                            break;
                        }
                    }
                }

                Some(event) = self.output_events.recv() => {
                    let input = match event {
                        OutputEvent::Ended { audio_id } => Input::ClipEnded { audio_id },
                        OutputEvent::Errored { audio_id, message } => {
                            Input::ClipErrored { audio_id, message }
                        }
                    };
                    self.apply(input);
                }

                Some(event) = self.timer_events.recv() => {
                    let input = match event {
                        TimerEvent::GapElapsed { generation } => Input::GapElapsed { generation },
                        TimerEvent::AutoResetElapsed { epoch } => Input::AutoResetElapsed { epoch },
                    };
                    self.apply(input);
                }

                Some((category, result)) = self.loads_rx.recv() => {
                    let input = match result {
                        Ok(clips) => Input::QueueLoaded { category, clips },
                        Err(e) => Input::CatalogMiss { category, reason: e.to_string() },
                    };
                    self.apply(input);
                }

                changed = self.master.changed(), if election_open => {
                    if changed.is_err() {
                        election_open = false;
                        continue;
                    }
                    let master = self.is_master();
                    info!("Master status changed: {}", if master { "master" } else { "follower" });
                    self.output.set_muted(!master);
                }
            }
        }

        self.timers.cancel_all();
        self.output.stop();
        self.output.stop_ambience();
    }

    fn translate(&self, event: BusEvent) -> Option<Input> {
        match event {
            BusEvent::SessionState(snapshot) => Some(Input::Session(snapshot)),
            BusEvent::SessionReset => Some(Input::SessionReset),
            BusEvent::ClipRequested { audio_id } => Some(Input::ClipRequested { audio_id }),
            BusEvent::AudioPause => Some(Input::Pause),
            BusEvent::AudioResume => Some(Input::Resume),
            BusEvent::ConnectionStatus { connected } => {
                if connected {
                    info!("Bus connected");
                } else {
                    warn!("Bus disconnected; holding current state");
                }
                None
            }
            other => {
                debug!("Table ignoring {}", other.event_type());
                None
            }
        }
    }

    /// Feed one input to the scheduler and carry out its actions
    pub fn apply(&mut self, input: Input) {
        let mut queue: VecDeque<Action> = self.scheduler.advance(input).into();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::LoadQueue(category) => self.load(category),
                Action::Play(clip) => {
                    if let Err(e) = self.output.play(&clip) {
                        queue.extend(self.scheduler.advance(Input::ClipErrored {
                            audio_id: clip.id,
                            message: e.to_string(),
                        }));
                    }
                }
                Action::StopAll => self.output.stop(),
                Action::PauseOutput => self.output.pause(),
                Action::ResumeOutput => self.output.resume(),
                Action::ScheduleGap { delay, generation } => {
                    self.timers
                        .schedule(delay, TimerEvent::GapElapsed { generation });
                }
                Action::ScheduleAutoReset { delay, epoch } => {
                    info!("Session ends, reset in {} ms", delay.as_millis());
                    self.timers
                        .schedule(delay, TimerEvent::AutoResetElapsed { epoch });
                }
                Action::CancelTimers => self.timers.cancel_all(),
                Action::Ambience(Some(lane)) => {
                    let path = self.ambience.for_lane(lane).to_string();
                    if let Err(e) = self.output.start_ambience(lane, &path) {
                        warn!("Ambience {} failed: {}", lane, e);
                    }
                }
                Action::Ambience(None) => self.output.stop_ambience(),
                Action::Emit(event) => self.emit(event, false),
                Action::Report(message) => warn!("{}", message),
            }
        }
    }

    /// Send to the server; followers stay silent unless `always` is set
    fn emit(&self, event: BusEvent, always: bool) {
        if !always && !self.is_master() {
            debug!("Follower suppressing {}", event.event_type());
            return;
        }
        let kind = event.event_type();
        if let Err(e) = self.sink.send(event) {
            warn!("Failed to send {}: {}", kind, e);
        }
    }

    fn load(&self, category: ClipCategory) {
        debug!("Loading {} queue", category);
        let source = Arc::clone(&self.source);
        let tx = self.loads_tx.clone();
        tokio::spawn(async move {
            let result = source.list_clips(category).await;
            let _ = tx.send((category, result));
        });
    }
}
