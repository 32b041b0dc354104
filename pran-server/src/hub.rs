//! Room hub
//!
//! Owns the authoritative session record. Every bus event and admin request
//! funnels through here; accepted mutations are persisted, then broadcast as
//! the relayed event, `phase_changed` when the phase moved, and a fresh
//! `session_state`.

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pran_common::db::{catalog, session};
use pran_common::{BusEvent, EventBus, Phase, SessionSnapshot, ROOM_KEY};

use crate::error::{Error, Result};
use crate::state_machine::{self, Outcome, Trigger};

pub struct Hub {
    db: SqlitePool,
    bus: EventBus,
    session: RwLock<SessionSnapshot>,
}

impl Hub {
    /// Restore the persisted session, or start a fresh one
    pub async fn restore(db: SqlitePool, bus: EventBus) -> Result<Self> {
        let restored = session::load_session(&db, ROOM_KEY).await?;
        info!(
            "Session restored: phase={}, category={:?}, pran={:?}",
            restored.current_phase, restored.category, restored.pran
        );

        Ok(Self {
            db,
            bus,
            session: RwLock::new(restored),
        })
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.read().await.clone()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Handle an event received from a bus connection
    ///
    /// Returns a reply meant for the sender only (`get_session`).
    pub async fn handle_event(&self, origin: Uuid, event: BusEvent) -> Result<Option<BusEvent>> {
        debug!("Bus event from {}: {}", origin, event.event_type());

        match event {
            BusEvent::GetSession => Ok(Some(BusEvent::SessionState(self.snapshot().await))),

            BusEvent::AgeSelected { age_group } => {
                self.transition(Some(origin), event, Trigger::AgeSelected(age_group), false)
                    .await
            }

            BusEvent::MoodSelected { mood, .. } => {
                let relayed = BusEvent::MoodSelected {
                    mood,
                    category: Some(mood.category()),
                };
                self.transition(Some(origin), relayed, Trigger::MoodSelected(mood), false)
                    .await
            }

            BusEvent::PranSelected { pran_id } => {
                let pran = catalog::get_pran(&self.db, pran_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("pran {}", pran_id)))?;
                self.transition(Some(origin), event, Trigger::PranSelected(pran), false)
                    .await
            }

            BusEvent::AudioPlay { ref audio_path, .. } => {
                let trigger = Trigger::AudioPlay {
                    audio_path: audio_path.clone(),
                };
                self.transition(Some(origin), event, trigger, true).await
            }

            BusEvent::AudioStop { .. } => {
                self.transition(Some(origin), event, Trigger::AudioStop, true)
                    .await
            }

            BusEvent::CueTrigger { cue_point, .. } => {
                self.transition(Some(origin), event, Trigger::Cue(cue_point), true)
                    .await
            }

            BusEvent::SessionReset => {
                self.transition(Some(origin), event, Trigger::Reset, false)
                    .await
            }

            BusEvent::ForcePhase { phase } => {
                self.force_phase(phase).await?;
                Ok(None)
            }

            BusEvent::AudioPause
            | BusEvent::AudioResume
            | BusEvent::AudioError { .. }
            | BusEvent::ClipRequested { .. }
            | BusEvent::Election { .. } => {
                self.bus.emit_from(origin, event);
                Ok(None)
            }

            BusEvent::PhaseChanged { .. }
            | BusEvent::SessionState(_)
            | BusEvent::ConnectionStatus { .. } => {
                warn!(
                    "Ignoring server-owned event {} from {}",
                    event.event_type(),
                    origin
                );
                Ok(None)
            }
        }
    }

    /// Admin phase override
    pub async fn force_phase(&self, phase: Phase) -> Result<SessionSnapshot> {
        let relayed = if phase == Phase::Init {
            BusEvent::SessionReset
        } else {
            BusEvent::ForcePhase { phase }
        };

        self.transition(None, relayed, Trigger::Force(phase), false)
            .await?;
        info!("Admin forced phase {}", phase);
        Ok(self.snapshot().await)
    }

    /// Admin session reset
    pub async fn reset(&self) -> Result<SessionSnapshot> {
        self.transition(None, BusEvent::SessionReset, Trigger::Reset, false)
            .await?;
        Ok(self.snapshot().await)
    }

    /// Broadcast a server-originated playback command
    pub fn broadcast(&self, event: BusEvent) {
        debug!("Server broadcast: {}", event.event_type());
        self.bus.emit_lossy(event);
    }

    /// Apply a trigger and broadcast the result
    ///
    /// `always_relay` relays the event even when the session did not change;
    /// playback and cue events carry meaning for other devices regardless.
    async fn transition(
        &self,
        origin: Option<Uuid>,
        relayed: BusEvent,
        trigger: Trigger,
        always_relay: bool,
    ) -> Result<Option<BusEvent>> {
        let mut current = self.session.write().await;

        let (next, phase_changed) = match state_machine::apply(&current, trigger)? {
            Outcome::Unchanged => {
                if always_relay {
                    self.relay(origin, relayed);
                } else {
                    debug!("{} left the session unchanged", relayed.event_type());
                }
                return Ok(None);
            }
            Outcome::Updated {
                session,
                phase_changed,
            } => (session, phase_changed),
        };

        session::save_session(&self.db, ROOM_KEY, &next).await?;
        *current = next.clone();

        if phase_changed {
            info!("Phase -> {}", next.current_phase);
        }

        self.relay(origin, relayed);
        if phase_changed {
            self.bus.emit_lossy(BusEvent::PhaseChanged {
                phase: next.current_phase,
            });
        }
        self.bus.emit_lossy(BusEvent::SessionState(next));

        Ok(None)
    }

    fn relay(&self, origin: Option<Uuid>, event: BusEvent) {
        match origin {
            Some(id) => self.bus.emit_from(id, event),
            None => self.bus.emit_lossy(event),
        }
    }
}
