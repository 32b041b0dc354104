//! Master-election protocol for audio authority
//!
//! Several tabs (processes or runtimes) may render the same session, but only one
//! of them may produce sound. Each tab owns a random id; a shared [`ClaimSlot`]
//! holds the current master id and a [`SiblingChannel`] carries claim, ping and
//! alive messages between tabs.
//!
//! The protocol is eventually consistent. Two tabs may briefly both believe they
//! are master (or neither). Every claim carries a stamp that orders it against
//! all claims this tab has heard of, and a master re-announces its claim on
//! every watchdog tick, so a claim posted while the channel was down still
//! reaches its siblings. Of two masters the one with the newer claim survives
//! within one ping timeout.

mod channel;
mod slot;

pub use channel::{LocalChannel, SiblingChannel};
pub use slot::{ClaimSlot, FileSlot, MemorySlot};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::Result;

/// Message exchanged between sibling tabs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ElectionMessage {
    /// `tab_id` wrote itself into the slot
    ///
    /// Sent on every claim and re-sent periodically while the claim stands.
    MasterClaimed {
        tab_id: Uuid,
        /// Claim stamp; the newer claim wins
        #[serde(default)]
        claimed_at: i64,
    },

    /// `from` asks the incumbent `target` whether it is still alive
    Ping { from: Uuid, target: Uuid },

    /// Reply to a ping
    Alive { tab_id: Uuid },
}

struct Inner {
    tab_id: Uuid,
    slot: Arc<dyn ClaimSlot>,
    channel: Arc<dyn SiblingChannel>,
    ping_timeout: Duration,
    status: watch::Sender<bool>,
    /// Stamp of this tab's current claim
    claimed_at: AtomicI64,
    /// Newest claim stamp seen from any sibling
    newest_seen: AtomicI64,
}

/// Last stamp handed out in this process
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Wall-clock microseconds, strictly above every stamp issued here or seen
fn next_stamp(seen: i64) -> i64 {
    let now = chrono::Utc::now().timestamp_micros();
    let mut previous = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let stamp = now.max(previous + 1).max(seen + 1);
        match LAST_STAMP.compare_exchange_weak(
            previous,
            stamp,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return stamp,
            Err(actual) => previous = actual,
        }
    }
}

impl Inner {
    fn is_master(&self) -> bool {
        *self.status.borrow()
    }

    fn set_master(&self, master: bool) {
        let flipped = self.status.send_if_modified(|current| {
            if *current == master {
                false
            } else {
                *current = master;
                true
            }
        });

        if flipped {
            if master {
                info!("Tab {} is now audio master", self.tab_id);
            } else {
                info!("Tab {} is no longer audio master", self.tab_id);
            }
        }
    }

    fn take(&self) -> Result<()> {
        let stamp = next_stamp(self.newest_seen.load(Ordering::Acquire));
        self.slot.write(self.tab_id)?;
        self.claimed_at.store(stamp, Ordering::Release);
        self.set_master(true);
        self.announce();
        Ok(())
    }

    fn announce(&self) {
        self.channel.post(ElectionMessage::MasterClaimed {
            tab_id: self.tab_id,
            claimed_at: self.claimed_at.load(Ordering::Acquire),
        });
    }

    fn handle(&self, message: ElectionMessage) {
        match message {
            ElectionMessage::MasterClaimed { tab_id, claimed_at } if tab_id != self.tab_id => {
                self.newest_seen.fetch_max(claimed_at, Ordering::AcqRel);
                if !self.is_master() {
                    return;
                }

                let ours = self.claimed_at.load(Ordering::Acquire);
                if (claimed_at, tab_id) > (ours, self.tab_id) {
                    debug!("Tab {} claimed master, demoting {}", tab_id, self.tab_id);
                    self.set_master(false);
                } else {
                    debug!("Older claim from {}, re-announcing {}", tab_id, self.tab_id);
                    self.announce();
                }
            }
            ElectionMessage::Ping { from, target } if target == self.tab_id => {
                debug!("Ping from {}, answering alive", from);
                self.channel.post(ElectionMessage::Alive {
                    tab_id: self.tab_id,
                });
            }
            _ => {}
        }
    }

    /// Demote when the slot names another tab; re-assert when it went empty
    fn check_slot(&self) {
        if !self.is_master() {
            return;
        }

        match self.slot.read() {
            Ok(Some(holder)) if holder != self.tab_id => {
                debug!("Slot now held by {}, demoting {}", holder, self.tab_id);
                self.set_master(false);
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(e) = self.slot.write(self.tab_id) {
                    warn!("Failed to re-assert master slot: {}", e);
                }
            }
            Err(e) => warn!("Failed to read master slot: {}", e),
        }
    }
}

/// Local election state of one tab
///
/// Must be created inside a tokio runtime: it spawns a listener for sibling
/// messages and a slot watchdog. Dropping it stops both and releases the slot
/// when this tab holds it.
pub struct MasterElection {
    inner: Arc<Inner>,
    tasks: Vec<JoinHandle<()>>,
}

impl MasterElection {
    pub fn start(
        slot: Arc<dyn ClaimSlot>,
        channel: Arc<dyn SiblingChannel>,
        ping_timeout: Duration,
    ) -> Self {
        Self::with_tab_id(Uuid::new_v4(), slot, channel, ping_timeout)
    }

    pub fn with_tab_id(
        tab_id: Uuid,
        slot: Arc<dyn ClaimSlot>,
        channel: Arc<dyn SiblingChannel>,
        ping_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            tab_id,
            slot,
            channel,
            ping_timeout,
            status,
            claimed_at: AtomicI64::new(0),
            newest_seen: AtomicI64::new(0),
        });

        let mut messages = inner.channel.subscribe();
        let listener = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                loop {
                    match messages.recv().await {
                        Ok(message) => inner.handle(message),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Election listener lagged, skipped {} messages", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        let watchdog = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let period = inner.ping_timeout;
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    inner.check_slot();
                    if inner.is_master() {
                        inner.announce();
                    }
                }
            })
        };

        debug!("Election started for tab {}", tab_id);
        Self {
            inner,
            tasks: vec![listener, watchdog],
        }
    }

    pub fn tab_id(&self) -> Uuid {
        self.inner.tab_id
    }

    /// Whether this tab may produce audible sound
    pub fn is_master(&self) -> bool {
        self.inner.is_master()
    }

    /// Claim mastership unless a live incumbent answers the ping
    ///
    /// Returns whether this tab ended up master.
    pub async fn claim(&self) -> Result<bool> {
        let incumbent = match self.inner.slot.read()? {
            None => None,
            Some(id) if id == self.inner.tab_id => None,
            Some(id) => Some(id),
        };

        let Some(incumbent) = incumbent else {
            self.inner.take()?;
            return Ok(true);
        };

        let mut replies = self.inner.channel.subscribe();
        self.inner.channel.post(ElectionMessage::Ping {
            from: self.inner.tab_id,
            target: incumbent,
        });

        let alive = tokio::time::timeout(self.inner.ping_timeout, async {
            loop {
                match replies.recv().await {
                    Ok(ElectionMessage::Alive { tab_id }) if tab_id == incumbent => return true,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        })
        .await
        .unwrap_or(false);

        if alive {
            debug!("Incumbent {} is alive, deferring", incumbent);
            self.inner.set_master(false);
            Ok(false)
        } else {
            info!("Incumbent {} did not answer, claiming", incumbent);
            self.inner.take()?;
            Ok(true)
        }
    }

    /// Claim mastership regardless of the current holder
    pub fn force_claim(&self) -> Result<()> {
        self.inner.take()
    }

    /// Give up mastership and clear the slot if it still names this tab
    pub fn release(&self) -> Result<()> {
        self.inner.set_master(false);
        self.inner.slot.clear_if(self.inner.tab_id)
    }

    /// Watch receiver over the local master flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.status.subscribe()
    }

    /// Invoke `callback` whenever the local master flag flips
    ///
    /// The callback stops when the returned [`Subscription`] is dropped.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + 'static,
    {
        let mut rx = self.inner.status.subscribe();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let master = *rx.borrow_and_update();
                callback(master);
            }
        });
        Subscription { handle }
    }
}

impl Drop for MasterElection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        if self.inner.is_master() {
            if let Err(e) = self.inner.slot.clear_if(self.inner.tab_id) {
                warn!("Failed to release master slot on shutdown: {}", e);
            }
        }
    }
}

/// Handle returned by [`MasterElection::on_change`]; unsubscribes on drop
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
