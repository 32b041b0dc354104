//! One-shot timers for gaps and the auto-reset
//!
//! Each armed timer is a sleeping task that reports back on an mpsc channel.
//! Firing is idempotent on the scheduler side (generation and epoch tokens), so
//! cancelling only saves wakeups; a timer that slips through is ignored.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    GapElapsed { generation: u64 },
    AutoResetElapsed { epoch: u64 },
}

pub struct Timers {
    tx: mpsc::UnboundedSender<TimerEvent>,
    armed: Vec<JoinHandle<()>>,
}

impl Timers {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                armed: Vec::new(),
            },
            rx,
        )
    }

    pub fn schedule(&mut self, delay: Duration, event: TimerEvent) {
        self.armed.retain(|handle| !handle.is_finished());

        let tx = self.tx.clone();
        self.armed.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        }));
    }

    pub fn cancel_all(&mut self) {
        for handle in self.armed.drain(..) {
            handle.abort();
        }
    }

    pub fn armed(&self) -> usize {
        self.armed.iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (mut timers, mut rx) = Timers::new();
        timers.schedule(
            Duration::from_millis(600),
            TimerEvent::GapElapsed { generation: 3 },
        );

        tokio::time::sleep(Duration::from_millis(599)).await;
        assert!(rx.try_recv().is_err());

        assert_eq!(
            rx.recv().await,
            Some(TimerEvent::GapElapsed { generation: 3 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_silences_timers() {
        let (mut timers, mut rx) = Timers::new();
        timers.schedule(Duration::from_millis(100), TimerEvent::AutoResetElapsed { epoch: 1 });
        timers.schedule(Duration::from_millis(200), TimerEvent::GapElapsed { generation: 1 });
        timers.cancel_all();
        assert_eq!(timers.armed(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
