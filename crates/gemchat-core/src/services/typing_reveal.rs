use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

/// Interval between revealed characters
pub const DEFAULT_REVEAL_TICK: Duration = Duration::from_millis(20);

/// Cancellation token shared between the controller and a running reveal.
/// Clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel is not missed
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How a reveal ended
#[derive(Debug, Clone, PartialEq)]
pub enum RevealOutcome {
    /// Every character was shown; carries the full text
    Completed(String),
    /// Stopped early; the partial buffer has been discarded
    Cancelled,
}

/// Disclose `text` one character per `tick`, reporting the growing prefix
/// through `on_progress`. The first character appears after one tick.
pub async fn reveal(
    text: &str,
    tick: Duration,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(&str),
) -> RevealOutcome {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately
    interval.tick().await;

    let mut revealed = String::with_capacity(text.len());

    for ch in text.chars() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return RevealOutcome::Cancelled,
            _ = interval.tick() => {}
        }

        revealed.push(ch);
        on_progress(&revealed);
    }

    if cancel.is_cancelled() {
        RevealOutcome::Cancelled
    } else {
        RevealOutcome::Completed(revealed)
    }
}
