use std::time::{Duration, Instant};

/// Trailing-edge coalescing of navigation input.
///
/// The first input after a quiet period opens a window of `interval`; inputs
/// offered while the window is open replace the pending one. When the window
/// closes the latest input is released, so at most one input runs per interval
/// and earlier ones are dropped rather than queued. A zero interval releases
/// every input immediately.
#[derive(Debug)]
pub struct Coalescer<T> {
    interval: Duration,
    pending: Option<T>,
    opened_at: Option<Instant>,
    dropped: u64,
}

impl<T> Coalescer<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
            opened_at: None,
            dropped: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn offer(&mut self, input: T, now: Instant) {
        if self.pending.replace(input).is_some() {
            self.dropped += 1;
        } else {
            self.opened_at = Some(now);
        }
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// When the pending input becomes due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        self.opened_at.map(|opened| opened + self.interval)
    }

    /// Releases the pending input once its window has closed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        self.opened_at = None;
        self.pending.take()
    }

    pub fn clear(&mut self) {
        self.pending = None;
        self.opened_at = None;
    }

    /// Inputs superseded before they ran.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
