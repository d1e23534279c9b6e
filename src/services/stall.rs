use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

/// Dead-man's switch for transfers: fires if it is not reset within `bound`.
///
/// Meant to be polled from a `tokio::select!` loop alongside the work it
/// guards; call [`StallTimer::reset`] on every observed progress event.
pub struct StallTimer {
    bound: Option<Duration>,
    sleep: Pin<Box<Sleep>>,
}

impl StallTimer {
    /// A `None` bound yields a timer that never fires.
    pub fn new(bound: Option<Duration>) -> Self {
        let deadline = bound.map_or_else(far_future, |b| Instant::now() + b);
        Self {
            bound,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
        }
    }

    pub fn reset(&mut self) {
        if let Some(bound) = self.bound {
            self.sleep.as_mut().reset(Instant::now() + bound);
        }
    }

    pub fn bound(&self) -> Option<Duration> {
        self.bound
    }

    /// Resolves once the bound elapses without a reset.
    pub async fn expired(&mut self) {
        if self.bound.is_none() {
            return pending().await;
        }
        self.sleep.as_mut().await;
    }
}

// Roughly 30 years; keeps the Sleep valid without ever firing.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}
