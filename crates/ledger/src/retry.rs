use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};

const MIN_DELAY: Duration = Duration::from_millis(5);
const MAX_DELAY: Duration = Duration::from_millis(500);

/// Jittered exponential pause between replays of a conflicted transaction,
/// bounded by a total time window.
pub(crate) struct Backoff {
    deadline: Instant,
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new(window: Duration) -> Backoff {
        Backoff {
            deadline: Instant::now() + window,
            delay: MIN_DELAY,
        }
    }

    /// Sleeps before the next attempt. `false` once the window is spent.
    pub(crate) async fn wait(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let half = self.delay / 2;
        let jitter = half.mul_f64(f64::from(Utc::now().timestamp_subsec_micros() % 1000) / 1000.0);
        sleep((half + jitter).min(self.deadline - now)).await;
        self.delay = (self.delay * 2).min(MAX_DELAY);
        true
    }
}
