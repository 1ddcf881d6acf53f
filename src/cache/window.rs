use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::clock::Clock;

struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Fixed-window submission counter per `(client ip, form id)`. Process-local
/// by design: this is basic spam throttling, not a hard security boundary.
pub struct SubmissionThrottle {
    windows: Mutex<HashMap<(String, String), Window>>,
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl SubmissionThrottle {
    pub fn new(limit: u32, window_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit,
            window: Duration::seconds(window_secs),
            clock,
        }
    }

    /// Record one submission attempt. Returns `false` once the per-window
    /// cap is exceeded; the counter resets when the window rolls over.
    pub fn allow(&self, client_ip: &str, form_id: &str) -> bool {
        let now = self.clock.now();
        let mut windows = self.windows.lock().expect("throttle poisoned");
        let entry = windows
            .entry((client_ip.to_string(), form_id.to_string()))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });
        if now - entry.started_at >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count <= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;

    #[test]
    fn eleventh_submission_in_window_is_rejected() {
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let throttle = SubmissionThrottle::new(10, 60, clock.clone());

        for _ in 0..10 {
            assert!(throttle.allow("10.0.0.1", "form-1"));
        }
        assert!(!throttle.allow("10.0.0.1", "form-1"));

        // Other keys are unaffected.
        assert!(throttle.allow("10.0.0.2", "form-1"));
        assert!(throttle.allow("10.0.0.1", "form-2"));

        // First submission of the next window succeeds again.
        clock.advance(Duration::seconds(60));
        assert!(throttle.allow("10.0.0.1", "form-1"));
    }
}
