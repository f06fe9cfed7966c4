//! Working/idle classification for sessions.
//!
//! Output is the only activity signal. A session counts as working while its
//! status is `Working` and its last output is younger than the idle threshold.
//! Nothing here runs a timer: staleness is computed on read against an
//! injected [`Clock`], and the presentation layer decides when to re-read via
//! an [`ActivityPoller`] it owns.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::sessions::{Session, SessionStatus};

/// Output older than this means the session went quiet.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_millis(2000);

/// How often the presentation layer re-evaluates [`is_working`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

// ═══════════════════════════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════════════════════════

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.lock();
        *now += step;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Classifier
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether `session` is actively producing output as of `now`.
///
/// Absent and stopped sessions are never working.
pub fn is_working(session: Option<&Session>, now: DateTime<Utc>, idle_threshold: Duration) -> bool {
    let Some(session) = session else {
        return false;
    };
    if session.status != SessionStatus::Working {
        return false;
    }

    let elapsed = now.signed_duration_since(session.last_activity_at);
    let threshold = i64::try_from(idle_threshold.as_millis()).unwrap_or(i64::MAX);
    elapsed.num_milliseconds() < threshold
}

/// Cancellable polling schedule owned by one UI scope.
///
/// Dropping the poller (or calling [`cancel`](Self::cancel)) ends the
/// schedule; a cancelled poller never reports due again.
#[derive(Debug, Clone)]
pub struct ActivityPoller {
    interval: Duration,
    next_due: DateTime<Utc>,
    cancelled: bool,
}

impl ActivityPoller {
    /// First tick is due one interval after `now`.
    pub fn new(interval: Duration, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            next_due: now + to_chrono(interval),
            cancelled: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True when a re-evaluation is due at `now`; schedules the next tick.
    pub fn due(&mut self, now: DateTime<Utc>) -> bool {
        if self.cancelled || now < self.next_due {
            return false;
        }
        self.next_due = now + to_chrono(self.interval);
        true
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
