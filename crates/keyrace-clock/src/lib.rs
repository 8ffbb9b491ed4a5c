//! Timers for Keyrace room actors.
//!
//! A race room is event-driven: nothing happens between player commands
//! except two kinds of deadline.
//!
//! - [`RoundTimer`]: the authoritative end of the current round. Armed
//!   when a round starts, cancelled when everyone finishes early or the
//!   round is abandoned.
//! - [`DeadlineQueue`]: per-player reconnect grace deadlines. A dropped
//!   player's slot is held until their deadline passes.
//!
//! # Integration
//!
//! Both are built to sit inside a room actor's `tokio::select!` loop. When
//! nothing is scheduled their futures pend forever, so `select!` simply
//! keeps serving the other branches:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         cmd = cmd_rx.recv() => { /* handle commands */ }
//!         _ = timer.expired() => { /* finish the round: time up */ }
//!         player = grace.next_expired() => { /* drop the held slot */ }
//!     }
//! }
//! ```
//!
//! Both futures are cancel-safe: state is only touched after the sleep
//! completes, so losing a `select!` race leaves everything scheduled.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Wall-clock milliseconds since the Unix epoch, as clients see it.
///
/// Only used to stamp outgoing events; deadlines run on [`Instant`].
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// RoundTimer
// ---------------------------------------------------------------------------

/// A single cancellable countdown.
#[derive(Debug, Default)]
pub struct RoundTimer {
    armed: Option<Armed>,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    started: Instant,
    deadline: Instant,
    length: Duration,
}

impl RoundTimer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the countdown. Returns the deadline.
    pub fn arm(&mut self, length: Duration) -> Instant {
        let started = Instant::now();
        let deadline = started + length;
        self.armed = Some(Armed {
            started,
            deadline,
            length,
        });
        debug!(length_ms = length.as_millis() as u64, "round timer armed");
        deadline
    }

    /// Stops the countdown. Returns `true` if it was running.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.armed.take().is_some();
        if was_armed {
            debug!("round timer cancelled");
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Time left before the deadline, or `None` when disarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .map(|a| a.deadline.saturating_duration_since(Instant::now()))
    }

    /// Time since the timer was armed, or `None` when disarmed.
    pub fn elapsed(&self) -> Option<Duration> {
        self.armed.map(|a| a.started.elapsed())
    }

    /// Resolves when the deadline passes, then disarms the timer.
    ///
    /// Returns the length the timer was armed with. Pends forever while
    /// disarmed.
    pub async fn expired(&mut self) -> Duration {
        let Some(armed) = self.armed else {
            return std::future::pending().await;
        };

        time::sleep_until(armed.deadline).await;

        let late_by = Instant::now().saturating_duration_since(armed.deadline);
        trace!(late_us = late_by.as_micros() as u64, "round timer fired");
        self.armed = None;
        armed.length
    }
}

// ---------------------------------------------------------------------------
// DeadlineQueue
// ---------------------------------------------------------------------------

/// A set of keyed deadlines; [`next_expired`](Self::next_expired) yields
/// keys in deadline order.
///
/// Scheduling a key that is already present replaces its deadline. Keys
/// with equal deadlines come out in key order.
#[derive(Debug)]
pub struct DeadlineQueue<K> {
    deadlines: HashMap<K, Instant>,
}

impl<K> Default for DeadlineQueue<K> {
    fn default() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }
}

impl<K> DeadlineQueue<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` to expire after `after`. Returns the deadline.
    pub fn schedule(&mut self, key: K, after: Duration) -> Instant {
        let deadline = Instant::now() + after;
        self.deadlines.insert(key, deadline);
        deadline
    }

    /// Removes `key`. Returns `true` if it was scheduled.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.deadlines.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Drops every deadline.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    /// Resolves with the earliest key once its deadline passes, removing
    /// it from the queue. Pends forever while empty.
    pub async fn next_expired(&mut self) -> K {
        let Some((key, deadline)) = self
            .deadlines
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(k, d)| (k.clone(), *d))
        else {
            return std::future::pending().await;
        };

        time::sleep_until(deadline).await;

        self.deadlines.remove(&key);
        key
    }
}
