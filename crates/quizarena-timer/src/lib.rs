//! Round timing primitives for QuizArena.
//!
//! A room actor owns all timing for its matches: the per-question
//! countdown, the post-round review pause, and the first-solver grace
//! delay. Both primitives here are designed to sit inside the actor's
//! `tokio::select!` loop and to *pend forever while idle*, so inactive
//! branches never fire:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         remaining = countdown.tick() => { /* broadcast, end round at 0 */ }
//!         token = review.elapsed() => { /* re-check token, advance */ }
//!     }
//! }
//! ```
//!
//! Because the actor is the only task touching them, cancellation is a
//! plain method call — there is no task to abort and no race between
//! cancelling and firing. A delayed advance that has logically expired is
//! defused by the identity token carried through [`Delay`]: the actor
//! compares the token against live state on wake and drops stale fires.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

/// A 1 Hz countdown for one question round.
///
/// After [`start`](Self::start), each [`tick`](Self::tick) resolves once
/// per second with the seconds remaining, starting with the full duration
/// immediately (clients render the initial value without waiting a
/// second). After the tick that returns `0`, the countdown deactivates
/// itself and `tick` pends until the next `start`.
///
/// [`truncate`](Self::truncate) implements the adaptive-timer rule:
/// replace the running countdown with a shorter one, re-announcing from
/// the new value.
#[derive(Debug, Default)]
pub struct Countdown {
    /// Seconds the *next* tick will report. `None` while idle.
    remaining: Option<u64>,
    /// When the next tick fires.
    deadline: Option<Instant>,
}

impl Countdown {
    /// Creates an idle countdown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the countdown at `secs`. The first tick
    /// fires immediately.
    pub fn start(&mut self, secs: u64) {
        self.remaining = Some(secs);
        self.deadline = Some(Instant::now());
        trace!(secs, "countdown started");
    }

    /// Replaces the running countdown with a shorter window. No-op while
    /// idle. Zero is clamped to one second so clients always see at
    /// least one tick before the round ends.
    pub fn truncate(&mut self, secs: u64) {
        if self.is_running() {
            self.start(secs.max(1));
        }
    }

    /// Stops the countdown. Idempotent.
    pub fn cancel(&mut self) {
        self.remaining = None;
        self.deadline = None;
    }

    /// Whether a countdown is active.
    pub fn is_running(&self) -> bool {
        self.remaining.is_some()
    }

    /// Seconds the next tick will report, if running.
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    /// Waits for the next tick and returns the seconds remaining.
    ///
    /// Pends forever while idle — safe as a `select!` branch. The tick
    /// that returns `0` is the round's end; the countdown deactivates
    /// before returning it.
    pub async fn tick(&mut self) -> u64 {
        let (deadline, remaining) = match (self.deadline, self.remaining) {
            (Some(d), Some(r)) => (d, r),
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(deadline).await;

        if remaining == 0 {
            self.cancel();
        } else {
            self.deadline = Some(deadline + Duration::from_secs(1));
            self.remaining = Some(remaining - 1);
        }
        trace!(remaining, "countdown tick");
        remaining
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// A single-shot cancellable delay carrying an identity token.
///
/// Used for the fixed review pause and the first-solver grace period.
/// The token is the round/challenge identity at scheduling time; when the
/// delay fires, the actor compares it against live state before acting,
/// because the state may have already advanced (e.g. both players
/// finished during the grace period).
///
/// Scheduling while a delay is pending replaces it — the previous delay
/// never fires.
#[derive(Debug)]
pub struct Delay<T> {
    pending: Option<(Instant, T)>,
}

impl<T> Default for Delay<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T: Copy> Delay<T> {
    /// Creates an idle delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the delay to fire after `after`, carrying `token`.
    pub fn schedule(&mut self, after: Duration, token: T) {
        self.pending = Some((Instant::now() + after, token));
    }

    /// Disarms the delay. Idempotent.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Whether a delay is armed.
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Waits for the armed delay and returns its token. Pends forever
    /// while idle. The delay disarms before returning.
    pub async fn elapsed(&mut self) -> T {
        let (deadline, token) = match self.pending {
            Some(p) => p,
            None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(deadline).await;
        self.pending = None;
        token
    }
}
