//! Iteration scheduler.
//!
//! # Data Flow
//! ```text
//! iterate(wait):
//!     yield → run due timers → poll listeners + connections
//!         ↓ (wait && nothing happened)
//!     block until timer deadline | socket readiness | max_wait
//!         ↓
//!     run due timers → poll listeners + connections → next deadline
//! ```
//!
//! # Design Decisions
//! - One pass never blocks longer than `max_wait`, so a cleared running
//!   flag is observed within that bound
//! - Every call yields to the runtime once so the signal task and the I/O
//!   driver make progress on a current-thread runtime

pub mod timer;

use std::time::Duration;

use tokio::time::Instant;

use crate::address_space::AddressSpace;
use crate::net::listener::ListenerError;
use crate::net::{IoActivity, Transport};
use crate::observability::metrics;

pub use timer::{TimerCallback, TimerId, TimerQueue};

/// Outcome of one scheduler pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IterationResult {
    /// Timer callbacks run during the pass.
    pub timers_fired: usize,
    /// Connections accepted, closed and messages handled.
    pub io: IoActivity,
    /// Whether the pass blocked waiting for work.
    pub waited: bool,
    /// Time until the earliest pending timer, if any.
    pub next_deadline: Option<Duration>,
}

impl IterationResult {
    /// No timer fired and no socket did anything.
    pub fn is_idle(&self) -> bool {
        self.timers_fired == 0 && self.io.is_idle()
    }
}

/// Timers plus the bounded wait policy.
pub struct Scheduler {
    timers: TimerQueue,
    max_wait: Duration,
}

impl Scheduler {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            timers: TimerQueue::new(),
            max_wait,
        }
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// How long a blocking pass may sleep from `now`.
    pub fn wait_timeout(&mut self, now: Instant) -> Duration {
        match self.timers.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(self.max_wait),
            None => self.max_wait,
        }
    }

    /// Run one pass over timers and sockets.
    ///
    /// A listener failure aborts the pass; timers already fired stay fired
    /// and the scheduler remains usable.
    pub async fn iterate(
        &mut self,
        transport: &mut Transport,
        space: &mut AddressSpace,
        wait: bool,
    ) -> Result<IterationResult, ListenerError> {
        let mut result = IterationResult::default();

        tokio::task::yield_now().await;
        self.service(transport, space, &mut result)?;

        if wait && result.is_idle() {
            let timeout = self.wait_timeout(Instant::now());
            if !timeout.is_zero() {
                result.waited = true;
                let woke = transport.wait(timeout).await?;
                result.io.merge(woke);
            }
            self.service(transport, space, &mut result)?;
        }

        result.next_deadline = self
            .timers
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));

        metrics::record_iteration();
        if result.timers_fired > 0 {
            metrics::record_timers_fired(result.timers_fired);
        }
        Ok(result)
    }

    fn service(
        &mut self,
        transport: &mut Transport,
        space: &mut AddressSpace,
        result: &mut IterationResult,
    ) -> Result<(), ListenerError> {
        result.timers_fired += self.timers.run_due(Instant::now(), space);
        let activity = transport.poll()?;
        result.io.merge(activity);
        Ok(())
    }
}
