//! Timer queue.
//!
//! # Ordering
//! Due callbacks fire in deadline order, ties broken by registration order
//! (the timer id is allocated from a monotonic counter).
//!
//! # Design Decisions
//! - Binary heap with lazy deletion: removing or re-arming a timer bumps its
//!   generation and stale heap entries are skipped on pop
//! - The heap is rebuilt from the live timers once stale entries outnumber
//!   them, so it never holds more than twice the registered timers
//! - A repeated timer is re-armed after the due batch, so it fires at most
//!   once per `run_due` call
//! - Missed periods are not replayed: the next deadline is
//!   `previous + interval`, or `now + interval` if that already passed

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::time::Instant;

use crate::address_space::AddressSpace;

/// Callback run when a timer is due.
pub type TimerCallback = Box<dyn FnMut(&mut AddressSpace) + Send>;

/// Handle returned on timer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

struct Timer {
    callback: TimerCallback,
    interval: Option<Duration>,
    deadline: Instant,
    generation: u64,
}

/// Registered timers ordered by deadline.
pub struct TimerQueue {
    timers: HashMap<TimerId, Timer>,
    heap: BinaryHeap<Reverse<(Instant, TimerId, u64)>>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
            heap: BinaryHeap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// One-shot timer due at `deadline`.
    pub fn add_timed(&mut self, deadline: Instant, callback: TimerCallback) -> TimerId {
        self.add(deadline, None, callback)
    }

    /// Repeating timer, first due one `interval` after `now`.
    pub fn add_repeated(&mut self, now: Instant, interval: Duration, callback: TimerCallback) -> TimerId {
        self.add(now + interval, Some(interval), callback)
    }

    fn add(&mut self, deadline: Instant, interval: Option<Duration>, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(
            id,
            Timer {
                callback,
                interval,
                deadline,
                generation: 0,
            },
        );
        self.heap.push(Reverse((deadline, id, 0)));
        id
    }

    /// Change the period of a repeated timer; the next deadline becomes
    /// `now + interval`. Returns false for unknown or one-shot timers.
    pub fn change_interval(&mut self, id: TimerId, now: Instant, interval: Duration) -> bool {
        let Some(timer) = self.timers.get_mut(&id) else {
            return false;
        };
        if timer.interval.is_none() {
            return false;
        }
        timer.interval = Some(interval);
        Self::arm(&mut self.heap, id, timer, now + interval);
        self.compact();
        true
    }

    /// Current deadline of a registered timer.
    pub fn deadline(&self, id: TimerId) -> Option<Instant> {
        self.timers.get(&id).map(|timer| timer.deadline)
    }

    /// Remove a timer. Returns false if it was unknown (or a one-shot that already fired).
    pub fn remove(&mut self, id: TimerId) -> bool {
        let removed = self.timers.remove(&id).is_some();
        if removed {
            self.compact();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.heap.clear();
    }

    fn arm(heap: &mut BinaryHeap<Reverse<(Instant, TimerId, u64)>>, id: TimerId, timer: &mut Timer, deadline: Instant) {
        timer.generation += 1;
        timer.deadline = deadline;
        heap.push(Reverse((deadline, id, timer.generation)));
    }

    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.timers.len() {
            return;
        }
        self.heap = self
            .timers
            .iter()
            .map(|(id, timer)| Reverse((timer.deadline, *id, timer.generation)))
            .collect();
    }

    fn is_live(&self, id: TimerId, generation: u64) -> bool {
        self.timers
            .get(&id)
            .is_some_and(|timer| timer.generation == generation)
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse((_, id, generation))) = self.heap.peek().copied() {
            if self.is_live(id, generation) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.drop_stale();
        self.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Run every callback due at `now`. Returns the number fired.
    pub fn run_due(&mut self, now: Instant, space: &mut AddressSpace) -> usize {
        let mut fired = 0;
        let mut rearm = Vec::new();

        loop {
            self.drop_stale();
            let Some(Reverse((deadline, id, _))) = self.heap.peek().copied() else {
                break;
            };
            if deadline > now {
                break;
            }
            self.heap.pop();

            let Some(timer) = self.timers.get_mut(&id) else {
                continue;
            };
            (timer.callback)(space);
            let interval = timer.interval;
            fired += 1;
            tracing::trace!(timer_id = %id, "Timer fired");

            match interval {
                Some(interval) => {
                    let mut next = deadline + interval;
                    if next <= now {
                        next = now + interval;
                    }
                    rearm.push((id, next));
                }
                None => {
                    self.timers.remove(&id);
                }
            }
        }

        for (id, next) in rearm {
            if let Some(timer) = self.timers.get_mut(&id) {
                Self::arm(&mut self.heap, id, timer, next);
            }
        }
        fired
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> TimerCallback {
        let log = Arc::clone(log);
        Box::new(move |_: &mut AddressSpace| log.lock().unwrap().push(name))
    }

    #[test]
    fn fires_in_deadline_then_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut space = AddressSpace::new("urn:test");
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();

        queue.add_timed(t0 + Duration::from_millis(30), recorder(&log, "c"));
        queue.add_timed(t0 + Duration::from_millis(10), recorder(&log, "a"));
        queue.add_timed(t0 + Duration::from_millis(20), recorder(&log, "b1"));
        queue.add_timed(t0 + Duration::from_millis(20), recorder(&log, "b2"));

        assert_eq!(queue.run_due(t0 + Duration::from_millis(25), &mut space), 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b1", "b2"]);
        assert_eq!(queue.next_deadline(), Some(t0 + Duration::from_millis(30)));

        assert_eq!(queue.run_due(t0 + Duration::from_millis(30), &mut space), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn nothing_due_before_deadline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut space = AddressSpace::new("urn:test");
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();

        queue.add_timed(t0 + Duration::from_millis(100), recorder(&log, "late"));
        assert_eq!(queue.run_due(t0 + Duration::from_millis(99), &mut space), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn repeated_timer_fires_once_per_run_and_skips_missed_periods() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut space = AddressSpace::new("urn:test");
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();

        queue.add_repeated(t0, Duration::from_millis(10), recorder(&log, "tick"));

        // Five periods late: one fire, next deadline relative to now.
        let late = t0 + Duration::from_millis(55);
        assert_eq!(queue.run_due(late, &mut space), 1);
        assert_eq!(queue.next_deadline(), Some(late + Duration::from_millis(10)));

        // On time: re-armed from the previous deadline.
        let on_time = late + Duration::from_millis(10);
        assert_eq!(queue.run_due(on_time, &mut space), 1);
        assert_eq!(queue.next_deadline(), Some(on_time + Duration::from_millis(10)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn removed_timer_never_fires() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut space = AddressSpace::new("urn:test");
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();

        let id = queue.add_timed(t0, recorder(&log, "gone"));
        assert!(queue.remove(id));
        assert!(!queue.remove(id));
        assert_eq!(queue.next_deadline(), None);
        assert_eq!(queue.run_due(t0 + Duration::from_secs(1), &mut space), 0);
    }

    #[test]
    fn change_interval_rearms_from_now() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();

        let repeated = queue.add_repeated(t0, Duration::from_secs(10), recorder(&log, "r"));
        let once = queue.add_timed(t0, recorder(&log, "o"));

        let now = t0 + Duration::from_millis(5);
        assert!(queue.change_interval(repeated, now, Duration::from_millis(50)));
        assert!(!queue.change_interval(once, now, Duration::from_millis(50)));
        assert_eq!(queue.deadline(repeated), Some(now + Duration::from_millis(50)));
        queue.remove(once);
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_millis(50)));
    }

    #[test]
    fn callbacks_can_update_the_address_space() {
        use crate::address_space::{Variant, SERVER_CURRENT_TIME};

        let mut space = AddressSpace::new("urn:test");
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();

        queue.add_timed(
            t0,
            Box::new(|space: &mut AddressSpace| {
                space.set_value(&SERVER_CURRENT_TIME, Variant::Int64(42)).unwrap();
            }),
        );
        queue.run_due(t0, &mut space);
        assert_eq!(space.read_value(&SERVER_CURRENT_TIME).unwrap(), &Variant::Int64(42));
    }

    #[test]
    fn heap_stays_bounded_under_add_remove_churn() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();
        let keep = queue.add_timed(t0 + Duration::from_secs(60), recorder(&log, "keep"));

        for _ in 0..100_000 {
            let id = queue.add_timed(t0 + Duration::from_secs(3600), recorder(&log, "churn"));
            assert!(queue.remove(id));
            assert!(queue.heap.len() <= 2 * queue.len());
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), queue.deadline(keep));

        assert!(queue.remove(keep));
        assert!(queue.heap.is_empty());
    }

    #[test]
    fn heap_stays_bounded_under_interval_changes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut space = AddressSpace::new("urn:test");
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();
        let id = queue.add_repeated(t0, Duration::from_secs(1), recorder(&log, "r"));

        for i in 0..10_000u64 {
            assert!(queue.change_interval(id, t0, Duration::from_millis(100 + i % 7)));
            assert!(queue.heap.len() <= 2 * queue.len());
        }
        let expected = t0 + Duration::from_millis(100 + 9_999 % 7);
        assert_eq!(queue.next_deadline(), Some(expected));
        assert_eq!(queue.run_due(expected, &mut space), 1);
        assert_eq!(*log.lock().unwrap(), vec!["r"]);
    }
}
