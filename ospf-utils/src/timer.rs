//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Logical-clock timer queue.
///
/// Timers never fire on their own. The owner advances the clock with
/// [`TimerQueue::pop_expired`], which hands back the message associated with
/// each expired timer in deadline order. Timers created at the same deadline
/// fire in creation order.
#[derive(Debug)]
pub struct TimerQueue<T> {
    inner: Rc<RefCell<Wheel<T>>>,
}

/// A handle which can be used to manipulate the timeout created by the
/// [`TimerQueue::timeout`] function.
///
/// Dropping this handle cancels the timeout.
#[derive(Debug)]
pub struct TimeoutTask {
    id: TimerId,
    wheel: Weak<RefCell<dyn TimerControl>>,
}

/// A handle which can be used to manipulate the interval created by the
/// [`TimerQueue::interval`] function.
///
/// Dropping this handle cancels the interval.
#[derive(Debug)]
pub struct IntervalTask {
    id: TimerId,
    wheel: Weak<RefCell<dyn TimerControl>>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct TimerId(u64);

#[derive(Debug)]
struct Wheel<T> {
    now: Duration,
    next_id: u64,
    next_seq: u64,
    entries: HashMap<TimerId, Entry<T>>,
    heap: BinaryHeap<Reverse<(Duration, u64, TimerId)>>,
}

#[derive(Debug)]
struct Entry<T> {
    period: Duration,
    periodic: bool,
    // Unset for timeouts that have already expired.
    deadline: Option<Duration>,
    seq: u64,
    msg: T,
}

// Type-erased view of the wheel used by the timer handles.
trait TimerControl: std::fmt::Debug {
    fn reset(&mut self, id: TimerId, period: Option<Duration>);
    fn remaining(&self, id: TimerId) -> Duration;
    fn cancel(&mut self, id: TimerId);
}

// ===== impl TimerQueue =====

impl<T> TimerQueue<T>
where
    T: Clone + std::fmt::Debug + 'static,
{
    pub fn new() -> TimerQueue<T> {
        TimerQueue {
            inner: Rc::new(RefCell::new(Wheel {
                now: Duration::ZERO,
                next_id: 0,
                next_seq: 0,
                entries: Default::default(),
                heap: Default::default(),
            })),
        }
    }

    /// Returns the current value of the logical clock.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Creates a timer that will yield `msg` once, when the specified
    /// timeout expires.
    ///
    /// Returns a handler that can be used to manipulate the timeout.
    #[must_use]
    pub fn timeout(&self, timeout: Duration, msg: T) -> TimeoutTask {
        let id = self.inner.borrow_mut().insert(timeout, false, false, msg);
        TimeoutTask {
            id,
            wheel: self.weak(),
        }
    }

    /// Creates a timer that will yield `msg` whenever the specified interval
    /// ticks. When `tick_on_start` is set, the first tick happens at the
    /// current time.
    ///
    /// Returns a handler that can be used to manipulate the interval.
    #[must_use]
    pub fn interval(
        &self,
        interval: Duration,
        tick_on_start: bool,
        msg: T,
    ) -> IntervalTask {
        let id =
            self.inner
                .borrow_mut()
                .insert(interval, true, tick_on_start, msg);
        IntervalTask {
            id,
            wheel: self.weak(),
        }
    }

    /// Returns the deadline of the next timer to expire, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        let mut wheel = self.inner.borrow_mut();
        wheel.discard_stale();
        wheel.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Returns the message of the earliest timer whose deadline is not later
    /// than `until`, advancing the clock to that deadline.
    ///
    /// Once no more timers are due, the clock is moved to `until` and `None`
    /// is returned. The clock never moves backwards.
    pub fn pop_expired(&self, until: Duration) -> Option<T> {
        let mut wheel = self.inner.borrow_mut();
        let wheel = &mut *wheel;
        wheel.discard_stale();

        let Some(Reverse((deadline, _, id))) = wheel.heap.peek().copied()
        else {
            wheel.now = wheel.now.max(until);
            return None;
        };
        if deadline > until {
            wheel.now = wheel.now.max(until);
            return None;
        }
        wheel.heap.pop();
        wheel.now = wheel.now.max(deadline);

        let seq = wheel.alloc_seq();
        let entry = wheel.entries.get_mut(&id)?;
        let msg = entry.msg.clone();
        if entry.periodic {
            let next = deadline + entry.period;
            entry.deadline = Some(next);
            entry.seq = seq;
            wheel.heap.push(Reverse((next, seq, id)));
        } else {
            entry.deadline = None;
        }

        Some(msg)
    }

    /// Returns the number of armed timers.
    pub fn len(&self) -> usize {
        self.inner
            .borrow()
            .entries
            .values()
            .filter(|entry| entry.deadline.is_some())
            .count()
    }

    /// Returns true if no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn weak(&self) -> Weak<RefCell<dyn TimerControl>> {
        let inner: Rc<RefCell<dyn TimerControl>> = self.inner.clone();
        Rc::downgrade(&inner)
    }
}

impl<T> Default for TimerQueue<T>
where
    T: Clone + std::fmt::Debug + 'static,
{
    fn default() -> TimerQueue<T> {
        TimerQueue::new()
    }
}

// ===== impl Wheel =====

impl<T> Wheel<T> {
    fn alloc_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn insert(
        &mut self,
        period: Duration,
        periodic: bool,
        tick_on_start: bool,
        msg: T,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let seq = self.alloc_seq();
        let deadline = if tick_on_start {
            self.now
        } else {
            self.now + period
        };
        self.entries.insert(
            id,
            Entry {
                period,
                periodic,
                deadline: Some(deadline),
                seq,
                msg,
            },
        );
        self.heap.push(Reverse((deadline, seq, id)));
        id
    }

    // Drops heap items left behind by cancelled or rescheduled timers.
    fn discard_stale(&mut self) {
        while let Some(Reverse((deadline, seq, id))) = self.heap.peek() {
            let live = self.entries.get(id).is_some_and(|entry| {
                entry.seq == *seq && entry.deadline == Some(*deadline)
            });
            if live {
                break;
            }
            self.heap.pop();
        }
    }
}

impl<T: std::fmt::Debug> TimerControl for Wheel<T> {
    fn reset(&mut self, id: TimerId, period: Option<Duration>) {
        let seq = self.alloc_seq();
        let now = self.now;
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        if let Some(period) = period {
            entry.period = period;
        }
        let deadline = now + entry.period;
        entry.deadline = Some(deadline);
        entry.seq = seq;
        self.heap.push(Reverse((deadline, seq, id)));
    }

    fn remaining(&self, id: TimerId) -> Duration {
        self.entries
            .get(&id)
            .and_then(|entry| entry.deadline)
            .map(|deadline| deadline.saturating_sub(self.now))
            .unwrap_or_default()
    }

    fn cancel(&mut self, id: TimerId) {
        self.entries.remove(&id);
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Resets the timeout, regardless if it has already expired or not.
    ///
    /// If a new timeout value isn't specified, the last value will be reused.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        if let Some(wheel) = self.wheel.upgrade() {
            wheel.borrow_mut().reset(self.id, timeout);
        }
    }

    /// Returns the remaining time before the timeout expires.
    pub fn remaining(&self) -> Duration {
        self.wheel
            .upgrade()
            .map(|wheel| wheel.borrow().remaining(self.id))
            .unwrap_or_default()
    }
}

impl Drop for TimeoutTask {
    fn drop(&mut self) {
        if let Some(wheel) = self.wheel.upgrade() {
            wheel.borrow_mut().cancel(self.id);
        }
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Resets the interval.
    ///
    /// If a new interval value isn't specified, the last value will be reused.
    pub fn reset(&mut self, interval: Option<Duration>) {
        if let Some(wheel) = self.wheel.upgrade() {
            wheel.borrow_mut().reset(self.id, interval);
        }
    }

    /// Returns the remaining time before the next interval tick.
    pub fn remaining(&self) -> Duration {
        self.wheel
            .upgrade()
            .map(|wheel| wheel.borrow().remaining(self.id))
            .unwrap_or_default()
    }
}

impl Drop for IntervalTask {
    fn drop(&mut self) {
        if let Some(wheel) = self.wheel.upgrade() {
            wheel.borrow_mut().cancel(self.id);
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn drain(
        queue: &TimerQueue<&'static str>,
        until: u64,
    ) -> Vec<&'static str> {
        std::iter::from_fn(|| queue.pop_expired(secs(until))).collect()
    }

    #[test]
    fn timeout_fires_once() {
        let queue = TimerQueue::new();
        let _task = queue.timeout(secs(5), "rxmt");

        assert_eq!(queue.next_deadline(), Some(secs(5)));
        assert!(drain(&queue, 4).is_empty());
        assert_eq!(queue.now(), secs(4));
        assert_eq!(drain(&queue, 10), vec!["rxmt"]);
        assert!(drain(&queue, 100).is_empty());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn interval_ticks() {
        let queue = TimerQueue::new();
        let _task = queue.interval(secs(10), true, "hello");

        assert_eq!(drain(&queue, 0), vec!["hello"]);
        assert_eq!(drain(&queue, 25), vec!["hello", "hello"]);
        assert_eq!(queue.next_deadline(), Some(secs(30)));
    }

    #[test]
    fn deadline_order() {
        let queue = TimerQueue::new();
        let _a = queue.timeout(secs(3), "a");
        let _b = queue.timeout(secs(1), "b");
        let _c = queue.timeout(secs(3), "c");

        assert_eq!(drain(&queue, 3), vec!["b", "a", "c"]);
    }

    #[test]
    fn drop_cancels() {
        let queue = TimerQueue::new();
        let task = queue.timeout(secs(1), "dead");
        drop(task);

        assert!(queue.is_empty());
        assert!(drain(&queue, 5).is_empty());
    }

    #[test]
    fn reset_postpones() {
        let queue = TimerQueue::new();
        let mut task = queue.timeout(secs(40), "inactivity");

        assert!(drain(&queue, 30).is_empty());
        task.reset(None);
        assert_eq!(task.remaining(), secs(40));
        assert!(drain(&queue, 69).is_empty());
        assert_eq!(drain(&queue, 70), vec!["inactivity"]);
        assert_eq!(task.remaining(), Duration::ZERO);

        // Expired timeouts can be rearmed.
        task.reset(Some(secs(2)));
        assert_eq!(drain(&queue, 72), vec!["inactivity"]);
    }

    #[test]
    fn handle_outlives_queue() {
        let queue = TimerQueue::new();
        let mut task = queue.interval(secs(1), false, "tick");
        drop(queue);

        task.reset(None);
        assert_eq!(task.remaining(), Duration::ZERO);
    }
}
