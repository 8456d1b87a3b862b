//! Deterministic event scheduler.
//!
//! A min-heap keyed by `(at, seq)`. Sequence numbers are strictly
//! increasing, so events scheduled for the same instant pop in the order
//! they were scheduled. The virtual clock lives here and only moves
//! forward.

use crate::{EntityKey, Error, ExceptionEvent, Pid, Result, SimTime};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Why a suspended process is being resumed
#[derive(Debug, Clone, PartialEq)]
pub enum Wake {
    /// First activation of an entity or process
    Start,
    /// A hold elapsed
    Timeout,
    /// A resource or level operation completed
    Granted,
    /// The patience of a resource request ran out before the grant
    Reneged,
    /// A signal the process waited on was raised
    Signaled(Option<ExceptionEvent>),
}

/// What happens when an event fires
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Resume a process
    Resume { pid: Pid, wake: Wake },
    /// Reneging alarm of a process waiting on a resource
    Alarm { pid: Pid, resource: EntityKey },
    /// End the run
    Stop,
}

/// A scheduled activation
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub at: SimTime,
    pub seq: u64,
    pub kind: EventKind,
}

impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event queue and virtual clock
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Event>,
    cancelled: HashSet<u64>,
    now: SimTime,
    next_seq: u64,
}

impl Scheduler {
    /// Create a new, empty scheduler at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule an event `delay` after now; returns its sequence number
    pub fn schedule(&mut self, delay: f64, kind: EventKind) -> Result<u64> {
        if delay.is_nan() || delay < 0.0 {
            return Err(Error::NegativeDelay(delay));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Event {
            at: self.now.after(delay),
            seq,
            kind,
        });
        Ok(seq)
    }

    /// Schedule an event for the current instant
    pub fn post(&mut self, kind: EventKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Event {
            at: self.now,
            seq,
            kind,
        });
        seq
    }

    /// Cancel a pending event; it will be skipped when popped
    pub fn cancel(&mut self, seq: u64) {
        self.cancelled.insert(seq);
    }

    /// Time of the next live event
    pub fn peek_time(&mut self) -> Option<SimTime> {
        self.discard_cancelled();
        self.queue.peek().map(|e| e.at)
    }

    /// Pop the next live event and advance the clock to it
    pub fn pop(&mut self) -> Option<Event> {
        self.discard_cancelled();
        let event = self.queue.pop()?;
        self.now = self.now.max(event.at);
        Some(event)
    }

    /// Move the clock forward without dispatching (end of a bounded run)
    pub fn advance_to(&mut self, at: SimTime) {
        self.now = self.now.max(at);
    }

    /// Returns `true` if no live event is pending
    pub fn is_empty(&mut self) -> bool {
        self.peek_time().is_none()
    }

    /// Number of queued events (cancelled ones included until popped)
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.queue.peek() {
            if !self.cancelled.remove(&top.seq) {
                break;
            }
            self.queue.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resume(pid: u64) -> EventKind {
        EventKind::Resume {
            pid: Pid(pid),
            wake: Wake::Timeout,
        }
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut sched = Scheduler::new();
        sched.schedule(10.0, resume(1)).unwrap();
        sched.schedule(10.0, resume(2)).unwrap();
        sched.schedule(10.0, resume(3)).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| sched.pop()).map(|e| e.kind).collect();
        assert_eq!(order, vec![resume(1), resume(2), resume(3)]);
        assert_eq!(sched.now(), SimTime(10.0));
    }

    #[test]
    fn test_time_ordering() {
        let mut sched = Scheduler::new();
        sched.schedule(30.0, resume(1)).unwrap();
        sched.schedule(10.0, resume(2)).unwrap();
        sched.schedule(20.0, resume(3)).unwrap();

        assert_eq!(sched.pop().unwrap().at, SimTime(10.0));
        assert_eq!(sched.pop().unwrap().at, SimTime(20.0));
        assert_eq!(sched.pop().unwrap().at, SimTime(30.0));
        assert!(sched.pop().is_none());
    }

    #[test]
    fn test_post_runs_before_later_events() {
        let mut sched = Scheduler::new();
        sched.schedule(1.0, resume(1)).unwrap();
        sched.pop();
        sched.schedule(0.0, resume(2)).unwrap();
        sched.post(resume(3));
        sched.schedule(0.5, resume(4)).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| sched.pop()).map(|e| e.kind).collect();
        assert_eq!(order, vec![resume(2), resume(3), resume(4)]);
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut sched = Scheduler::new();
        assert_eq!(
            sched.schedule(-1.0, EventKind::Stop).unwrap_err(),
            Error::NegativeDelay(-1.0)
        );
        assert!(sched.schedule(f64::NAN, EventKind::Stop).is_err());
        assert!(sched.is_empty());
    }

    #[test]
    fn test_cancel() {
        let mut sched = Scheduler::new();
        let first = sched.schedule(1.0, resume(1)).unwrap();
        sched.schedule(2.0, resume(2)).unwrap();
        sched.cancel(first);

        assert_eq!(sched.peek_time(), Some(SimTime(2.0)));
        assert_eq!(sched.pop().unwrap().kind, resume(2));
        assert!(sched.is_empty());
    }

    #[test]
    fn test_clock_never_moves_back() {
        let mut sched = Scheduler::new();
        sched.advance_to(SimTime(5.0));
        sched.advance_to(SimTime(3.0));
        assert_eq!(sched.now(), SimTime(5.0));
    }
}
