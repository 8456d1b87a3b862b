//! Wait/signal rendezvous between processes
//!
//! A nested process reports its end to the parent through a private
//! signal. Raising a signal wakes every waiter with the payload; raising
//! one nobody waits on keeps the payload until the next `wait`.

use crate::{Error, ExceptionEvent, Pid, Result, SignalId};
use indexmap::IndexMap;

/// What a signal carries: the unhandled exception of the signalling side
pub type Payload = Option<ExceptionEvent>;

#[derive(Debug, Default)]
struct Slot {
    waiters: Vec<Pid>,
    pending: Option<Payload>,
}

/// All live signals of a simulation
#[derive(Debug, Default)]
pub struct Signals {
    slots: IndexMap<SignalId, Slot>,
    next_id: u64,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new signal
    pub fn create(&mut self) -> SignalId {
        let id = SignalId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, Slot::default());
        id
    }

    /// Drop a signal; pending payloads and waiters are forgotten
    pub fn remove(&mut self, id: SignalId) -> bool {
        self.slots.shift_remove(&id).is_some()
    }

    /// Block `pid` on a signal
    ///
    /// Returns the stored payload if the signal was raised before anyone
    /// waited; the caller must then wake `pid` itself.
    pub fn wait(&mut self, id: SignalId, pid: Pid) -> Result<Option<Payload>> {
        let slot = self.slots.get_mut(&id).ok_or(Error::UnknownSignal(id.0))?;
        if let Some(payload) = slot.pending.take() {
            return Ok(Some(payload));
        }
        slot.waiters.push(pid);
        Ok(None)
    }

    /// Raise a signal, returning the processes to wake
    pub fn raise(&mut self, id: SignalId, payload: Payload) -> Result<Vec<Pid>> {
        let slot = self.slots.get_mut(&id).ok_or(Error::UnknownSignal(id.0))?;
        if slot.waiters.is_empty() {
            slot.pending = Some(payload);
        }
        Ok(std::mem::take(&mut slot.waiters))
    }

    /// Number of live signals
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
