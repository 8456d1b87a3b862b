//! Shared objects: resources and levels
//!
//! Shared objects are keyed by entity identity and live for the whole
//! run. Every entity instance with the same identity, in any process,
//! operates on the same object.
//!
//! - [`Resource`] - integral capacity, active set and FIFO wait queue
//! - [`Level`] - continuous quantity with FIFO get and put queues

use crate::{EntityKey, Error, Pid, Result};
use indexmap::IndexMap;
use std::collections::VecDeque;

/// A process queued on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub pid: Pid,
    /// Sequence number of the reneging alarm, if the request has patience
    pub alarm: Option<u64>,
}

/// A capacity-limited mutual exclusion object
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    key: EntityKey,
    capacity: usize,
    active: Vec<Pid>,
    waiting: VecDeque<Waiter>,
}

impl Resource {
    /// Create a resource; capacity must be at least one
    pub fn new(key: EntityKey, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity {
                key: key.to_string(),
                reason: "resource capacity must be at least 1".to_string(),
            });
        }
        Ok(Self {
            key,
            capacity,
            active: Vec::new(),
            waiting: VecDeque::new(),
        })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Processes currently holding the resource
    pub fn active(&self) -> &[Pid] {
        &self.active
    }

    /// Queue length
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Queued processes in grant order
    pub fn waiting(&self) -> impl Iterator<Item = Pid> + '_ {
        self.waiting.iter().map(|w| w.pid)
    }

    /// Whether a request would be admitted right now
    pub fn has_room(&self) -> bool {
        self.active.len() < self.capacity
    }

    /// True iff `pid` is in the active set
    pub fn acquired(&self, pid: Pid) -> bool {
        self.active.contains(&pid)
    }

    /// True iff `pid` is queued
    pub fn is_waiting(&self, pid: Pid) -> bool {
        self.waiting.iter().any(|w| w.pid == pid)
    }

    /// Admit `pid` or queue it; returns whether it was admitted
    pub fn request(&mut self, pid: Pid, alarm: Option<u64>) -> bool {
        if self.has_room() {
            self.active.push(pid);
            true
        } else {
            self.waiting.push_back(Waiter { pid, alarm });
            false
        }
    }

    /// Remove `pid` from the active set and admit the queue head
    pub fn release(&mut self, pid: Pid) -> Result<Option<Waiter>> {
        let pos = self
            .active
            .iter()
            .position(|p| *p == pid)
            .ok_or_else(|| Error::NotHolding {
                key: self.key.to_string(),
                pid: pid.raw(),
            })?;
        self.active.remove(pos);
        let admitted = self.waiting.pop_front();
        if let Some(waiter) = admitted {
            self.active.push(waiter.pid);
        }
        Ok(admitted)
    }

    /// Withdraw a queued request; returns false if `pid` was not queued
    pub fn renege(&mut self, pid: Pid) -> bool {
        match self.waiting.iter().position(|w| w.pid == pid) {
            Some(pos) => {
                self.waiting.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Pending level operation
#[derive(Debug, Clone, Copy, PartialEq)]
struct Pending {
    pid: Pid,
    amount: f64,
}

/// A quantity-limited buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    key: EntityKey,
    capacity: f64,
    amount: f64,
    getters: VecDeque<Pending>,
    putters: VecDeque<Pending>,
}

impl Level {
    /// Create a level holding `initial` out of `capacity`
    pub fn new(key: EntityKey, capacity: f64, initial: f64) -> Result<Self> {
        let fail = |reason: &str| Error::InvalidCapacity {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if !(capacity >= 0.0) {
            return Err(fail("level capacity must be non-negative"));
        }
        if !(initial >= 0.0) {
            return Err(fail("initial amount must be non-negative"));
        }
        if initial > capacity {
            return Err(fail("initial amount greater than capacity"));
        }
        Ok(Self {
            key,
            capacity,
            amount: initial,
            getters: VecDeque::new(),
            putters: VecDeque::new(),
        })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Current quantity
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Number of blocked get requests
    pub fn getters_len(&self) -> usize {
        self.getters.len()
    }

    /// Number of blocked put requests
    pub fn putters_len(&self) -> usize {
        self.putters.len()
    }

    fn check(&self, amount: f64) -> Result<()> {
        if !(amount >= 0.0) {
            return Err(Error::NegativeAmount {
                key: self.key.to_string(),
                amount,
            });
        }
        if amount > self.capacity {
            return Err(Error::CapacityExceeded {
                key: self.key.to_string(),
                requested: amount,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Queue a get request; call [`Level::settle`] afterwards
    pub fn get(&mut self, pid: Pid, amount: f64) -> Result<()> {
        self.check(amount)?;
        self.getters.push_back(Pending { pid, amount });
        Ok(())
    }

    /// Queue a put request; call [`Level::settle`] afterwards
    pub fn put(&mut self, pid: Pid, amount: f64) -> Result<()> {
        self.check(amount)?;
        self.putters.push_back(Pending { pid, amount });
        Ok(())
    }

    /// Serve queue heads while possible; returns the satisfied processes
    /// in the order they were served
    pub fn settle(&mut self) -> Vec<Pid> {
        let mut served = Vec::new();
        loop {
            let mut progress = false;
            if let Some(head) = self.putters.front().copied() {
                if head.amount <= self.capacity - self.amount {
                    self.amount += head.amount;
                    self.putters.pop_front();
                    served.push(head.pid);
                    progress = true;
                }
            }
            if let Some(head) = self.getters.front().copied() {
                if head.amount <= self.amount {
                    self.amount -= head.amount;
                    self.getters.pop_front();
                    served.push(head.pid);
                    progress = true;
                }
            }
            if !progress {
                return served;
            }
        }
    }
}

/// A resource or a level
#[derive(Debug, Clone, PartialEq)]
pub enum SharedObject {
    Resource(Resource),
    Level(Level),
}

impl SharedObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SharedObject::Resource(_) => "resource",
            SharedObject::Level(_) => "level",
        }
    }

    pub fn capacity(&self) -> f64 {
        match self {
            SharedObject::Resource(r) => r.capacity() as f64,
            SharedObject::Level(l) => l.capacity(),
        }
    }
}

/// Simulation-wide registry of shared objects
#[derive(Debug, Default)]
pub struct SharedRegistry {
    objects: IndexMap<EntityKey, SharedObject>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&SharedObject> {
        self.objects.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.objects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether an object of `kind` exists under `key`
    ///
    /// An existing object of a different kind is an error.
    pub fn exists(&self, key: &EntityKey, kind: &'static str) -> Result<bool> {
        match self.objects.get(key) {
            Some(existing) if existing.kind_name() != kind => Err(mismatch(key, kind, existing)),
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    /// Register an object; the first one registered under a key wins
    pub fn insert(&mut self, key: EntityKey, object: SharedObject) -> bool {
        if self.objects.contains_key(&key) {
            return false;
        }
        self.objects.insert(key, object);
        true
    }

    pub fn resource(&self, key: &EntityKey) -> Result<&Resource> {
        match self.objects.get(key) {
            Some(SharedObject::Resource(r)) => Ok(r),
            Some(other) => Err(mismatch(key, "resource", other)),
            None => Err(Error::UnknownSharedObject(key.to_string())),
        }
    }

    pub fn resource_mut(&mut self, key: &EntityKey) -> Result<&mut Resource> {
        match self.objects.get_mut(key) {
            Some(SharedObject::Resource(r)) => Ok(r),
            Some(other) => Err(mismatch(key, "resource", other)),
            None => Err(Error::UnknownSharedObject(key.to_string())),
        }
    }

    pub fn level(&self, key: &EntityKey) -> Result<&Level> {
        match self.objects.get(key) {
            Some(SharedObject::Level(l)) => Ok(l),
            Some(other) => Err(mismatch(key, "level", other)),
            None => Err(Error::UnknownSharedObject(key.to_string())),
        }
    }

    pub fn level_mut(&mut self, key: &EntityKey) -> Result<&mut Level> {
        match self.objects.get_mut(key) {
            Some(SharedObject::Level(l)) => Ok(l),
            Some(other) => Err(mismatch(key, "level", other)),
            None => Err(Error::UnknownSharedObject(key.to_string())),
        }
    }
}

fn mismatch(key: &EntityKey, expected: &'static str, actual: &SharedObject) -> Error {
    Error::SharedKindMismatch {
        key: key.to_string(),
        expected,
        actual: actual.kind_name(),
    }
}
