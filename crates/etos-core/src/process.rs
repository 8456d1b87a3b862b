//! Processes and the resumption protocol
//!
//! A process is one running transaction. Its body is a tree of entities,
//! each an explicit state machine: the scheduler resumes the body with a
//! [`crate::Wake`], the body answers with a [`Step`]. A suspended body names the
//! [`Op`] it waits on; a finished one either completes or raises an
//! [`ExceptionEvent`] that every composing layer inspects on the way up.

use crate::entity::Sequence;
use crate::property::{self, PropertyPath};
use crate::simulation::Kernel;
use crate::transaction::{self, Parent};
use crate::{
    ActorId, EntityInfo, EntityKey, LogLevel, MeasureKind, Node, Pid, Registry, Result, ScopeId,
    SignalId, SimTime, Value, XValue,
};
use std::fmt;
use std::rc::Rc;

/// Kind of the signal produced by `exit`
pub const EXIT: &str = "__exit__";

/// Default kind intercepted by loops
pub const RESTART: &str = "restart";

/// A typed control signal
///
/// Raised by an entity instead of completing normally. Not an error: it is
/// threaded through the process and either intercepted by a control-flow
/// entity or ends the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExceptionEvent {
    kind: String,
}

impl ExceptionEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// The reserved signal that ends a transaction silently
    pub fn exit() -> Self {
        Self::new(EXIT)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_exit(&self) -> bool {
        self.kind == EXIT
    }
}

impl fmt::Display for ExceptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)
    }
}

/// A suspending operation consumed by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Pure timeout
    Hold(f64),
    /// Acquire one unit of a resource
    Request(EntityKey),
    /// Acquire a resource, giving up after `patience`
    RequestWithin { resource: EntityKey, patience: f64 },
    /// Give back a held resource
    Release(EntityKey),
    /// Take `amount` out of a level
    Get { level: EntityKey, amount: f64 },
    /// Add `amount` to a level
    Put { level: EntityKey, amount: f64 },
    /// Block until a signal is raised
    Wait(SignalId),
}

/// Outcome of resuming an entity
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Waiting on an operation; resume with its wake reason
    Suspend(Op),
    /// Finished normally
    Complete,
    /// Finished with a control signal
    Raise(ExceptionEvent),
}

/// Identity and bookkeeping of a process
#[derive(Debug, Clone)]
pub struct ProcessHeader {
    pub pid: Pid,
    /// Transaction id: the pid of the top-level process of the family
    pub id: u64,
    pub ppid: Option<Pid>,
    pub start: SimTime,
    /// Clock scope of the transaction
    pub scope: ScopeId,
    pub actor: ActorId,
    /// Signal raised when the process ends (nested processes only)
    pub return_signal: Option<SignalId>,
    /// Scopes released when the process ends
    pub(crate) owned: Vec<ScopeId>,
}

impl ProcessHeader {
    pub fn is_top_level(&self) -> bool {
        self.ppid.is_none()
    }
}

/// A running transaction
#[derive(Debug)]
pub struct Process {
    pub(crate) header: ProcessHeader,
    pub(crate) body: Sequence,
}

impl Process {
    pub fn header(&self) -> &ProcessHeader {
        &self.header
    }
}

/// What an entity sees while it runs
pub struct Cx<'a> {
    kernel: &'a mut Kernel,
    registry: &'a Registry,
    header: &'a mut ProcessHeader,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(
        kernel: &'a mut Kernel,
        registry: &'a Registry,
        header: &'a mut ProcessHeader,
    ) -> Self {
        Self {
            kernel,
            registry,
            header,
        }
    }

    /// Current virtual time
    pub fn now(&self) -> f64 {
        self.kernel.now().secs()
    }

    pub fn pid(&self) -> Pid {
        self.header.pid
    }

    pub fn header(&self) -> &ProcessHeader {
        &*self.header
    }

    /// Evaluate a lazy value at the current time
    pub fn read(&mut self, value: &XValue) -> Result<f64> {
        self.kernel.read(value)
    }

    /// Start a new activation of a scope
    pub fn enter(&mut self, scope: ScopeId) -> Result<()> {
        let now = self.now();
        self.kernel.scopes.enter(scope, now)
    }

    /// Bernoulli trial on the simulation generator
    pub fn chance(&mut self, probability: f64) -> bool {
        self.kernel.rng.chance(probability)
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let pid = self.header.pid;
        self.kernel.log(level, Some(pid), message);
    }

    /// Read a property as seen from `entity`
    pub fn property(&mut self, path: &PropertyPath, entity: &EntityInfo) -> Result<Value> {
        property::read(self.kernel, self.header, entity, path)
    }

    /// Write a property bag entry
    pub fn set_property(&mut self, path: &PropertyPath, value: Value) -> Result<()> {
        property::write(self.kernel, self.header, path, value)
    }

    pub fn collect(
        &mut self,
        category: &str,
        value: Value,
        kind: MeasureKind,
        key: Option<Value>,
    ) -> Result<()> {
        self.kernel.collector.collect(category, value, kind, key)
    }

    /// Local time of the simulation scope
    pub fn simulation_time(&self) -> Result<f64> {
        self.kernel.simulation_time()
    }

    pub fn new_signal(&mut self) -> SignalId {
        self.kernel.signals.create()
    }

    pub fn drop_signal(&mut self, signal: SignalId) {
        self.kernel.signals.remove(signal);
    }

    /// Start a nested process sharing this process's id and actor; it
    /// raises `signal` when it ends
    pub fn spawn_nested(&mut self, node: &Rc<Node>, signal: SignalId) -> Result<Pid> {
        let parent = Parent {
            pid: self.header.pid,
            id: self.header.id,
            actor: self.header.actor,
            signal,
        };
        transaction::spawn(self.kernel, self.registry, node, Some(parent), None)
    }

    /// Start an independent top-level process
    pub fn spawn_independent(&mut self, node: &Rc<Node>) -> Result<Pid> {
        transaction::spawn(self.kernel, self.registry, node, None, None)
    }

    /// Ask the scheduler to stop at the current instant
    pub fn request_stop(&mut self) {
        let pid = self.header.pid;
        self.kernel.request_stop(Some(pid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_event() {
        let exit = ExceptionEvent::exit();
        assert!(exit.is_exit());
        assert_eq!(exit.kind(), "__exit__");
        let crash = ExceptionEvent::new("crash");
        assert!(!crash.is_exit());
        assert_eq!(crash.to_string(), "crash");
    }
}
