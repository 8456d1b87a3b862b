//! The simulation: kernel state and the event loop
//!
//! [`Kernel`] owns everything a running process may touch: the scheduler,
//! the scope arena, shared objects, signals, actors, property bags, the
//! random generator, the collector and the journal. [`Simulation`] pairs a
//! kernel with the entity registry and drives the event loop.
//!
//! Resuming a process takes it out of the process table, lets its body run
//! until the next suspension point, then either puts it back and performs
//! the requested operation or finishes it.

use crate::actor::Actor;
use crate::scheduler::EventKind;
use crate::{
    transaction, ActorId, Attr, Category, Collector, Cx, Error, ExceptionEvent, LogLevel,
    LogRecord, MemoryCollector, Node, Op, Parameters, Pid, Process, Registry, Result, Scheduler,
    ScopeId, Scopes, SharedRegistry, Signals, SimConfig, SimRng, SimTime, Step, TimeBase,
    TransactionSpec, Value, ValueMap, Wake, XValue,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Process-wide state shared by every running process
#[derive(Debug)]
pub struct Kernel {
    pub(crate) config: SimConfig,
    pub(crate) scheduler: Scheduler,
    pub(crate) scopes: Scopes,
    pub(crate) shared: SharedRegistry,
    pub(crate) signals: Signals,
    pub(crate) actors: IndexMap<ActorId, Actor>,
    pub(crate) processes: IndexMap<Pid, Process>,
    /// Transaction property bags by transaction id
    pub(crate) bags: IndexMap<u64, ValueMap>,
    pub(crate) globals: ValueMap,
    pub(crate) rng: SimRng,
    pub(crate) collector: Box<dyn Collector>,
    pub(crate) journal: Vec<LogRecord>,
    pub(crate) sim_scope: ScopeId,
    next_pid: u64,
    next_actor: u64,
    started: u64,
    finished: u64,
    unhandled: u64,
    stopped: bool,
}

impl Kernel {
    fn new(config: SimConfig) -> Self {
        let mut scopes = Scopes::new();
        let sim_scope = scopes.create(TimeBase::Offset(config.start_time));
        Self {
            rng: SimRng::new(config.seed),
            config,
            scheduler: Scheduler::new(),
            scopes,
            shared: SharedRegistry::new(),
            signals: Signals::new(),
            actors: IndexMap::new(),
            processes: IndexMap::new(),
            bags: IndexMap::new(),
            globals: ValueMap::new(),
            collector: Box::new(MemoryCollector::new()),
            journal: Vec::new(),
            sim_scope,
            next_pid: 1,
            next_actor: 1,
            started: 0,
            finished: 0,
            unhandled: 0,
            stopped: false,
        }
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Evaluate a lazy value at the current time
    pub fn read(&mut self, value: &XValue) -> Result<f64> {
        let now = self.now().secs();
        value.read(&mut self.scopes, now, &mut self.rng)
    }

    /// Local time of the simulation scope
    pub fn simulation_time(&self) -> Result<f64> {
        self.scopes.local_time(self.sim_scope, self.now().secs())
    }

    pub fn log(&mut self, level: LogLevel, pid: Option<Pid>, message: impl Into<String>) {
        let record = LogRecord::new(self.now(), level, pid, message);
        record.emit();
        if self.config.record_logs {
            self.journal.push(record);
        }
    }

    pub(crate) fn request_stop(&mut self, pid: Option<Pid>) {
        self.log(LogLevel::Info, pid, "stop requested");
        self.scheduler.post(EventKind::Stop);
    }

    pub(crate) fn next_pid(&mut self) -> Pid {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        pid
    }

    /// Create an actor with its own scope, entered now
    pub(crate) fn new_actor(&mut self) -> Result<(ActorId, ScopeId)> {
        let id = ActorId(self.next_actor);
        self.next_actor += 1;
        let scope = self.scopes.create(TimeBase::Elapsed);
        self.scopes.enter(scope, self.now().secs())?;
        self.actors.insert(id, Actor::new(id, scope));
        Ok((id, scope))
    }

    pub(crate) fn add_process(&mut self, process: Process) {
        let pid = process.header.pid;
        self.processes.insert(pid, process);
        self.started += 1;
        self.scheduler.post(EventKind::Resume {
            pid,
            wake: Wake::Start,
        });
    }

    fn grant(&mut self, pid: Pid) {
        self.scheduler.post(EventKind::Resume {
            pid,
            wake: Wake::Granted,
        });
    }

    /// Perform the operation a process suspended on
    fn suspend(&mut self, pid: Pid, op: Op) -> Result<()> {
        match op {
            Op::Hold(delay) => {
                self.scheduler.schedule(
                    delay,
                    EventKind::Resume {
                        pid,
                        wake: Wake::Timeout,
                    },
                )?;
            }
            Op::Request(key) => {
                if self.shared.resource_mut(&key)?.request(pid, None) {
                    self.grant(pid);
                }
            }
            Op::RequestWithin { resource, patience } => {
                if self.shared.resource(&resource)?.has_room() {
                    self.shared.resource_mut(&resource)?.request(pid, None);
                    self.grant(pid);
                } else {
                    let alarm = self.scheduler.schedule(
                        patience,
                        EventKind::Alarm {
                            pid,
                            resource: resource.clone(),
                        },
                    )?;
                    self.shared.resource_mut(&resource)?.request(pid, Some(alarm));
                }
            }
            Op::Release(key) => {
                let admitted = self.shared.resource_mut(&key)?.release(pid)?;
                self.grant(pid);
                if let Some(waiter) = admitted {
                    if let Some(alarm) = waiter.alarm {
                        self.scheduler.cancel(alarm);
                    }
                    self.grant(waiter.pid);
                }
            }
            Op::Get { level, amount } => {
                let level = self.shared.level_mut(&level)?;
                level.get(pid, amount)?;
                for served in level.settle() {
                    self.grant(served);
                }
            }
            Op::Put { level, amount } => {
                let level = self.shared.level_mut(&level)?;
                level.put(pid, amount)?;
                for served in level.settle() {
                    self.grant(served);
                }
            }
            Op::Wait(signal) => {
                if let Some(payload) = self.signals.wait(signal, pid)? {
                    self.scheduler.post(EventKind::Resume {
                        pid,
                        wake: Wake::Signaled(payload),
                    });
                }
            }
        }
        Ok(())
    }

    /// Tear down a process that ran to its end
    fn finish(&mut self, process: Process, exception: Option<ExceptionEvent>) -> Result<()> {
        let header = process.header;
        for scope in &header.owned {
            self.scopes.release(*scope);
        }
        self.finished += 1;
        match header.return_signal {
            Some(signal) => {
                for waiter in self.signals.raise(signal, exception.clone())? {
                    self.scheduler.post(EventKind::Resume {
                        pid: waiter,
                        wake: Wake::Signaled(exception.clone()),
                    });
                }
            }
            None => {
                self.bags.shift_remove(&header.id);
                // Nested processes end before their invoker, so nothing
                // else holds the actor at this point
                if let Some(actor) = self.actors.shift_remove(&header.actor) {
                    self.scopes.release(actor.scope());
                }
                match exception {
                    Some(e) if !e.is_exit() => {
                        self.unhandled += 1;
                        self.log(
                            LogLevel::Warn,
                            Some(header.pid),
                            format!("unhandled exception '{}'", e.kind()),
                        );
                    }
                    Some(_) => {
                        self.log(LogLevel::Debug, Some(header.pid), "transaction exited");
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Virtual time when the run stopped
    pub time: SimTime,
    /// Processes started so far
    pub started: u64,
    /// Processes that ran to their end
    pub finished: u64,
    /// Top-level processes ended by an unhandled signal
    pub unhandled: u64,
    /// Processes still suspended
    pub pending: usize,
    /// The run ended on a stop request
    pub stopped: bool,
}

/// A discrete-event simulation
///
/// # Example
///
/// ```
/// use etos_core::{Node, Simulation};
///
/// let mut sim = Simulation::new();
/// let spec = sim
///     .load(Node::new("transaction").child(Node::new("pause").attr("duration", 90.0)))
///     .unwrap();
/// let summary = sim.start(&spec, None, None).unwrap();
/// assert_eq!(summary.time.secs(), 90.0);
/// assert_eq!(summary.finished, 1);
/// ```
#[derive(Debug)]
pub struct Simulation {
    kernel: Kernel,
    registry: Registry,
    parameters: Parameters,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    /// A simulation with the default configuration and the standard
    /// entity library
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    pub fn with_config(config: SimConfig) -> Self {
        Self {
            kernel: Kernel::new(config),
            registry: Registry::standard(),
            parameters: Parameters::new(),
        }
    }

    /// Builder: replace the entity library
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Builder: replace the measurement sink
    pub fn with_collector(mut self, collector: Box<dyn Collector>) -> Self {
        self.kernel.collector = collector;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.kernel.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn now(&self) -> SimTime {
        self.kernel.now()
    }

    /// Bind a parameter for documents loaded afterwards
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Attr>) {
        self.parameters.insert(name.into(), value.into());
    }

    pub fn parameter(&self, name: &str) -> Option<&Attr> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Prepare a transaction document with the bound parameters
    pub fn load(&self, root: Node) -> Result<TransactionSpec> {
        TransactionSpec::new(root, &self.parameters)
    }

    /// Validate and start a top-level process at the current time
    pub fn spawn(&mut self, spec: &TransactionSpec, actor: Option<ValueMap>) -> Result<Pid> {
        self.registry.validate(spec.root())?;
        transaction::spawn(&mut self.kernel, &self.registry, spec.root(), None, actor)
    }

    /// Spawn a transaction and run until `max_duration` (the configured
    /// horizon if `None`) or until nothing is left to do
    pub fn start(
        &mut self,
        spec: &TransactionSpec,
        max_duration: Option<f64>,
        actor: Option<ValueMap>,
    ) -> Result<RunSummary> {
        self.spawn(spec, actor)?;
        let until = max_duration.unwrap_or(self.kernel.config.max_duration);
        self.run(until)
    }

    /// Dispatch events up to and including `until`
    pub fn run(&mut self, until: f64) -> Result<RunSummary> {
        self.kernel.stopped = false;
        while let Some(at) = self.kernel.scheduler.peek_time() {
            if at.secs() > until {
                self.kernel.scheduler.advance_to(SimTime(until));
                break;
            }
            let Some(event) = self.kernel.scheduler.pop() else {
                break;
            };
            match event.kind {
                EventKind::Resume { pid, wake } => self.resume(pid, wake)?,
                EventKind::Alarm { pid, resource } => {
                    if self.kernel.shared.resource_mut(&resource)?.renege(pid) {
                        self.kernel
                            .log(LogLevel::Debug, Some(pid), format!("reneged on '{}'", resource));
                        self.resume(pid, Wake::Reneged)?;
                    }
                }
                EventKind::Stop => {
                    self.kernel.stopped = true;
                    break;
                }
            }
        }
        Ok(self.summary())
    }

    fn resume(&mut self, pid: Pid, wake: Wake) -> Result<()> {
        let mut process = self
            .kernel
            .processes
            .shift_remove(&pid)
            .ok_or(Error::ProcessNotFound(pid.raw()))?;
        if wake == Wake::Start {
            let now = self.kernel.now();
            self.kernel.scopes.enter(process.header.scope, now.secs())?;
            process.header.start = now;
        }
        let step = {
            let Process { header, body } = &mut process;
            let mut cx = Cx::new(&mut self.kernel, &self.registry, header);
            body.resume(&mut cx, wake)?
        };
        match step {
            Step::Suspend(op) => {
                self.kernel.processes.insert(pid, process);
                self.kernel.suspend(pid, op)
            }
            Step::Complete => self.kernel.finish(process, None),
            Step::Raise(exception) => self.kernel.finish(process, Some(exception)),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            time: self.kernel.now(),
            started: self.kernel.started,
            finished: self.kernel.finished,
            unhandled: self.kernel.unhandled,
            pending: self.kernel.processes.len(),
            stopped: self.kernel.stopped,
        }
    }

    /// Look up a measurement category
    pub fn category(&self, name: &str) -> Result<&Category> {
        self.kernel.collector.get(name)
    }

    /// Diagnostics recorded so far
    pub fn logs(&self) -> &[LogRecord] {
        &self.kernel.journal
    }

    /// Simulation-wide property bag
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.kernel.globals.get(name)
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.kernel.globals.insert(name.into(), value);
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.kernel.actors.get(&id)
    }

    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.kernel.processes.get(&pid)
    }

    pub fn shared(&self) -> &SharedRegistry {
        &self.kernel.shared
    }

    /// Number of live scopes (the simulation scope included)
    pub fn live_scopes(&self) -> usize {
        self.kernel.scopes.len()
    }
}
