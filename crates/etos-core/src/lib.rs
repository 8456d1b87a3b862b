//! Etos Core - discrete-event simulation kernel for transport systems
//!
//! This crate provides the building blocks of a process-oriented
//! simulation:
//! - Virtual-time event scheduler with FIFO tie-breaking (`Scheduler`)
//! - Resources with FIFO queues and reneging, continuous levels
//! - Transactions: processes built from declarative node trees
//! - Control-flow entities (loops, branches, try/catch) as resumable
//!   state machines over typed control signals (`ExceptionEvent`)
//! - Scoped values: random and time-dependent attributes (`XValue`)
//! - Measurements through a pluggable `Collector`
//!
//! ## Model
//!
//! A [`Simulation`] owns a kernel (clock, queues, scopes, actors) and a
//! [`Registry`] of entity constructors. A document is loaded into a
//! [`TransactionSpec`], spawned as a top-level process and run until the
//! horizon or a stop request:
//!
//! ```
//! use etos_core::{Node, Simulation};
//!
//! let mut sim = Simulation::new();
//! let spec = sim
//!     .load(
//!         Node::new("transaction")
//!             .child(
//!                 Node::new("parking")
//!                     .with_id("P1")
//!                     .attr("capacity", 1i64)
//!                     .attr("duration", 60.0),
//!             )
//!             .child(Node::new("trace").attr("text", "left the parking")),
//!     )
//!     .unwrap();
//! let summary = sim.start(&spec, None, None).unwrap();
//! assert_eq!(summary.time.secs(), 60.0);
//! ```

mod actor;
pub mod activities;
mod collector;
mod config;
pub mod control;
mod distribution;
mod entity;
mod error;
mod identity;
mod log;
mod node;
mod process;
mod property;
mod registry;
pub mod resources;
mod rng;
mod scheduler;
mod shared;
mod signal;
mod simulation;
pub mod time;
pub mod transaction;
mod value;
mod xvalue;

pub use actor::{Actor, ActorProp};
pub use collector::{Aggregate, Category, Collector, MeasureKind, MemoryCollector, Stat};
pub use config::SimConfig;
pub use distribution::Distribution;
pub use entity::{activate, Entity, EntityInfo, Sequence};
pub use error::{Error, Result};
pub use identity::{ActorId, EntityKey, Pid, ScopeId, SignalId};
pub use log::{LogLevel, LogRecord};
pub use node::{Attr, Node, Parameters, TransactionSpec, DATA_TAGS};
pub use process::{Cx, ExceptionEvent, Op, Process, ProcessHeader, Step, EXIT, RESTART};
pub use property::{PathScope, PropertyPath};
pub use registry::{Build, Constructor, Registry};
pub use rng::SimRng;
pub use scheduler::{Event, EventKind, Scheduler, Wake};
pub use shared::{Level, Resource, SharedObject, SharedRegistry, Waiter};
pub use signal::{Payload, Signals};
pub use simulation::{RunSummary, Simulation};
pub use time::{DayTime, SimTime};
pub use value::{Value, ValueMap};
pub use xvalue::{Context, Scopes, TimeBase, TimeFn, XRef, XSource, XValue};
