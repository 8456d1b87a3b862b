//! Transactions: building processes and the entities that start them

use crate::entity::{unexpected, Sequence};
use crate::simulation::Kernel;
use crate::{
    ActorId, Build, Cx, Entity, EntityInfo, LogLevel, Node, Op, Pid, Process, ProcessHeader,
    Registry, Result, SignalId, Step, ValueMap, Wake,
};
use std::rc::Rc;

/// Invoker of a nested process
#[derive(Debug, Clone, Copy)]
pub(crate) struct Parent {
    pub pid: Pid,
    pub id: u64,
    pub actor: ActorId,
    /// Raised by the nested process when it ends
    pub signal: SignalId,
}

/// Build a process from a `transaction` node and schedule its start at the
/// current time
///
/// Top-level processes get a fresh id and an actor built from the node's
/// `actor` child; nested ones inherit both from `parent`.
pub(crate) fn spawn(
    kernel: &mut Kernel,
    registry: &Registry,
    node: &Rc<Node>,
    parent: Option<Parent>,
    initial: Option<ValueMap>,
) -> Result<Pid> {
    let pid = kernel.next_pid();
    let start = kernel.now();
    let mut b = Build::new(kernel, registry);
    let actor = match parent {
        Some(parent) => Ok(parent.actor),
        None => b.actor(node, initial),
    };
    let built = actor.and_then(|actor| {
        let scope = b.scope();
        let children = b.children(node)?;
        Ok((actor, scope, children))
    });
    let (actor, scope, children) = match built {
        Ok(built) => built,
        Err(e) => {
            b.abandon();
            return Err(e);
        }
    };
    let owned = b.finish();
    let header = ProcessHeader {
        pid,
        id: parent.map_or(pid.raw(), |p| p.id),
        ppid: parent.map(|p| p.pid),
        start,
        scope,
        actor,
        return_signal: parent.map(|p| p.signal),
        owned,
    };
    let message = match header.ppid {
        Some(ppid) => format!("nested transaction started by pid:{}", ppid),
        None => format!("transaction {} started", node.key()),
    };
    kernel.add_process(Process {
        header,
        body: Sequence::new(children),
    });
    kernel.log(LogLevel::Debug, Some(pid), message);
    Ok(pid)
}

/// Run the node's children as a nested process and wait for it
///
/// A signal the nested process ends with is raised again here.
#[derive(Debug)]
pub struct SubTransaction {
    info: EntityInfo,
    node: Rc<Node>,
    signal: Option<SignalId>,
}

pub(crate) fn sub_transaction(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    Ok(Box::new(SubTransaction {
        info: b.info(node),
        node: Rc::clone(node),
        signal: None,
    }))
}

impl Entity for SubTransaction {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match (self.signal, wake) {
            (_, Wake::Start) => {
                let signal = cx.new_signal();
                self.signal = Some(signal);
                cx.spawn_nested(&self.node, signal)?;
                Ok(Step::Suspend(Op::Wait(signal)))
            }
            (Some(signal), Wake::Signaled(payload)) => {
                cx.drop_signal(signal);
                self.signal = None;
                Ok(match payload {
                    Some(exception) => Step::Raise(exception),
                    None => Step::Complete,
                })
            }
            (_, wake) => Err(unexpected(&self.info, &wake)),
        }
    }
}

/// Start an independent top-level process and carry on without waiting
#[derive(Debug)]
pub struct StartTransaction {
    info: EntityInfo,
    node: Rc<Node>,
}

pub(crate) fn start_transaction(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    Ok(Box::new(StartTransaction {
        info: b.info(node),
        node: Rc::clone(node),
    }))
}

impl Entity for StartTransaction {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => {
                cx.spawn_independent(&self.node)?;
                Ok(Step::Complete)
            }
            other => Err(unexpected(&self.info, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{ActorId, LogLevel, Node, Simulation, Value};

    fn trace(text: &str) -> Node {
        Node::new("trace").attr("text", text)
    }

    #[test]
    fn test_nested_shares_identity() {
        let mut sim = Simulation::new();
        let spec = sim
            .load(
                Node::new("transaction")
                    .with_id("outer")
                    .child(Node::new("set").attr("property", "transaction.mark").attr("value", 7.0))
                    .child(
                        Node::new("transaction")
                            .child(Node::new("pause").attr("duration", 10.0))
                            .child(
                                Node::new("checkpoint").child(
                                    Node::new("measure")
                                        .attr("property", "transaction.mark")
                                        .attr("type", "list"),
                                ),
                            )
                            .child(
                                Node::new("checkpoint").child(
                                    Node::new("measure")
                                        .attr("property", "transaction.ppid")
                                        .attr("type", "list"),
                                ),
                            ),
                    )
                    .child(trace("back")),
            )
            .unwrap();
        let summary = sim.start(&spec, None, None).unwrap();
        assert_eq!(summary.started, 2);
        assert_eq!(summary.finished, 2);
        assert_eq!(summary.time.secs(), 10.0);
        let marks = sim.category("transaction.mark").unwrap();
        assert_eq!(marks.all().as_list().unwrap(), &[Value::Float(7.0)]);
        let ppids = sim.category("transaction.ppid").unwrap();
        assert_eq!(ppids.all().as_list().unwrap(), &[Value::Int(1)]);
        assert!(sim
            .logs()
            .iter()
            .any(|r| r.level == LogLevel::Info && r.message == "back" && r.time.secs() == 10.0));
    }

    #[test]
    fn test_nested_exception_reraised() {
        let mut sim = Simulation::new();
        let spec = sim
            .load(
                Node::new("transaction")
                    .child(
                        Node::new("try_catch")
                            .attr("exception", "crash")
                            .child(
                                Node::new("transaction")
                                    .child(Node::new("exception").attr("type", "crash")),
                            )
                            .child(trace("recovered")),
                    )
                    .child(
                        Node::new("transaction")
                            .child(Node::new("exception").attr("type", "flat_tyre")),
                    )
                    .child(trace("unreachable")),
            )
            .unwrap();
        let summary = sim.start(&spec, None, None).unwrap();
        let infos: Vec<&str> = sim
            .logs()
            .iter()
            .filter(|r| r.level == LogLevel::Info)
            .map(|r| r.message.as_str())
            .collect();
        assert_eq!(infos, vec!["recovered"]);
        // Only the top-level process counts as unhandled
        assert_eq!(summary.unhandled, 1);
        assert_eq!(summary.finished, 3);
        assert!(sim
            .logs()
            .iter()
            .any(|r| r.level == LogLevel::Warn && r.message == "unhandled exception 'flat_tyre'"));
    }

    #[test]
    fn test_start_transaction_independent() {
        let mut sim = Simulation::new();
        let spec = sim
            .load(
                Node::new("transaction")
                    .child(
                        Node::new("start_transaction")
                            .child(Node::new("actor").attr("name", "truck"))
                            .child(Node::new("pause").attr("duration", 30.0))
                            .child(
                                Node::new("checkpoint").child(
                                    Node::new("measure")
                                        .attr("property", "actor.name")
                                        .attr("type", "counter"),
                                ),
                            )
                            .child(Node::new("exit")),
                    )
                    .child(Node::new("pause").attr("duration", 5.0)),
            )
            .unwrap();
        let summary = sim.start(&spec, None, None).unwrap();
        assert_eq!(summary.started, 2);
        assert_eq!(summary.finished, 2);
        assert_eq!(summary.unhandled, 0);
        assert_eq!(summary.time.secs(), 30.0);
        let names = sim.category("actor.name").unwrap();
        assert_eq!(names.all().as_counter().unwrap().get("truck"), Some(&1));
        // Both actors went away with their processes
        assert!(sim.actor(ActorId(1)).is_none());
        assert!(sim.actor(ActorId(2)).is_none());
    }
}
