//! Control-flow entities
//!
//! Every control-flow entity owns pre-built subentities and a [`Flow`]
//! that decides which of them runs next. [`Control`] drives the protocol:
//!
//! 1. `next_iteration` decides whether another pass starts
//! 2. `next_subentity` picks the subentity to activate, given the one that
//!    just ended and the signal it raised (if handled)
//! 3. `handles` decides whether a raised signal is intercepted; signals
//!    that are not intercepted end the entity and travel upwards unchanged

use crate::entity::{activate, unexpected};
use crate::property::PropertyPath;
use crate::{
    Build, Cx, Entity, EntityInfo, Error, ExceptionEvent, Node, Result, Step, Value, Wake,
    XValue, RESTART,
};
use std::fmt;
use std::rc::Rc;

/// Iteration and branching policy of a control-flow entity
pub trait Flow: fmt::Debug {
    /// Called when the entity is (re)activated
    fn reset(&mut self) {}

    /// Whether another pass should run
    fn next_iteration(&mut self, cx: &mut Cx<'_>, info: &EntityInfo) -> Result<bool>;

    /// Subentity to activate after `prev` ended; `None` ends the pass
    ///
    /// `raised` is set when `prev` raised a signal this flow handles.
    fn next_subentity(
        &mut self,
        cx: &mut Cx<'_>,
        info: &EntityInfo,
        prev: Option<usize>,
        raised: Option<&ExceptionEvent>,
    ) -> Result<Option<usize>>;

    /// Whether a signal raised by subentity `index` is intercepted
    fn handles(&self, exception: &ExceptionEvent, index: usize) -> bool;

    /// A pass ended; `completed` is false when it was cut short by an
    /// intercepted signal
    fn pass_ended(&mut self, _completed: bool) {}
}

/// Generic driver of a [`Flow`] over its subentities
#[derive(Debug)]
pub struct Control<F> {
    info: EntityInfo,
    children: Vec<Box<dyn Entity>>,
    flow: F,
    current: Option<usize>,
}

impl<F: Flow> Control<F> {
    fn activate_child(&mut self, cx: &mut Cx<'_>, index: usize) -> Result<Step> {
        let child = self.children.get_mut(index).ok_or_else(|| {
            Error::InvalidStructure(format!(
                "'{}' has no subentity {}",
                self.info.tag, index
            ))
        })?;
        self.current = Some(index);
        activate(child.as_mut(), cx)
    }

    /// Start passes until one suspends or raises, or iteration ends
    fn next_pass(&mut self, cx: &mut Cx<'_>) -> Result<Step> {
        loop {
            if !self.flow.next_iteration(cx, &self.info)? {
                self.current = None;
                return Ok(Step::Complete);
            }
            match self.flow.next_subentity(cx, &self.info, None, None)? {
                Some(index) => {
                    let step = self.activate_child(cx, index)?;
                    return self.drive(cx, step);
                }
                None => self.flow.pass_ended(true),
            }
        }
    }

    /// Follow completed and intercepted subentities until one suspends
    fn drive(&mut self, cx: &mut Cx<'_>, mut step: Step) -> Result<Step> {
        loop {
            let index = match self.current {
                Some(index) => index,
                None => return Ok(step),
            };
            let (raised, completed) = match step {
                Step::Suspend(op) => return Ok(Step::Suspend(op)),
                Step::Complete => (None, true),
                Step::Raise(e) if self.flow.handles(&e, index) => (Some(e), false),
                Step::Raise(e) => {
                    self.current = None;
                    return Ok(Step::Raise(e));
                }
            };
            match self
                .flow
                .next_subentity(cx, &self.info, Some(index), raised.as_ref())?
            {
                Some(next) => step = self.activate_child(cx, next)?,
                None => {
                    self.flow.pass_ended(completed);
                    return self.next_pass(cx);
                }
            }
        }
    }
}

impl<F: Flow> Entity for Control<F> {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => {
                self.flow.reset();
                self.current = None;
                self.next_pass(cx)
            }
            wake => {
                let index = self
                    .current
                    .ok_or_else(|| unexpected(&self.info, &wake))?;
                let step = match self.children.get_mut(index) {
                    Some(child) => child.resume(cx, wake)?,
                    None => return Err(unexpected(&self.info, &wake)),
                };
                self.drive(cx, step)
            }
        }
    }
}

/// Check the number of subentities before building them
fn expect_children(node: &Node, min: usize, max: Option<usize>) -> Result<()> {
    let n = node.entity_children().count();
    let ok = n >= min && max.map_or(true, |max| n <= max);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => format!("exactly {}", min),
        Some(max) => format!("{} to {}", min, max),
        None => format!("at least {}", min),
    };
    Err(Error::InvalidStructure(format!(
        "'{}' expects {} subentities, got {}",
        node.tag, expected, n
    )))
}

fn build<F: Flow + 'static>(
    node: &Rc<Node>,
    b: &mut Build<'_>,
    info: EntityInfo,
    flow: F,
) -> Result<Box<dyn Entity>> {
    let children = b.children(node)?;
    Ok(Box::new(Control {
        info,
        children,
        flow,
        current: None,
    }))
}

/// Sequential order over `len` subentities; a handled signal ends the pass
fn sequential(prev: Option<usize>, raised: Option<&ExceptionEvent>, len: usize) -> Option<usize> {
    match (prev, raised) {
        (_, Some(_)) => None,
        (None, None) => Some(0),
        (Some(i), None) => Some(i + 1).filter(|&j| j < len),
    }
}

fn restart_kind(node: &Node) -> Result<String> {
    Ok(node.optional_text("restart")?.unwrap_or(RESTART).to_string())
}

fn numeric(value: Value) -> Result<f64> {
    value.as_float().ok_or_else(|| Error::TypeError {
        expected: "number".to_string(),
        got: value.type_name().to_string(),
    })
}

/// Condition of `while`/`if` and their range variants
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Property is truthy
    Truthy(PropertyPath),
    /// Property lies within `[minimum, maximum]`
    InRange {
        property: PropertyPath,
        minimum: XValue,
        maximum: XValue,
    },
}

impl Predicate {
    fn truthy(node: &Node) -> Result<Self> {
        Ok(Predicate::Truthy(PropertyPath::parse(node.text("property")?)?))
    }

    fn in_range(node: &Node, b: &mut Build<'_>, info: &EntityInfo) -> Result<Self> {
        Ok(Predicate::InRange {
            property: PropertyPath::parse(node.text("property")?)?,
            minimum: b.xvalue(node, "minimum", info.scope)?,
            maximum: b.xvalue(node, "maximum", info.scope)?,
        })
    }

    fn eval(&self, cx: &mut Cx<'_>, info: &EntityInfo) -> Result<bool> {
        match self {
            Predicate::Truthy(path) => Ok(cx.property(path, info)?.is_truthy()),
            Predicate::InRange {
                property,
                minimum,
                maximum,
            } => {
                let value = numeric(cx.property(property, info)?)?;
                let minimum = cx.read(minimum)?;
                let maximum = cx.read(maximum)?;
                Ok(minimum <= value && value <= maximum)
            }
        }
    }
}

/// How many passes a loop makes
#[derive(Debug, Clone)]
pub enum Repeat {
    Forever,
    /// Until `count` passes have completed
    Counted { count: XValue, completed: u64 },
    /// While the predicate holds at the start of a pass
    While(Predicate),
}

/// Sequential passes over the subentities; a pass cut short by the restart
/// signal does not count
#[derive(Debug)]
pub struct Loop {
    repeat: Repeat,
    restart: String,
    len: usize,
}

impl Flow for Loop {
    fn reset(&mut self) {
        if let Repeat::Counted { completed, .. } = &mut self.repeat {
            *completed = 0;
        }
    }

    fn next_iteration(&mut self, cx: &mut Cx<'_>, info: &EntityInfo) -> Result<bool> {
        match &self.repeat {
            Repeat::Forever => Ok(true),
            Repeat::Counted { count, completed } => Ok((*completed as f64) < cx.read(count)?),
            Repeat::While(predicate) => predicate.eval(cx, info),
        }
    }

    fn next_subentity(
        &mut self,
        _cx: &mut Cx<'_>,
        _info: &EntityInfo,
        prev: Option<usize>,
        raised: Option<&ExceptionEvent>,
    ) -> Result<Option<usize>> {
        Ok(sequential(prev, raised, self.len))
    }

    fn handles(&self, exception: &ExceptionEvent, _index: usize) -> bool {
        exception.kind() == self.restart
    }

    fn pass_ended(&mut self, completed: bool) {
        if let (Repeat::Counted { completed: n, .. }, true) = (&mut self.repeat, completed) {
            *n += 1;
        }
    }
}

fn build_loop(
    node: &Rc<Node>,
    b: &mut Build<'_>,
    repeat: impl FnOnce(&mut Build<'_>, &EntityInfo) -> Result<Repeat>,
) -> Result<Box<dyn Entity>> {
    expect_children(node, 1, None)?;
    let info = b.info(node);
    let flow = Loop {
        repeat: repeat(b, &info)?,
        restart: restart_kind(node)?,
        len: node.entity_children().count(),
    };
    build(node, b, info, flow)
}

pub(crate) fn infinity_loop(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    build_loop(node, b, |_, _| Ok(Repeat::Forever))
}

pub(crate) fn counted_loop(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    build_loop(node, b, |b, info| {
        Ok(Repeat::Counted {
            count: b.xvalue(node, "count", info.scope)?,
            completed: 0,
        })
    })
}

pub(crate) fn while_loop(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    build_loop(node, b, |_, _| Ok(Repeat::While(Predicate::truthy(node)?)))
}

pub(crate) fn while_in_range(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    build_loop(node, b, |b, info| {
        Ok(Repeat::While(Predicate::in_range(node, b, info)?))
    })
}

/// A single pass; tracks whether it already ran in this activation
#[derive(Debug, Default)]
struct Once {
    done: bool,
}

impl Once {
    fn take(&mut self) -> bool {
        !std::mem::replace(&mut self.done, true)
    }
}

/// Run the subentities once, in order
#[derive(Debug)]
pub struct Block {
    once: Once,
    len: usize,
}

impl Flow for Block {
    fn reset(&mut self) {
        self.once = Once::default();
    }

    fn next_iteration(&mut self, _cx: &mut Cx<'_>, _info: &EntityInfo) -> Result<bool> {
        Ok(self.once.take())
    }

    fn next_subentity(
        &mut self,
        _cx: &mut Cx<'_>,
        _info: &EntityInfo,
        prev: Option<usize>,
        raised: Option<&ExceptionEvent>,
    ) -> Result<Option<usize>> {
        Ok(sequential(prev, raised, self.len))
    }

    fn handles(&self, _exception: &ExceptionEvent, _index: usize) -> bool {
        false
    }
}

pub(crate) fn block(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    expect_children(node, 1, None)?;
    let info = b.info(node);
    let flow = Block {
        once: Once::default(),
        len: node.entity_children().count(),
    };
    build(node, b, info, flow)
}

/// Run subentity 0; run subentity 1 only if 0 raised the caught kind
#[derive(Debug)]
pub struct TryCatch {
    once: Once,
    exception: String,
}

impl Flow for TryCatch {
    fn reset(&mut self) {
        self.once = Once::default();
    }

    fn next_iteration(&mut self, _cx: &mut Cx<'_>, _info: &EntityInfo) -> Result<bool> {
        Ok(self.once.take())
    }

    fn next_subentity(
        &mut self,
        _cx: &mut Cx<'_>,
        _info: &EntityInfo,
        prev: Option<usize>,
        raised: Option<&ExceptionEvent>,
    ) -> Result<Option<usize>> {
        Ok(match (prev, raised) {
            (None, _) => Some(0),
            (Some(0), Some(_)) => Some(1),
            _ => None,
        })
    }

    fn handles(&self, exception: &ExceptionEvent, index: usize) -> bool {
        index == 0 && exception.kind() == self.exception
    }
}

pub(crate) fn try_catch(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    expect_children(node, 2, Some(2))?;
    let exception = node.text("exception")?.to_string();
    let info = b.info(node);
    let flow = TryCatch {
        once: Once::default(),
        exception,
    };
    build(node, b, info, flow)
}

/// What selects the branch of a two-way choice
#[derive(Debug, Clone)]
pub enum Choice {
    When(Predicate),
    /// Bernoulli trial on the simulation generator
    Probability(XValue),
}

/// Run subentity 0 when the choice holds, else subentity 1 if present
#[derive(Debug)]
pub struct Branch {
    once: Once,
    choice: Choice,
    has_else: bool,
}

impl Flow for Branch {
    fn reset(&mut self) {
        self.once = Once::default();
    }

    fn next_iteration(&mut self, _cx: &mut Cx<'_>, _info: &EntityInfo) -> Result<bool> {
        Ok(self.once.take())
    }

    fn next_subentity(
        &mut self,
        cx: &mut Cx<'_>,
        info: &EntityInfo,
        prev: Option<usize>,
        _raised: Option<&ExceptionEvent>,
    ) -> Result<Option<usize>> {
        if prev.is_some() {
            return Ok(None);
        }
        let holds = match &self.choice {
            Choice::When(predicate) => predicate.eval(cx, info)?,
            Choice::Probability(p) => {
                let p = cx.read(p)?;
                cx.chance(p)
            }
        };
        Ok(if holds {
            Some(0)
        } else if self.has_else {
            Some(1)
        } else {
            None
        })
    }

    fn handles(&self, _exception: &ExceptionEvent, _index: usize) -> bool {
        false
    }
}

fn build_branch(
    node: &Rc<Node>,
    b: &mut Build<'_>,
    choice: impl FnOnce(&mut Build<'_>, &EntityInfo) -> Result<Choice>,
) -> Result<Box<dyn Entity>> {
    expect_children(node, 1, Some(2))?;
    let info = b.info(node);
    let flow = Branch {
        once: Once::default(),
        choice: choice(b, &info)?,
        has_else: node.entity_children().count() == 2,
    };
    build(node, b, info, flow)
}

pub(crate) fn if_branch(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    build_branch(node, b, |_, _| Ok(Choice::When(Predicate::truthy(node)?)))
}

pub(crate) fn if_in_range(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    build_branch(node, b, |b, info| {
        Ok(Choice::When(Predicate::in_range(node, b, info)?))
    })
}

pub(crate) fn with_probability(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    build_branch(node, b, |b, info| {
        Ok(Choice::Probability(b.xvalue(node, "probability", info.scope)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogLevel, Simulation};

    fn pause(duration: f64) -> Node {
        Node::new("pause").attr("duration", duration)
    }

    fn trace(text: &str) -> Node {
        Node::new("trace").attr("text", text)
    }

    fn traces(sim: &Simulation) -> Vec<(f64, String)> {
        sim.logs()
            .iter()
            .filter(|r| r.level == LogLevel::Info)
            .map(|r| (r.time.secs(), r.message.clone()))
            .collect()
    }

    fn run(root: Node) -> Simulation {
        let mut sim = Simulation::new();
        let spec = sim.load(root).unwrap();
        sim.start(&spec, None, None).unwrap();
        sim
    }

    #[test]
    fn test_sequential() {
        assert_eq!(sequential(None, None, 2), Some(0));
        assert_eq!(sequential(Some(0), None, 2), Some(1));
        assert_eq!(sequential(Some(1), None, 2), None);
        assert_eq!(sequential(Some(0), Some(&ExceptionEvent::new("restart")), 2), None);
    }

    #[test]
    fn test_counted_loop() {
        let sim = run(Node::new("transaction").child(
            Node::new("counted_loop")
                .attr("count", 3i64)
                .child(pause(10.0))
                .child(trace("pass")),
        ));
        let times: Vec<f64> = traces(&sim).into_iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![10.0, 20.0, 30.0]);
        assert_eq!(sim.summary().finished, 1);
    }

    #[test]
    fn test_block_propagates() {
        let sim = run(Node::new("transaction").child(
            Node::new("block")
                .child(pause(5.0))
                .child(Node::new("exception").attr("type", "crash"))
                .child(trace("unreachable")),
        ));
        assert!(traces(&sim).is_empty());
        assert_eq!(sim.summary().unhandled, 1);
        assert_eq!(sim.now().secs(), 5.0);
    }

    #[test]
    fn test_try_catch() {
        let sim = run(Node::new("transaction").child(
            Node::new("try_catch")
                .attr("exception", "crash")
                .child(
                    Node::new("block")
                        .child(Node::new("exception").attr("type", "crash"))
                        .child(trace("unreachable")),
                )
                .child(trace("caught")),
        ));
        assert_eq!(traces(&sim), vec![(0.0, "caught".to_string())]);
        assert_eq!(sim.summary().unhandled, 0);
    }

    #[test]
    fn test_try_catch_skips_handler() {
        let sim = run(Node::new("transaction")
            .child(
                Node::new("try_catch")
                    .attr("exception", "crash")
                    .child(pause(1.0))
                    .child(trace("handler")),
            )
            .child(trace("after")));
        assert_eq!(traces(&sim), vec![(1.0, "after".to_string())]);
    }

    #[test]
    fn test_try_catch_other_kind() {
        let sim = run(Node::new("transaction").child(
            Node::new("try_catch")
                .attr("exception", "crash")
                .child(Node::new("exception").attr("type", "flat_tyre"))
                .child(trace("handler")),
        ));
        assert!(traces(&sim).is_empty());
        assert_eq!(sim.summary().unhandled, 1);
    }

    #[test]
    fn test_if_branches() {
        let mut sim = Simulation::new();
        sim.set_global("rain", true.into());
        let spec = sim
            .load(Node::new("transaction").child(
                Node::new("if")
                    .attr("property", "simulation.rain")
                    .child(trace("wet"))
                    .child(trace("dry")),
            ))
            .unwrap();
        sim.start(&spec, None, None).unwrap();
        assert_eq!(traces(&sim), vec![(0.0, "wet".to_string())]);
    }

    #[test]
    fn test_if_in_range_without_else() {
        let sim = run(Node::new("transaction")
            .child(pause(50.0))
            .child(
                Node::new("if_in_range")
                    .attr("property", "transaction.t")
                    .attr("minimum", 0.0)
                    .attr("maximum", 10.0)
                    .child(trace("early")),
            )
            .child(trace("done")));
        assert_eq!(traces(&sim), vec![(50.0, "done".to_string())]);
    }

    #[test]
    fn test_with_probability() {
        let sim = run(Node::new("transaction")
            .child(
                Node::new("with")
                    .attr("probability", 1.0)
                    .child(trace("always"))
                    .child(trace("never")),
            )
            .child(
                Node::new("with")
                    .attr("probability", 0.0)
                    .child(trace("never")),
            ));
        assert_eq!(traces(&sim), vec![(0.0, "always".to_string())]);
    }

    #[test]
    fn test_while_in_range() {
        // transaction.t is 0, 10, 20 at the start of each pass
        let sim = run(Node::new("transaction").child(
            Node::new("while_in_range")
                .attr("property", "transaction.t")
                .attr("minimum", 0.0)
                .attr("maximum", 25.0)
                .child(pause(10.0)),
        ));
        assert_eq!(sim.now().secs(), 30.0);
        assert_eq!(sim.summary().finished, 1);
    }

    #[test]
    fn test_child_counts() {
        let mut sim = Simulation::new();
        let bad = [
            Node::new("block"),
            Node::new("try_catch").attr("exception", "x").child(pause(1.0)),
            Node::new("if")
                .attr("property", "simulation.t")
                .child(pause(1.0))
                .child(pause(1.0))
                .child(pause(1.0)),
            Node::new("counted_loop").attr("count", 1i64),
        ];
        for node in bad {
            let spec = sim.load(Node::new("transaction").child(node)).unwrap();
            let err = sim.spawn(&spec, None).unwrap_err();
            assert!(matches!(err, Error::InvalidStructure(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_while_truthy_property() {
        let set = |value: f64| {
            Node::new("set")
                .attr("property", "transaction.moving")
                .attr("value", value)
        };
        let sim = run(Node::new("transaction")
            .child(set(1.0))
            .child(
                Node::new("while")
                    .attr("property", "transaction.moving")
                    .child(pause(10.0))
                    .child(trace("leg"))
                    .child(set(0.0)),
            )
            .child(trace("parked")));
        assert_eq!(
            traces(&sim),
            vec![(10.0, "leg".to_string()), (10.0, "parked".to_string())]
        );
    }

    #[test]
    fn test_infinity_loop_restart() {
        let mut sim = Simulation::new();
        let spec = sim
            .load(Node::new("transaction").child(
                Node::new("infinity_loop")
                    .child(pause(5.0))
                    .child(trace("pass"))
                    .child(Node::new("exception").attr("type", "restart"))
                    .child(trace("unreachable")),
            ))
            .unwrap();
        let summary = sim.start(&spec, Some(22.0), None).unwrap();
        let times: Vec<f64> = traces(&sim)
            .into_iter()
            .filter(|(_, m)| m == "pass")
            .map(|(t, _)| t)
            .collect();
        assert_eq!(times, vec![5.0, 10.0, 15.0, 20.0]);
        assert_eq!(traces(&sim).len(), 4);
        assert_eq!(summary.unhandled, 0);
        assert_eq!(summary.pending, 1);
    }

    #[test]
    fn test_infinity_loop_passes_other_signals() {
        let sim = run(Node::new("transaction").child(
            Node::new("infinity_loop")
                .child(pause(1.0))
                .child(Node::new("exception").attr("type", "crash")),
        ));
        assert_eq!(sim.summary().unhandled, 1);
        assert_eq!(sim.now().secs(), 1.0);
    }
}
