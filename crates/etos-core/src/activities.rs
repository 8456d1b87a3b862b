//! Simple timed activities
//!
//! - `pause`, `pause_to`, `connection` - timeouts
//! - `trace`, `checkpoint` - diagnostics and measurements
//! - `set`, `stop_simulation` - side effects after a zero hold
//! - `exception`, `exit` - raise control signals

use crate::entity::unexpected;
use crate::property::PropertyPath;
use crate::{
    Build, Cx, DayTime, Entity, EntityInfo, Error, ExceptionEvent, LogLevel, MeasureKind, Node,
    Op, Result, Step, Value, Wake, XValue,
};
use std::rc::Rc;

/// Completes on the timeout of a single hold
fn after_hold(info: &EntityInfo, wake: Wake) -> Result<Step> {
    match wake {
        Wake::Timeout => Ok(Step::Complete),
        other => Err(unexpected(info, &other)),
    }
}

/// Hold for `duration`
#[derive(Debug)]
pub struct Pause {
    info: EntityInfo,
    duration: XValue,
}

pub(crate) fn pause(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let info = b.info(node);
    let duration = b.xvalue(node, "duration", info.scope)?;
    Ok(Box::new(Pause { info, duration }))
}

impl Entity for Pause {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => Ok(Step::Suspend(Op::Hold(cx.read(&self.duration)?))),
            wake => after_hold(&self.info, wake),
        }
    }
}

/// Hold until the clock given by `epoch` reaches `time`, or its next
/// occurrence when `period` is set (e.g. the next 08:00 of a day)
#[derive(Debug)]
pub struct PauseTo {
    info: EntityInfo,
    time: XValue,
    period: Option<XValue>,
    epoch: PropertyPath,
}

pub(crate) fn pause_to(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let info = b.info(node);
    let time = b.xvalue(node, "time", info.scope)?;
    let period = b.optional_xvalue(node, "period", info.scope)?;
    let epoch = PropertyPath::parse(node.optional_text("epoch")?.unwrap_or("simulation.t"))?;
    Ok(Box::new(PauseTo {
        info,
        time,
        period,
        epoch,
    }))
}

impl PauseTo {
    fn delay(&self, cx: &mut Cx<'_>) -> Result<f64> {
        let current = cx.property(&self.epoch, &self.info)?;
        let current = current.as_float().ok_or_else(|| Error::TypeError {
            expected: "number".to_string(),
            got: current.type_name().to_string(),
        })?;
        let target = cx.read(&self.time)?;
        let period = match &self.period {
            Some(p) => cx.read(p)?,
            None => 0.0,
        };
        if period > 0.0 {
            Ok((target - current).rem_euclid(period))
        } else {
            Ok((target - current).max(0.0))
        }
    }
}

impl Entity for PauseTo {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => Ok(Step::Suspend(Op::Hold(self.delay(cx)?))),
            wake => after_hold(&self.info, wake),
        }
    }
}

/// Travel `distance` at `velocity`
///
/// Both attributes live in the entity scope, so one activation sees one
/// velocity draw however often it is read.
#[derive(Debug)]
pub struct Connection {
    info: EntityInfo,
    distance: XValue,
    velocity: XValue,
}

pub(crate) fn connection(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let info = b.info(node);
    let distance = b.xvalue(node, "distance", info.scope)?;
    let velocity = b.xvalue(node, "velocity", info.scope)?;
    Ok(Box::new(Connection {
        info,
        distance,
        velocity,
    }))
}

impl Entity for Connection {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => {
                let velocity = cx.read(&self.velocity)?;
                if !(velocity > 0.0) {
                    return Err(Error::invalid(
                        &self.info.tag,
                        "velocity",
                        format!("must be positive, got {}", velocity),
                    ));
                }
                let distance = cx.read(&self.distance)?;
                Ok(Step::Suspend(Op::Hold(distance / velocity)))
            }
            wake => after_hold(&self.info, wake),
        }
    }
}

/// Log a line of text
#[derive(Debug)]
pub struct Trace {
    info: EntityInfo,
    text: String,
}

pub(crate) fn trace(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let text = node.text("text")?.to_string();
    Ok(Box::new(Trace {
        info: b.info(node),
        text,
    }))
}

impl Entity for Trace {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => {
                cx.log(LogLevel::Info, self.text.clone());
                Ok(Step::Complete)
            }
            other => Err(unexpected(&self.info, &other)),
        }
    }
}

/// Write `value` into a property bag
#[derive(Debug)]
pub struct SetProperty {
    info: EntityInfo,
    property: PropertyPath,
    value: XValue,
}

pub(crate) fn set(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let info = b.info(node);
    let property = PropertyPath::parse(node.text("property")?)?;
    let value = b.xvalue(node, "value", info.scope)?;
    Ok(Box::new(SetProperty {
        info,
        property,
        value,
    }))
}

impl Entity for SetProperty {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => Ok(Step::Suspend(Op::Hold(0.0))),
            Wake::Timeout => {
                let value = cx.read(&self.value)?;
                cx.set_property(&self.property, Value::Float(value))?;
                Ok(Step::Complete)
            }
            other => Err(unexpected(&self.info, &other)),
        }
    }
}

/// End the run at the current instant
#[derive(Debug)]
pub struct StopSimulation {
    info: EntityInfo,
}

pub(crate) fn stop_simulation(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    Ok(Box::new(StopSimulation { info: b.info(node) }))
}

impl Entity for StopSimulation {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => Ok(Step::Suspend(Op::Hold(0.0))),
            Wake::Timeout => {
                cx.request_stop();
                Ok(Step::Complete)
            }
            other => Err(unexpected(&self.info, &other)),
        }
    }
}

/// Raise a control signal (`exception` and `exit`)
#[derive(Debug)]
pub struct Raise {
    info: EntityInfo,
    signal: ExceptionEvent,
}

pub(crate) fn exception(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let kind = node.text("type")?;
    if kind.is_empty() {
        return Err(Error::invalid(&node.tag, "type", "empty exception type"));
    }
    Ok(Box::new(Raise {
        info: b.info(node),
        signal: ExceptionEvent::new(kind),
    }))
}

pub(crate) fn exit(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    Ok(Box::new(Raise {
        info: b.info(node),
        signal: ExceptionEvent::exit(),
    }))
}

impl Entity for Raise {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, _cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => Ok(Step::Raise(self.signal.clone())),
            other => Err(unexpected(&self.info, &other)),
        }
    }
}

/// One `measure` child of a checkpoint
#[derive(Debug, Clone)]
struct Measure {
    property: PropertyPath,
    /// Property as written in the document
    label: String,
    category: String,
    kind: MeasureKind,
    key: Option<PropertyPath>,
}

impl Measure {
    fn parse(node: &Node) -> Result<Self> {
        let label = node.text("property")?.to_string();
        let property = PropertyPath::parse(&label)?;
        let kind_name = node.text("type")?;
        let kind = MeasureKind::parse(kind_name).ok_or_else(|| {
            Error::invalid(&node.tag, "type", format!("unknown measure type '{}'", kind_name))
        })?;
        let key = node.optional_text("key")?.map(PropertyPath::parse).transpose()?;
        let category = node
            .optional_text("category")?
            .map_or_else(|| label.clone(), str::to_string);
        Ok(Self {
            property,
            label,
            category,
            kind,
            key,
        })
    }
}

/// Which neighbour `entity.*` and `shared.*` paths refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Referred {
    Itself,
    Prev,
    Next,
}

/// Record measurements into the collector
#[derive(Debug)]
pub struct Checkpoint {
    info: EntityInfo,
    measures: Vec<Measure>,
    referred: Referred,
    target: Option<EntityInfo>,
}

pub(crate) fn checkpoint(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let measures = node
        .children
        .iter()
        .filter(|c| c.tag == "measure")
        .map(|c| Measure::parse(c))
        .collect::<Result<Vec<_>>>()?;
    let referred = match node.optional_text("referred")? {
        None => Referred::Itself,
        Some("prev") => Referred::Prev,
        Some("next") => Referred::Next,
        Some(other) => {
            return Err(Error::invalid(
                &node.tag,
                "referred",
                format!("expected 'prev' or 'next', got '{}'", other),
            ))
        }
    };
    Ok(Box::new(Checkpoint {
        info: b.info(node),
        measures,
        referred,
        target: None,
    }))
}

impl Checkpoint {
    fn record(&self, cx: &mut Cx<'_>) -> Result<()> {
        let target = self.target.as_ref().unwrap_or(&self.info);
        for measure in &self.measures {
            let value = cx.property(&measure.property, target)?;
            let key = match &measure.key {
                Some(path) => Some(cx.property(path, target)?),
                None => None,
            };
            if measure.kind == MeasureKind::Log {
                let time = DayTime::from_secs(cx.simulation_time()?);
                let mut line =
                    format!("{}: {} {}={}", time, measure.category, measure.label, value);
                if let Some(key) = key {
                    line.push_str(&format!(" ({})", key));
                }
                cx.log(LogLevel::Info, line);
            } else {
                cx.collect(&measure.category, value, measure.kind, key)?;
            }
        }
        Ok(())
    }
}

impl Entity for Checkpoint {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match wake {
            Wake::Start => Ok(Step::Suspend(Op::Hold(0.0))),
            Wake::Timeout => {
                self.record(cx)?;
                Ok(Step::Complete)
            }
            other => Err(unexpected(&self.info, &other)),
        }
    }

    fn link(&mut self, prev: Option<&EntityInfo>, next: Option<&EntityInfo>) -> Result<()> {
        let neighbour = match self.referred {
            Referred::Itself => return Ok(()),
            Referred::Prev => prev,
            Referred::Next => next,
        };
        let neighbour = neighbour.ok_or_else(|| {
            Error::invalid(&self.info.tag, "referred", "no such neighbour entity")
        })?;
        self.target = Some(neighbour.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Distribution, Error, LogLevel, Node, Simulation, Value};

    fn pause(duration: f64) -> Node {
        Node::new("pause").attr("duration", duration)
    }

    fn trace(text: &str) -> Node {
        Node::new("trace").attr("text", text)
    }

    fn trace_times(sim: &Simulation) -> Vec<f64> {
        sim.logs()
            .iter()
            .filter(|r| r.level == LogLevel::Info)
            .map(|r| r.time.secs())
            .collect()
    }

    fn run(root: Node) -> Simulation {
        let mut sim = Simulation::new();
        let spec = sim.load(root).unwrap();
        sim.start(&spec, None, None).unwrap();
        sim
    }

    fn parking(capacity: i64) -> Node {
        Node::new("parking")
            .with_id("P1")
            .attr("capacity", capacity)
            .attr("duration", 10.0)
    }

    fn measure(property: &str, kind: &str) -> Node {
        Node::new("measure").attr("property", property).attr("type", kind)
    }

    #[test]
    fn test_connection_velocity_drawn_per_activation() {
        let sim = run(Node::new("transaction").child(
            Node::new("counted_loop")
                .attr("count", 4i64)
                .child(
                    Node::new("connection")
                        .attr("distance", 100.0)
                        .attr("velocity", Distribution::Uniform { min: 1.0, max: 2.0 }),
                )
                .child(trace("arrived")),
        ));
        let times = trace_times(&sim);
        assert_eq!(times.len(), 4);
        let mut legs = Vec::new();
        let mut last = 0.0;
        for t in times {
            legs.push(t - last);
            last = t;
        }
        // distance / velocity with velocity in [1, 2)
        assert!(legs.iter().all(|leg| *leg > 50.0 && *leg <= 100.0), "{:?}", legs);
        assert!(legs.iter().any(|leg| (leg - legs[0]).abs() > 1e-9));
    }

    #[test]
    fn test_connection_rejects_zero_velocity() {
        let mut sim = Simulation::new();
        let spec = sim
            .load(Node::new("transaction").child(
                Node::new("connection")
                    .attr("distance", 100.0)
                    .attr("velocity", 0.0),
            ))
            .unwrap();
        let err = sim.start(&spec, None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidAttribute { ref attr, .. } if attr == "velocity"));
    }

    #[test]
    fn test_pause_to_absolute_time() {
        let sim = run(Node::new("transaction")
            .child(pause(10.0))
            .child(Node::new("pause_to").attr("time", 25.0))
            .child(trace("on time"))
            .child(Node::new("pause_to").attr("time", 5.0))
            .child(trace("already past")));
        assert_eq!(trace_times(&sim), vec![25.0, 25.0]);
    }

    #[test]
    fn test_pause_to_next_period() {
        // Next occurrence of offset 25 in a 100 s cycle after t=130
        let sim = run(Node::new("transaction")
            .child(pause(130.0))
            .child(
                Node::new("pause_to")
                    .attr("time", 25.0)
                    .attr("period", 100.0),
            )
            .child(trace("next cycle"))
            .child(
                Node::new("pause_to")
                    .attr("time", 25.0)
                    .attr("period", 100.0),
            )
            .child(trace("same instant")));
        assert_eq!(trace_times(&sim), vec![225.0, 225.0]);
    }

    #[test]
    fn test_pause_to_custom_epoch() {
        // transaction.t starts counting when the process starts
        let mut sim = Simulation::new();
        let late = sim
            .load(
                Node::new("transaction").child(pause(40.0)).child(
                    Node::new("start_transaction")
                        .child(
                            Node::new("pause_to")
                                .attr("time", 15.0)
                                .attr("epoch", "transaction.t"),
                        )
                        .child(trace("fifteen in")),
                ),
            )
            .unwrap();
        sim.start(&late, None, None).unwrap();
        assert_eq!(trace_times(&sim), vec![55.0]);
    }

    #[test]
    fn test_checkpoint_referred_prev_reads_shared() {
        let mut sim = Simulation::new();
        let spec = sim
            .load(
                Node::new("transaction").child(parking(1)).child(
                    Node::new("checkpoint")
                        .attr("referred", "prev")
                        .child(measure("shared.active", "list"))
                        .child(measure("entity.id", "counter")),
                ),
            )
            .unwrap();
        sim.spawn(&spec, None).unwrap();
        sim.spawn(&spec, None).unwrap();
        sim.run(f64::INFINITY).unwrap();
        // The first leaver has already handed the place to the second one
        let active = sim.category("shared.active").unwrap();
        assert_eq!(active.all().as_list().unwrap(), &[Value::Int(1), Value::Int(0)]);
        let ids = sim.category("entity.id").unwrap();
        assert_eq!(ids.all().as_counter().unwrap().get("P1"), Some(&2));
    }

    #[test]
    fn test_checkpoint_referred_next() {
        let sim = run(Node::new("transaction")
            .child(
                Node::new("checkpoint")
                    .attr("referred", "next")
                    .child(measure("shared.capacity", "list"))
                    .child(measure("shared.waiting", "list")),
            )
            .child(parking(3)));
        let capacity = sim.category("shared.capacity").unwrap();
        assert_eq!(capacity.all().as_list().unwrap(), &[Value::Float(3.0)]);
        let waiting = sim.category("shared.waiting").unwrap();
        assert_eq!(waiting.all().as_list().unwrap(), &[Value::Int(0)]);
    }

    #[test]
    fn test_checkpoint_without_neighbour() {
        let mut sim = Simulation::new();
        let spec = sim
            .load(
                Node::new("transaction").child(pause(1.0)).child(
                    Node::new("checkpoint")
                        .attr("referred", "next")
                        .child(measure("shared.active", "list")),
                ),
            )
            .unwrap();
        let err = sim.spawn(&spec, None).unwrap_err();
        assert!(matches!(err, Error::InvalidAttribute { ref attr, .. } if attr == "referred"));
    }

    #[test]
    fn test_shared_path_without_shared_object() {
        let mut sim = Simulation::new();
        let spec = sim
            .load(
                Node::new("transaction")
                    .child(Node::new("checkpoint").child(measure("shared.active", "list"))),
            )
            .unwrap();
        let err = sim.start(&spec, None, None).unwrap_err();
        assert_eq!(err, Error::PropertyNotFound("shared.active".to_string()));
    }
}
