//! Resource-consuming and level-consuming activities

use crate::entity::unexpected;
use crate::{
    Build, Cx, Entity, EntityInfo, EntityKey, Error, Node, Op, Result, Step, Wake, XValue,
};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Requesting,
    Holding,
    Releasing,
}

/// Occupy one unit of a resource for `duration`
///
/// With `queue_waiting` set, the request is abandoned once that much time
/// passes without a grant; the process then carries on without holding.
#[derive(Debug)]
pub struct ResourceActivity {
    info: EntityInfo,
    duration: XValue,
    patience: Option<XValue>,
    phase: Phase,
}

pub(crate) fn resource(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let key = b.resource(node)?;
    let mut info = b.info(node);
    info.shared = Some(key);
    let duration = b.xvalue(node, "duration", info.scope)?;
    let patience = b.optional_xvalue(node, "queue_waiting", info.scope)?;
    Ok(Box::new(ResourceActivity {
        info,
        duration,
        patience,
        phase: Phase::Idle,
    }))
}

impl ResourceActivity {
    fn key(&self) -> Result<EntityKey> {
        self.info
            .shared
            .clone()
            .ok_or_else(|| Error::UnknownSharedObject(self.info.key.to_string()))
    }
}

impl Entity for ResourceActivity {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match (self.phase, wake) {
            (_, Wake::Start) => {
                let resource = self.key()?;
                let op = match &self.patience {
                    Some(patience) => {
                        let patience = cx.read(patience)?;
                        Op::RequestWithin { resource, patience }
                    }
                    None => Op::Request(resource),
                };
                self.phase = Phase::Requesting;
                Ok(Step::Suspend(op))
            }
            (Phase::Requesting, Wake::Granted) => {
                self.phase = Phase::Holding;
                Ok(Step::Suspend(Op::Hold(cx.read(&self.duration)?)))
            }
            (Phase::Requesting, Wake::Reneged) => {
                self.phase = Phase::Idle;
                Ok(Step::Complete)
            }
            (Phase::Holding, Wake::Timeout) => {
                self.phase = Phase::Releasing;
                Ok(Step::Suspend(Op::Release(self.key()?)))
            }
            (Phase::Releasing, Wake::Granted) => {
                self.phase = Phase::Idle;
                Ok(Step::Complete)
            }
            (_, wake) => Err(unexpected(&self.info, &wake)),
        }
    }
}

/// Take from or add to a level, then optionally hold
#[derive(Debug)]
pub struct LevelActivity {
    info: EntityInfo,
    put: bool,
    amount: XValue,
    duration: Option<XValue>,
    phase: Phase,
}

pub(crate) fn level(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
    let key = b.level(node)?;
    let put = match node.optional_text("operation")?.unwrap_or("get") {
        "get" => false,
        "put" => true,
        other => {
            return Err(Error::invalid(
                &node.tag,
                "operation",
                format!("expected 'get' or 'put', got '{}'", other),
            ))
        }
    };
    let mut info = b.info(node);
    info.shared = Some(key);
    let amount = b.xvalue(node, "amount", info.scope)?;
    let duration = b.optional_xvalue(node, "duration", info.scope)?;
    Ok(Box::new(LevelActivity {
        info,
        put,
        amount,
        duration,
        phase: Phase::Idle,
    }))
}

impl Entity for LevelActivity {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        match (self.phase, wake) {
            (_, Wake::Start) => {
                let level = self
                    .info
                    .shared
                    .clone()
                    .ok_or_else(|| Error::UnknownSharedObject(self.info.key.to_string()))?;
                let amount = cx.read(&self.amount)?;
                self.phase = Phase::Requesting;
                Ok(Step::Suspend(if self.put {
                    Op::Put { level, amount }
                } else {
                    Op::Get { level, amount }
                }))
            }
            (Phase::Requesting, Wake::Granted) => match &self.duration {
                Some(duration) => {
                    self.phase = Phase::Holding;
                    Ok(Step::Suspend(Op::Hold(cx.read(duration)?)))
                }
                None => {
                    self.phase = Phase::Idle;
                    Ok(Step::Complete)
                }
            },
            (Phase::Holding, Wake::Timeout) => {
                self.phase = Phase::Idle;
                Ok(Step::Complete)
            }
            (_, wake) => Err(unexpected(&self.info, &wake)),
        }
    }
}
