//! Entities: units of timed behaviour within a process
//!
//! Every entity is a resumable state machine. `resume(cx, Wake::Start)`
//! (re)starts it from the beginning; any other wake continues it from the
//! operation it last suspended on. The parent enters the entity's scope
//! before starting it, so random attributes are redrawn once per
//! activation.

use crate::{Cx, EntityKey, Error, Result, ScopeId, Step, Wake};
use std::fmt;

/// Identity of an entity instance
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    /// Tag the entity was built from
    pub tag: String,
    /// Explicit or surrogate id
    pub key: EntityKey,
    /// Scope anchored at the entity's start
    pub scope: ScopeId,
    /// Key of the shared object the entity operates on
    pub shared: Option<EntityKey>,
}

/// A unit of timed behaviour
pub trait Entity: fmt::Debug {
    fn info(&self) -> &EntityInfo;

    /// Advance the state machine
    fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step>;

    /// Called once after all siblings are built, with the neighbours in
    /// document order
    fn link(&mut self, _prev: Option<&EntityInfo>, _next: Option<&EntityInfo>) -> Result<()> {
        Ok(())
    }
}

/// Error for a wake the entity's current phase cannot accept
pub(crate) fn unexpected(info: &EntityInfo, wake: &Wake) -> Error {
    Error::UnexpectedWake {
        tag: info.tag.clone(),
        wake: format!("{:?}", wake),
    }
}

/// Enter the entity's scope and start it
pub fn activate(entity: &mut dyn Entity, cx: &mut Cx<'_>) -> Result<Step> {
    cx.enter(entity.info().scope)?;
    entity.resume(cx, Wake::Start)
}

/// Entities executed strictly in order; a raised signal stops the
/// sequence and is passed up unchanged
#[derive(Debug)]
pub struct Sequence {
    entities: Vec<Box<dyn Entity>>,
    current: usize,
}

impl Sequence {
    pub fn new(entities: Vec<Box<dyn Entity>>) -> Self {
        Self {
            entities,
            current: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn resume(&mut self, cx: &mut Cx<'_>, wake: Wake) -> Result<Step> {
        let mut step = match wake {
            Wake::Start => {
                self.current = 0;
                match self.entities.first_mut() {
                    Some(first) => activate(first.as_mut(), cx)?,
                    None => return Ok(Step::Complete),
                }
            }
            wake => match self.entities.get_mut(self.current) {
                Some(entity) => entity.resume(cx, wake)?,
                None => return Ok(Step::Complete),
            },
        };
        loop {
            match step {
                Step::Complete => {
                    self.current += 1;
                    match self.entities.get_mut(self.current) {
                        Some(next) => step = activate(next.as_mut(), cx)?,
                        None => return Ok(Step::Complete),
                    }
                }
                other => return Ok(other),
            }
        }
    }
}
