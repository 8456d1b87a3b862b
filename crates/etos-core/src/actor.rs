//! Actors: the simulated subjects moved by transactions
//!
//! An actor is a property bag shared by a transaction and all its nested
//! transactions. Declared properties may be lazy; the actor scope is
//! entered once at creation, so a random property is drawn once per actor.

use crate::{ActorId, ScopeId, Value, ValueMap, XValue};
use indexmap::IndexMap;

/// A property of an actor
#[derive(Debug, Clone, PartialEq)]
pub enum ActorProp {
    Value(Value),
    Lazy(XValue),
}

/// The simulated subject of a transaction
#[derive(Debug, Clone)]
pub struct Actor {
    id: ActorId,
    scope: ScopeId,
    props: IndexMap<String, ActorProp>,
}

impl Actor {
    pub fn new(id: ActorId, scope: ScopeId) -> Self {
        Self {
            id,
            scope,
            props: IndexMap::new(),
        }
    }

    /// Builder: start from plain values
    pub fn with_values(mut self, values: ValueMap) -> Self {
        for (name, value) in values {
            self.props.insert(name, ActorProp::Value(value));
        }
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Scope owning the actor's lazy properties
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn get(&self, name: &str) -> Option<&ActorProp> {
        self.props.get(name)
    }

    /// Set a property, replacing a lazy one
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.props.insert(name.into(), ActorProp::Value(value));
    }

    pub(crate) fn declare(&mut self, name: impl Into<String>, prop: ActorProp) {
        self.props.insert(name.into(), prop);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_lazy() {
        let mut actor = Actor::new(ActorId(1), ScopeId(0));
        actor.declare("speed", ActorProp::Lazy(XValue::Fixed(3.0)));
        actor.set("speed", Value::Float(4.0));
        assert_eq!(actor.get("speed"), Some(&ActorProp::Value(Value::Float(4.0))));
    }

    #[test]
    fn test_with_values() {
        let mut values = ValueMap::new();
        values.insert("name".into(), Value::from("car"));
        values.insert("battery".into(), Value::Float(0.8));
        let actor = Actor::new(ActorId(2), ScopeId(1)).with_values(values);
        assert_eq!(actor.names().collect::<Vec<_>>(), vec!["name", "battery"]);
        assert_eq!(actor.id(), ActorId(2));
    }
}
