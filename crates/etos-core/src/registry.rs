//! Entity library and the entity factory
//!
//! A [`Registry`] maps tags to constructors. Registration happens before a
//! run; [`Registry::validate`] rejects documents with unknown tags before
//! anything is built. Constructors receive a [`Build`], which binds
//! attributes to scopes and creates shared objects on first reference.

use crate::actor::ActorProp;
use crate::simulation::Kernel;
use crate::{
    activities, control, resources, transaction, ActorId, Attr, DayTime, Entity, EntityInfo,
    EntityKey, Error, Level, Node, Resource, Result, ScopeId, SharedObject, TimeBase, ValueMap,
    XSource, XValue, DATA_TAGS,
};
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Builds an entity from its node
pub type Constructor = fn(&Rc<Node>, &mut Build<'_>) -> Result<Box<dyn Entity>>;

/// Tag to constructor mapping
#[derive(Clone, Default)]
pub struct Registry {
    constructors: IndexMap<String, Constructor>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

impl Registry {
    /// An empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard entity library
    pub fn standard() -> Self {
        let table: &[(&str, Constructor)] = &[
            ("pause", activities::pause),
            ("pause_to", activities::pause_to),
            ("connection", activities::connection),
            ("trace", activities::trace),
            ("set", activities::set),
            ("stop_simulation", activities::stop_simulation),
            ("exception", activities::exception),
            ("exit", activities::exit),
            ("checkpoint", activities::checkpoint),
            ("resource", resources::resource),
            ("parking", resources::resource),
            ("fuel_station", resources::resource),
            ("level", resources::level),
            ("tank", resources::level),
            ("infinity_loop", control::infinity_loop),
            ("counted_loop", control::counted_loop),
            ("while", control::while_loop),
            ("while_in_range", control::while_in_range),
            ("block", control::block),
            ("try_catch", control::try_catch),
            ("if", control::if_branch),
            ("if_in_range", control::if_in_range),
            ("with", control::with_probability),
            ("transaction", transaction::sub_transaction),
            ("start_transaction", transaction::start_transaction),
        ];
        let mut registry = Self::new();
        for (tag, ctor) in table {
            registry.constructors.insert(tag.to_string(), *ctor);
        }
        registry
    }

    /// Add an entity kind
    pub fn register(&mut self, tag: impl Into<String>, ctor: Constructor) -> Result<()> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(Error::InvalidStructure("empty entity tag".to_string()));
        }
        if self.constructors.contains_key(&tag) || DATA_TAGS.contains(&tag.as_str()) {
            return Err(Error::DuplicateTag(tag));
        }
        self.constructors.insert(tag, ctor);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Check every tag of a document; data nodes are skipped with their
    /// subtrees
    pub fn validate(&self, node: &Node) -> Result<()> {
        if DATA_TAGS.contains(&node.tag.as_str()) {
            return Ok(());
        }
        if !self.contains(&node.tag) {
            return Err(Error::UnknownTag(node.tag.clone()));
        }
        node.children.iter().try_for_each(|child| self.validate(child))
    }

    fn constructor(&self, tag: &str) -> Result<Constructor> {
        self.constructors
            .get(tag)
            .copied()
            .ok_or_else(|| Error::UnknownTag(tag.to_string()))
    }
}

/// Entity factory state for one process
pub struct Build<'a> {
    kernel: &'a mut Kernel,
    registry: &'a Registry,
    owned: Vec<ScopeId>,
    actor: Option<ActorId>,
}

impl<'a> Build<'a> {
    pub(crate) fn new(kernel: &'a mut Kernel, registry: &'a Registry) -> Self {
        Self {
            kernel,
            registry,
            owned: Vec::new(),
            actor: None,
        }
    }

    /// Scopes created so far, handed over to the process
    pub(crate) fn finish(self) -> Vec<ScopeId> {
        self.owned
    }

    /// Drop everything created by a failed build
    pub(crate) fn abandon(self) {
        for scope in self.owned {
            self.kernel.scopes.release(scope);
        }
        if let Some(actor) = self.actor.and_then(|id| self.kernel.actors.shift_remove(&id)) {
            self.kernel.scopes.release(actor.scope());
        }
    }

    /// A new scope owned by the process being built
    pub fn scope(&mut self) -> ScopeId {
        let scope = self.kernel.scopes.create(TimeBase::Elapsed);
        self.owned.push(scope);
        scope
    }

    /// Identity of the entity built from `node`, with a fresh scope
    pub fn info(&mut self, node: &Node) -> EntityInfo {
        EntityInfo {
            tag: node.tag.clone(),
            key: node.key(),
            scope: self.scope(),
            shared: None,
        }
    }

    /// Build one entity
    pub fn entity(&mut self, node: &Rc<Node>) -> Result<Box<dyn Entity>> {
        let ctor = self.registry.constructor(&node.tag)?;
        ctor(node, self)
    }

    /// Build the entity children of `node` in document order and link
    /// neighbours
    pub fn children(&mut self, node: &Rc<Node>) -> Result<Vec<Box<dyn Entity>>> {
        let mut entities = node
            .entity_children()
            .map(|child| self.entity(child))
            .collect::<Result<Vec<_>>>()?;
        let infos: Vec<EntityInfo> = entities.iter().map(|e| e.info().clone()).collect();
        for (i, entity) in entities.iter_mut().enumerate() {
            let prev = i.checked_sub(1).and_then(|j| infos.get(j));
            entity.link(prev, infos.get(i + 1))?;
        }
        Ok(entities)
    }

    /// Bind a required attribute in `scope`
    pub fn xvalue(&mut self, node: &Node, name: &str, scope: ScopeId) -> Result<XValue> {
        let attr = node.get(name).ok_or_else(|| Error::missing(&node.tag, name))?;
        self.bind(node, name, attr, scope)
    }

    /// Bind an optional attribute in `scope`
    pub fn optional_xvalue(
        &mut self,
        node: &Node,
        name: &str,
        scope: ScopeId,
    ) -> Result<Option<XValue>> {
        node.get(name)
            .map(|attr| self.bind(node, name, attr, scope))
            .transpose()
    }

    /// Read a configuration attribute in the simulation scope
    pub fn constant(&mut self, node: &Node, name: &str) -> Result<f64> {
        let scope = self.kernel.sim_scope;
        let value = self.xvalue(node, name, scope)?;
        self.kernel.read(&value)
    }

    pub fn optional_constant(&mut self, node: &Node, name: &str) -> Result<Option<f64>> {
        let scope = self.kernel.sim_scope;
        match self.optional_xvalue(node, name, scope)? {
            Some(value) => Ok(Some(self.kernel.read(&value)?)),
            None => Ok(None),
        }
    }

    fn bind(&mut self, node: &Node, name: &str, attr: &Attr, scope: ScopeId) -> Result<XValue> {
        match attr {
            Attr::Int(i) => Ok(XValue::Fixed(*i as f64)),
            Attr::Num(x) => Ok(XValue::Fixed(*x)),
            Attr::Bool(b) => Ok(XValue::Fixed(if *b { 1.0 } else { 0.0 })),
            Attr::Str(s) => parse_number(s).map(XValue::Fixed).ok_or_else(|| {
                Error::invalid(&node.tag, name, format!("'{}' is not a number or day-time", s))
            }),
            Attr::Dist(dist) => self
                .kernel
                .scopes
                .bind(scope, XSource::Random(dist.clone())),
            Attr::Clock => self.kernel.scopes.clock(scope),
            Attr::Param(param) => Err(Error::UnresolvedParameter(param.clone())),
        }
    }

    /// The resource shared under this node's key, created on first
    /// reference
    pub fn resource(&mut self, node: &Node) -> Result<EntityKey> {
        let key = node.key();
        if !self.kernel.shared.exists(&key, "resource")? {
            let capacity = self.constant(node, "capacity")?;
            if capacity.fract() != 0.0 || capacity < 1.0 {
                return Err(Error::InvalidCapacity {
                    key: key.to_string(),
                    reason: format!("resource capacity must be a positive integer, got {}", capacity),
                });
            }
            let resource = Resource::new(key.clone(), capacity as usize)?;
            self.kernel
                .shared
                .insert(key.clone(), SharedObject::Resource(resource));
        }
        Ok(key)
    }

    /// The level shared under this node's key, created on first reference
    pub fn level(&mut self, node: &Node) -> Result<EntityKey> {
        let key = node.key();
        if !self.kernel.shared.exists(&key, "level")? {
            let capacity = self.constant(node, "capacity")?;
            let initial = self.optional_constant(node, "initialAmount")?.unwrap_or(0.0);
            let level = Level::new(key.clone(), capacity, initial)?;
            self.kernel.shared.insert(key.clone(), SharedObject::Level(level));
        }
        Ok(key)
    }

    /// Create the actor of a top-level process from the node's `actor`
    /// child and the caller's initial values
    pub(crate) fn actor(&mut self, node: &Node, initial: Option<ValueMap>) -> Result<ActorId> {
        let (id, scope) = self.kernel.new_actor()?;
        self.actor = Some(id);
        let mut props = Vec::new();
        if let Some(decl) = node.find_child("actor") {
            for (name, attr) in &decl.attrs {
                let prop = match attr {
                    Attr::Str(s) => ActorProp::Value(s.as_str().into()),
                    Attr::Int(i) => ActorProp::Value((*i).into()),
                    Attr::Bool(b) => ActorProp::Value((*b).into()),
                    attr => {
                        let value = self.bind(decl, name, attr, scope)?;
                        match value {
                            XValue::Fixed(x) => ActorProp::Value(x.into()),
                            lazy => ActorProp::Lazy(lazy),
                        }
                    }
                };
                props.push((name.clone(), prop));
            }
        }
        if let Some(actor) = self.kernel.actors.get_mut(&id) {
            for (name, prop) in props {
                actor.declare(name, prop);
            }
            for (name, value) in initial.unwrap_or_default() {
                actor.set(name, value);
            }
        }
        Ok(id)
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .or_else(|| DayTime::parse(text).map(|d| d.total_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cx, Step, Wake};

    #[derive(Debug)]
    struct Noop(EntityInfo);

    impl Entity for Noop {
        fn info(&self) -> &EntityInfo {
            &self.0
        }

        fn resume(&mut self, _cx: &mut Cx<'_>, _wake: Wake) -> Result<Step> {
            Ok(Step::Complete)
        }
    }

    fn noop(node: &Rc<Node>, b: &mut Build<'_>) -> Result<Box<dyn Entity>> {
        Ok(Box::new(Noop(b.info(node))))
    }

    #[test]
    fn test_register() {
        let mut registry = Registry::standard();
        assert!(registry.contains("pause"));
        registry.register("charger", noop).unwrap();
        assert!(registry.contains("charger"));
        assert_eq!(
            registry.register("charger", noop).unwrap_err(),
            Error::DuplicateTag("charger".into())
        );
        assert!(registry.register("", noop).is_err());
        assert!(registry.register("actor", noop).is_err());
    }

    #[test]
    fn test_validate() {
        let registry = Registry::standard();
        let doc = Node::new("transaction")
            .child(Node::new("actor").child(Node::new("whatever")))
            .child(
                Node::new("checkpoint").child(Node::new("measure").attr("property", "t.t")),
            )
            .child(Node::new("counted_loop").child(Node::new("pause")));
        registry.validate(&doc).unwrap();

        let bad = doc.child(Node::new("block").child(Node::new("teleport")));
        assert_eq!(
            registry.validate(&bad).unwrap_err(),
            Error::UnknownTag("teleport".into())
        );
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("00:02"), Some(120.0));
        assert_eq!(parse_number("soon"), None);
    }
}
