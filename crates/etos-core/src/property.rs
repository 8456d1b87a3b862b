//! Property paths: `<scope>.<name>`
//!
//! | scope | alias | readable | writable |
//! |---|---|---|---|
//! | `actor` | `a` | bag, `t`, `id` | bag |
//! | `transaction` | `t` | bag, `t`, `id`, `pid`, `ppid`, `start` | bag |
//! | `simulation` | `s` | bag, `t`, `now` | bag |
//! | `entity` | `e` | `t`, `id`, `start` | - |
//! | `shared` | `eso` | `capacity`, `active`, `waiting`, `amount` | - |
//!
//! Built-in names shadow bag entries and are read-only.

use crate::actor::ActorProp;
use crate::simulation::Kernel;
use crate::{EntityInfo, Error, ProcessHeader, Result, SharedObject, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which object a path addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathScope {
    Actor,
    Transaction,
    Simulation,
    Entity,
    Shared,
}

impl PathScope {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "actor" | "a" => Some(PathScope::Actor),
            "transaction" | "t" => Some(PathScope::Transaction),
            "simulation" | "s" => Some(PathScope::Simulation),
            "entity" | "e" => Some(PathScope::Entity),
            "shared" | "eso" => Some(PathScope::Shared),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            PathScope::Actor => "actor",
            PathScope::Transaction => "transaction",
            PathScope::Simulation => "simulation",
            PathScope::Entity => "entity",
            PathScope::Shared => "shared",
        }
    }

    fn builtins(&self) -> &'static [&'static str] {
        match self {
            PathScope::Actor => &["t", "id"],
            PathScope::Transaction => &["t", "id", "pid", "ppid", "start"],
            PathScope::Simulation => &["t", "now"],
            PathScope::Entity => &["t", "id", "start"],
            PathScope::Shared => &["capacity", "active", "waiting", "amount"],
        }
    }
}

/// A parsed `<scope>.<name>` path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyPath {
    scope: PathScope,
    name: String,
}

impl PropertyPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = || Error::InvalidPropertyPath(path.to_string());
        let (scope, name) = path.trim().split_once('.').ok_or_else(invalid)?;
        let scope = PathScope::parse(scope).ok_or_else(invalid)?;
        if name.is_empty() || name.contains('.') {
            return Err(invalid());
        }
        Ok(Self {
            scope,
            name: name.to_string(),
        })
    }

    pub fn scope(&self) -> PathScope {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_builtin(&self) -> bool {
        self.scope.builtins().contains(&self.name.as_str())
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope.name(), self.name)
    }
}

fn not_found(path: &PropertyPath) -> Error {
    Error::PropertyNotFound(path.to_string())
}

/// Resolve a path for a process, as seen from `entity`
pub(crate) fn read(
    kernel: &mut Kernel,
    header: &ProcessHeader,
    entity: &EntityInfo,
    path: &PropertyPath,
) -> Result<Value> {
    let now = kernel.now().secs();
    let name = path.name.as_str();
    match path.scope {
        PathScope::Actor => {
            let actor = kernel
                .actors
                .get(&header.actor)
                .ok_or_else(|| not_found(path))?;
            match name {
                "t" => Ok(Value::Float(kernel.scopes.local_time(actor.scope(), now)?)),
                "id" => Ok(Value::from(actor.id().raw())),
                _ => match actor.get(name).cloned() {
                    Some(ActorProp::Value(v)) => Ok(v),
                    Some(ActorProp::Lazy(x)) => Ok(Value::Float(kernel.read(&x)?)),
                    None => Err(not_found(path)),
                },
            }
        }
        PathScope::Transaction => match name {
            "t" => Ok(Value::Float(kernel.scopes.local_time(header.scope, now)?)),
            "id" => Ok(Value::from(header.id)),
            "pid" => Ok(Value::from(header.pid.raw())),
            "ppid" => Ok(header.ppid.map_or(Value::Null, |p| Value::from(p.raw()))),
            "start" => Ok(Value::Float(header.start.secs())),
            _ => kernel
                .bags
                .get(&header.id)
                .and_then(|bag| bag.get(name))
                .cloned()
                .ok_or_else(|| not_found(path)),
        },
        PathScope::Simulation => match name {
            "t" => Ok(Value::Float(kernel.simulation_time()?)),
            "now" => Ok(Value::Float(now)),
            _ => kernel
                .globals
                .get(name)
                .cloned()
                .ok_or_else(|| not_found(path)),
        },
        PathScope::Entity => match name {
            "t" => Ok(Value::Float(kernel.scopes.local_time(entity.scope, now)?)),
            "id" => Ok(Value::from(entity.key.as_str())),
            "start" => Ok(Value::Float(kernel.scopes.get(entity.scope)?.origin())),
            _ => Err(not_found(path)),
        },
        PathScope::Shared => {
            let key = entity.shared.as_ref().ok_or_else(|| not_found(path))?;
            let object = kernel
                .shared
                .get(key)
                .ok_or_else(|| Error::UnknownSharedObject(key.to_string()))?;
            match (name, object) {
                ("capacity", object) => Ok(Value::Float(object.capacity())),
                ("active", SharedObject::Resource(r)) => Ok(Value::from(r.active().len())),
                ("waiting", SharedObject::Resource(r)) => Ok(Value::from(r.waiting_len())),
                ("amount", SharedObject::Level(l)) => Ok(Value::Float(l.amount())),
                ("waiting", SharedObject::Level(l)) => {
                    Ok(Value::from(l.getters_len() + l.putters_len()))
                }
                _ => Err(not_found(path)),
            }
        }
    }
}

/// Write a bag entry; built-ins, entities and shared objects are read-only
pub(crate) fn write(
    kernel: &mut Kernel,
    header: &ProcessHeader,
    path: &PropertyPath,
    value: Value,
) -> Result<()> {
    if path.is_builtin() {
        return Err(Error::ReadOnlyProperty(path.to_string()));
    }
    match path.scope {
        PathScope::Actor => {
            let actor = kernel
                .actors
                .get_mut(&header.actor)
                .ok_or_else(|| not_found(path))?;
            actor.set(path.name.clone(), value);
        }
        PathScope::Transaction => {
            kernel
                .bags
                .entry(header.id)
                .or_default()
                .insert(path.name.clone(), value);
        }
        PathScope::Simulation => {
            kernel.globals.insert(path.name.clone(), value);
        }
        PathScope::Entity | PathScope::Shared => {
            return Err(Error::ReadOnlyProperty(path.to_string()));
        }
    }
    Ok(())
}
