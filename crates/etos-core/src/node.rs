//! Declarative node tree consumed by the entity factory
//!
//! A document is a tree of tagged nodes. Every node becomes an entity
//! (or data consumed by its parent, such as `actor` and `measure`).
//! Attribute values stay declarative until the factory turns them into
//! scoped values.

use crate::{Distribution, Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Tags that carry data for their parent instead of becoming entities
pub const DATA_TAGS: &[&str] = &["actor", "measure"];

/// A declarative attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attr {
    /// Integral constant
    Int(i64),
    /// Floating point constant
    Num(f64),
    /// Boolean constant
    Bool(bool),
    /// Text (names, property paths, day-time literals such as "01:30")
    Str(String),
    /// Random value drawn from a distribution once per scope activation
    Dist(Distribution),
    /// Local time of the owning scope
    Clock,
    /// Reference to an external parameter, resolved at load time
    Param(String),
}

impl Attr {
    /// Text content, if this is a string attribute
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether binding this attribute resolves to a constant
    pub fn is_constant(&self) -> bool {
        matches!(self, Attr::Int(_) | Attr::Num(_) | Attr::Bool(_) | Attr::Str(_))
    }
}

impl From<f64> for Attr {
    fn from(v: f64) -> Self {
        Attr::Num(v)
    }
}

impl From<i64> for Attr {
    fn from(v: i64) -> Self {
        Attr::Int(v)
    }
}

impl From<bool> for Attr {
    fn from(v: bool) -> Self {
        Attr::Bool(v)
    }
}

impl From<&str> for Attr {
    fn from(v: &str) -> Self {
        Attr::Str(v.to_string())
    }
}

impl From<Distribution> for Attr {
    fn from(v: Distribution) -> Self {
        Attr::Dist(v)
    }
}

/// Named constants bindable into any attribute before a run
pub type Parameters = IndexMap<String, Attr>;

/// One node of a declarative document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Entity kind (looked up in the registry)
    pub tag: String,
    /// Explicit identity; surrogates are assigned for nodes without one
    #[serde(default)]
    pub id: Option<String>,
    /// Attributes by name
    #[serde(default)]
    pub attrs: IndexMap<String, Attr>,
    /// Child nodes in document order
    #[serde(default)]
    pub children: Vec<Rc<Node>>,
}

impl Node {
    /// Create an empty node
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            attrs: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder: set the explicit id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: add an attribute
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Attr>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Builder: append a child
    pub fn child(mut self, node: Node) -> Self {
        self.children.push(Rc::new(node));
        self
    }

    /// Get an attribute
    pub fn get(&self, name: &str) -> Option<&Attr> {
        self.attrs.get(name)
    }

    /// Get a string attribute, failing if it is missing or not text
    pub fn text(&self, name: &str) -> Result<&str> {
        match self.attrs.get(name) {
            Some(Attr::Str(s)) => Ok(s),
            Some(_) => Err(Error::invalid(&self.tag, name, "expected text")),
            None => Err(Error::missing(&self.tag, name)),
        }
    }

    /// Get an optional string attribute
    pub fn optional_text(&self, name: &str) -> Result<Option<&str>> {
        match self.attrs.get(name) {
            Some(Attr::Str(s)) => Ok(Some(s)),
            Some(_) => Err(Error::invalid(&self.tag, name, "expected text")),
            None => Ok(None),
        }
    }

    /// Children that become entities (data tags skipped)
    pub fn entity_children(&self) -> impl Iterator<Item = &Rc<Node>> {
        self.children
            .iter()
            .filter(|c| !DATA_TAGS.contains(&c.tag.as_str()))
    }

    /// First child with the given tag
    pub fn find_child(&self, tag: &str) -> Option<&Rc<Node>> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Identity of the entity built from this node
    pub fn key(&self) -> crate::EntityKey {
        crate::EntityKey::new(self.id.clone().unwrap_or_else(|| self.tag.clone()))
    }

    /// Replace every `Param` attribute in the tree by its bound constant
    pub fn bind_parameters(&mut self, parameters: &Parameters) -> Result<()> {
        for (name, attr) in self.attrs.iter_mut() {
            if let Attr::Param(param) = attr {
                let bound = parameters
                    .get(param.as_str())
                    .ok_or_else(|| Error::UnresolvedParameter(param.clone()))?;
                if matches!(bound, Attr::Param(_)) {
                    return Err(Error::invalid(&self.tag, name, "parameter bound to parameter"));
                }
                *attr = bound.clone();
            }
        }
        for child in self.children.iter_mut() {
            Rc::make_mut(child).bind_parameters(parameters)?;
        }
        Ok(())
    }

    /// Give every node without an explicit id a surrogate `tag#n`
    ///
    /// Numbering is a pre-order walk, so the same document always yields
    /// the same surrogates.
    pub fn assign_surrogates(&mut self) {
        let mut counter = 0usize;
        self.assign_from(&mut counter);
    }

    fn assign_from(&mut self, counter: &mut usize) {
        if self.id.is_none() {
            self.id = Some(format!("{}#{}", self.tag, counter));
        }
        *counter += 1;
        for child in self.children.iter_mut() {
            Rc::make_mut(child).assign_from(counter);
        }
    }

    /// Visit the node and all descendants (pre-order)
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node) -> Result<()>) -> Result<()> {
        visit(self)?;
        for child in &self.children {
            child.walk(visit)?;
        }
        Ok(())
    }
}

/// A loaded, parameter-bound transaction document ready to be started
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSpec {
    root: Rc<Node>,
}

impl TransactionSpec {
    /// Prepare a document: bind parameters and assign surrogate ids
    pub fn new(mut root: Node, parameters: &Parameters) -> Result<Self> {
        if root.tag != "transaction" {
            return Err(Error::InvalidStructure(format!(
                "document root must be <transaction>, found <{}>",
                root.tag
            )));
        }
        root.bind_parameters(parameters)?;
        root.assign_surrogates();
        Ok(Self {
            root: Rc::new(root),
        })
    }

    /// The root `transaction` node
    pub fn root(&self) -> &Rc<Node> {
        &self.root
    }
}
