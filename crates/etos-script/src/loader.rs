//! RON document loader

use crate::error::{Error, Result};
use etos_core::{Attr, Node, Parameters, SimConfig, TransactionSpec};
use indexmap::IndexMap;
use ron::extensions::Extensions;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// Parse a document; optional fields such as `id` are written bare
fn parse<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(ron::Options::default()
        .with_default_extension(Extensions::IMPLICIT_SOME)
        .from_str(content)?)
}

/// Entity definitions shared between transaction documents
///
/// A transaction node with the same tag and id as a definition inherits the
/// attributes it does not set itself, and the definition's children when it
/// has none.
#[derive(Debug, Default, Clone)]
pub struct EntityLibrary {
    definitions: IndexMap<(String, String), Node>,
}

impl EntityLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition; it must carry an explicit id
    pub fn insert(&mut self, node: Node) -> Result<()> {
        let id = node
            .id
            .clone()
            .ok_or_else(|| Error::InvalidSchema(format!("<{}> definition without id", node.tag)))?;
        let key = (node.tag.clone(), id);
        if self.definitions.contains_key(&key) {
            return Err(Error::DuplicateDefinition(format!("{} '{}'", key.0, key.1)));
        }
        self.definitions.insert(key, node);
        Ok(())
    }

    /// Get a definition by tag and id
    pub fn get(&self, tag: &str, id: &str) -> Option<&Node> {
        self.definitions.get(&(tag.to_string(), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Complete `node` and its descendants from the library
    fn merge(&self, node: &mut Node) {
        if let Some(def) = node.id.as_deref().and_then(|id| self.get(&node.tag, id)) {
            for (name, attr) in &def.attrs {
                if !node.attrs.contains_key(name) {
                    node.attrs.insert(name.clone(), attr.clone());
                }
            }
            if node.children.is_empty() {
                node.children = def.children.clone();
            }
        }
        for child in node.children.iter_mut() {
            self.merge(Rc::make_mut(child));
        }
    }
}

/// Loader for RON simulation documents
#[derive(Debug, Default)]
pub struct Loader {
    library: EntityLibrary,
    parameters: Parameters,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter used by `Param` attributes
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Attr>) {
        self.parameters.insert(name.into(), value.into());
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn library(&self) -> &EntityLibrary {
        &self.library
    }

    /// Load a parameter set: `{ "name": Num(1.0), ... }`
    ///
    /// Later sets override earlier bindings.
    pub fn load_parameters_str(&mut self, content: &str) -> Result<()> {
        let parameters: Parameters = parse(content)?;
        for (name, attr) in parameters {
            if matches!(attr, Attr::Param(_)) {
                return Err(Error::InvalidSchema(format!(
                    "parameter '{}' is bound to another parameter",
                    name
                )));
            }
            self.parameters.insert(name, attr);
        }
        Ok(())
    }

    /// Load entity definitions from a RON string: `(entities: [...])`
    pub fn load_str(&mut self, content: &str) -> Result<()> {
        #[derive(Deserialize)]
        struct LibraryFile {
            entities: Vec<Node>,
        }

        let file: LibraryFile = parse(content)?;
        for node in file.entities {
            self.library.insert(node)?;
        }
        Ok(())
    }

    /// Load entity definitions from a file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let content = fs::read_to_string(path)?;
        self.load_str(&content)
    }

    /// Load entity definitions from every `.ron` file under a directory
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {:?}", path),
            )));
        }

        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        // Directory order is platform dependent
        entries.sort();

        for file_path in entries {
            if file_path.extension().map(|e| e == "ron").unwrap_or(false) {
                self.load_file(&file_path)?;
            } else if file_path.is_dir() {
                self.load_directory(&file_path)?;
            }
        }

        Ok(())
    }

    /// Prepare a transaction document from a RON string
    pub fn transaction_str(&self, content: &str) -> Result<TransactionSpec> {
        let mut root: Node = parse(content)?;
        self.library.merge(&mut root);
        self.check_parameters(&root)?;
        Ok(TransactionSpec::new(root, &self.parameters)?)
    }

    /// Prepare a transaction document from a file
    pub fn transaction_file(&self, path: impl AsRef<Path>) -> Result<TransactionSpec> {
        let content = fs::read_to_string(path)?;
        self.transaction_str(&content)
    }

    fn check_parameters(&self, root: &Node) -> Result<()> {
        root.walk(&mut |node| {
            for attr in node.attrs.values() {
                if let Attr::Param(name) = attr {
                    if !self.parameters.contains_key(name) {
                        return Err(etos_core::Error::UnresolvedParameter(name.clone()));
                    }
                }
            }
            Ok(())
        })
        .map_err(|e| match e {
            etos_core::Error::UnresolvedParameter(name) => Error::UnknownParameter(name),
            other => Error::Core(other),
        })
    }

    /// Parse a simulation configuration; omitted fields keep their defaults
    pub fn load_config_str(content: &str) -> Result<SimConfig> {
        parse(content)
    }

    pub fn load_config_file(path: impl AsRef<Path>) -> Result<SimConfig> {
        let content = fs::read_to_string(path)?;
        Self::load_config_str(&content)
    }
}
