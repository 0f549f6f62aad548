//! Tag registry: which XML element is parsed by which production.
//!
//! Every supported element is registered under its namespace-qualified name
//! together with the capabilities of the node it produces. A production asks
//! for a child with a set of acceptable capabilities; the registry rejects
//! unknown tags and tags whose capabilities do not fit that position.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use roxmltree::Node;

use crate::ast::AstNode;
use crate::error::{FesError, Result};
use crate::parser::Parser;
use crate::xml::{ElementExt, QName};

/// The roles a parsed node can play inside its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// A document root (`Filter`, `SortBy`).
    Root,
    Expression,
    Predicate,
    Identifier,
    Geometry,
    TemporalPrimitive,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Root => "root element",
            Capability::Expression => "expression",
            Capability::Predicate => "predicate",
            Capability::Identifier => "resource identifier",
            Capability::Geometry => "geometry",
            Capability::TemporalPrimitive => "temporal element",
        };
        f.write_str(name)
    }
}

pub type NodeParser = fn(&Parser<'_>, Node<'_, '_>) -> Result<AstNode>;

#[derive(Clone, Copy)]
pub struct TagEntry {
    /// Production name, used in logs.
    pub production: &'static str,
    pub capabilities: &'static [Capability],
    pub parse: NodeParser,
}

impl TagEntry {
    pub fn new(production: &'static str, capabilities: &'static [Capability], parse: NodeParser) -> Self {
        Self {
            production,
            capabilities,
            parse,
        }
    }

    fn fits(&self, allowed: &[Capability]) -> bool {
        self.capabilities.iter().any(|c| allowed.contains(c))
    }
}

impl fmt::Debug for TagEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagEntry")
            .field("production", &self.production)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct TagRegistry {
    entries: HashMap<QName, TagEntry>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every FES 2.0 and GML production.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        crate::parser::register_fes_tags(&mut registry)?;
        crate::gml::register_gml_tags(&mut registry)?;
        Ok(registry)
    }

    /// Register a production. Registering the same name twice is a
    /// configuration error.
    pub fn register(&mut self, namespace: &str, local: &str, entry: TagEntry) -> Result<()> {
        let qname = QName::new(namespace, local);
        if let Some(existing) = self.entries.get(&qname) {
            return Err(FesError::Invariant(format!(
                "tag {} is already registered to {}, cannot register {}",
                qname, existing.production, entry.production
            )));
        }
        self.entries.insert(qname, entry);
        Ok(())
    }

    pub fn resolve(&self, qname: &QName) -> Result<&TagEntry> {
        self.entries
            .get(qname)
            .ok_or_else(|| FesError::UnsupportedTag(qname.to_string()))
    }

    pub fn contains(&self, qname: &QName) -> bool {
        self.entries.contains_key(qname)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `el` with its registered production, provided it may appear
    /// where one of `allowed` is expected.
    pub fn dispatch(&self, parser: &Parser<'_>, el: Node<'_, '_>, allowed: &[Capability]) -> Result<AstNode> {
        let entry = self.resolve(&el.qname())?;
        if !entry.fits(allowed) {
            let expected: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            return Err(FesError::UnexpectedNode {
                found: el.describe(),
                expected: expected.join(", "),
            });
        }
        tracing::trace!(tag = %el.tag_name().name(), production = entry.production, "dispatch");
        (entry.parse)(parser, el)
    }
}

/// The default registry, built on first use.
pub static TAGS: Lazy<TagRegistry> = Lazy::new(|| match TagRegistry::with_defaults() {
    Ok(registry) => registry,
    Err(err) => panic!("invalid default tag registry: {err}"),
});
