//! Attribute tree
//!
//! Maps hierarchical string paths (e.g. `Requester/7/number`) to stable
//! integer identifiers. Identifiers are handed out from an append-only arena,
//! so a path keeps its identifier for the lifetime of the tree.

use crate::types::{AttributeId, Result, TraceError};
use std::collections::HashMap;

/// Path segment matching every child of the parent attribute
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<AttributeId>,
    /// Children in creation order
    children: Vec<AttributeId>,
    /// Child lookup by name
    child_index: HashMap<String, AttributeId>,
}

impl Node {
    fn new(name: String, parent: Option<AttributeId>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            child_index: HashMap::new(),
        }
    }
}

/// Arena of attributes keyed by path segment
#[derive(Debug, Clone)]
pub struct AttributeTree {
    nodes: Vec<Node>,
}

impl AttributeTree {
    /// Create a tree holding only the root attribute
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(String::new(), None)],
        }
    }

    /// Number of attributes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if only the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    fn node(&self, attribute: AttributeId) -> Result<&Node> {
        self.nodes
            .get(attribute.index())
            .ok_or(TraceError::UnknownAttribute(attribute))
    }

    /// Get the identifier of `path`, creating every missing segment
    pub fn get_or_add<S: AsRef<str>>(&mut self, path: &[S]) -> Result<AttributeId> {
        let mut current = AttributeId::ROOT;
        for segment in path {
            let segment = segment.as_ref();
            if segment.is_empty() || segment == WILDCARD {
                return Err(TraceError::InvalidPath(join_path(path)));
            }
            let existing = self.nodes[current.index()].child_index.get(segment).copied();
            current = match existing {
                Some(child) => child,
                None => self.push_child(current, segment),
            };
        }
        Ok(current)
    }

    fn push_child(&mut self, parent: AttributeId, name: &str) -> AttributeId {
        let id = AttributeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(name.to_string(), Some(parent)));
        let parent_node = &mut self.nodes[parent.index()];
        parent_node.children.push(id);
        parent_node.child_index.insert(name.to_string(), id);
        log::trace!("Added attribute {} '{}' under {}", id, name, parent);
        id
    }

    /// Look up an exact path from the root, without creating anything
    pub fn opt_attribute<S: AsRef<str>>(&self, path: &[S]) -> Option<AttributeId> {
        self.opt_attribute_relative(AttributeId::ROOT, path)
    }

    /// Look up an exact path below `start`, without creating anything
    pub fn opt_attribute_relative<S: AsRef<str>>(
        &self,
        start: AttributeId,
        path: &[S],
    ) -> Option<AttributeId> {
        path.iter().try_fold(start, |current, segment| {
            self.nodes
                .get(current.index())?
                .child_index
                .get(segment.as_ref())
                .copied()
        })
    }

    /// Resolve a path pattern where any segment may be [`WILDCARD`]
    ///
    /// Matches are returned in depth-first creation order. A pattern that
    /// names a missing segment resolves to nothing.
    pub fn resolve<S: AsRef<str>>(&self, pattern: &[S]) -> Vec<AttributeId> {
        let mut current = vec![AttributeId::ROOT];
        for segment in pattern {
            let segment = segment.as_ref();
            let mut next = Vec::new();
            for attribute in current {
                let node = &self.nodes[attribute.index()];
                if segment == WILDCARD {
                    next.extend(node.children.iter().copied());
                } else if let Some(child) = node.child_index.get(segment) {
                    next.push(*child);
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }

    /// Direct children of `attribute`, in creation order
    pub fn children_of(&self, attribute: AttributeId) -> Result<&[AttributeId]> {
        Ok(&self.node(attribute)?.children)
    }

    /// Last path segment of `attribute` (empty for the root)
    pub fn name_of(&self, attribute: AttributeId) -> Result<&str> {
        Ok(&self.node(attribute)?.name)
    }

    /// Parent of `attribute` (`None` for the root)
    pub fn parent_of(&self, attribute: AttributeId) -> Result<Option<AttributeId>> {
        Ok(self.node(attribute)?.parent)
    }

    /// Every segment from the root down to `attribute`
    pub fn full_path(&self, attribute: AttributeId) -> Result<Vec<String>> {
        let mut segments = Vec::new();
        let mut current = Some(attribute);
        while let Some(id) = current {
            let node = self.node(id)?;
            if node.parent.is_some() {
                segments.push(node.name.clone());
            }
            current = node.parent;
        }
        segments.reverse();
        Ok(segments)
    }

    /// Identifier to path mapping for diagnostics
    pub fn dump(&self) -> Vec<(AttributeId, String)> {
        (1..self.nodes.len())
            .map(|idx| {
                let id = AttributeId(idx as u32);
                let path = self.full_path(id).map(|p| p.join("/")).unwrap_or_default();
                (id, path)
            })
            .collect()
    }
}

impl Default for AttributeTree {
    fn default() -> Self {
        Self::new()
    }
}

fn join_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("/")
}
