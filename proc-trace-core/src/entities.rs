//! Entity model
//!
//! Walks the attribute tree and produces the parent-linked entity hierarchy
//! shown by every view: trace → receivers, trace → requesters → ids.

use crate::store::IntervalStore;
use crate::style::OutputStyle;
use crate::types::{AttributeId, Result, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

/// Identifier of an entity in a tree model
pub type EntityId = i64;

/// First identifier handed out to entries that have no attribute
const SYNTHETIC_ID_BASE: EntityId = 1 << 40;

pub const RECEIVER: &str = "Receiver";
pub const REQUESTER: &str = "Requester";
/// Child of an id attribute holding the processed number
pub const NUMBER: &str = "number";

/// A node of the entity hierarchy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: EntityId,
    /// `None` for the root
    pub parent_id: Option<EntityId>,
    /// Column labels; the first one is the display name
    pub labels: Vec<String>,
    /// True if the entity has no children in this tree
    pub is_leaf: bool,
    /// True if the entity gets a timeline row
    pub has_row_model: bool,
    pub start: Timestamp,
    pub end: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<OutputStyle>,
}

impl Entity {
    pub fn new(
        id: EntityId,
        parent_id: Option<EntityId>,
        name: impl Into<String>,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        Self {
            id,
            parent_id,
            labels: vec![name.into()],
            is_leaf: true,
            has_row_model: true,
            start,
            end,
            style: None,
        }
    }

    /// Display name (first label)
    pub fn name(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("")
    }
}

/// A tree of entities plus the column headers describing their labels
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreeModel {
    pub columns: Vec<String>,
    /// Parent before child
    pub entities: Vec<Entity>,
}

/// Entity identifier of an attribute; stable across calls
pub fn entity_id(attribute: AttributeId) -> EntityId {
    attribute.index() as EntityId
}

/// Maps entity identifiers to attributes and names synthetic entries
///
/// Attribute-backed entities use [`entity_id`]. Entries without an
/// attribute ("Total", "Selection") get identifiers that stay the same for
/// the lifetime of the registry.
#[derive(Debug)]
pub struct EntityIdRegistry {
    named: RwLock<HashMap<String, EntityId>>,
    next_id: AtomicI64,
}

impl EntityIdRegistry {
    pub fn new() -> Self {
        Self {
            named: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(SYNTHETIC_ID_BASE),
        }
    }

    /// Identifier of a synthetic entry
    pub fn named_id(&self, key: &str) -> EntityId {
        if let Some(id) = self.named.read().get(key) {
            return *id;
        }
        *self
            .named
            .write()
            .entry(key.to_string())
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Attributes behind the given entities; unknown and synthetic ids are dropped
    pub fn selected_entries(
        &self,
        store: &IntervalStore,
        ids: &[EntityId],
    ) -> Result<BTreeMap<EntityId, AttributeId>> {
        store.with_tree(|tree| {
            ids.iter()
                .filter(|id| (0..tree.len() as EntityId).contains(*id))
                .map(|id| (*id, AttributeId(*id as u32)))
                .collect()
        })
    }
}

impl Default for EntityIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the entity hierarchy, parent before child
///
/// Root spans the store's committed range; receivers hang off the root;
/// requesters hang off the root with one leaf per id below them.
pub fn build_entities(store: &IntervalStore) -> Result<Vec<Entity>> {
    let start = store.start_time();
    let end = store.current_end_time();

    store.with_tree(|tree| {
        let root_id = entity_id(AttributeId::ROOT);
        let mut root = Entity::new(root_id, None, store.trace_name(), start, end);
        root.has_row_model = false;
        let mut entities = vec![root];

        for receiver in tree.resolve(&[RECEIVER, crate::attributes::WILDCARD]) {
            let name = tree.name_of(receiver)?;
            entities.push(Entity::new(entity_id(receiver), Some(root_id), name, start, end));
        }

        for requester in tree.resolve(&[REQUESTER, crate::attributes::WILDCARD]) {
            let requester_id = entity_id(requester);
            let ids = tree.children_of(requester)?;
            let name = tree.name_of(requester)?;
            let mut entity = Entity::new(requester_id, Some(root_id), name, start, end);
            entity.is_leaf = ids.is_empty();
            entities.push(entity);

            for &id in ids {
                let name = tree.name_of(id)?;
                entities.push(Entity::new(entity_id(id), Some(requester_id), name, start, end));
            }
        }

        let only_root = entities.len() == 1;
        if let Some(root) = entities.first_mut() {
            root.is_leaf = only_root;
        }
        log::debug!("Built {} entities for '{}'", entities.len(), store.trace_name());
        Ok(entities)
    })?
}
