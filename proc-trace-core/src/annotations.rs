//! Hand-off annotations
//!
//! Every receiver interval naming a requester marks two zero-duration
//! hand-off points: when the ball arrives and right after it leaves. No
//! matching against the requester side is needed.

use crate::entities::{EntityId, RECEIVER};
use crate::store::IntervalStore;
use crate::style::{OutputStyle, StyleRegistry, BALL_ANNOTATION_KEY, BALL_CATEGORY};
use crate::types::{AttributeId, Result, Timestamp};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A point (or span) marker attached to an entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub time: Timestamp,
    pub duration: i64,
    pub entity_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub style: OutputStyle,
}

/// Annotations grouped by category
pub type AnnotationModel = BTreeMap<String, Vec<Annotation>>;

/// Categories this system produces
pub fn annotation_categories() -> Vec<String> {
    vec![BALL_CATEGORY.to_string()]
}

/// Hand-off markers for the receiver entities among `entries`
pub fn build_annotations(
    store: &IntervalStore,
    entries: &BTreeMap<EntityId, AttributeId>,
    times: &[Timestamp],
    styles: &StyleRegistry,
) -> Result<AnnotationModel> {
    let receivers: BTreeSet<AttributeId> = store
        .resolve(&[RECEIVER, crate::attributes::WILDCARD])?
        .into_iter()
        .collect();
    let selected: Vec<(EntityId, AttributeId)> = entries
        .iter()
        .filter(|(_, attribute)| receivers.contains(*attribute))
        .map(|(id, attribute)| (*id, *attribute))
        .collect();
    let attributes: Vec<AttributeId> = selected.iter().map(|(_, a)| *a).collect();
    let intervals = store.range_query(&attributes, times)?;

    let mut markers = Vec::new();
    for (entity_id, attribute) in selected {
        for interval in intervals.get(&attribute).into_iter().flatten() {
            if interval.value.as_text().is_none() {
                continue;
            }
            for time in [interval.start, interval.end + 1] {
                markers.push(Annotation {
                    time,
                    duration: 0,
                    entity_id,
                    label: None,
                    style: styles.get(BALL_ANNOTATION_KEY),
                });
            }
        }
    }

    let mut model = AnnotationModel::new();
    if !markers.is_empty() {
        model.insert(BALL_CATEGORY.to_string(), markers);
    }
    Ok(model)
}
