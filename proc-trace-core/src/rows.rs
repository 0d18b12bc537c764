//! Timeline rows
//!
//! Projects each selected entity's intervals onto the requested time grid.

use crate::entities::{EntityId, NUMBER};
use crate::store::IntervalStore;
use crate::style::{OutputStyle, StyleRegistry};
use crate::types::{AttributeId, Interval, ProcessingState, Result, Timestamp, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Tooltip entry holding the processed number
pub const VALUE_LABEL: &str = "Value";

/// One segment of a timeline row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeGraphState {
    pub time: Timestamp,
    pub duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// `None` marks a "no data" segment
    pub style: Option<OutputStyle>,
}

impl TimeGraphState {
    /// True for the segment emitted where nothing was recorded
    pub fn is_no_data(&self) -> bool {
        self.style.is_none()
    }

    /// Style key of this segment
    pub fn style_key(&self) -> Option<&str> {
        self.style.as_ref().and_then(OutputStyle::key)
    }
}

/// All segments of one entity, ordered by time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowModel {
    pub entity_id: EntityId,
    pub states: Vec<TimeGraphState>,
}

/// Map an interval to a row segment
///
/// Enumeration ordinals become state segments and absent values become
/// "no data" segments. Other value kinds, and ordinals outside the state
/// set, produce nothing.
pub fn state_for(interval: &Interval, styles: &StyleRegistry) -> Option<TimeGraphState> {
    let style = match &interval.value {
        Value::Integer(ordinal) => match ProcessingState::from_ordinal(*ordinal) {
            Some(state) => Some(styles.get(state.key())),
            None => {
                log::trace!("Skipping unknown state ordinal {} on {}", ordinal, interval.attribute);
                return None;
            }
        },
        Value::Absent => None,
        Value::Long(_) | Value::Text(_) => return None,
    };
    Some(TimeGraphState {
        time: interval.start,
        duration: interval.duration(),
        label: None,
        style,
    })
}

/// Build one row per entry of `entries`, sampled at `times`
pub fn build_rows(
    store: &IntervalStore,
    entries: &BTreeMap<EntityId, AttributeId>,
    times: &[Timestamp],
    styles: &StyleRegistry,
) -> Result<Vec<RowModel>> {
    let attributes: Vec<AttributeId> = entries
        .values()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let intervals = store.range_query(&attributes, times)?;

    let rows = entries
        .iter()
        .map(|(entity_id, attribute)| RowModel {
            entity_id: *entity_id,
            states: intervals
                .get(attribute)
                .map(|found| found.iter().filter_map(|i| state_for(i, styles)).collect())
                .unwrap_or_default(),
        })
        .collect();
    Ok(rows)
}

/// Tooltip of an id entity at `time`
///
/// Holds the processed number when the entity is processing at `time`
/// and its `number` child records one; empty otherwise.
pub fn build_tooltip(
    store: &IntervalStore,
    attribute: AttributeId,
    time: Timestamp,
) -> Result<BTreeMap<String, String>> {
    let mut tooltip = BTreeMap::new();
    let Some(number_attribute) = store.opt_attribute_relative(attribute, &[NUMBER])? else {
        return Ok(tooltip);
    };
    let state = store.point_query(attribute, time)?;
    let number = store.point_query(number_attribute, time)?;
    if let (Some(state), Some(number)) = (state, number) {
        if let (true, Some(value)) = (
            ProcessingState::Processing.matches(&state.value),
            number.value.as_long(),
        ) {
            tooltip.insert(VALUE_LABEL.to_string(), value.to_string());
        }
    }
    Ok(tooltip)
}
