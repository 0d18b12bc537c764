//! Processing value series
//!
//! Every id with a `number` child is a series of the numbers it processed.
//! The line form samples one value per requested time; the scatter form has
//! one point per PROCESSING interval.

use crate::attributes::WILDCARD;
use crate::config::QueryParameters;
use crate::entities::{entity_id, Entity, EntityId, EntityIdRegistry, TreeModel, NUMBER, REQUESTER};
use crate::provider::{EntityProvider, ModelResponse, XyProvider};
use crate::store::IntervalStore;
use crate::style::{line_series_style, scatter_series_style, OutputStyle};
use crate::types::{interval_at, AttributeId, Interval, ProcessingState, Result, Timestamp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SERIES_TITLE: &str = "Processing Values";
pub const SERIES_COLUMN: &str = "Requester";

/// How a series is drawn and sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Line,
    Scatter,
}

impl SeriesKind {
    fn style(self, index: usize) -> OutputStyle {
        match self {
            SeriesKind::Line => line_series_style(index),
            SeriesKind::Scatter => scatter_series_style(index),
        }
    }
}

/// One series; `x_values` and `y_values` have the same length
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub id: EntityId,
    pub name: String,
    pub x_values: Vec<Timestamp>,
    pub y_values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XyModel {
    pub title: String,
    pub series: Vec<Series>,
}

impl XyModel {
    fn new(series: Vec<Series>) -> Self {
        Self {
            title: SERIES_TITLE.to_string(),
            series,
        }
    }
}

/// Selected id attributes that carry a series, with their number attribute
struct SeriesSource {
    entity_id: EntityId,
    state: AttributeId,
    number: AttributeId,
}

fn series_sources(
    store: &IntervalStore,
    entries: &BTreeMap<EntityId, AttributeId>,
) -> Result<Vec<SeriesSource>> {
    let ids = store.resolve(&[REQUESTER, WILDCARD, WILDCARD])?;
    let mut sources = Vec::new();
    for (&entity_id, &state) in entries.iter().filter(|(_, a)| ids.contains(*a)) {
        if let Some(number) = store.opt_attribute_relative(state, &[NUMBER])? {
            sources.push(SeriesSource {
                entity_id,
                state,
                number,
            });
        }
    }
    Ok(sources)
}

/// Window covered by `times` clamped to the committed range, if not empty
fn clamped_window(store: &IntervalStore, times: &[Timestamp]) -> Option<(Timestamp, Timestamp)> {
    let first = *times.iter().min()?;
    let last = *times.iter().max()?;
    let start = store.start_time().max(first);
    let end = store.current_end_time().min(last);
    (start <= end).then_some((start, end))
}

fn intervals_of(
    intervals: &BTreeMap<AttributeId, Vec<Interval>>,
    attribute: AttributeId,
) -> &[Interval] {
    intervals.get(&attribute).map(Vec::as_slice).unwrap_or_default()
}

fn number_at(numbers: &[Interval], time: Timestamp) -> Option<i64> {
    interval_at(numbers, time).and_then(|n| n.value.as_long())
}

fn is_processing(interval: &Interval) -> bool {
    ProcessingState::Processing.matches(&interval.value)
}

/// One value per requested time
///
/// `y[i]` is the number recorded at the start of the first PROCESSING
/// interval overlapping `[times[i], times[i + 1])`, or 0 if there is none.
/// `times` must be sorted.
pub fn sample_line(states: &[Interval], numbers: &[Interval], times: &[Timestamp]) -> Vec<f64> {
    let mut candidates = states.iter().filter(|i| is_processing(i));
    let mut current = candidates.next();
    times
        .iter()
        .enumerate()
        .map(|(i, &t0)| {
            let t1 = times.get(i + 1).copied().unwrap_or(Timestamp::MAX);
            while current.map_or(false, |c| c.end < t0) {
                current = candidates.next();
            }
            match current {
                Some(c) if c.start < t1 => number_at(numbers, c.start).map_or(0.0, |v| v as f64),
                _ => 0.0,
            }
        })
        .collect()
}

/// One point per PROCESSING interval, at its start
pub fn sample_scatter(states: &[Interval], numbers: &[Interval]) -> (Vec<Timestamp>, Vec<f64>) {
    states
        .iter()
        .filter(|i| is_processing(i))
        .filter_map(|i| match number_at(numbers, i.start) {
            Some(value) => Some((i.start, value as f64)),
            None => {
                log::trace!("No number for {} at {}", i.attribute, i.start);
                None
            }
        })
        .unzip()
}

/// Series for the selected ids over `times`
pub fn build_series(
    store: &IntervalStore,
    entries: &BTreeMap<EntityId, AttributeId>,
    times: &[Timestamp],
    kind: SeriesKind,
) -> Result<XyModel> {
    let Some((start, end)) = clamped_window(store, times) else {
        return Ok(XyModel::new(Vec::new()));
    };
    let sources = series_sources(store, entries)?;
    let attributes: Vec<AttributeId> = sources.iter().flat_map(|s| [s.state, s.number]).collect();
    let intervals = store.range_query_span(&attributes, start, end)?;

    let mut series = Vec::with_capacity(sources.len());
    for source in &sources {
        let states = intervals_of(&intervals, source.state);
        let numbers = intervals_of(&intervals, source.number);
        let (x_values, y_values) = match kind {
            SeriesKind::Line => (times.to_vec(), sample_line(states, numbers, times)),
            SeriesKind::Scatter => sample_scatter(states, numbers),
        };
        series.push(Series {
            id: source.entity_id,
            name: store.name_of(source.state)?,
            x_values,
            y_values,
        });
    }
    log::debug!("Built {} {:?} series over [{}, {}]", series.len(), kind, start, end);
    Ok(XyModel::new(series))
}

/// Palette slot of an id: its numeric name, or its entity id otherwise
fn palette_index(name: &str, id: EntityId) -> usize {
    name.parse::<usize>().unwrap_or(id.unsigned_abs() as usize)
}

/// Series tree: root → requesters → ids, each id styled by palette slot
pub fn build_series_tree(store: &IntervalStore, kind: SeriesKind) -> Result<TreeModel> {
    let (start, end) = (store.start_time(), store.current_end_time());
    let root_id = entity_id(AttributeId::ROOT);
    let mut root = Entity::new(root_id, None, store.trace_name(), start, end);
    root.is_leaf = false;
    root.has_row_model = false;
    let mut entities = vec![root];

    for requester in store.resolve(&[REQUESTER, WILDCARD])? {
        let requester_id = entity_id(requester);
        let name = store.name_of(requester)?;
        let mut entity = Entity::new(requester_id, Some(root_id), name, start, end);
        entity.is_leaf = false;
        entity.has_row_model = false;
        entities.push(entity);

        for id in store.children_of(requester)? {
            let name = store.name_of(id)?;
            let series_id = entity_id(id);
            let style = kind.style(palette_index(&name, series_id));
            let mut entity = Entity::new(series_id, Some(requester_id), name, start, end);
            entity.style = Some(style);
            entities.push(entity);
        }
    }
    Ok(TreeModel {
        columns: vec![SERIES_COLUMN.to_string()],
        entities,
    })
}

/// Value series views over a shared interval store
pub struct ProcessingValuesProvider {
    store: Arc<IntervalStore>,
    ids: EntityIdRegistry,
    kind: SeriesKind,
}

impl ProcessingValuesProvider {
    pub fn new(store: Arc<IntervalStore>, kind: SeriesKind) -> Self {
        Self {
            store,
            ids: EntityIdRegistry::new(),
            kind,
        }
    }

    pub fn line(store: Arc<IntervalStore>) -> Self {
        Self::new(store, SeriesKind::Line)
    }

    pub fn scatter(store: Arc<IntervalStore>) -> Self {
        Self::new(store, SeriesKind::Scatter)
    }

    pub fn kind(&self) -> SeriesKind {
        self.kind
    }
}

impl EntityProvider for ProcessingValuesProvider {
    fn fetch_tree(&self, _params: &QueryParameters) -> ModelResponse<TreeModel> {
        let complete = self.store.is_built();
        ModelResponse::from_result(build_series_tree(&self.store, self.kind), complete)
    }
}

impl XyProvider for ProcessingValuesProvider {
    fn fetch_xy(&self, params: &QueryParameters) -> ModelResponse<XyModel> {
        let complete = self.store.is_built();
        let result = self
            .ids
            .selected_entries(&self.store, &params.selected_items)
            .and_then(|entries| {
                build_series(&self.store, &entries, &params.requested_times, self.kind)
            });
        ModelResponse::from_result(result, complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResponseStatus;
    use crate::types::Value;

    fn interval(start: Timestamp, end: Timestamp, value: Value) -> Interval {
        Interval::new(AttributeId(1), start, end, value)
    }

    fn processing() -> Value {
        ProcessingState::Processing.into()
    }

    fn waiting() -> Value {
        ProcessingState::Waiting.into()
    }

    #[test]
    fn test_sample_line() {
        let states = vec![
            interval(0, 9, waiting()),
            interval(10, 14, processing()),
            interval(15, 39, waiting()),
            interval(40, 44, processing()),
            interval(45, 60, waiting()),
        ];
        let numbers = vec![
            interval(0, 9, Value::Absent),
            interval(10, 39, Value::Long(3)),
            interval(40, 60, Value::Long(5)),
        ];
        let y = sample_line(&states, &numbers, &[0, 20, 30, 40, 50]);
        // [0, 20) overlaps the run at 10; [30, 40) has none
        assert_eq!(y, vec![3.0, 0.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn test_sample_scatter_skips_missing_numbers() {
        let states = vec![
            interval(0, 9, processing()),
            interval(10, 19, waiting()),
            interval(20, 29, processing()),
        ];
        let numbers = vec![interval(0, 19, Value::Absent), interval(20, 29, Value::Long(12))];
        let (x, y) = sample_scatter(&states, &numbers);
        assert_eq!(x, vec![20]);
        assert_eq!(y, vec![12.0]);
    }

    fn store() -> Arc<IntervalStore> {
        let store = IntervalStore::new("trace", 0);
        let id = store.attribute_or_add(&[REQUESTER, "A", "5"]).unwrap();
        let number = store.attribute_or_add(&[REQUESTER, "A", "5", NUMBER]).unwrap();
        store.attribute_or_add(&[REQUESTER, "A", "6"]).unwrap();
        store.modify_attribute(10, processing(), id).unwrap();
        store.modify_attribute(10, Value::Long(42), number).unwrap();
        store.modify_attribute(20, waiting(), id).unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_series_tree_styles() {
        let store = store();
        let tree = build_series_tree(&store, SeriesKind::Scatter).unwrap();
        assert_eq!(tree.columns, vec![SERIES_COLUMN]);
        let names: Vec<&str> = tree.entities.iter().map(Entity::name).collect();
        assert_eq!(names, vec!["trace", "A", "5", "6"]);
        let five = tree.entities[2].style.as_ref().unwrap();
        assert_eq!(five, &scatter_series_style(1));
        assert_ne!(tree.entities[3].style, tree.entities[2].style);
    }

    #[test]
    fn test_fetch_xy() {
        let store = store();
        let id = store.opt_attribute(&[REQUESTER, "A", "5"]).unwrap().unwrap();
        let without_number = store.opt_attribute(&[REQUESTER, "A", "6"]).unwrap().unwrap();
        let params = QueryParameters::new()
            .with_selected_items([entity_id(id), entity_id(without_number)])
            .with_requested_times(vec![0, 10, 20]);

        let line = ProcessingValuesProvider::line(Arc::clone(&store)).fetch_xy(&params);
        assert_eq!(line.status, ResponseStatus::Running);
        let model = line.model.unwrap();
        assert_eq!(model.series.len(), 1);
        assert_eq!(model.series[0].name, "5");
        assert_eq!(model.series[0].y_values, vec![0.0, 42.0, 0.0]);

        store.close_history(30).unwrap();
        let scatter = ProcessingValuesProvider::scatter(Arc::clone(&store)).fetch_xy(&params);
        assert_eq!(scatter.status, ResponseStatus::Completed);
        let series = &scatter.model.unwrap().series[0];
        assert_eq!((series.x_values.clone(), series.y_values.clone()), (vec![10], vec![42.0]));

        let outside = params.clone().with_requested_times(vec![100, 200]);
        let empty = ProcessingValuesProvider::line(store).fetch_xy(&outside);
        assert!(empty.model.unwrap().series.is_empty());
    }
}
