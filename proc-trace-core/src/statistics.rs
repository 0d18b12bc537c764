//! Processing value statistics
//!
//! Count, minimum, maximum and mean of the numbers processed by each id,
//! merged bottom-up: id → requester → total. A number is sampled once per
//! PROCESSING interval, at the interval start.

use crate::attributes::WILDCARD;
use crate::config::{QueryParameters, StatsConfig};
use crate::entities::{entity_id, Entity, EntityId, EntityIdRegistry, TreeModel, NUMBER, REQUESTER};
use crate::monitor::ProgressMonitor;
use crate::provider::{EntityProvider, ModelResponse, StatsProvider};
use crate::store::IntervalStore;
use crate::types::{
    interval_at, AttributeId, Interval, ProcessingState, Result, Timestamp, TraceError,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key of the overall accumulator
pub const TOTAL: &str = "*";
/// Separator between requester and id in leaf keys
pub const SEP: &str = "/";

pub const TOTAL_LABEL: &str = "Total";
pub const SELECTION_LABEL: &str = "Selection";

/// Columns of the statistics tree
pub const STATS_COLUMNS: [&str; 5] = ["Challenger", "Count", "Minimum", "Maximum", "Average"];

/// Running statistic over Long samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub count: u64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub mean: f64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fold one sample in
    pub fn add(&mut self, value: i64) {
        self.count += 1;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.mean += (value as f64 - self.mean) / self.count as f64;
    }

    /// Combine with another accumulator; an empty one leaves `self` unchanged
    pub fn merge(&mut self, other: &Statistics) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let total = self.mean * self.count as f64 + other.mean * other.count as f64;
        self.mean = total / count as f64;
        self.count = count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

/// Accumulators keyed by `*`, `<requester>` and `<requester>/<id>`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsReport {
    pub stats: BTreeMap<String, Statistics>,
    /// False when the computation was cancelled before every group merged
    pub complete: bool,
}

impl StatsReport {
    pub fn get(&self, key: &str) -> Option<&Statistics> {
        self.stats.get(key)
    }

    pub fn total(&self) -> Option<&Statistics> {
        self.get(TOTAL)
    }

    fn cancelled() -> Self {
        Self {
            stats: BTreeMap::new(),
            complete: false,
        }
    }
}

/// Leaf key of an id
pub fn leaf_key(requester: &str, id: &str) -> String {
    format!("{}{}{}", requester, SEP, id)
}

struct RequesterStats {
    name: String,
    group: Statistics,
    leaves: Vec<(String, Statistics)>,
}

/// Samples of one id over `[start, end]`
fn leaf_stats(
    store: &IntervalStore,
    id: AttributeId,
    start: Timestamp,
    end: Timestamp,
) -> Result<Statistics> {
    let mut stats = Statistics::new();
    let Some(number) = store.opt_attribute_relative(id, &[NUMBER])? else {
        return Ok(stats);
    };
    let intervals = store.range_query_span(&[id, number], start, end)?;
    let states: &[Interval] = intervals.get(&id).map(Vec::as_slice).unwrap_or_default();
    let numbers: &[Interval] = intervals.get(&number).map(Vec::as_slice).unwrap_or_default();

    for interval in states
        .iter()
        .filter(|i| ProcessingState::Processing.matches(&i.value))
        .filter(|i| (start..=end).contains(&i.start))
    {
        match interval_at(numbers, interval.start).and_then(|n| n.value.as_long()) {
            Some(value) => stats.add(value),
            None => log::trace!("No number on {} at {}", number, interval.start),
        }
    }
    Ok(stats)
}

fn requester_stats(
    store: &IntervalStore,
    requester: AttributeId,
    start: Timestamp,
    end: Timestamp,
) -> Result<RequesterStats> {
    let name = store.name_of(requester)?;
    let mut group = Statistics::new();
    let mut leaves = Vec::new();
    for id in store.children_of(requester)? {
        let leaf = leaf_stats(store, id, start, end)?;
        group.merge(&leaf);
        leaves.push((leaf_key(&name, &store.name_of(id)?), leaf));
    }
    Ok(RequesterStats { name, group, leaves })
}

fn compute(
    store: &IntervalStore,
    start: Timestamp,
    end: Timestamp,
    monitor: &ProgressMonitor,
) -> Result<Option<StatsReport>> {
    let requesters = store.resolve(&[REQUESTER, WILDCARD])?;
    if requesters.is_empty() {
        log::debug!("No requesters in '{}', no statistics", store.trace_name());
        return Ok(None);
    }

    let groups = requesters
        .par_iter()
        .map(|&requester| {
            if monitor.is_cancelled() {
                return Ok(None);
            }
            requester_stats(store, requester, start, end).map(Some)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut report = StatsReport {
        stats: BTreeMap::new(),
        complete: true,
    };
    let mut total = Statistics::new();
    for group in groups {
        let Some(group) = group else {
            report.complete = false;
            continue;
        };
        total.merge(&group.group);
        report.stats.insert(group.name, group.group);
        report.stats.extend(group.leaves);
    }
    report.stats.insert(TOTAL.to_string(), total);
    if !report.complete {
        log::info!("Statistics cancelled, returning {} merged groups", report.stats.len() - 1);
    }
    Ok(Some(report))
}

/// Statistics of the PROCESSING intervals starting in `[start, end]`
///
/// Waits for the store to be built first. Returns `None` for an inverted
/// range, a store without requesters, a disposed store or a wait that timed
/// out. Cancellation yields whatever was merged, flagged incomplete.
pub fn stats_for_range(
    store: &IntervalStore,
    start: Timestamp,
    end: Timestamp,
    config: &StatsConfig,
    monitor: &ProgressMonitor,
) -> Option<StatsReport> {
    if start > end {
        log::debug!("Inverted statistics range [{}, {}]", start, end);
        return None;
    }
    if !store.wait_until_built_cancellable(config.wait_timeout(), monitor) {
        if monitor.is_cancelled() && !store.is_disposed() {
            log::info!("Statistics cancelled while waiting for '{}'", store.trace_name());
            return Some(StatsReport::cancelled());
        }
        log::debug!("Store '{}' not available for statistics", store.trace_name());
        return None;
    }
    match compute(store, start, end, monitor) {
        Ok(report) => report,
        Err(TraceError::Disposed) => None,
        Err(e) => {
            log::warn!("Statistics failed: {}", e);
            None
        }
    }
}

/// Statistics over the whole store
pub fn stats_per_type(
    store: &IntervalStore,
    config: &StatsConfig,
    monitor: &ProgressMonitor,
) -> Option<StatsReport> {
    let built = store.wait_until_built_cancellable(config.wait_timeout(), monitor);
    if !built && !monitor.is_cancelled() {
        return None;
    }
    stats_for_range(store, store.start_time(), store.current_end_time(), config, monitor)
}

/// Labels of a statistics tree row
pub fn stats_labels(name: &str, key: &str, report: Option<&StatsReport>) -> Vec<String> {
    let Some(stats) = report.and_then(|r| r.get(key)) else {
        return vec![name.to_string()];
    };
    let blank_if_empty = |value: String| {
        if stats.is_empty() {
            String::new()
        } else {
            value
        }
    };
    vec![
        name.to_string(),
        stats.count.to_string(),
        blank_if_empty(stats.min.map(|v| v.to_string()).unwrap_or_default()),
        blank_if_empty(stats.max.map(|v| v.to_string()).unwrap_or_default()),
        blank_if_empty(format!("{:.3}", stats.mean)),
    ]
}

/// Statistics views over a shared interval store
pub struct ProcessingStatisticsProvider {
    store: Arc<IntervalStore>,
    ids: EntityIdRegistry,
    config: StatsConfig,
}

impl ProcessingStatisticsProvider {
    pub fn new(store: Arc<IntervalStore>, config: StatsConfig) -> Self {
        Self {
            store,
            ids: EntityIdRegistry::new(),
            config,
        }
    }

    pub fn store(&self) -> &IntervalStore {
        &self.store
    }

    /// Requester and id rows below `parent`
    ///
    /// `scope` prefixes the ids of a secondary subtree so that every entity
    /// in one tree keeps a distinct id.
    fn push_requesters(
        &self,
        entities: &mut Vec<Entity>,
        parent: EntityId,
        scope: Option<&str>,
        report: Option<&StatsReport>,
    ) -> Result<()> {
        let (start, end) = (self.store.start_time(), self.store.current_end_time());
        let id_of = |attribute: AttributeId| match scope {
            Some(scope) => self.ids.named_id(&format!("{}{}{}", scope, SEP, attribute)),
            None => entity_id(attribute),
        };

        for requester in self.store.resolve(&[REQUESTER, WILDCARD])? {
            let name = self.store.name_of(requester)?;
            let requester_id = id_of(requester);
            let children = self.store.children_of(requester)?;

            let mut entity = Entity::new(requester_id, Some(parent), name.clone(), start, end);
            entity.labels = stats_labels(&name, &name, report);
            entity.is_leaf = children.is_empty();
            entity.has_row_model = false;
            entities.push(entity);

            for id in children {
                let id_name = self.store.name_of(id)?;
                let mut entity =
                    Entity::new(id_of(id), Some(requester_id), id_name.clone(), start, end);
                entity.labels = stats_labels(&id_name, &leaf_key(&name, &id_name), report);
                entity.has_row_model = false;
                entities.push(entity);
            }
        }
        Ok(())
    }

    fn build_tree(
        &self,
        params: &QueryParameters,
        monitor: &ProgressMonitor,
    ) -> Result<(TreeModel, bool)> {
        let store = &*self.store;
        let per_type = stats_per_type(store, &self.config, monitor);
        if store.is_disposed() {
            return Err(TraceError::Disposed);
        }
        let (start, end) = (store.start_time(), store.current_end_time());

        let root_id = entity_id(AttributeId::ROOT);
        let mut root = Entity::new(root_id, None, store.trace_name(), start, end);
        root.is_leaf = false;
        root.has_row_model = false;
        let mut entities = vec![root];

        let total_id = self.ids.named_id(TOTAL_LABEL);
        let mut total = Entity::new(total_id, Some(root_id), TOTAL_LABEL, start, end);
        total.labels = stats_labels(TOTAL_LABEL, TOTAL, per_type.as_ref());
        total.is_leaf = false;
        total.has_row_model = false;
        entities.push(total);
        self.push_requesters(&mut entities, total_id, None, per_type.as_ref())?;

        let mut complete = per_type.as_ref().map_or(false, |r| r.complete);
        if params.filtered() {
            if let Some((first, last)) = params.time_bounds() {
                let range = stats_for_range(
                    store,
                    start.max(first),
                    end.min(last),
                    &self.config,
                    monitor,
                );
                complete &= range.as_ref().map_or(true, |r| r.complete);

                let selection_id = self.ids.named_id(SELECTION_LABEL);
                let mut selection =
                    Entity::new(selection_id, Some(root_id), SELECTION_LABEL, start, end);
                selection.labels = stats_labels(SELECTION_LABEL, TOTAL, range.as_ref());
                selection.is_leaf = false;
                selection.has_row_model = false;
                entities.push(selection);
                self.push_requesters(
                    &mut entities,
                    selection_id,
                    Some(SELECTION_LABEL),
                    range.as_ref(),
                )?;
            }
        }

        let tree = TreeModel {
            columns: STATS_COLUMNS.iter().map(|c| c.to_string()).collect(),
            entities,
        };
        Ok((tree, complete))
    }

    /// Statistics tree: Total and, when filtered, Selection subtrees
    pub fn fetch_statistics_tree(
        &self,
        params: &QueryParameters,
        monitor: &ProgressMonitor,
    ) -> ModelResponse<TreeModel> {
        match self.build_tree(params, monitor) {
            Ok((tree, _)) if monitor.is_cancelled() => ModelResponse::cancelled(Some(tree)),
            Ok((tree, complete)) => ModelResponse::from_result(Ok(tree), complete),
            Err(e) => ModelResponse::from_result(Err(e), true),
        }
    }
}

impl EntityProvider for ProcessingStatisticsProvider {
    fn fetch_tree(&self, params: &QueryParameters) -> ModelResponse<TreeModel> {
        self.fetch_statistics_tree(params, &ProgressMonitor::new())
    }
}

impl StatsProvider for ProcessingStatisticsProvider {
    /// Statistics over the requested time bounds, or the whole store when
    /// no times were requested
    fn fetch_statistics(
        &self,
        params: &QueryParameters,
        monitor: &ProgressMonitor,
    ) -> ModelResponse<StatsReport> {
        let store = &*self.store;
        let report = match params.time_bounds() {
            Some((first, last)) => stats_for_range(
                store,
                store.start_time().max(first),
                store.current_end_time().min(last),
                &self.config,
                monitor,
            ),
            None => stats_per_type(store, &self.config, monitor),
        };
        match report {
            Some(report) if !report.complete => ModelResponse::cancelled(Some(report)),
            Some(report) => ModelResponse::completed(report),
            None => ModelResponse::no_data(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResponseStatus;
    use crate::types::Value;

    fn accumulate(values: &[i64]) -> Statistics {
        let mut stats = Statistics::new();
        for &v in values {
            stats.add(v);
        }
        stats
    }

    fn assert_same(a: &Statistics, b: &Statistics) {
        assert_eq!((a.count, a.min, a.max), (b.count, b.min, b.max));
        assert!((a.mean - b.mean).abs() < 1e-9, "{} != {}", a.mean, b.mean);
    }

    /// Requester A with ids 1 and 2, requester B with id 1
    fn store() -> IntervalStore {
        let store = IntervalStore::new("trace", 0);
        let samples: [(&str, &str, &[(Timestamp, Timestamp, i64)]); 3] = [
            ("A", "1", &[(10, 19, 4), (40, 49, 8)]),
            ("A", "2", &[(20, 29, 6)]),
            ("B", "1", &[(30, 39, 10)]),
        ];
        let mut events = Vec::new();
        for (requester, id, runs) in samples {
            let state = store.attribute_or_add(&[REQUESTER, requester, id]).unwrap();
            let number = store.attribute_or_add(&[REQUESTER, requester, id, NUMBER]).unwrap();
            for &(start, end, value) in runs {
                events.push((start, state, Value::from(ProcessingState::Processing)));
                events.push((start, number, Value::Long(value)));
                events.push((end + 1, state, Value::from(ProcessingState::Waiting)));
            }
        }
        events.sort_by_key(|(t, _, _)| *t);
        for (time, attribute, value) in events {
            store.modify_attribute(time, value, attribute).unwrap();
        }
        store
    }

    #[test]
    fn test_merge_identity_and_order() {
        let a = accumulate(&[1, 5]);
        let b = accumulate(&[3]);
        let c = accumulate(&[-2, 9, 4]);

        let mut with_empty = a;
        with_empty.merge(&Statistics::new());
        assert_eq!(with_empty, a);
        let mut empty = Statistics::new();
        empty.merge(&a);
        assert_eq!(empty, a);

        let mut ab = a;
        ab.merge(&b);
        let mut ba = b;
        ba.merge(&a);
        assert_same(&ab, &ba);

        let mut ab_c = ab;
        ab_c.merge(&c);
        let mut bc = b;
        bc.merge(&c);
        let mut a_bc = a;
        a_bc.merge(&bc);
        assert_same(&ab_c, &a_bc);
        assert_same(&ab_c, &accumulate(&[1, 5, 3, -2, 9, 4]));
        assert_eq!((ab_c.min, ab_c.max), (Some(-2), Some(9)));
    }

    #[test]
    fn test_grouped_statistics() {
        let store = store();
        store.close_history(100).unwrap();
        let report =
            stats_for_range(&store, 0, 100, &StatsConfig::new(), &ProgressMonitor::new()).unwrap();

        assert!(report.complete);
        assert_same(&report.stats["A/1"], &accumulate(&[4, 8]));
        assert_same(&report.stats["A"], &accumulate(&[4, 8, 6]));
        assert_same(&report.stats["B"], &accumulate(&[10]));
        let total = report.total().unwrap();
        assert_eq!(total.count, 4);
        assert!((total.mean - 7.0).abs() < 1e-9);

        let leaf_sum: u64 = ["A/1", "A/2", "B/1"].iter().map(|k| report.stats[*k].count).sum();
        assert_eq!(leaf_sum, total.count);
    }

    #[test]
    fn test_range_counts_interval_starts_only() {
        let store = store();
        store.close_history(100).unwrap();
        // [15, 35] contains the starts at 20 and 30 but not 10
        let report =
            stats_for_range(&store, 15, 35, &StatsConfig::new(), &ProgressMonitor::new()).unwrap();
        assert_eq!(report.total().unwrap().count, 2);
        assert!(report.stats["A/1"].is_empty());
        assert_eq!(stats_labels("1", "A/1", Some(&report)), vec!["1", "0", "", "", ""]);
    }

    #[test]
    fn test_absent_results() {
        let store = store();
        store.close_history(100).unwrap();
        let config = StatsConfig::new();
        let monitor = ProgressMonitor::new();
        assert!(stats_for_range(&store, 50, 10, &config, &monitor).is_none());

        let empty = IntervalStore::new("empty", 0);
        empty.close_history(10).unwrap();
        assert!(stats_for_range(&empty, 0, 10, &config, &monitor).is_none());

        let unfinished = IntervalStore::new("unfinished", 0);
        let quick = StatsConfig::new().with_wait_timeout(10);
        assert!(stats_for_range(&unfinished, 0, 10, &quick, &monitor).is_none());

        store.dispose();
        assert!(stats_for_range(&store, 0, 100, &config, &monitor).is_none());
    }

    #[test]
    fn test_cancelled_before_build() {
        let store = store();
        let monitor = ProgressMonitor::new();
        monitor.cancel();
        let report = stats_for_range(&store, 0, 100, &StatsConfig::new(), &monitor).unwrap();
        assert!(!report.complete);
        assert!(report.stats.is_empty());
    }

    #[test]
    fn test_statistics_tree_with_selection() {
        let store = Arc::new(store());
        store.close_history(100).unwrap();
        let provider = ProcessingStatisticsProvider::new(Arc::clone(&store), StatsConfig::new());

        let params = QueryParameters::new()
            .with_requested_times(vec![25, 45])
            .with_filtered(true);
        let response = provider.fetch_tree(&params);
        assert_eq!(response.status, ResponseStatus::Completed);
        let tree = response.model.unwrap();
        assert_eq!(tree.columns[0], "Challenger");

        let total = tree.entities.iter().find(|e| e.name() == TOTAL_LABEL).unwrap();
        assert_eq!(total.labels, vec!["Total", "4", "4", "10", "7.000"]);
        let selection = tree.entities.iter().find(|e| e.name() == SELECTION_LABEL).unwrap();
        // Starts at 30 and 40
        assert_eq!(selection.labels, vec!["Selection", "2", "8", "10", "9.000"]);

        let ids: std::collections::BTreeSet<EntityId> =
            tree.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), tree.entities.len());
        for (idx, entity) in tree.entities.iter().enumerate() {
            if let Some(parent) = entity.parent_id {
                assert!(tree.entities[..idx].iter().any(|e| e.id == parent));
            }
        }
    }

    #[test]
    fn test_fetch_statistics_status() {
        let store = Arc::new(store());
        store.close_history(100).unwrap();
        let provider = ProcessingStatisticsProvider::new(store, StatsConfig::new());

        let whole = provider.fetch_statistics(&QueryParameters::new(), &ProgressMonitor::new());
        assert_eq!(whole.status, ResponseStatus::Completed);
        assert_eq!(whole.model.unwrap().total().unwrap().count, 4);

        let outside = QueryParameters::new().with_requested_times(vec![500, 600]);
        let response = provider.fetch_statistics(&outside, &ProgressMonitor::new());
        assert_eq!(response.status, ResponseStatus::Completed);
        assert!(response.model.is_none());
    }
}
