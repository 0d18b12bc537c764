//! Query parameter types
//!
//! Every derived view is driven by the same parameter set: which entities are
//! selected, which timestamps are requested, whether a filtered (selection)
//! breakdown is wanted, and which rendered element a tooltip is asked for.

use crate::entities::EntityId;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Parameters accepted by every provider fetch operation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryParameters {
    /// Entities the caller wants data for
    #[serde(default)]
    pub selected_items: Vec<EntityId>,

    /// Sample timestamps, normally sorted and evenly spaced over the window
    #[serde(default)]
    pub requested_times: Vec<Timestamp>,

    /// Whether a breakdown over the requested range is wanted
    #[serde(default)]
    pub is_filtered: Option<bool>,

    /// Element a tooltip is requested for
    #[serde(default)]
    pub element: Option<RequestedElement>,
}

/// Kind of rendered element a tooltip can be requested for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestedElement {
    /// A timeline state segment
    State,
    /// A request or reply arrow
    Arrow,
    /// A point annotation
    Annotation,
}

impl QueryParameters {
    /// Create empty query parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the selected entities
    pub fn with_selected_items(mut self, items: impl IntoIterator<Item = EntityId>) -> Self {
        self.selected_items = items.into_iter().collect();
        self
    }

    /// Builder method: add one selected entity
    pub fn add_selected_item(mut self, item: EntityId) -> Self {
        self.selected_items.push(item);
        self
    }

    /// Builder method: set the requested timestamps
    pub fn with_requested_times(mut self, times: Vec<Timestamp>) -> Self {
        self.requested_times = times;
        self
    }

    /// Builder method: request `resolution` evenly spaced times over `[start, end]`
    ///
    /// Both bounds are always included; an inverted range yields no times.
    pub fn with_time_range(mut self, start: Timestamp, end: Timestamp, resolution: usize) -> Self {
        self.requested_times = sample_times(start, end, resolution);
        self
    }

    /// Builder method: ask for the filtered breakdown
    pub fn with_filtered(mut self, filtered: bool) -> Self {
        self.is_filtered = Some(filtered);
        self
    }

    /// Builder method: set the tooltip element
    pub fn with_element(mut self, element: RequestedElement) -> Self {
        self.element = Some(element);
        self
    }

    /// Selected entities as an ordered set
    pub fn selected_set(&self) -> BTreeSet<EntityId> {
        self.selected_items.iter().copied().collect()
    }

    /// First and last requested timestamps
    pub fn time_bounds(&self) -> Option<(Timestamp, Timestamp)> {
        Some((*self.requested_times.first()?, *self.requested_times.last()?))
    }

    /// True if the filtered breakdown was requested
    pub fn filtered(&self) -> bool {
        self.is_filtered.unwrap_or(false)
    }
}

/// Evenly spaced sample times over `[start, end]`, both bounds included
pub fn sample_times(start: Timestamp, end: Timestamp, resolution: usize) -> Vec<Timestamp> {
    if end < start || resolution == 0 {
        return Vec::new();
    }
    if resolution == 1 || start == end {
        return vec![start];
    }
    // The span of the full i64 range does not fit in an i64
    let span = (end as i128 - start as i128) as u128;
    let steps = (resolution - 1) as u128;
    let mut times: Vec<Timestamp> = (0..=steps)
        .map(|i| (start as i128 + (span * i / steps) as i128) as Timestamp)
        .collect();
    times.dedup();
    times
}

/// Configuration of the statistics aggregator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsConfig {
    /// How long to wait for the store to be built (None = wait indefinitely)
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

impl StatsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: bound the wait for a complete store
    pub fn with_wait_timeout(mut self, timeout_ms: u64) -> Self {
        self.wait_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parameters_builder() {
        let params = QueryParameters::new()
            .with_selected_items(vec![3, 1])
            .add_selected_item(3)
            .with_time_range(0, 100, 5)
            .with_filtered(true)
            .with_element(RequestedElement::State);

        assert_eq!(params.selected_items, vec![3, 1, 3]);
        assert_eq!(params.selected_set().into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(params.requested_times, vec![0, 25, 50, 75, 100]);
        assert_eq!(params.time_bounds(), Some((0, 100)));
        assert!(params.filtered());
        assert_eq!(params.element, Some(RequestedElement::State));
    }

    #[test]
    fn test_sample_times_edges() {
        assert!(sample_times(10, 5, 4).is_empty());
        assert!(sample_times(0, 10, 0).is_empty());
        assert_eq!(sample_times(7, 7, 10), vec![7]);
        assert_eq!(sample_times(0, 10, 1), vec![0]);
        // More samples than distinct timestamps collapses duplicates
        assert_eq!(sample_times(0, 2, 5), vec![0, 1, 2]);
    }

    #[test]
    fn test_sample_times_full_range() {
        assert_eq!(sample_times(i64::MIN, i64::MAX, 3), vec![i64::MIN, -1, i64::MAX]);
        assert_eq!(sample_times(i64::MIN, i64::MAX, 2), vec![i64::MIN, i64::MAX]);
        assert_eq!(sample_times(-10, i64::MAX, 2), vec![-10, i64::MAX]);
    }

    #[test]
    fn test_query_parameters_deserialization() {
        let json = r#"{"selected_items":[1,2],"requested_times":[10,20],"element":"state"}"#;
        let params: QueryParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.selected_items, vec![1, 2]);
        assert_eq!(params.is_filtered, None);
        assert!(!params.filtered());
        assert_eq!(params.element, Some(RequestedElement::State));

        let empty: QueryParameters = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.time_bounds(), None);
    }

    #[test]
    fn test_stats_config() {
        assert_eq!(StatsConfig::new().wait_timeout(), None);
        let config = StatsConfig::new().with_wait_timeout(250);
        assert_eq!(config.wait_timeout(), Some(Duration::from_millis(250)));
    }
}
