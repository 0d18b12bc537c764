//! Processing states time graph
//!
//! Entity tree, rows, tooltips, arrows and annotations of the request/reply
//! exchange, served from one shared interval store.

use crate::annotations::{annotation_categories, build_annotations, AnnotationModel};
use crate::arrows::{match_arrows, ArrowModel};
use crate::config::{QueryParameters, RequestedElement};
use crate::entities::{build_entities, EntityIdRegistry, TreeModel};
use crate::provider::{
    AnnotationProvider, ArrowProvider, EntityProvider, ModelResponse, RowProvider,
};
use crate::rows::{build_rows, build_tooltip, RowModel};
use crate::store::IntervalStore;
use crate::style::{style_model, OutputStyle, StyleRegistry};
use crate::types::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Time graph views over a shared interval store
///
/// Every fetch is non-blocking: while the store is still being written the
/// response covers committed data and reports `Running`.
pub struct ProcessingStatesProvider {
    store: Arc<IntervalStore>,
    ids: EntityIdRegistry,
    styles: Arc<StyleRegistry>,
}

impl ProcessingStatesProvider {
    pub fn new(store: Arc<IntervalStore>, styles: Arc<StyleRegistry>) -> Self {
        Self {
            store,
            ids: EntityIdRegistry::new(),
            styles,
        }
    }

    pub fn store(&self) -> &IntervalStore {
        &self.store
    }

    /// The fixed style table referenced by every element
    pub fn fetch_styles(&self) -> ModelResponse<BTreeMap<String, OutputStyle>> {
        ModelResponse::completed(style_model())
    }

    /// Build state is sampled before querying so a `Completed` response
    /// never covers a store that was still growing
    fn respond<T>(&self, query: impl FnOnce() -> Result<T>) -> ModelResponse<T> {
        let complete = self.store.is_built();
        ModelResponse::from_result(query(), complete)
    }
}

impl EntityProvider for ProcessingStatesProvider {
    fn fetch_tree(&self, _params: &QueryParameters) -> ModelResponse<TreeModel> {
        self.respond(|| {
            Ok(TreeModel {
                columns: Vec::new(),
                entities: build_entities(&self.store)?,
            })
        })
    }
}

impl RowProvider for ProcessingStatesProvider {
    fn fetch_rows(&self, params: &QueryParameters) -> ModelResponse<Vec<RowModel>> {
        self.respond(|| {
            let entries = self.ids.selected_entries(&self.store, &params.selected_items)?;
            build_rows(&self.store, &entries, &params.requested_times, &self.styles)
        })
    }

    fn fetch_tooltip(&self, params: &QueryParameters) -> ModelResponse<BTreeMap<String, String>> {
        if params.element != Some(RequestedElement::State) {
            return ModelResponse::completed(BTreeMap::new());
        }
        let first = (params.selected_items.first(), params.requested_times.first());
        let (Some(&entity), Some(&time)) = first else {
            return ModelResponse::completed(BTreeMap::new());
        };
        let tooltip = self
            .ids
            .selected_entries(&self.store, &[entity])
            .and_then(|entries| match entries.get(&entity) {
                Some(&attribute) => build_tooltip(&self.store, attribute, time),
                None => Ok(BTreeMap::new()),
            });
        match tooltip {
            Ok(tooltip) => ModelResponse::completed(tooltip),
            Err(e) => {
                log::debug!("Tooltip unavailable: {}", e);
                ModelResponse::completed(BTreeMap::new())
            }
        }
    }
}

impl ArrowProvider for ProcessingStatesProvider {
    fn fetch_arrows(&self, params: &QueryParameters) -> ModelResponse<ArrowModel> {
        self.respond(|| match_arrows(&self.store, &params.requested_times, &self.styles))
    }
}

impl AnnotationProvider for ProcessingStatesProvider {
    fn fetch_annotation_categories(&self) -> ModelResponse<Vec<String>> {
        ModelResponse::completed(annotation_categories())
    }

    fn fetch_annotations(&self, params: &QueryParameters) -> ModelResponse<AnnotationModel> {
        self.respond(|| {
            let entries = self.ids.selected_entries(&self.store, &params.selected_items)?;
            build_annotations(&self.store, &entries, &params.requested_times, &self.styles)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{entity_id, NUMBER};
    use crate::provider::ResponseStatus;
    use crate::rows::VALUE_LABEL;
    use crate::style::BALL_CATEGORY;
    use crate::types::{ProcessingState, Value};

    fn provider() -> ProcessingStatesProvider {
        let store = IntervalStore::new("trace", 0);
        let receiver = store.attribute_or_add(&["Receiver", "r1"]).unwrap();
        let id = store.attribute_or_add(&["Requester", "A", "1"]).unwrap();
        let number = store.attribute_or_add(&["Requester", "A", "1", NUMBER]).unwrap();
        store.modify_attribute(10, ProcessingState::Processing.into(), id).unwrap();
        store.modify_attribute(10, Value::Long(3), number).unwrap();
        store.modify_attribute(20, Value::Text("A".into()), receiver).unwrap();
        store.modify_attribute(30, ProcessingState::Waiting.into(), id).unwrap();
        ProcessingStatesProvider::new(Arc::new(store), Arc::new(StyleRegistry::new()))
    }

    fn attribute_id(provider: &ProcessingStatesProvider, path: &[&str]) -> i64 {
        entity_id(provider.store().opt_attribute(path).unwrap().unwrap())
    }

    #[test]
    fn test_running_until_built() {
        let provider = provider();
        let id = attribute_id(&provider, &["Requester", "A", "1"]);
        let params = QueryParameters::new()
            .with_selected_items([id])
            .with_time_range(0, 30, 31);

        let rows = provider.fetch_rows(&params);
        assert_eq!(rows.status, ResponseStatus::Running);
        assert_eq!(rows.model.unwrap()[0].states.len(), 3);

        provider.store().close_history(40).unwrap();
        assert_eq!(provider.fetch_tree(&params).status, ResponseStatus::Completed);
    }

    #[test]
    fn test_tooltip_needs_state_element() {
        let provider = provider();
        let id = attribute_id(&provider, &["Requester", "A", "1"]);
        let params = QueryParameters::new()
            .with_selected_items([id])
            .with_requested_times(vec![15]);

        assert!(provider.fetch_tooltip(&params).model.unwrap().is_empty());
        let state = params.clone().with_element(RequestedElement::State);
        let tooltip = provider.fetch_tooltip(&state).model.unwrap();
        assert_eq!(tooltip[VALUE_LABEL], "3");
    }

    #[test]
    fn test_disposed_store_completes_without_data() {
        let provider = provider();
        provider.store().dispose();
        let params = QueryParameters::new().with_requested_times(vec![15]);
        let arrows = provider.fetch_arrows(&params);
        assert_eq!(arrows.status, ResponseStatus::Completed);
        assert!(arrows.model.is_none());
        assert!(provider.fetch_tree(&params).model.is_none());
    }

    #[test]
    fn test_annotations_and_styles() {
        let provider = provider();
        let receiver = attribute_id(&provider, &["Receiver", "r1"]);
        let params = QueryParameters::new()
            .with_selected_items([receiver])
            .with_requested_times(vec![25]);
        let annotations = provider.fetch_annotations(&params).model.unwrap();
        assert!(annotations.contains_key(BALL_CATEGORY));
        assert_eq!(
            provider.fetch_annotation_categories().model.unwrap(),
            vec![BALL_CATEGORY.to_string()]
        );
        assert_eq!(provider.fetch_styles().model.unwrap().len(), 6);
    }
}
