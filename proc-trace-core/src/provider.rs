//! Provider capabilities and the response envelope
//!
//! Each derived view is an independent capability over the interval store.
//! A caller composes the ones it needs; no provider depends on another.

use crate::annotations::AnnotationModel;
use crate::arrows::ArrowModel;
use crate::config::QueryParameters;
use crate::entities::TreeModel;
use crate::monitor::ProgressMonitor;
use crate::rows::RowModel;
use crate::series::XyModel;
use crate::statistics::StatsReport;
use crate::types::{Result, TraceError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of a provider fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    /// The model is final (it may still be absent when there is no data)
    Completed,
    /// The store is still being written; the model covers committed data only
    Running,
    /// The computation was cancelled; the model holds what was merged so far
    Cancelled,
    /// The request could not be served
    Failed,
}

/// Model returned by a provider together with its status
#[derive(Debug, Clone, Serialize)]
pub struct ModelResponse<T> {
    pub model: Option<T>,
    pub status: ResponseStatus,
    pub message: String,
}

pub const COMPLETED_MESSAGE: &str = "Completed";
pub const RUNNING_MESSAGE: &str = "Running";
pub const NO_DATA_MESSAGE: &str = "No data";
pub const CANCELLED_MESSAGE: &str = "Task cancelled";

impl<T> ModelResponse<T> {
    pub fn completed(model: T) -> Self {
        Self {
            model: Some(model),
            status: ResponseStatus::Completed,
            message: COMPLETED_MESSAGE.to_string(),
        }
    }

    /// Partial model over data committed so far
    pub fn running(model: T) -> Self {
        Self {
            model: Some(model),
            status: ResponseStatus::Running,
            message: RUNNING_MESSAGE.to_string(),
        }
    }

    /// Completed without a model
    pub fn no_data() -> Self {
        Self {
            model: None,
            status: ResponseStatus::Completed,
            message: NO_DATA_MESSAGE.to_string(),
        }
    }

    pub fn cancelled(model: Option<T>) -> Self {
        Self {
            model,
            status: ResponseStatus::Cancelled,
            message: CANCELLED_MESSAGE.to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            model: None,
            status: ResponseStatus::Failed,
            message: message.into(),
        }
    }

    /// Wrap a query result
    ///
    /// A disposed store or an inverted time range is not a fault: the
    /// response completes without data. Anything else fails the request.
    pub fn from_result(result: Result<T>, complete: bool) -> Self {
        match result {
            Ok(model) if complete => Self::completed(model),
            Ok(model) => Self::running(model),
            Err(TraceError::Disposed) | Err(TraceError::TimeRange { .. }) => Self::no_data(),
            Err(e) => {
                log::warn!("Provider query failed: {}", e);
                Self::failed(e.to_string())
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ModelResponse<U> {
        ModelResponse {
            model: self.model.map(f),
            status: self.status,
            message: self.message,
        }
    }
}

/// Builds the entity tree of a view
pub trait EntityProvider {
    fn fetch_tree(&self, params: &QueryParameters) -> ModelResponse<TreeModel>;
}

/// Projects entities onto the requested time grid
pub trait RowProvider {
    fn fetch_rows(&self, params: &QueryParameters) -> ModelResponse<Vec<RowModel>>;

    /// Name/value pairs describing the element under the cursor
    fn fetch_tooltip(&self, params: &QueryParameters) -> ModelResponse<BTreeMap<String, String>>;
}

/// Synthesises cross-entity arrows
pub trait ArrowProvider {
    fn fetch_arrows(&self, params: &QueryParameters) -> ModelResponse<ArrowModel>;
}

/// Derives point markers grouped by category
pub trait AnnotationProvider {
    fn fetch_annotation_categories(&self) -> ModelResponse<Vec<String>>;

    fn fetch_annotations(&self, params: &QueryParameters) -> ModelResponse<AnnotationModel>;
}

/// Aggregates statistics over a time range
pub trait StatsProvider {
    fn fetch_statistics(
        &self,
        params: &QueryParameters,
        monitor: &ProgressMonitor,
    ) -> ModelResponse<StatsReport>;
}

/// Samples numeric series over the requested times
pub trait XyProvider {
    fn fetch_xy(&self, params: &QueryParameters) -> ModelResponse<XyModel>;
}
