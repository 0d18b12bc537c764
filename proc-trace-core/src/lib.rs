//! Processing Trace Core Library
//!
//! Reconstructs the views of a request/reply "ball" exchange from a
//! hierarchical time-interval attribute store.
//!
//! # Architecture
//!
//! An external ingester writes state changes into an [`IntervalStore`]:
//! - `Receiver/<name>` holds the name of the requester being served (text)
//! - `Requester/<name>/<id>` holds the processing state of each id
//! - `Requester/<name>/<id>/number` holds the number being processed
//!
//! Views read the store concurrently with the writer and never mutate it:
//! - Entity tree and timeline rows
//! - Request/reply arrows, matched by a temporal join on the receiver's
//!   recorded requester name
//! - Hand-off annotations
//! - Grouped statistics and value series of the processed numbers
//!
//! Each view is a capability trait ([`EntityProvider`], [`RowProvider`],
//! [`ArrowProvider`], [`AnnotationProvider`], [`StatsProvider`],
//! [`XyProvider`]) implemented by plain structs over a shared store.
//!
//! # Example Usage
//!
//! ```no_run
//! use proc_trace_core::{
//!     IntervalStore, ProcessingState, ProcessingStatesProvider, QueryParameters, RowProvider,
//!     StyleRegistry, Value,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(IntervalStore::new("trace", 0));
//! let id = store.attribute_or_add(&["Requester", "A", "1"]).unwrap();
//! store.modify_attribute(10, ProcessingState::Processing.into(), id).unwrap();
//! store.modify_attribute(20, Value::from(ProcessingState::Waiting), id).unwrap();
//! store.close_history(30).unwrap();
//!
//! let styles = Arc::new(StyleRegistry::new());
//! let provider = ProcessingStatesProvider::new(Arc::clone(&store), styles);
//! let params = QueryParameters::new()
//!     .with_selected_items([id.index() as i64])
//!     .with_time_range(0, 30, 100);
//! let rows = provider.fetch_rows(&params);
//! println!("{:?}", rows.status);
//! ```

// Public modules
pub mod annotations;
pub mod arrows;
pub mod attributes;
pub mod config;
pub mod entities;
pub mod monitor;
pub mod provider;
pub mod rows;
pub mod series;
pub mod statistics;
pub mod store;
pub mod style;
pub mod timegraph;
pub mod types;

// Re-export main types for convenience
pub use annotations::{Annotation, AnnotationModel};
pub use arrows::{Arrow, ArrowKind, ArrowMiss, ArrowModel, MissReason};
pub use attributes::AttributeTree;
pub use config::{QueryParameters, RequestedElement, StatsConfig};
pub use entities::{Entity, EntityId, EntityIdRegistry, TreeModel};
pub use monitor::ProgressMonitor;
pub use provider::{
    AnnotationProvider, ArrowProvider, EntityProvider, ModelResponse, ResponseStatus, RowProvider,
    StatsProvider, XyProvider,
};
pub use rows::{RowModel, TimeGraphState};
pub use series::{ProcessingValuesProvider, Series, SeriesKind, XyModel};
pub use statistics::{ProcessingStatisticsProvider, Statistics, StatsReport};
pub use store::IntervalStore;
pub use style::{OutputStyle, StyleRegistry};
pub use timegraph::ProcessingStatesProvider;
pub use types::{AttributeId, Interval, ProcessingState, Result, Timestamp, TraceError, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
