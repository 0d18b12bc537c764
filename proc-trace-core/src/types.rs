//! Core types for the processing trace library
//!
//! This module defines the values stored in the interval store, the intervals
//! themselves and the error type shared by every query. Derived views (rows,
//! arrows, annotations, statistics) have their own model types next to the
//! code that builds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the library (nanoseconds since epoch)
pub type Timestamp = i64;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Convert a nanosecond timestamp to a calendar time, if representable
pub fn timestamp_to_datetime(ts: Timestamp) -> Option<DateTime<Utc>> {
    let secs = ts.div_euclid(1_000_000_000);
    let nsecs = ts.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nsecs)
}

/// Errors that can occur while writing to or querying the interval store
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(AttributeId),

    #[error("Invalid attribute path: {0}")]
    InvalidPath(String),

    #[error("Interval store has been disposed")]
    Disposed,

    #[error("Invalid time range: start {start} is after end {end}")]
    TimeRange { start: Timestamp, end: Timestamp },

    #[error("Out of order state change on attribute {attribute}: time {time} precedes {last}")]
    OutOfOrder {
        attribute: AttributeId,
        time: Timestamp,
        last: Timestamp,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Stable integer identifier of an attribute in the attribute tree
///
/// Identifiers are assigned once, in creation order, and never reused.
/// Identifier 0 is the root of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeId(pub(crate) u32);

impl AttributeId {
    /// The root attribute (empty path)
    pub const ROOT: AttributeId = AttributeId(0);

    /// Position of this attribute in the tree's arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value carried by an interval
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    /// No recorded state
    #[default]
    Absent,
    /// Enumeration ordinal (see [`ProcessingState`])
    #[serde(rename = "int")]
    Integer(i32),
    /// Numeric payload
    Long(i64),
    /// Reference to another attribute by name
    Text(String),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Get the enumeration ordinal, if this is an integer value
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the numeric payload, if this is a long value
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the referenced name, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "-"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<ProcessingState> for Value {
    fn from(state: ProcessingState) -> Self {
        Value::Integer(state.ordinal())
    }
}

/// A closed time range `[start, end]` holding one value of one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub attribute: AttributeId,
    /// Inclusive start time
    pub start: Timestamp,
    /// Inclusive end time
    pub end: Timestamp,
    pub value: Value,
}

impl Interval {
    pub fn new(attribute: AttributeId, start: Timestamp, end: Timestamp, value: Value) -> Self {
        Self {
            attribute,
            start,
            end,
            value,
        }
    }

    /// True if `time` lies within `[start, end]`
    pub fn intersects(&self, time: Timestamp) -> bool {
        self.start <= time && time <= self.end
    }

    /// True if this interval overlaps `[start, end]`
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start <= end && start <= self.end
    }

    /// Number of time units covered (both bounds inclusive)
    pub fn duration(&self) -> i64 {
        self.end - self.start + 1
    }
}

/// Find the interval containing `time` in a start-ordered slice
///
/// Floor search on the start time followed by a containment check.
pub fn interval_at(intervals: &[Interval], time: Timestamp) -> Option<&Interval> {
    let idx = intervals.partition_point(|interval| interval.start <= time);
    let candidate = intervals.get(idx.checked_sub(1)?)?;
    candidate.intersects(time).then_some(candidate)
}

/// States recorded on the `Requester/<name>/<id>` attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    Initializing,
    Processing,
    Waiting,
}

impl ProcessingState {
    pub const ALL: [ProcessingState; 3] = [
        ProcessingState::Initializing,
        ProcessingState::Processing,
        ProcessingState::Waiting,
    ];

    /// Ordinal stored in the interval value
    pub fn ordinal(self) -> i32 {
        match self {
            ProcessingState::Initializing => 0,
            ProcessingState::Processing => 1,
            ProcessingState::Waiting => 2,
        }
    }

    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(ordinal).ok()?).copied()
    }

    /// Style key used for this state in timeline rows
    pub fn key(self) -> &'static str {
        match self {
            ProcessingState::Initializing => "INITIALIZING",
            ProcessingState::Processing => "PROCESSING",
            ProcessingState::Waiting => "WAITING",
        }
    }

    /// Human readable name
    pub fn display_name(self) -> &'static str {
        match self {
            ProcessingState::Initializing => "Initializing",
            ProcessingState::Processing => "Processing",
            ProcessingState::Waiting => "Waiting",
        }
    }

    /// True if `value` holds this state's ordinal
    pub fn matches(self, value: &Value) -> bool {
        value.as_int() == Some(self.ordinal())
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
