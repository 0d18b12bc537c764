//! State-change log loading
//!
//! A log is a JSON-lines file: one `{"time", "path", "value"}` object per
//! state change and an optional `{"end": t}` line closing the history.
//! Several logs are merged by time before they are written to the store.

use anyhow::{bail, Context, Result};
use proc_trace_core::{IntervalStore, Timestamp, Value};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One line of a state-change log
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LogLine {
    Change {
        time: Timestamp,
        path: Vec<String>,
        value: Value,
    },
    End {
        end: Timestamp,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub time: Timestamp,
    pub path: Vec<String>,
    pub value: Value,
}

/// Parsed contents of one or more logs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceLog {
    /// Ordered by time; changes at the same time keep their file order
    pub changes: Vec<StateChange>,
    pub end: Option<Timestamp>,
}

impl TraceLog {
    /// Time of the first change, or 0 for an empty log
    pub fn start_time(&self) -> Timestamp {
        self.changes.first().map_or(0, |c| c.time)
    }

    /// Time the history is closed at
    pub fn end_time(&self) -> Timestamp {
        let last = self.changes.last().map_or(self.start_time(), |c| c.time);
        self.end.map_or(last, |end| end.max(last))
    }

    fn merge(&mut self, other: TraceLog) {
        self.changes.extend(other.changes);
        self.changes.sort_by_key(|c| c.time);
        self.end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Summary of what a writer committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub changes: usize,
    pub attributes: usize,
    pub end: Timestamp,
}

/// Parse one log from a reader; blank lines are skipped
pub fn parse_log<R: BufRead>(reader: R, source: &str) -> Result<TraceLog> {
    let mut parsed_log = TraceLog::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {} line {}", source, idx + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: LogLine = serde_json::from_str(line)
            .with_context(|| format!("Invalid state change at {}:{}", source, idx + 1))?;
        match parsed {
            LogLine::Change { time, path, value } => {
                if path.is_empty() {
                    bail!("Empty attribute path at {}:{}", source, idx + 1);
                }
                parsed_log.changes.push(StateChange { time, path, value });
            }
            LogLine::End { end } => parsed_log.end = Some(end),
        }
    }
    parsed_log.changes.sort_by_key(|c| c.time);
    log::debug!("Parsed {} state changes from {}", parsed_log.changes.len(), source);
    Ok(parsed_log)
}

/// Read and merge every log in `paths`
pub fn read_logs<P: AsRef<Path>>(paths: &[P]) -> Result<TraceLog> {
    let mut merged = TraceLog::default();
    for path in paths {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open log file: {:?}", path))?;
        merged.merge(parse_log(BufReader::new(file), &path.display().to_string())?);
    }
    Ok(merged)
}

fn write_changes(store: &IntervalStore, trace: &TraceLog) -> Result<IngestSummary> {
    for change in &trace.changes {
        let attribute = store
            .attribute_or_add(change.path.as_slice())
            .with_context(|| format!("Cannot add attribute {}", change.path.join("/")))?;
        store.modify_attribute(change.time, change.value.clone(), attribute)?;
    }
    let end = trace.end_time();
    store.close_history(end)?;
    Ok(IngestSummary {
        changes: trace.changes.len(),
        attributes: store.with_tree(|tree| tree.len())?,
        end,
    })
}

/// Write every change of `trace` into `store`, then close its history
///
/// On failure the store is disposed so that waiting readers give up.
pub fn apply(store: &IntervalStore, trace: &TraceLog) -> Result<IngestSummary> {
    let result = write_changes(store, trace);
    match &result {
        Ok(summary) => log::info!(
            "Loaded {} state changes into {} attributes, history closed at {}",
            summary.changes,
            summary.attributes,
            summary.end
        ),
        Err(e) => {
            log::error!("Loading failed: {:#}", e);
            store.dispose();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const LOG: &str = r#"
{"time": 10, "path": ["Requester", "A", "1"], "value": {"int": 1}}
{"time": 10, "path": ["Requester", "A", "1", "number"], "value": {"long": 4}}
{"time": 5, "path": ["Receiver", "r1"], "value": {"text": "A"}}
{"time": 20, "path": ["Receiver", "r1"], "value": "absent"}
{"end": 50}
"#;

    #[test]
    fn test_parse_log() {
        let log = parse_log(Cursor::new(LOG), "test").unwrap();
        assert_eq!(log.changes.len(), 4);
        assert_eq!(log.changes[0].time, 5);
        assert_eq!(log.changes[0].value, Value::Text("A".into()));
        assert_eq!(log.changes[3].value, Value::Absent);
        assert_eq!((log.start_time(), log.end_time()), (5, 50));
    }

    #[test]
    fn test_invalid_lines_are_reported() {
        let err = parse_log(Cursor::new("{\"time\": 1}\n"), "broken").unwrap_err();
        assert!(format!("{:#}", err).contains("broken:1"));
        let empty_path = r#"{"time": 1, "path": [], "value": "absent"}"#;
        assert!(parse_log(Cursor::new(empty_path), "x").is_err());
    }

    #[test]
    fn test_merge_and_apply() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        write!(first, "{}", LOG).unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            second,
            r#"{{"time": 15, "path": ["Requester", "B", "1"], "value": {{"int": 2}}}}"#
        )
        .unwrap();

        let log = read_logs(&[first.path(), second.path()]).unwrap();
        let times: Vec<Timestamp> = log.changes.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![5, 10, 10, 15, 20]);

        let store = IntervalStore::new("test", log.start_time());
        let summary = apply(&store, &log).unwrap();
        assert!(store.is_built());
        assert_eq!(summary.end, 50);
        assert_eq!(summary.changes, 5);
        // root, Receiver, r1, Requester, A, 1, number, B, 1
        assert_eq!(summary.attributes, 9);
    }

    #[test]
    fn test_out_of_order_disposes_store() {
        let log = TraceLog {
            changes: vec![StateChange {
                time: 1,
                path: vec!["Receiver".into(), "r1".into()],
                value: Value::Absent,
            }],
            end: None,
        };
        let store = IntervalStore::new("test", 10);
        let attribute = store.attribute_or_add(&["Receiver", "r1"]).unwrap();
        store.modify_attribute(20, Value::Text("A".into()), attribute).unwrap();
        assert!(apply(&store, &log).is_err());
        assert!(store.is_disposed());
    }
}
