//! Report generation
//!
//! Renders provider responses as plain-text tables or JSON.

use crate::config::OutputFormat;
use anyhow::Result;
use chrono::{DateTime, Utc};
use proc_trace_core::types::timestamp_to_datetime;
use proc_trace_core::{
    AnnotationModel, ArrowModel, ModelResponse, OutputStyle, ResponseStatus, RowModel, StatsReport,
    Timestamp, TreeModel, XyModel,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

const RULE: &str = "───────────────────────────────────────────────";

/// Nanosecond timestamp as `HH:MM:SS.nnnnnnnnn`, with the raw value
pub fn format_time(ts: Timestamp) -> String {
    let datetime: Option<DateTime<Utc>> = timestamp_to_datetime(ts);
    match datetime {
        Some(dt) => format!("{} ({})", dt.format("%H:%M:%S%.9f"), ts),
        None => ts.to_string(),
    }
}

/// Render a response in the requested format
pub fn render<T: Serialize>(
    title: &str,
    response: &ModelResponse<T>,
    format: OutputFormat,
    txt: impl FnOnce(&T, &mut String) -> std::fmt::Result,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(response)?),
        OutputFormat::Txt => {
            let mut out = String::new();
            writeln!(out, "{}", title)?;
            writeln!(out, "{}", RULE)?;
            if response.status != ResponseStatus::Completed {
                writeln!(out, "Status: {:?} ({})", response.status, response.message)?;
            }
            match &response.model {
                Some(model) => txt(model, &mut out)?,
                None => writeln!(out, "{}", response.message)?,
            }
            Ok(out)
        }
    }
}

/// Several responses as one JSON object keyed by section name
pub fn json_sections(sections: Vec<(&str, serde_json::Value)>) -> Result<String> {
    let document: serde_json::Map<String, serde_json::Value> = sections
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn tree_txt(tree: &TreeModel, out: &mut String) -> std::fmt::Result {
    if !tree.columns.is_empty() {
        writeln!(out, "{:>8}  {}", "id", tree.columns.join(" | "))?;
    }
    let mut depth: BTreeMap<i64, usize> = BTreeMap::new();
    for entity in &tree.entities {
        let level = entity.parent_id.and_then(|p| depth.get(&p)).map_or(0, |d| d + 1);
        depth.insert(entity.id, level);
        writeln!(
            out,
            "{:>8}  {}{}",
            entity.id,
            "  ".repeat(level),
            entity.labels.join(" | ")
        )?;
    }
    Ok(())
}

pub fn rows_txt(rows: &Vec<RowModel>, out: &mut String) -> std::fmt::Result {
    for row in rows {
        writeln!(out, "Entity {}", row.entity_id)?;
        for state in &row.states {
            writeln!(
                out,
                "  {}  +{:<10} {}",
                format_time(state.time),
                state.duration,
                state.style_key().unwrap_or("(no data)")
            )?;
        }
    }
    Ok(())
}

pub fn arrows_txt(model: &ArrowModel, out: &mut String) -> std::fmt::Result {
    for arrow in &model.arrows {
        writeln!(
            out,
            "  {:<7} {:>6} -> {:<6} {}  +{}",
            format!("{:?}", arrow.kind),
            arrow.source_id,
            arrow.destination_id,
            format_time(arrow.time),
            arrow.duration
        )?;
    }
    if !model.misses.is_empty() {
        writeln!(out, "Unmatched ({}):", model.misses.len())?;
        for miss in &model.misses {
            writeln!(
                out,
                "  {:<7} receiver {} -> '{}' at {}: {:?}",
                format!("{:?}", miss.kind),
                miss.receiver_id,
                miss.reference,
                format_time(miss.time),
                miss.reason
            )?;
        }
    }
    Ok(())
}

pub fn annotations_txt(model: &AnnotationModel, out: &mut String) -> std::fmt::Result {
    for (category, annotations) in model {
        writeln!(out, "{} ({})", category, annotations.len())?;
        for annotation in annotations {
            writeln!(
                out,
                "  entity {:>6}  {}",
                annotation.entity_id,
                format_time(annotation.time)
            )?;
        }
    }
    Ok(())
}

pub fn stats_txt(report: &StatsReport, out: &mut String) -> std::fmt::Result {
    writeln!(
        out,
        "{:<24} {:>8} {:>12} {:>12} {:>14}",
        "Key", "Count", "Minimum", "Maximum", "Average"
    )?;
    for (key, stats) in &report.stats {
        let opt = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        let mean = if stats.is_empty() {
            String::new()
        } else {
            format!("{:.3}", stats.mean)
        };
        writeln!(
            out,
            "{:<24} {:>8} {:>12} {:>12} {:>14}",
            key,
            stats.count,
            opt(stats.min),
            opt(stats.max),
            mean
        )?;
    }
    if !report.complete {
        writeln!(out, "(incomplete)")?;
    }
    Ok(())
}

pub fn series_txt(model: &XyModel, out: &mut String) -> std::fmt::Result {
    writeln!(out, "{}", model.title)?;
    for series in &model.series {
        writeln!(out, "Series {} ({} points)", series.name, series.x_values.len())?;
        for (x, y) in series.x_values.iter().zip(&series.y_values) {
            writeln!(out, "  {}  {:.3}", format_time(*x), y)?;
        }
    }
    Ok(())
}

pub fn styles_txt(styles: &BTreeMap<String, OutputStyle>, out: &mut String) -> std::fmt::Result {
    for (key, style) in styles {
        let properties: Vec<String> = style
            .values
            .iter()
            .map(|(name, value)| {
                let value = serde_json::to_string(value).unwrap_or_default();
                format!("{}={}", name, value)
            })
            .collect();
        writeln!(out, "{:<16} {}", key, properties.join(" "))?;
    }
    Ok(())
}
