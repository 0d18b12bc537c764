//! Output styles
//!
//! Every state, arrow and annotation refers to a style by key. The full style
//! table is returned by [`style_model`]; individual elements carry a
//! reference style obtained through a [`StyleRegistry`].

use crate::types::ProcessingState;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const BALL_REQUEST_ARROW_KEY: &str = "BallRequest";
pub const BALL_REPLY_ARROW_KEY: &str = "BallReply";
pub const BALL_ANNOTATION_KEY: &str = "BallAnnotation";

/// The single annotation category produced by this system
pub const BALL_CATEGORY: &str = "Ball";

// Style property names
pub const BACKGROUND_COLOR: &str = "background-color";
pub const COLOR: &str = "color";
pub const WIDTH: &str = "width";
pub const HEIGHT: &str = "height";
pub const STYLE_GROUP: &str = "style-group";
pub const STYLE_NAME: &str = "style-name";
pub const SYMBOL_TYPE: &str = "symbol-type";
pub const SERIES_TYPE: &str = "series-type";
pub const SERIES_STYLE: &str = "series-style";

/// Colours rotated over the id series of the value views
const SERIES_PALETTE: [&str; 4] = ["#1F77B4", "#FF7F0E", "#2CA02C", "#D62728"];

/// A single style property value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StyleValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<&str> for StyleValue {
    fn from(v: &str) -> Self {
        StyleValue::Text(v.to_string())
    }
}

impl From<i64> for StyleValue {
    fn from(v: i64) -> Self {
        StyleValue::Int(v)
    }
}

impl From<f64> for StyleValue {
    fn from(v: f64) -> Self {
        StyleValue::Float(v)
    }
}

/// Style of an output element: an optional parent key plus overrides
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OutputStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, StyleValue>,
}

impl OutputStyle {
    /// A style that only refers to an entry of the style table
    pub fn reference(key: impl Into<String>) -> Self {
        Self {
            parent_key: Some(key.into()),
            values: BTreeMap::new(),
        }
    }

    /// A standalone style built from property pairs
    pub fn with_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<StyleValue>,
    {
        Self {
            parent_key: None,
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        }
    }

    /// The style table key this style refers to
    pub fn key(&self) -> Option<&str> {
        self.parent_key.as_deref()
    }
}

/// Read-through cache of reference styles, keyed by style key
///
/// Providers own one and hand out clones; tests can start from a fresh one.
#[derive(Debug, Default)]
pub struct StyleRegistry {
    cache: RwLock<HashMap<String, OutputStyle>>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the reference style for `key`, creating it on first use
    pub fn get(&self, key: &str) -> OutputStyle {
        if let Some(style) = self.cache.read().get(key) {
            return style.clone();
        }
        self.cache
            .write()
            .entry(key.to_string())
            .or_insert_with(|| OutputStyle::reference(key))
            .clone()
    }

    /// Number of distinct keys handed out so far
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

fn state_style(state: ProcessingState) -> OutputStyle {
    let color = match state {
        ProcessingState::Initializing => "#888888",
        ProcessingState::Processing => "#BCDD68",
        ProcessingState::Waiting => "#CCCCCC",
    };
    OutputStyle::with_values([
        (BACKGROUND_COLOR, StyleValue::from(color)),
        (STYLE_GROUP, "States".into()),
        (STYLE_NAME, state.display_name().into()),
    ])
}

fn arrow_style(color: &str, name: &str) -> OutputStyle {
    OutputStyle::with_values([
        (COLOR, StyleValue::from(color)),
        (WIDTH, 2i64.into()),
        (STYLE_GROUP, "Arrows".into()),
        (STYLE_NAME, name.into()),
    ])
}

/// The complete style table, keyed by style key
pub fn style_model() -> BTreeMap<String, OutputStyle> {
    let mut styles = BTreeMap::new();
    for state in ProcessingState::ALL {
        styles.insert(state.key().to_string(), state_style(state));
    }
    styles.insert(
        BALL_REQUEST_ARROW_KEY.to_string(),
        arrow_style("#00FF00", "Ball Request"),
    );
    styles.insert(
        BALL_REPLY_ARROW_KEY.to_string(),
        arrow_style("#CC0000", "Ball Reply"),
    );
    styles.insert(
        BALL_ANNOTATION_KEY.to_string(),
        OutputStyle::with_values([
            (SYMBOL_TYPE, StyleValue::from("circle")),
            (COLOR, "#0000CC".into()),
            (HEIGHT, 0.25f64.into()),
            (STYLE_GROUP, "Markers".into()),
            (STYLE_NAME, "Ball".into()),
        ]),
    );
    styles
}

/// Colour of the `index`-th value series
pub fn series_color(index: usize) -> &'static str {
    SERIES_PALETTE[index % SERIES_PALETTE.len()]
}

/// Style of a value series drawn as a line of dots
pub fn line_series_style(index: usize) -> OutputStyle {
    OutputStyle::with_values([
        (COLOR, StyleValue::from(series_color(index))),
        (SERIES_STYLE, "dot".into()),
        (WIDTH, 3i64.into()),
    ])
}

/// Style of a value series drawn as scattered diamonds
pub fn scatter_series_style(index: usize) -> OutputStyle {
    OutputStyle::with_values([
        (COLOR, StyleValue::from(series_color(index))),
        (SERIES_TYPE, "scatter".into()),
        (SERIES_STYLE, "none".into()),
        (SYMBOL_TYPE, "diamond".into()),
        (HEIGHT, 2.0f64.into()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_memoizes() {
        let registry = StyleRegistry::new();
        assert!(registry.is_empty());
        let first = registry.get(BALL_REQUEST_ARROW_KEY);
        let second = registry.get(BALL_REQUEST_ARROW_KEY);
        registry.get(BALL_REPLY_ARROW_KEY);
        assert_eq!(first, second);
        assert_eq!(first.key(), Some(BALL_REQUEST_ARROW_KEY));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_style_model_covers_all_keys() {
        let model = style_model();
        for key in [
            "INITIALIZING",
            "PROCESSING",
            "WAITING",
            BALL_REQUEST_ARROW_KEY,
            BALL_REPLY_ARROW_KEY,
            BALL_ANNOTATION_KEY,
        ] {
            assert!(model.contains_key(key), "missing style {}", key);
        }
        let processing = &model["PROCESSING"];
        assert_eq!(
            processing.values.get(BACKGROUND_COLOR),
            Some(&StyleValue::Text("#BCDD68".into()))
        );
        assert_eq!(
            model[BALL_REPLY_ARROW_KEY].values.get(WIDTH),
            Some(&StyleValue::Int(2))
        );
    }

    #[test]
    fn test_series_palette_rotates() {
        assert_eq!(series_color(1), series_color(5));
        assert_ne!(series_color(0), series_color(1));
    }
}
