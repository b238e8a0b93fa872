//! Page and typography settings applied to every document of a run.
//!
//! Stylesheets are small JSON files living next to the server. Any key left
//! out keeps its default, so `{}` is a valid stylesheet.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stylesheet {
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub margin_mm: f32,
    /// Body text size in points.
    pub font_size: f32,
    /// Sizes for `#` to `######`.
    pub heading_sizes: [f32; 6],
    /// Line height as a multiple of the font size.
    pub line_height: f32,
    /// Space after a block, in points.
    pub paragraph_spacing: f32,
    pub table_font_size: f32,
    /// Padding inside table cells, in mm.
    pub cell_padding_mm: f32,
    pub rule_thickness: f32,
    pub text_color: String,
    pub heading_color: String,
    pub rule_color: String,
    /// Narrowest a table column may shrink to before conversion fails.
    pub min_column_mm: f32,
}

impl Default for Stylesheet {
    fn default() -> Self {
        Stylesheet {
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            margin_mm: 20.0,
            font_size: 11.0,
            heading_sizes: [22.0, 17.0, 14.0, 12.0, 11.0, 10.0],
            line_height: 1.4,
            paragraph_spacing: 6.0,
            table_font_size: 10.0,
            cell_padding_mm: 1.5,
            rule_thickness: 0.5,
            text_color: "#000000".to_string(),
            heading_color: "#000000".to_string(),
            rule_color: "#555555".to_string(),
            min_column_mm: 12.0,
        }
    }
}

impl Stylesheet {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load `path`, falling back to the defaults when it is missing or broken.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(sheet) => sheet,
            Err(e) => {
                warn!("{}; using default stylesheet", e);
                Stylesheet::default()
            }
        }
    }

    pub fn text_width_mm(&self) -> f32 {
        self.page_width_mm - 2.0 * self.margin_mm
    }
}

/// Parse `#rgb`, `#rrggbb` or a handful of CSS colour names into 0..1 RGB.
pub fn parse_color(value: &str) -> Option<(f32, f32, f32)> {
    let value = value.trim().to_ascii_lowercase();
    let named = match value.as_str() {
        "black" => Some((0, 0, 0)),
        "white" => Some((255, 255, 255)),
        "red" => Some((255, 0, 0)),
        "green" => Some((0, 128, 0)),
        "blue" => Some((0, 0, 255)),
        "gray" | "grey" => Some((128, 128, 128)),
        "orange" => Some((255, 165, 0)),
        "darkred" => Some((139, 0, 0)),
        "navy" => Some((0, 0, 128)),
        _ => None,
    };
    let (r, g, b) = match named {
        Some(rgb) => rgb,
        None => {
            let hex = value.strip_prefix('#')?;
            let expanded: String = match hex.len() {
                3 => hex.chars().flat_map(|c| [c, c]).collect(),
                6 => hex.to_string(),
                _ => return None,
            };
            let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
            (channel(0)?, channel(2)?, channel(4)?)
        }
    };
    Some((r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let sheet = Stylesheet::from_json(r#"{ "font_size": 12.5, "margin_mm": 15 }"#).unwrap();
        assert_eq!(sheet.font_size, 12.5);
        assert_eq!(sheet.margin_mm, 15.0);
        assert_eq!(sheet.page_width_mm, 210.0);
        assert_eq!(sheet.text_width_mm(), 180.0);
    }

    #[test]
    fn loads_from_disk_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("style.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{ "text_color": "navy" }}"#).unwrap();

        assert_eq!(Stylesheet::load(&path).unwrap().text_color, "navy");
        assert_eq!(
            Stylesheet::load_or_default(dir.path().join("missing.json")),
            Stylesheet::default()
        );
        assert!(matches!(
            Stylesheet::load(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn colors() {
        assert_eq!(parse_color("red"), Some((1.0, 0.0, 0.0)));
        assert_eq!(parse_color("#fff"), Some((1.0, 1.0, 1.0)));
        assert_eq!(parse_color("#000000"), Some((0.0, 0.0, 0.0)));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("chartreuse"), None);
    }
}
