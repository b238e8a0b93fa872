//! Markdown (with tables) to paginated PDF.

mod blocks;
mod layout;

pub use blocks::{Block, Span, parse as parse_markdown};

use log::debug;

use crate::error::ConversionError;
use crate::stylesheet::Stylesheet;
use layout::PageWriter;

/// Stateless converter; one instance can serve any number of documents.
#[derive(Clone, Copy, Debug, Default)]
pub struct DocumentConverter;

impl DocumentConverter {
    pub fn new() -> Self {
        DocumentConverter
    }

    /// Convert rendered markdown into PDF bytes.
    ///
    /// The document title is taken from the first heading, if any. Without a
    /// stylesheet the built-in defaults apply.
    ///
    /// # Examples
    /// ```
    /// use surveillances::DocumentConverter;
    ///
    /// let pdf = DocumentConverter::new()
    ///     .convert("# Convocation\n\n| Date | Horaire |\n|:--|:--|\n| lundi | 8h |", None)
    ///     .unwrap();
    /// assert!(pdf.starts_with(b"%PDF"));
    /// ```
    pub fn convert(&self, markdown: &str, stylesheet: Option<&Stylesheet>) -> Result<Vec<u8>, ConversionError> {
        let default_style;
        let style = match stylesheet {
            Some(style) => style,
            None => {
                default_style = Stylesheet::default();
                &default_style
            }
        };

        let blocks = blocks::parse(markdown);
        let title = blocks
            .iter()
            .find_map(|block| match block {
                Block::Heading { spans, .. } => {
                    Some(spans.iter().map(|s| s.text.as_str()).collect::<String>())
                }
                _ => None,
            })
            .unwrap_or_else(|| "Document".to_string());

        let mut writer = PageWriter::new(&title, style)?;
        for block in &blocks {
            writer.block(block)?;
        }
        debug!(
            "converted \"{}\": {} blocks on {} page(s)",
            title,
            blocks.len(),
            writer.pages()
        );
        writer.finish()
    }
}
