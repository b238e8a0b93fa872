//! Paginated layout of blocks onto PDF pages.
//!
//! Coordinates are millimetres from the bottom-left corner, as printpdf
//! expects. Text metrics come from the Helvetica AFM widths, which is what
//! the built-in fonts actually render with.

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};

use super::blocks::{Block, Cell, Span};
use crate::error::ConversionError;
use crate::stylesheet::{Stylesheet, parse_color};

const PT_TO_MM: f32 = 0.352_778;

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {..~
];

fn char_width(c: char) -> u16 {
    let code = c as u32;
    if (32..=126).contains(&code) {
        HELVETICA_WIDTHS[(code - 32) as usize]
    } else {
        // Accented letters share their base letter's width closely enough
        556
    }
}

/// Width of `text` in mm at `size` points.
pub fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let units: u32 = text.chars().map(|c| char_width(c) as u32).sum();
    let factor = if bold { 1.06 } else { 1.0 };
    units as f32 / 1000.0 * size * PT_TO_MM * factor
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    bold_italic: IndirectFontRef,
}

impl Fonts {
    fn pick(&self, bold: bool, italic: bool) -> &IndirectFontRef {
        match (bold, italic) {
            (false, false) => &self.regular,
            (true, false) => &self.bold,
            (false, true) => &self.italic,
            (true, true) => &self.bold_italic,
        }
    }
}

/// A word (or a forced line break) placed during wrapping.
#[derive(Clone, Debug)]
struct Fragment {
    text: String,
    bold: bool,
    italic: bool,
    color: Option<(f32, f32, f32)>,
    size: f32,
    space_before: bool,
    newline: bool,
}

impl Fragment {
    fn width(&self) -> f32 {
        text_width(&self.text, self.size, self.bold)
    }
}

/// A wrapped line: fragments with their x offsets, and the line's font size.
struct LaidLine {
    pieces: Vec<(f32, Fragment)>,
    size: f32,
}

fn fragments(spans: &[Span], base_size: f32, force_bold: bool) -> Vec<Fragment> {
    let mut out = Vec::new();
    let mut pending_space = false;
    for span in spans {
        let size = base_size * span.scale;
        for (i, line) in span.text.split('\n').enumerate() {
            if i > 0 {
                out.push(Fragment {
                    text: String::new(),
                    bold: false,
                    italic: false,
                    color: None,
                    size,
                    space_before: false,
                    newline: true,
                });
                pending_space = false;
            }
            if line.starts_with(char::is_whitespace) {
                pending_space = true;
            }
            let mut words = line.split_whitespace().peekable();
            while let Some(word) = words.next() {
                out.push(Fragment {
                    text: word.to_string(),
                    bold: span.bold || force_bold,
                    italic: span.italic,
                    color: span.color,
                    size,
                    space_before: pending_space,
                    newline: false,
                });
                pending_space = words.peek().is_some();
            }
            if line.ends_with(char::is_whitespace) && !line.trim().is_empty() {
                pending_space = true;
            }
        }
    }
    out
}

/// Greedy word wrapping into lines no wider than `max_width` mm.
fn wrap(fragments: Vec<Fragment>, max_width: f32, base_size: f32) -> Vec<LaidLine> {
    let mut lines = Vec::new();
    let mut current: Vec<(f32, Fragment)> = Vec::new();
    let mut x = 0.0;
    let mut size = base_size;

    for fragment in fragments {
        if fragment.newline {
            lines.push(LaidLine {
                pieces: std::mem::take(&mut current),
                size,
            });
            x = 0.0;
            size = base_size;
            continue;
        }
        let space = if fragment.space_before && !current.is_empty() {
            text_width(" ", fragment.size, false)
        } else {
            0.0
        };
        let width = fragment.width();
        if !current.is_empty() && x + space + width > max_width {
            lines.push(LaidLine {
                pieces: std::mem::take(&mut current),
                size,
            });
            size = base_size.max(fragment.size);
            current.push((0.0, fragment));
            x = width;
            continue;
        }
        size = size.max(fragment.size);
        current.push((x + space, fragment));
        x += space + width;
    }
    if !current.is_empty() {
        lines.push(LaidLine {
            pieces: current,
            size,
        });
    }
    lines
}

fn rgb(color: (f32, f32, f32)) -> Color {
    Color::Rgb(Rgb::new(color.0, color.1, color.2, None))
}

/// Cursor-based writer over a growing PDF document.
pub struct PageWriter<'s> {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    fonts: Fonts,
    style: &'s Stylesheet,
    /// Baseline cursor, mm from the bottom edge.
    y: f32,
    pages: usize,
    text_color: (f32, f32, f32),
    heading_color: (f32, f32, f32),
    rule_color: (f32, f32, f32),
}

impl<'s> PageWriter<'s> {
    pub fn new(title: &str, style: &'s Stylesheet) -> Result<Self, ConversionError> {
        let (doc, page, layer) = PdfDocument::new(
            title,
            Mm(style.page_width_mm),
            Mm(style.page_height_mm),
            "Page 1",
        );
        let font = |builtin: BuiltinFont| {
            doc.add_builtin_font(builtin)
                .map_err(|e| ConversionError::Pdf(e.to_string()))
        };
        let fonts = Fonts {
            regular: font(BuiltinFont::Helvetica)?,
            bold: font(BuiltinFont::HelveticaBold)?,
            italic: font(BuiltinFont::HelveticaOblique)?,
            bold_italic: font(BuiltinFont::HelveticaBoldOblique)?,
        };
        let layer = doc.get_page(page).get_layer(layer);
        let black = (0.0, 0.0, 0.0);

        Ok(PageWriter {
            doc,
            layer,
            fonts,
            style,
            y: style.page_height_mm - style.margin_mm,
            pages: 1,
            text_color: parse_color(&style.text_color).unwrap_or(black),
            heading_color: parse_color(&style.heading_color).unwrap_or(black),
            rule_color: parse_color(&style.rule_color).unwrap_or(black),
        })
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    fn new_page(&mut self) {
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(self.style.page_width_mm),
            Mm(self.style.page_height_mm),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = self.style.page_height_mm - self.style.margin_mm;
    }

    /// Break the page unless `height` mm still fit above the bottom margin.
    fn reserve(&mut self, height: f32) {
        let at_top = self.y >= self.style.page_height_mm - self.style.margin_mm;
        if self.y - height < self.style.margin_mm && !at_top {
            self.new_page();
        }
    }

    fn line_height(&self, size: f32) -> f32 {
        size * self.style.line_height * PT_TO_MM
    }

    fn rule(&mut self, x1: f32, x2: f32, y: f32, thickness: f32) {
        self.layer.set_outline_color(rgb(self.rule_color));
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y)), false),
                (Point::new(Mm(x2), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    fn draw_line(&self, line: &LaidLine, x0: f32, baseline: f32, default_color: (f32, f32, f32)) {
        for (x, fragment) in &line.pieces {
            let font = self.fonts.pick(fragment.bold, fragment.italic);
            self.layer
                .set_fill_color(rgb(fragment.color.unwrap_or(default_color)));
            self.layer
                .use_text(fragment.text.clone(), fragment.size, Mm(x0 + x), Mm(baseline), font);
        }
    }

    /// Lay out wrapped text starting at `indent` mm from the left margin.
    fn text_block(&mut self, spans: &[Span], size: f32, indent: f32, bold: bool, color: (f32, f32, f32)) {
        let x0 = self.style.margin_mm + indent;
        let width = self.style.text_width_mm() - indent;
        for line in wrap(fragments(spans, size, bold), width, size) {
            let height = self.line_height(line.size);
            self.reserve(height);
            self.y -= height;
            self.draw_line(&line, x0, self.y + height * 0.25, color);
        }
    }

    fn spacing(&mut self) {
        self.y -= self.style.paragraph_spacing * PT_TO_MM;
    }

    pub fn block(&mut self, block: &Block) -> Result<(), ConversionError> {
        match block {
            Block::Heading { level, spans } => {
                let size = self.style.heading_sizes[(*level).clamp(1, 6) - 1];
                // Keep a heading with at least one line of what follows
                self.reserve(self.line_height(size) + self.line_height(self.style.font_size));
                let color = self.heading_color;
                self.text_block(spans, size, 0.0, true, color);
                self.spacing();
            }
            Block::Paragraph(spans) => {
                let color = self.text_color;
                self.text_block(spans, self.style.font_size, 0.0, false, color);
                self.spacing();
            }
            Block::ListItem { marker, depth, spans } => {
                let indent = 6.0 * (*depth as f32 + 1.0);
                let size = self.style.font_size;
                let color = self.text_color;
                if !marker.is_empty() {
                    let height = self.line_height(size);
                    self.reserve(height);
                    let marker_x = self.style.margin_mm + indent - text_width(marker, size, false) - 2.0;
                    self.layer.set_fill_color(rgb(color));
                    self.layer.use_text(
                        marker.clone(),
                        size,
                        Mm(marker_x),
                        Mm(self.y - height * 0.75),
                        &self.fonts.regular,
                    );
                }
                self.text_block(spans, size, indent, false, color);
                self.y -= self.style.paragraph_spacing * PT_TO_MM * 0.4;
            }
            Block::Table { header, rows } => {
                self.table(header, rows)?;
                self.spacing();
            }
            Block::Rule => {
                self.reserve(4.0);
                self.y -= 2.0;
                let right = self.style.page_width_mm - self.style.margin_mm;
                self.rule(self.style.margin_mm, right, self.y, self.style.rule_thickness);
                self.y -= 2.0;
            }
        }
        Ok(())
    }

    /// Column widths: natural widths when they fit, otherwise shrunk
    /// proportionally down to the stylesheet minimum.
    fn column_widths(&self, header: &[Cell], rows: &[Vec<Cell>]) -> Result<Vec<f32>, ConversionError> {
        let size = self.style.table_font_size;
        let pad = 2.0 * self.style.cell_padding_mm;
        let columns = header.len().max(rows.iter().map(Vec::len).max().unwrap_or(0));
        let available = self.style.text_width_mm();

        let cell_width = |cell: &Cell, bold: bool| -> f32 {
            cell.iter()
                .map(|span| text_width(&span.text, size * span.scale, bold || span.bold))
                .sum::<f32>()
        };
        let natural: Vec<f32> = (0..columns)
            .map(|i| {
                let head = header.get(i).map_or(0.0, |c| cell_width(c, true));
                rows.iter()
                    .filter_map(|row| row.get(i))
                    .map(|c| cell_width(c, false))
                    .fold(head, f32::max)
                    + pad
            })
            .map(|w| w.max(self.style.min_column_mm))
            .collect();

        let total: f32 = natural.iter().sum();
        if total <= available {
            return Ok(natural);
        }
        if columns as f32 * self.style.min_column_mm > available {
            return Err(ConversionError::TableTooWide {
                columns,
                available_mm: available,
            });
        }
        // Shrink only what exceeds the minimum
        let min = self.style.min_column_mm;
        let excess: f32 = natural.iter().map(|w| w - min).sum();
        let budget = available - min * columns as f32;
        Ok(natural
            .iter()
            .map(|w| min + (w - min) * budget / excess)
            .collect())
    }

    fn wrap_row(&self, cells: &[Cell], widths: &[f32], bold: bool) -> Vec<Vec<LaidLine>> {
        let size = self.style.table_font_size;
        let pad = self.style.cell_padding_mm;
        widths
            .iter()
            .enumerate()
            .map(|(i, width)| {
                let spans = cells.get(i).map(Vec::as_slice).unwrap_or(&[]);
                wrap(fragments(spans, size, bold), width - 2.0 * pad, size)
            })
            .collect()
    }

    fn row_lines(wrapped: &[Vec<LaidLine>]) -> usize {
        wrapped.iter().map(Vec::len).max().unwrap_or(0).max(1)
    }

    /// Table lines that still fit above the bottom margin.
    fn lines_fitting(&self) -> usize {
        let line_h = self.line_height(self.style.table_font_size);
        let room = self.y - self.style.margin_mm - 2.0 * self.style.cell_padding_mm;
        ((room + 1e-3) / line_h).floor().max(0.0) as usize
    }

    /// Draw lines `from..from + count` of every cell; returns the height used.
    fn table_row(&mut self, wrapped: &[Vec<LaidLine>], widths: &[f32], from: usize, count: usize) -> f32 {
        let pad = self.style.cell_padding_mm;
        let line_h = self.line_height(self.style.table_font_size);

        let top = self.y;
        let mut x = self.style.margin_mm;
        for (column, width) in wrapped.iter().zip(widths) {
            let mut baseline = top - pad;
            for line in column.iter().skip(from).take(count) {
                baseline -= line_h;
                self.draw_line(line, x + pad, baseline + line_h * 0.25, self.text_color);
            }
            x += width;
        }
        count.max(1) as f32 * line_h + 2.0 * pad
    }

    fn table_header(&mut self, header: &[Vec<LaidLine>], widths: &[f32], left: f32, right: f32) {
        let thin = self.style.rule_thickness;
        self.rule(left, right, self.y, thin);
        let height = self.table_row(header, widths, 0, Self::row_lines(header));
        self.y -= height;
        self.rule(left, right, self.y, thin * 2.0);
    }

    fn table(&mut self, header: &[Cell], rows: &[Vec<Cell>]) -> Result<(), ConversionError> {
        let widths = self.column_widths(header, rows)?;
        let left = self.style.margin_mm;
        let right = left + widths.iter().sum::<f32>();
        let thin = self.style.rule_thickness;
        let pad = self.style.cell_padding_mm;
        let line_h = self.line_height(self.style.table_font_size);

        let header = self.wrap_row(header, &widths, true);
        let header_height = Self::row_lines(&header) as f32 * line_h + 2.0 * pad;
        // Lines a row may take on a page holding nothing but the header
        let page_room = self.style.page_height_mm - 2.0 * self.style.margin_mm - header_height - 2.0 * pad;
        let page_capacity = ((page_room + 1e-3) / line_h).floor().max(0.0) as usize;
        if page_capacity == 0 {
            return Err(ConversionError::RowTooTall {
                available_mm: page_room.max(0.0),
            });
        }

        self.reserve(header_height + line_h + 2.0 * pad);
        self.table_header(&header, &widths, left, right);

        for row in rows {
            let wrapped = self.wrap_row(row, &widths, false);
            let total = Self::row_lines(&wrapped);
            let mut from = 0;
            while from < total {
                let remaining = total - from;
                let mut fit = self.lines_fitting();
                // Rows that fit on a page move there whole; taller ones are split
                if fit < remaining && (fit == 0 || remaining <= page_capacity) {
                    self.new_page();
                    // Repeat the header on continuation pages
                    self.table_header(&header, &widths, left, right);
                    fit = self.lines_fitting().max(1);
                }
                let count = fit.min(remaining);
                let height = self.table_row(&wrapped, &widths, from, count);
                self.y -= height;
                self.rule(left, right, self.y, thin);
                from += count;
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>, ConversionError> {
        self.doc
            .save_to_bytes()
            .map_err(|e| ConversionError::Pdf(e.to_string()))
    }
}
