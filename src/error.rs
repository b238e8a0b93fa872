//! Error types for every stage of the generation pipeline.
//!
//! Each component owns a small enum; [`Error`] aggregates them for callers
//! that only want a single type (the web layer and the binaries).

use thiserror::Error;

use crate::grouping::Field;

/// The uploaded spreadsheet could not be turned into a [`crate::Dataset`].
///
/// Row numbers are 1-based and count the header row, so they match what a
/// user sees in their spreadsheet application.
#[derive(Debug, Error)]
pub enum DataFormatError {
    #[error("unable to read spreadsheet: {0}")]
    Workbook(String),

    #[error("spreadsheet contains no worksheet")]
    NoWorksheet,

    #[error("missing column \"{0}\"")]
    MissingColumn(&'static str),

    #[error("row {row}: column \"{column}\" is empty")]
    EmptyValue { row: usize, column: &'static str },

    #[error("row {row}: invalid date \"{value}\"")]
    InvalidDate { row: usize, value: String },

    #[error("row {row}: invalid time slot \"{value}\"")]
    InvalidSlot { row: usize, value: String },
}

/// Filtering a dataset on a key yielded nothing.
///
/// Keys handed to the grouper come from [`crate::Dataset::distinct`], so this
/// signals an internal inconsistency rather than bad user input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("no rows where {field} = \"{value}\"")]
    EmptyGroup { field: Field, value: String },
}

/// Placeholder substitution failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("unknown placeholder \"{name}\"")]
    MissingKey { name: String },

    #[error("template syntax error: {0}")]
    Syntax(String),
}

/// Markdown to PDF conversion failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("table with {columns} columns does not fit in {available_mm:.0} mm")]
    TableTooWide { columns: usize, available_mm: f32 },

    #[error("page leaves {available_mm:.0} mm for table rows, not enough for one line")]
    RowTooTall { available_mm: f32 },

    #[error("pdf generation failed: {0}")]
    Pdf(String),
}

/// Why a single group could not be turned into an archive entry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ItemError {
    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// A batch run stopped before producing an archive.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("document for \"{key}\" failed: {source}")]
    Item {
        key: String,
        #[source]
        source: ItemError,
    },

    #[error("unable to write archive: {0}")]
    Archive(String),

    #[error("a batch is already running")]
    Busy,
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown locale \"{0}\"")]
    UnknownLocale(String),

    #[error("invalid date pattern \"{0}\"")]
    InvalidPattern(String),
}

/// Any failure the crate can report.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    DataFormat(#[from] DataFormatError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
