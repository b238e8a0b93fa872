/*!
# Surveillances

Generates exam-proctoring documents from a schedule spreadsheet.

## Overview

A department keeps its proctoring schedule in a spreadsheet: one row per
assignment of a teacher to an exam slot. This crate turns that sheet into two
families of PDF documents, each delivered as a zip archive:

- **Convocations**: one letter per teacher listing the slots they proctor.
- **Fiches de suivi**: one sheet per exam listing its proctors, with room and
  remarks columns left blank to be filled in by hand.

## Pipeline

```text
spreadsheet bytes -> Dataset -> group per key -> template -> markdown -> PDF -> zip
```

### Record Store
- Reads `.ods`, `.xlsx`, `.xls` and `.xlsb` with calamine
- Validates the `Enseignant`, `Matière`, `VraiMatière`, `Date` and `Horaire`
  columns once, at load
- Keeps any other column as free-form text

### Grouper
- Filters rows on a key column and projects them into a markdown pipe table
- Sorts rows stably, dates chronologically
- Formats dates with an explicit locale and pattern

### Template Renderer
- `{{name}}` placeholders through handlebars in strict mode
- A missing value is an error, never an empty string

### Document Converter
- Parses markdown tables and inline `<span style>` with pulldown-cmark
- Lays out A4 pages with printpdf, repeating table headers across page breaks

### Batch Packager
- One document per distinct key, written into an in-memory zip
- Per-item failures either abort the run or are collected in a report
- Progress after every item

## Modules

- **dataset**: typed rows and spreadsheet loading
- **grouping**: grouping, sorting and markdown tables
- **template**: placeholder substitution
- **converter**: markdown to PDF
- **packager**: batch runs, archives and reports
- **documents**: the two document kinds and their default templates
- **dates**: locale-aware date formatting
- **stylesheet**: page and typography settings
- **config**: application configuration
- **error**: error types
- **app**, **session**: the web interface (feature `web`)

## REST API Endpoints

- `GET /` - Upload and generation page
- `POST /api/dataset` - Upload the schedule spreadsheet
- `GET|PUT /api/templates/{kind}` - Read or replace a template
- `POST /api/generate/{kind}` - Run a batch and download its archive
- `GET /api/report/{kind}` - Summary of the last batch
- `GET /api/progress` - Progress of the running batch
*/

pub mod config;
pub mod converter;
pub mod dataset;
pub mod dates;
pub mod documents;
pub mod error;
pub mod grouping;
pub mod packager;
pub mod stylesheet;
pub mod template;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod session;

pub use config::AppConfig;
pub use converter::DocumentConverter;
pub use dataset::{Assignment, Dataset};
pub use dates::DateFormat;
pub use documents::DocumentKind;
pub use error::{
    BatchError, ConfigError, ConversionError, DataFormatError, Error, GroupError, ItemError,
    RenderError, Result,
};
pub use grouping::{Field, Group, GroupQuery, Table, group};
pub use packager::{
    Archive, BatchJob, BatchOutcome, BatchPackager, BatchReport, BatchState, FailurePolicy,
    ItemFailure, Progress, sanitize_file_name,
};
pub use stylesheet::Stylesheet;
pub use template::{TemplateRenderer, Values};
