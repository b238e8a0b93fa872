//! Batch generation: one document per group key, collected into a zip.
//!
//! A run walks the sorted distinct keys of the document kind's key column.
//! Each key goes through grouping, template rendering and PDF conversion,
//! and the resulting bytes are stored under a sanitized entry name. A
//! progress update follows every key. A failing key either aborts the run or
//! is recorded in the [`BatchReport`], depending on the [`FailurePolicy`].

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::converter::DocumentConverter;
use crate::dataset::Dataset;
use crate::dates::DateFormat;
use crate::documents::DocumentKind;
use crate::error::{BatchError, ItemError};
use crate::stylesheet::Stylesheet;
use crate::template::TemplateRenderer;

pub const ZIP_MIME: &str = "application/zip";

/// What to do when one document of a batch fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep going; the archive holds the successes.
    #[default]
    Continue,
    /// Stop at the first failure and discard the partial archive.
    Abort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running { index: usize, total: usize },
    Done,
    Failed,
}

/// Emitted after each key, `index` is 1-based.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
    pub label: String,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.index as f32 / self.total as f32
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub key: String,
    pub reason: String,
}

/// Per-run summary returned alongside the archive.
#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub kind: DocumentKind,
    pub total: usize,
    /// Archive entry names, in generation order.
    pub entries: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A finished zip, ready to be offered as a download.
#[derive(Clone, Debug)]
pub struct Archive {
    pub file_name: &'static str,
    pub bytes: Vec<u8>,
}

impl Archive {
    pub fn mime_type(&self) -> &'static str {
        ZIP_MIME
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub archive: Archive,
    pub report: BatchReport,
}

/// Inputs of one run besides the dataset.
#[derive(Clone, Debug)]
pub struct BatchJob<'a> {
    pub kind: DocumentKind,
    pub template: &'a str,
    pub stylesheet: Option<&'a Stylesheet>,
    pub dates: &'a DateFormat,
}

/// Replace path separators so a group key is safe as a zip entry name.
///
/// # Examples
/// ```
/// use surveillances::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("Math/Info"), "Math-Info");
/// assert_eq!(sanitize_file_name("Dupont"), "Dupont");
/// ```
pub fn sanitize_file_name(key: &str) -> String {
    key.replace(['/', '\\'], "-")
}

/// Hands out unique `<name>.pdf` entry names.
#[derive(Default)]
struct EntryNames {
    used: HashSet<String>,
}

impl EntryNames {
    fn claim(&mut self, key: &str) -> String {
        let base = sanitize_file_name(key);
        let mut name = format!("{}.pdf", base);
        let mut n = 2;
        // "A/B" and "A-B" would otherwise collide
        while !self.used.insert(name.clone()) {
            name = format!("{} ({}).pdf", base, n);
            n += 1;
        }
        name
    }
}

pub struct BatchPackager {
    renderer: TemplateRenderer,
    converter: DocumentConverter,
    policy: FailurePolicy,
    state: BatchState,
}

impl BatchPackager {
    pub fn new(policy: FailurePolicy) -> Self {
        BatchPackager {
            renderer: TemplateRenderer::new(),
            converter: DocumentConverter::new(),
            policy,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Grouper, renderer then converter for a single key.
    pub fn build_document(&self, dataset: &Dataset, job: &BatchJob<'_>, key: &str) -> Result<Vec<u8>, ItemError> {
        let values = job.kind.values(dataset, key, job.dates)?;
        let markdown = self.renderer.render(job.template, &values)?;
        let pdf = self.converter.convert(&markdown, job.stylesheet)?;
        Ok(pdf)
    }

    /// Generate every document of `job.kind` and zip them.
    ///
    /// `on_progress` is called once per key, after the key is processed.
    pub fn run<F>(&mut self, dataset: &Dataset, job: &BatchJob<'_>, mut on_progress: F) -> Result<BatchOutcome, BatchError>
    where
        F: FnMut(&Progress),
    {
        let keys = dataset.distinct(job.kind.key_field());
        let total = keys.len();
        info!("generating {} {} document(s)", total, job.kind);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut names = EntryNames::default();
        let mut entries = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (i, key) in keys.iter().enumerate() {
            let index = i + 1;
            self.state = BatchState::Running { index, total };

            match self.build_document(dataset, job, key) {
                Ok(pdf) => {
                    let name = names.claim(key);
                    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
                    if let Err(e) = zip
                        .start_file(name.as_str(), options)
                        .map_err(|e| e.to_string())
                        .and_then(|_| zip.write_all(&pdf).map_err(|e| e.to_string()))
                    {
                        self.state = BatchState::Failed;
                        return Err(BatchError::Archive(e));
                    }
                    entries.push(name);
                }
                Err(e) => {
                    if let ItemError::Group(group_error) = &e {
                        error!("grouping invariant violated: {}", group_error);
                    }
                    match self.policy {
                        FailurePolicy::Abort => {
                            error!("{} \"{}\" failed, aborting: {}", job.kind, key, e);
                            self.state = BatchState::Failed;
                            return Err(BatchError::Item {
                                key: key.clone(),
                                source: e,
                            });
                        }
                        FailurePolicy::Continue => {
                            warn!("{} \"{}\" failed: {}", job.kind, key, e);
                            failures.push(ItemFailure {
                                key: key.clone(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }

            on_progress(&Progress {
                index,
                total,
                label: job.kind.progress_label(index, total, key),
            });
        }

        let bytes = match zip.finish() {
            Ok(cursor) => cursor.into_inner(),
            Err(e) => {
                self.state = BatchState::Failed;
                return Err(BatchError::Archive(e.to_string()));
            }
        };
        self.state = BatchState::Done;
        info!(
            "{}: {} entries, {} failure(s), {} bytes",
            job.kind.archive_name(),
            entries.len(),
            failures.len(),
            bytes.len()
        );

        Ok(BatchOutcome {
            archive: Archive {
                file_name: job.kind.archive_name(),
                bytes,
            },
            report: BatchReport {
                kind: job.kind,
                total,
                entries,
                failures,
                finished_at: Utc::now(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_both_separators() {
        assert_eq!(sanitize_file_name("a/b\\c"), "a-b-c");
    }

    #[test]
    fn entry_names_stay_unique() {
        let mut names = EntryNames::default();
        assert_eq!(names.claim("Math/Info"), "Math-Info.pdf");
        assert_eq!(names.claim("Math-Info"), "Math-Info (2).pdf");
        assert_eq!(names.claim("Math\\Info"), "Math-Info (3).pdf");
        assert_eq!(names.claim("Physique"), "Physique.pdf");
    }

    #[test]
    fn empty_dataset_gives_empty_archive() {
        let dates = DateFormat::new("fr_FR", "%A %d %B %Y").unwrap();
        let mut packager = BatchPackager::new(FailurePolicy::Abort);
        assert_eq!(packager.state(), BatchState::Idle);

        let mut calls = 0;
        let outcome = packager
            .run(
                &Dataset::default(),
                &BatchJob {
                    kind: DocumentKind::Fiche,
                    template: DocumentKind::Fiche.default_template(),
                    stylesheet: None,
                    dates: &dates,
                },
                |_| calls += 1,
            )
            .unwrap();

        assert_eq!(calls, 0);
        assert_eq!(packager.state(), BatchState::Done);
        assert_eq!(outcome.archive.file_name, "fiches_de_suivi.zip");
        assert!(outcome.report.entries.is_empty());
        let archive = zip::ZipArchive::new(Cursor::new(outcome.archive.bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn progress_fraction() {
        let p = Progress {
            index: 1,
            total: 4,
            label: String::new(),
        };
        assert_eq!(p.fraction(), 0.25);
    }
}
