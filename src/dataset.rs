//! Typed record store loaded from an uploaded spreadsheet.
//!
//! The first worksheet is read once, its header row is matched against the
//! fixed column names, and every data row is validated into an
//! [`Assignment`]. Nothing downstream ever sees an untyped cell.

use calamine::{Data, Range, Reader, open_workbook_auto, open_workbook_auto_from_rs};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;

use crate::error::DataFormatError;
use crate::grouping::Field;

pub const COL_PERSON: &str = "Enseignant";
pub const COL_SUBJECT: &str = "Matière";
pub const COL_EXAM: &str = "VraiMatière";
pub const COL_DATE: &str = "Date";
pub const COL_SLOT: &str = "Horaire";

lazy_static! {
    static ref ISO_DURATION_REGEX: Regex =
        Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?$").unwrap();
}

/// One proctoring slot: a person watching an exam at a given date and time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub person: String,
    pub subject: String,
    pub exam: String,
    pub date: NaiveDate,
    pub slot: String,
    /// Columns outside the fixed schema, keyed by header.
    pub extra: BTreeMap<String, String>,
}

impl Assignment {
    /// Text value of a key column. Dates have no text value here; they are
    /// formatted by the grouper with the run's [`crate::DateFormat`].
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Person => Some(&self.person),
            Field::Subject => Some(&self.subject),
            Field::Exam => Some(&self.exam),
            Field::Slot => Some(&self.slot),
            Field::Date => None,
        }
    }
}

/// Read-only set of assignments, shared between generation runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    rows: Vec<Assignment>,
}

impl Dataset {
    pub fn new(rows: Vec<Assignment>) -> Self {
        Dataset { rows }
    }

    /// Load a spreadsheet from disk. The format is detected from the extension.
    ///
    /// # Examples
    /// ```no_run
    /// use surveillances::Dataset;
    ///
    /// match Dataset::load("surveillances.ods") {
    ///     Ok(data) => println!("{} assignments", data.len()),
    ///     Err(e) => eprintln!("Error loading spreadsheet: {}", e),
    /// }
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataFormatError> {
        let mut workbook = open_workbook_auto(path.as_ref())
            .map_err(|e| DataFormatError::Workbook(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(DataFormatError::NoWorksheet)?
            .map_err(|e| DataFormatError::Workbook(e.to_string()))?;
        Self::from_range(&range)
    }

    /// Load an uploaded spreadsheet held in memory (ods, xlsx, xls or xlsb).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DataFormatError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| DataFormatError::Workbook(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(DataFormatError::NoWorksheet)?
            .map_err(|e| DataFormatError::Workbook(e.to_string()))?;
        Self::from_range(&range)
    }

    fn from_range(range: &Range<Data>) -> Result<Self, DataFormatError> {
        let mut rows_iter = range.rows();
        let header = rows_iter
            .next()
            .ok_or(DataFormatError::MissingColumn(COL_PERSON))?;
        let columns = HeaderIndex::new(header)?;

        let mut rows = Vec::new();
        // +2: 1-based, and the header occupies the first line
        for (offset, row) in rows_iter.enumerate() {
            let line = offset + 2;
            if row.iter().all(is_blank) {
                continue;
            }
            rows.push(columns.assignment(row, line)?);
        }

        info!(
            "loaded {} assignments ({} extra columns)",
            rows.len(),
            columns.extra.len()
        );
        Ok(Dataset { rows })
    }

    pub fn rows(&self) -> &[Assignment] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted, de-duplicated values of a text column.
    ///
    /// Asking for [`Field::Date`] yields ISO dates (`2024-01-15`), which sort
    /// chronologically.
    pub fn distinct(&self, field: Field) -> Vec<String> {
        let values: BTreeSet<String> = self
            .rows
            .iter()
            .map(|row| match row.text(field) {
                Some(text) => text.to_string(),
                None => row.date.format("%Y-%m-%d").to_string(),
            })
            .collect();
        values.into_iter().collect()
    }
}

/// Positions of the fixed columns within the header row.
struct HeaderIndex {
    person: usize,
    subject: usize,
    exam: usize,
    date: usize,
    slot: usize,
    extra: Vec<(usize, String)>,
}

impl HeaderIndex {
    fn new(header: &[Data]) -> Result<Self, DataFormatError> {
        let names: Vec<String> = header.iter().map(|cell| cell.to_string()).collect();
        let find = |column: &'static str| {
            names
                .iter()
                .position(|name| name.trim() == column)
                .ok_or(DataFormatError::MissingColumn(column))
        };

        let person = find(COL_PERSON)?;
        let subject = find(COL_SUBJECT)?;
        let exam = find(COL_EXAM)?;
        let date = find(COL_DATE)?;
        let slot = find(COL_SLOT)?;
        let fixed = [person, subject, exam, date, slot];

        let extra = names
            .iter()
            .enumerate()
            .filter(|(i, name)| !fixed.contains(i) && !name.trim().is_empty())
            .map(|(i, name)| (i, name.trim().to_string()))
            .collect();

        Ok(HeaderIndex {
            person,
            subject,
            exam,
            date,
            slot,
            extra,
        })
    }

    fn assignment(&self, row: &[Data], line: usize) -> Result<Assignment, DataFormatError> {
        let cell = |i: usize| row.get(i).unwrap_or(&Data::Empty);

        let extra = self
            .extra
            .iter()
            .map(|(i, name)| (name.clone(), cell_text(cell(*i))))
            .collect();

        Ok(Assignment {
            person: required_text(cell(self.person), line, COL_PERSON)?,
            subject: required_text(cell(self.subject), line, COL_SUBJECT)?,
            exam: required_text(cell(self.exam), line, COL_EXAM)?,
            date: parse_date(cell(self.date), line)?,
            slot: parse_slot(cell(self.slot), line)?,
            extra,
        })
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // Whole numbers come back as floats from most formats
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn required_text(cell: &Data, line: usize, column: &'static str) -> Result<String, DataFormatError> {
    let text = cell_text(cell);
    if text.is_empty() {
        return Err(DataFormatError::EmptyValue { row: line, column });
    }
    Ok(text)
}

/// Spreadsheet serial number (days since 1899-12-30) to a timestamp.
fn from_serial(serial: f64) -> Option<NaiveDateTime> {
    // 0001-01-01 to 9999-12-31
    if !serial.is_finite() || !(-693_593.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::try_milliseconds(millis)?)
}

fn parse_date(cell: &Data, line: usize) -> Result<NaiveDate, DataFormatError> {
    let invalid = || DataFormatError::InvalidDate {
        row: line,
        value: cell.to_string(),
    };

    match cell {
        Data::Empty => Err(DataFormatError::EmptyValue {
            row: line,
            column: COL_DATE,
        }),
        Data::DateTime(dt) => from_serial(dt.as_f64()).map(|t| t.date()).ok_or_else(invalid),
        Data::Float(f) => from_serial(*f).map(|t| t.date()).ok_or_else(invalid),
        Data::Int(i) => from_serial(*i as f64).map(|t| t.date()).ok_or_else(invalid),
        Data::DateTimeIso(s) | Data::String(s) => parse_date_text(s.trim()).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn format_time(time: NaiveTime) -> String {
    format!("{:02}h{:02}", time.hour(), time.minute())
}

fn parse_slot(cell: &Data, line: usize) -> Result<String, DataFormatError> {
    let invalid = || DataFormatError::InvalidSlot {
        row: line,
        value: cell.to_string(),
    };

    match cell {
        Data::Empty => Err(DataFormatError::EmptyValue {
            row: line,
            column: COL_SLOT,
        }),
        Data::String(s) if s.trim().is_empty() => Err(DataFormatError::EmptyValue {
            row: line,
            column: COL_SLOT,
        }),
        Data::String(s) => Ok(s.trim().to_string()),
        Data::DateTime(dt) => from_serial(dt.as_f64())
            .map(|t| format_time(t.time()))
            .ok_or_else(invalid),
        Data::Float(f) if (0.0..1.0).contains(f) => from_serial(*f)
            .map(|t| format_time(t.time()))
            .ok_or_else(invalid),
        Data::DurationIso(s) => parse_iso_duration(s).ok_or_else(invalid),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S")
            .map(|t| format_time(t.time()))
            .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S").map(format_time))
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn parse_iso_duration(text: &str) -> Option<String> {
    let caps = ISO_DURATION_REGEX.captures(text.trim())?;
    let hours: u32 = caps.get(1).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let minutes: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    debug!("duration {} -> {}h{}", text, hours, minutes);
    Some(format!("{:02}h{:02}", hours, minutes))
}
