//! Group-by, projection and sorting of assignments into printable tables.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::dataset::{Assignment, COL_DATE, COL_EXAM, COL_PERSON, COL_SLOT, COL_SUBJECT, Dataset};
use crate::dates::DateFormat;
use crate::error::GroupError;

/// A column of the fixed dataset schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Person,
    Subject,
    Exam,
    Date,
    Slot,
}

impl Field {
    /// Spreadsheet header, also used as the table header.
    pub fn header(self) -> &'static str {
        match self {
            Field::Person => COL_PERSON,
            Field::Subject => COL_SUBJECT,
            Field::Exam => COL_EXAM,
            Field::Date => COL_DATE,
            Field::Slot => COL_SLOT,
        }
    }

    fn compare(self, a: &Assignment, b: &Assignment) -> Ordering {
        match self {
            Field::Date => a.date.cmp(&b.date),
            _ => a.text(self).cmp(&b.text(self)),
        }
    }

    fn matches(self, row: &Assignment, value: &str) -> bool {
        match row.text(self) {
            Some(text) => text == value,
            None => row.date.format("%Y-%m-%d").to_string() == value,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// What to extract for one group key.
#[derive(Clone, Debug)]
pub struct GroupQuery<'a> {
    pub key: Field,
    pub value: &'a str,
    /// Projected columns, in output order.
    pub columns: &'a [Field],
    /// Sort key, most significant first. Ascending and stable.
    pub sort_by: &'a [Field],
    /// Empty columns appended after the projection, to be filled in by hand.
    pub blank_columns: &'a [&'a str],
}

/// Rows sharing one key value, already ordered.
#[derive(Debug)]
pub struct Group<'a> {
    rows: Vec<&'a Assignment>,
    columns: &'a [Field],
    blank_columns: &'a [&'a str],
}

/// Filter `dataset` on `query.key == query.value` and sort the result.
pub fn group<'a>(dataset: &'a Dataset, query: &GroupQuery<'a>) -> Result<Group<'a>, GroupError> {
    let mut rows: Vec<&Assignment> = dataset
        .rows()
        .iter()
        .filter(|row| query.key.matches(row, query.value))
        .collect();

    if rows.is_empty() {
        return Err(GroupError::EmptyGroup {
            field: query.key,
            value: query.value.to_string(),
        });
    }

    // sort_by is stable: equal keys keep dataset order
    rows.sort_by(|a, b| {
        query
            .sort_by
            .iter()
            .map(|field| field.compare(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    Ok(Group {
        rows,
        columns: query.columns,
        blank_columns: query.blank_columns,
    })
}

impl<'a> Group<'a> {
    pub fn rows(&self) -> &[&'a Assignment] {
        &self.rows
    }

    /// First row in dataset order, regardless of sorting.
    pub fn first_in_dataset(&self, dataset: &'a Dataset) -> Option<&'a Assignment> {
        dataset
            .rows()
            .iter()
            .find(|row| self.rows.iter().any(|r| std::ptr::eq(*r, *row)))
    }

    /// Render the projection as a table, dates formatted with `dates`.
    pub fn table(&self, dates: &DateFormat) -> Table {
        let mut headers: Vec<String> = self.columns.iter().map(|f| f.header().to_string()).collect();
        headers.extend(self.blank_columns.iter().map(|name| name.to_string()));

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut cells: Vec<String> = self
                    .columns
                    .iter()
                    .map(|field| match row.text(*field) {
                        Some(text) => text.to_string(),
                        None => dates.format(row.date),
                    })
                    .collect();
                cells.extend(self.blank_columns.iter().map(|_| String::new()));
                cells
            })
            .collect();

        Table { headers, rows }
    }
}

/// Headers plus rows of text cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Markdown pipe table with left-aligned, padded columns.
    ///
    /// # Examples
    /// ```
    /// use surveillances::Table;
    ///
    /// let table = Table {
    ///     headers: vec!["Enseignant".into(), "Salle".into()],
    ///     rows: vec![vec!["Dupont".into(), "".into()]],
    /// };
    /// assert_eq!(
    ///     table.to_markdown(),
    ///     "| Enseignant | Salle |\n|:-----------|:------|\n| Dupont     |       |"
    /// );
    /// ```
    pub fn to_markdown(&self) -> String {
        let escape = |cell: &str| cell.replace('|', "\\|").replace('\n', " ");
        let headers: Vec<String> = self.headers.iter().map(|h| escape(h)).collect();
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|c| escape(c)).collect())
            .collect();

        let widths: Vec<usize> = (0..headers.len())
            .map(|i| {
                rows.iter()
                    .filter_map(|row| row.get(i))
                    .chain(std::iter::once(&headers[i]))
                    .map(|cell| cell.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: &[String]| {
            let padded: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, width)| {
                    let cell = cells.get(i).map(String::as_str).unwrap_or("");
                    let pad = width - cell.chars().count();
                    format!(" {}{} ", cell, " ".repeat(pad))
                })
                .collect();
            format!("|{}|", padded.join("|"))
        };

        let separator: Vec<String> = widths
            .iter()
            .map(|width| format!(":{}", "-".repeat(width + 1)))
            .collect();

        let mut out = vec![line(&headers), format!("|{}|", separator.join("|"))];
        out.extend(rows.iter().map(|row| line(row)));
        out.join("\n")
    }
}
