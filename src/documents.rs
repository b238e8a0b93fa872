//! The two document families produced from a proctoring schedule.
//!
//! A [`DocumentKind`] knows which column partitions the dataset, how a group
//! becomes template values, and how its archive is named.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dataset::Dataset;
use crate::dates::DateFormat;
use crate::error::GroupError;
use crate::grouping::{Field, GroupQuery, group};
use crate::template::Values;

pub const DEFAULT_CONVOCATION_TEMPLATE: &str = r#"# Convocation

Mme./Mlle./Mr. **{{enseignant}}**

Vous êtes cordialement invité(e) à assurer les surveillances
des **examens semestriels** selon le planning ci-dessous :

{{surveillances}}

**Le chef de département CPST**

<span style="color:red; font-size:.8em">Présence obligatoire
dans le hall entre les deux amphis 10 minutes avant le début de chaque épreuve</span>"#;

pub const DEFAULT_FICHE_TEMPLATE: &str = r#"## Suivi des surveillants

- **Date :** *{{date}}*
- **Matière :** *{{epreuve}}*
- **Horaire :** *{{horaire}}*

{{surveillants}}"#;

const CONVOCATION_COLUMNS: &[Field] = &[Field::Date, Field::Slot, Field::Subject];
const CONVOCATION_SORT: &[Field] = &[Field::Date, Field::Slot];
const FICHE_COLUMNS: &[Field] = &[Field::Person];
const FICHE_BLANKS: &[&str] = &["Salle", "Observation"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// One letter per proctor listing their slots.
    Convocation,
    /// One sheet per exam listing its proctors, with room and remarks left blank.
    Fiche,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Convocation, DocumentKind::Fiche];

    /// Column whose distinct values each get one document.
    pub fn key_field(self) -> Field {
        match self {
            DocumentKind::Convocation => Field::Person,
            DocumentKind::Fiche => Field::Exam,
        }
    }

    pub fn archive_name(self) -> &'static str {
        match self {
            DocumentKind::Convocation => "convocations.zip",
            DocumentKind::Fiche => "fiches_de_suivi.zip",
        }
    }

    pub fn stylesheet_name(self) -> &'static str {
        match self {
            DocumentKind::Convocation => "style_convocation.json",
            DocumentKind::Fiche => "style_fiche.json",
        }
    }

    pub fn default_template(self) -> &'static str {
        match self {
            DocumentKind::Convocation => DEFAULT_CONVOCATION_TEMPLATE,
            DocumentKind::Fiche => DEFAULT_FICHE_TEMPLATE,
        }
    }

    /// Placeholders filled in for every document of this kind.
    pub fn placeholders(self) -> &'static [&'static str] {
        match self {
            DocumentKind::Convocation => &["enseignant", "surveillances"],
            DocumentKind::Fiche => &["epreuve", "date", "horaire", "surveillants"],
        }
    }

    /// Progress label for item `index` of `total`.
    pub fn progress_label(self, index: usize, total: usize, key: &str) -> String {
        match self {
            DocumentKind::Convocation => format!("[{}/{}] Convocation de {}", index, total, key),
            DocumentKind::Fiche => format!("[{}/{}] Fiche de suivi de {}", index, total, key),
        }
    }

    /// Template values for the group `key`.
    ///
    /// `dates` formats the dates of this kind: the schedule table for
    /// convocations, the exam date for fiches.
    pub fn values(self, dataset: &Dataset, key: &str, dates: &DateFormat) -> Result<Values, GroupError> {
        let mut values = Values::new();
        match self {
            DocumentKind::Convocation => {
                let slots = group(
                    dataset,
                    &GroupQuery {
                        key: Field::Person,
                        value: key,
                        columns: CONVOCATION_COLUMNS,
                        sort_by: CONVOCATION_SORT,
                        blank_columns: &[],
                    },
                )?;
                values.insert("enseignant".to_string(), key.to_string());
                values.insert("surveillances".to_string(), slots.table(dates).to_markdown());
            }
            DocumentKind::Fiche => {
                let proctors = group(
                    dataset,
                    &GroupQuery {
                        key: Field::Exam,
                        value: key,
                        columns: FICHE_COLUMNS,
                        sort_by: FICHE_COLUMNS,
                        blank_columns: FICHE_BLANKS,
                    },
                )?;
                let first = proctors
                    .first_in_dataset(dataset)
                    .ok_or_else(|| GroupError::EmptyGroup {
                        field: Field::Exam,
                        value: key.to_string(),
                    })?;
                values.insert("epreuve".to_string(), key.to_string());
                values.insert("date".to_string(), dates.format(first.date));
                values.insert("horaire".to_string(), first.slot.clone());
                values.insert("surveillants".to_string(), proctors.table(dates).to_markdown());
            }
        }
        Ok(values)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Convocation => f.write_str("convocation"),
            DocumentKind::Fiche => f.write_str("fiche"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "convocation" | "convocations" => Ok(DocumentKind::Convocation),
            "fiche" | "fiches" | "fiches_de_suivi" => Ok(DocumentKind::Fiche),
            other => Err(format!("unknown document kind \"{}\"", other)),
        }
    }
}
