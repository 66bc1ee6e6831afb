#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The course gradebook and the post-run reconciliation step.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use colored::Colorize;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use itertools::Itertools;

use crate::{
    bulk::BulkResult,
    constants::{
        COLUMN_FEEDBACK, COLUMN_FULL_NAME, COLUMN_GRADE, COLUMN_IDENTIFIER, INELIGIBLE_FEEDBACK,
        MISSING_METADATA,
    },
    error::GradeError,
};

/// A gradebook table keyed by `Participant <id>`.
#[derive(Debug, Clone)]
pub struct Gradebook {
    /// File the table was read from.
    path:     PathBuf,
    /// Column names.
    headers:  Vec<String>,
    /// Rows, each as long as `headers`.
    rows:     Vec<Vec<String>>,
    /// Row index per identifier.
    by_ident: BTreeMap<String, usize>,
}

/// Identifier cell value of a participant.
fn identifier(participant_id: u64) -> String {
    format!("Participant {participant_id}")
}

impl Gradebook {
    /// Builds an error tied to this gradebook.
    fn error(&self, reason: impl Into<String>) -> GradeError {
        GradeError::Gradebook {
            path:   self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Reads a gradebook CSV file.
    ///
    /// Short rows are padded; rows longer than the header are rejected.
    pub fn load(path: &Path) -> Result<Self, GradeError> {
        let fail = |reason: String| GradeError::Gradebook {
            path: path.to_path_buf(),
            reason,
        };
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| fail(e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| fail(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record: StringRecord = record.map_err(|e| fail(e.to_string()))?;
            if record.len() > headers.len() {
                return Err(fail(format!(
                    "row {} has {} fields, the header has {}",
                    line + 2,
                    record.len(),
                    headers.len()
                )));
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        let mut gradebook = Self {
            path: path.to_path_buf(),
            headers,
            rows,
            by_ident: BTreeMap::new(),
        };
        for column in [COLUMN_IDENTIFIER, COLUMN_FULL_NAME] {
            if gradebook.column(column).is_none() {
                return Err(gradebook.error(format!("missing column `{column}`")));
            }
        }
        gradebook.ensure_column(COLUMN_FEEDBACK);
        gradebook.ensure_column(COLUMN_GRADE);

        let ident = gradebook.column(COLUMN_IDENTIFIER).unwrap_or_default();
        gradebook.by_ident = gradebook
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (row[ident].clone(), idx))
            .collect();
        Ok(gradebook)
    }

    /// Position of a column.
    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Appends an empty column unless it exists.
    fn ensure_column(&mut self, name: &str) {
        if self.column(name).is_none() {
            self.headers.push(name.to_string());
            for row in &mut self.rows {
                row.push(String::new());
            }
        }
    }

    /// Row index of a participant.
    fn row(&self, participant_id: u64) -> Result<usize, GradeError> {
        self.by_ident
            .get(&identifier(participant_id))
            .copied()
            .ok_or_else(|| self.error(format!("no row for {}", identifier(participant_id))))
    }

    /// Reads a cell of a participant's row.
    pub fn get(&self, participant_id: u64, column: &str) -> Result<&str, GradeError> {
        let col = self
            .column(column)
            .ok_or_else(|| self.error(format!("missing column `{column}`")))?;
        Ok(&self.rows[self.row(participant_id)?][col])
    }

    /// Full name of a participant.
    pub fn full_name(&self, participant_id: u64) -> Result<&str, GradeError> {
        self.get(participant_id, COLUMN_FULL_NAME)
    }

    /// Writes grade and feedback into a participant's row.
    pub fn record(
        &mut self,
        participant_id: u64,
        grade: u32,
        feedback: &str,
    ) -> Result<(), GradeError> {
        let row = self.row(participant_id)?;
        let values = [
            (COLUMN_GRADE, grade.to_string()),
            (COLUMN_FEEDBACK, feedback.to_string()),
        ];
        for (column, value) in values {
            let col = self
                .column(column)
                .ok_or_else(|| self.error(format!("missing column `{column}`")))?;
            self.rows[row][col] = value;
        }
        Ok(())
    }

    /// Writes the table back to the file it was read from.
    pub fn save(&self) -> Result<(), GradeError> {
        self.save_to(&self.path)
    }

    /// Writes the table to `path`, quoting every non-numeric field.
    pub fn save_to(&self, path: &Path) -> Result<(), GradeError> {
        let fail = |e: csv::Error| GradeError::Gradebook {
            path:   path.to_path_buf(),
            reason: e.to_string(),
        };
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::NonNumeric)
            .from_path(path)
            .map_err(fail)?;
        writer.write_record(&self.headers).map_err(fail)?;
        for row in &self.rows {
            writer.write_record(row).map_err(fail)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// A submission that should be looked at by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    /// Participant identifier.
    pub participant_id: u64,
    /// Full name from the gradebook.
    pub full_name:      String,
    /// Username from the notebook.
    pub username:       String,
    /// Feedback written to the gradebook.
    pub feedback:       String,
}

/// Anomalies found while merging results into the gradebook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Usernames linked to more than one full name, with those names.
    pub duplicates:     BTreeMap<String, Vec<String>>,
    /// `username:participant_id` of every eid mismatch.
    pub eid_mismatches: Vec<String>,
    /// Rows that ended with a grade of zero.
    pub review:         Vec<ReviewItem>,
}

/// Writes every result into the gradebook and collects anomalies.
///
/// Every participant must have a row; otherwise nothing is written. With
/// `force_eid`, an eid mismatch replaces grade and feedback.
pub fn reconcile(
    gradebook: &mut Gradebook,
    results: &[BulkResult],
    force_eid: bool,
) -> Result<Reconciliation, GradeError> {
    for result in results {
        gradebook.row(result.participant_id)?;
    }

    let mut names: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut summary = Reconciliation::default();

    for result in results {
        let full_name = gradebook.full_name(result.participant_id)?.to_string();
        names
            .entry(result.username.clone())
            .or_default()
            .push(full_name.clone());

        if !result.eid_matches {
            summary
                .eid_mismatches
                .push(format!("{}:{}", result.username, result.participant_id));
        }

        let (grade, feedback) = if force_eid && !result.eid_matches {
            (0, INELIGIBLE_FEEDBACK)
        } else {
            (result.total_grade, result.feedback.as_str())
        };

        if grade == 0 {
            summary.review.push(ReviewItem {
                participant_id: result.participant_id,
                full_name,
                username: result.username.clone(),
                feedback: feedback.to_string(),
            });
        }

        gradebook.record(result.participant_id, grade, feedback)?;
    }

    summary.duplicates = names
        .into_iter()
        .filter(|(username, _)| username != MISSING_METADATA)
        .filter(|(_, full_names)| full_names.iter().unique().count() > 1)
        .collect();

    Ok(summary)
}

impl Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.review {
            writeln!(
                f,
                "maybe look at {} {} {} {}",
                item.participant_id, item.full_name, item.username, item.feedback
            )?;
        }
        for (username, full_names) in &self.duplicates {
            writeln!(
                f,
                "{}",
                format!("username {username} used {} times:", full_names.len()).yellow()
            )?;
            writeln!(f, "{full_names:?}")?;
        }
        if !self.eid_mismatches.is_empty() {
            writeln!(
                f,
                "{}",
                format!(
                    "{} user(s) with eid mismatch: {:?}",
                    self.eid_mismatches.len(),
                    self.eid_mismatches
                )
                .yellow()
            )?;
        }
        Ok(())
    }
}
