#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The executable document model (Jupyter notebook format, version 4).

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{
    constants::{MISSING_METADATA, PROBLEM_TAG},
    error::{GradeError, NotebookError},
};

/// An ordered sequence of cells plus document metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    /// Cells in document order.
    pub cells:          Vec<Cell>,
    /// Document metadata; `user` and `eid` are set by the distribution
    /// mechanism.
    #[serde(default)]
    pub metadata:       Map<String, JsonValue>,
    /// Major format version.
    pub nbformat:       u32,
    /// Minor format version.
    pub nbformat_minor: u32,
}

/// Kind of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    /// Executable code.
    Code,
    /// Markdown prose.
    Markdown,
    /// Raw, unrendered content.
    Raw,
}

/// One execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Kind of the cell.
    pub cell_type: CellType,
    /// Source text; the on-disk list-of-lines form is joined on load.
    #[serde(deserialize_with = "multiline")]
    pub source:    String,
    /// Arbitrary metadata, including `tags` and the problem linkage fields.
    #[serde(default)]
    pub metadata:  Map<String, JsonValue>,
    /// Graded outputs; only code cells carry this field.
    #[serde(
        default,
        deserialize_with = "graded_outputs",
        skip_serializing_if = "Option::is_none"
    )]
    pub outputs:   Option<Vec<Output>>,
    /// Fields this crate does not interpret (`id`, `execution_count`, ...).
    #[serde(flatten)]
    pub extra:     Map<String, JsonValue>,
}

/// An output record that matters for grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    /// The value of the unit's last expression.
    ExecuteResult {
        /// Representations keyed by MIME type.
        data:            Map<String, JsonValue>,
        /// Output metadata.
        #[serde(default)]
        metadata:        Map<String, JsonValue>,
        /// Execution counter of the producing run.
        #[serde(default)]
        execution_count: Option<u32>,
    },
    /// An exception raised while running the unit.
    Error(ErrorOutput),
}

/// The payload of an `error` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorOutput {
    /// Exception type name.
    pub ename:     String,
    /// Exception message.
    pub evalue:    String,
    /// Formatted traceback lines.
    #[serde(default)]
    pub traceback: Vec<String>,
}

/// Output kinds that carry no grading information and are dropped on load.
const DISPLAY_ONLY_OUTPUTS: [&str; 3] = ["stream", "display_data", "update_display_data"];

/// Joins a string or a list of strings.
fn join_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Array(lines) => lines
            .iter()
            .map(|line| line.as_str())
            .collect::<Option<Vec<_>>>()
            .map(|lines| lines.concat()),
        _ => None,
    }
}

/// Deserializes `source`, which may be a string or a list of lines.
fn multiline<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    join_text(&value).ok_or_else(|| serde::de::Error::custom("source must be text or a list of lines"))
}

/// Deserializes an `outputs` list, keeping only `execute_result` and `error`
/// records and rejecting unknown kinds.
fn graded_outputs<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<Output>>, D::Error> {
    let raw = Vec::<JsonValue>::deserialize(deserializer)?;
    let mut outputs = Vec::with_capacity(raw.len());
    for record in raw {
        let kind = record
            .get("output_type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| serde::de::Error::custom("output without output_type"))?;
        if DISPLAY_ONLY_OUTPUTS.contains(&kind) {
            continue;
        }
        if kind != "execute_result" && kind != "error" {
            return Err(serde::de::Error::custom(format!("unknown output_type `{kind}`")));
        }
        outputs.push(serde_json::from_value(record).map_err(serde::de::Error::custom)?);
    }
    Ok(Some(outputs))
}

impl Notebook {
    /// Parses and validates a notebook from raw file contents.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NotebookError> {
        let text =
            std::str::from_utf8(bytes).map_err(|e| NotebookError::Unreadable(e.to_string()))?;
        let notebook: Notebook =
            serde_json::from_str(text).map_err(|e| NotebookError::Invalid(e.to_string()))?;
        notebook.validate()?;
        Ok(notebook)
    }

    /// Reads, parses and validates a notebook file.
    pub fn read(path: &Path) -> Result<Self, GradeError> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(&bytes)?)
    }

    /// Serializes the notebook to JSON text.
    pub fn to_json(&self) -> Result<String, GradeError> {
        serde_json::to_string_pretty(self).map_err(|e| NotebookError::Invalid(e.to_string()).into())
    }

    /// Checks the structural rules of the v4 format.
    pub fn validate(&self) -> Result<(), NotebookError> {
        if self.nbformat != 4 {
            return Err(NotebookError::Invalid(format!(
                "unsupported nbformat {}",
                self.nbformat
            )));
        }

        for (idx, cell) in self.cells.iter().enumerate() {
            match (cell.cell_type, cell.outputs.is_some()) {
                (CellType::Code, false) => {
                    return Err(NotebookError::Invalid(format!("code cell {idx} has no outputs")));
                }
                (CellType::Markdown | CellType::Raw, true) => {
                    return Err(NotebookError::Invalid(format!(
                        "non-code cell {idx} has outputs"
                    )));
                }
                _ => {}
            }

            if let Some(tags) = cell.metadata.get("tags") {
                let well_formed = tags
                    .as_array()
                    .is_some_and(|tags| tags.iter().all(JsonValue::is_string));
                if !well_formed {
                    return Err(NotebookError::Invalid(format!(
                        "cell {idx} has malformed tags"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Reads a document-level metadata field as text, `None` when absent.
    fn metadata_text(&self, key: &str) -> String {
        match self.metadata.get(key) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Null) | None => MISSING_METADATA.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Username written into the document by the distribution mechanism.
    pub fn user(&self) -> String {
        self.metadata_text("user")
    }

    /// Exercise identifier written into the document by the distribution
    /// mechanism.
    pub fn eid(&self) -> String {
        self.metadata_text("eid")
    }

    /// Iterates over code cells together with their index.
    pub fn code_cells(&self) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.cell_type == CellType::Code)
    }
}

impl Cell {
    /// Tags attached to the cell.
    pub fn tags(&self) -> Vec<&str> {
        self.metadata
            .get("tags")
            .and_then(JsonValue::as_array)
            .map(|tags| tags.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether the cell is tagged as a problem and carries a problem number
    /// field.
    pub fn is_problem(&self) -> bool {
        self.tags().contains(&PROBLEM_TAG) && self.metadata.contains_key("problem_number")
    }

    /// The problem number, if present and a positive integer.
    pub fn problem_number(&self) -> Option<u32> {
        self.metadata
            .get("problem_number")
            .and_then(JsonValue::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
    }

    /// Raw problem number field, for diagnostics.
    pub fn problem_number_field(&self) -> String {
        self.metadata
            .get("problem_number")
            .map(JsonValue::to_string)
            .unwrap_or_else(|| MISSING_METADATA.to_string())
    }

    /// Links the cell to a problem, as the reference tagging does.
    pub fn tag_problem(
        &mut self,
        problem_number: u32,
        points: u32,
        output_type: &str,
        has_custom_test: bool,
    ) {
        let mut tags: Vec<JsonValue> = self
            .metadata
            .get("tags")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();
        tags.push(JsonValue::from(PROBLEM_TAG));

        self.metadata.insert("deletable".into(), JsonValue::Bool(false));
        self.metadata.insert("tags".into(), JsonValue::Array(tags));
        self.metadata
            .insert("problem_number".into(), JsonValue::from(problem_number));
        self.metadata.insert("points".into(), JsonValue::from(points));
        self.metadata
            .insert("output_type".into(), JsonValue::from(output_type));
        self.metadata
            .insert("has_custom_test".into(), JsonValue::Bool(has_custom_test));
    }

    /// Iterates over the cell's graded outputs.
    fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.iter().flatten()
    }

    /// Text of the single `execute_result` output, if any.
    ///
    /// * `idx`: position of the cell, used in errors.
    pub fn execute_result(&self, idx: usize) -> Result<Option<String>, GradeError> {
        let results: Vec<&Map<String, JsonValue>> = self
            .outputs()
            .filter_map(|output| match output {
                Output::ExecuteResult { data, .. } => Some(data),
                Output::Error(_) => None,
            })
            .collect();

        let data = match results.as_slice() {
            [] => return Ok(None),
            [data] => *data,
            many => {
                return Err(GradeError::AmbiguousOutput {
                    cell:   idx,
                    reason: format!("{} execute_result outputs", many.len()),
                });
            }
        };

        let mut entries = data.values();
        match (entries.next(), entries.next()) {
            (Some(value), None) => Ok(Some(join_text(value).unwrap_or_else(|| value.to_string()))),
            _ => Err(GradeError::AmbiguousOutput {
                cell:   idx,
                reason: format!("execute_result with {} representations", data.len()),
            }),
        }
    }

    /// The single `error` output, if any.
    ///
    /// * `idx`: position of the cell, used in errors.
    pub fn error(&self, idx: usize) -> Result<Option<&ErrorOutput>, GradeError> {
        let errors: Vec<&ErrorOutput> = self
            .outputs()
            .filter_map(|output| match output {
                Output::Error(error) => Some(error),
                Output::ExecuteResult { .. } => None,
            })
            .collect();

        match errors.as_slice() {
            [] => Ok(None),
            [error] => Ok(Some(*error)),
            many => Err(GradeError::AmbiguousOutput {
                cell:   idx,
                reason: format!("{} error outputs", many.len()),
            }),
        }
    }
}
