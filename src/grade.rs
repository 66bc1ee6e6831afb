#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grades one submission against the problem table.

use std::{
    collections::{BTreeMap, btree_map::Entry},
    fmt::Write as _,
    path::Path,
};

use itertools::Itertools;
use serde::Deserialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};

use crate::{
    canonical::{RawOutput, canonicalize},
    constants::{
        FEEDBACK_BREAK, FEEDBACK_LEGEND, INVALID_DIAGNOSTIC, MISSING_METADATA, UNKNOWN_USER,
        UNREADABLE_DIAGNOSTIC,
    },
    error::{GradeError, NotebookError},
    executor::Executor,
    literal::Value,
    notebook::{Cell, Notebook},
    reference::{ProblemSpec, ProblemTable},
};

/// Extra accepted answers per problem, added after the fact.
#[derive(Debug, Clone, Default)]
pub struct Alternatives(BTreeMap<u32, Vec<RawOutput>>);

impl Alternatives {
    /// No alternatives.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON object mapping problem numbers to lists of literal texts,
    /// e.g. `{"3": ["0.5", "'half'"]}`.
    pub fn load(path: &Path) -> Result<Self, GradeError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| {
            GradeError::Configuration(format!("alternatives {}: {e}", path.display()))
        })
    }

    /// Parses the JSON form described in [`Alternatives::load`].
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        /// On-disk shape.
        #[derive(Deserialize)]
        #[serde(transparent)]
        struct Raw(BTreeMap<u32, Vec<String>>);

        let Raw(raw) = serde_json::from_str(text)?;
        Ok(Self(
            raw.into_iter()
                .map(|(problem, texts)| (problem, texts.into_iter().map(RawOutput::from).collect()))
                .collect(),
        ))
    }

    /// Accepts `value` as a correct answer to `problem_number`.
    pub fn insert(&mut self, problem_number: u32, value: Value) {
        self.0
            .entry(problem_number)
            .or_default()
            .push(RawOutput::Structured(value));
    }

    /// Alternatives registered for a problem.
    pub fn get(&self, problem_number: u32) -> &[RawOutput] {
        self.0.get(&problem_number).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Outcome of grading one notebook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeRecord {
    /// Points awarded per problem.
    pub points:      BTreeMap<u32, u32>,
    /// Diagnostics for unsolved problems.
    pub diagnostics: BTreeMap<u32, String>,
    /// Username from the notebook metadata.
    pub username:    String,
    /// Exercise identifier from the notebook metadata.
    pub eid:         String,
}

/// Row of the per-problem result table.
#[derive(Tabled)]
struct ProblemResult {
    /// Problem number.
    #[tabled(rename = "Problem")]
    problem:    u32,
    /// Awarded over possible points.
    #[tabled(rename = "Points")]
    points:     String,
    /// `expected / yours`, or the raised error.
    #[tabled(rename = "Diagnostic")]
    diagnostic: String,
}

impl GradeRecord {
    /// Record for a document that could not be parsed.
    pub fn from_notebook_error(error: &NotebookError) -> Self {
        let diagnostic = match error {
            NotebookError::Unreadable(_) => UNREADABLE_DIAGNOSTIC,
            NotebookError::Invalid(_) => INVALID_DIAGNOSTIC,
        };
        Self {
            points:      BTreeMap::new(),
            diagnostics: BTreeMap::from([(0, diagnostic.to_string())]),
            username:    UNKNOWN_USER.to_string(),
            eid:         MISSING_METADATA.to_string(),
        }
    }

    /// Whether the record stands for a document that could not be parsed.
    ///
    /// Such records carry their diagnostic under problem `0`, which no real
    /// problem uses.
    pub fn is_document_error(&self) -> bool {
        self.points.is_empty() && self.diagnostics.contains_key(&0)
    }

    /// Sum of awarded points.
    pub fn total(&self) -> u32 {
        self.points.values().sum()
    }

    /// Feedback text: the points map, then one line per unsolved problem.
    pub fn feedback(&self) -> String {
        let mut feedback = format!(
            "{{{}}}",
            self.points
                .iter()
                .map(|(problem, points)| format!("{problem}: {points}"))
                .join(", ")
        );
        if !self.diagnostics.is_empty() {
            feedback.push_str(FEEDBACK_BREAK);
            feedback.push_str(FEEDBACK_LEGEND);
            for (problem, diagnostic) in &self.diagnostics {
                let _ = write!(feedback, "{FEEDBACK_BREAK}{problem}: {diagnostic}");
            }
        }
        feedback
    }

    /// Renders a per-problem table.
    pub fn render(&self, problems: &ProblemTable) -> String {
        let rows: Vec<ProblemResult> = problems
            .iter()
            .map(|spec| ProblemResult {
                problem:    spec.problem_number,
                points:     format!(
                    "{}/{}",
                    self.points.get(&spec.problem_number).copied().unwrap_or(0),
                    spec.points
                ),
                diagnostic: self
                    .diagnostics
                    .get(&spec.problem_number)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();

        Table::new(&rows)
            .with(Panel::header(format!("Grading Overview ({})", self.username)))
            .with(Panel::footer(format!(
                "Total: {}/{}",
                self.total(),
                problems.max_points()
            )))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(40).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(
                Modify::new(Rows::last())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
            .to_string()
    }
}

/// Appends each custom test to the problem unit it belongs to.
fn inject_custom_tests(notebook: &mut Notebook, problems: &ProblemTable) {
    for cell in notebook.cells.iter_mut().filter(|cell| cell.is_problem()) {
        let Some(spec) = cell.problem_number().and_then(|n| problems.get(n)) else {
            continue;
        };
        if let Some(code) = &spec.custom_test_code {
            cell.source.push('\n');
            cell.source.push_str(code);
        }
    }
}

/// Pairs every problem unit with its problem number, enforcing a 1:1 match
/// with the table.
fn problem_units<'a>(
    notebook: &'a Notebook,
    problems: &ProblemTable,
) -> Result<BTreeMap<u32, (usize, &'a Cell)>, GradeError> {
    let units: Vec<(usize, &Cell)> = notebook
        .cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.is_problem())
        .collect();

    if units.len() != problems.len() {
        return Err(GradeError::Integrity(format!(
            "found {} problem cells, expected {}; found {}",
            units.len(),
            problems.len(),
            units
                .iter()
                .map(|(_, cell)| cell.problem_number_field())
                .join(",")
        )));
    }

    let mut by_number = BTreeMap::new();
    for (idx, cell) in units {
        let number = cell
            .problem_number()
            .filter(|n| problems.get(*n).is_some())
            .ok_or_else(|| {
                GradeError::Integrity(format!(
                    "problem number {} not in sample solution",
                    cell.problem_number_field()
                ))
            })?;
        match by_number.entry(number) {
            Entry::Vacant(slot) => {
                slot.insert((idx, cell));
            }
            Entry::Occupied(_) => {
                return Err(GradeError::Integrity(format!(
                    "problem number {number} appears more than once"
                )));
            }
        }
    }
    Ok(by_number)
}

/// Scores one unit; returns awarded points and a diagnostic when unsolved.
///
/// A unit with several results of a kind scores zero instead of failing the
/// submission.
fn score_unit(
    spec: &ProblemSpec,
    idx: usize,
    cell: &Cell,
    alternatives: &Alternatives,
) -> Result<(u32, Option<String>), GradeError> {
    let round = !spec.has_custom_test;
    let result = match cell.execute_result(idx) {
        Ok(result) => result,
        Err(GradeError::AmbiguousOutput { reason, .. }) => {
            return Ok((0, Some(format!("ambiguous output: {reason}"))));
        }
        Err(other) => return Err(other),
    };

    if result.is_none() {
        match cell.error(idx) {
            Ok(Some(error)) => {
                return Ok((0, Some(format!("{}: {}", error.ename, error.evalue))));
            }
            Ok(None) => {}
            Err(GradeError::AmbiguousOutput { reason, .. }) => {
                return Ok((0, Some(format!("ambiguous output: {reason}"))));
            }
            Err(other) => return Err(other),
        }
    }

    let expected = canonicalize(spec.expected_output.as_deref(), round);
    let answer = canonicalize(result.as_deref(), round);
    let solved = answer == expected
        || alternatives
            .get(spec.problem_number)
            .iter()
            .any(|alt| canonicalize(alt.clone(), round) == answer);

    if solved {
        Ok((spec.points, None))
    } else {
        Ok((
            0,
            Some(format!(
                "{} / {}",
                spec.expected_output.as_deref().unwrap_or(MISSING_METADATA),
                result.as_deref().unwrap_or(MISSING_METADATA)
            )),
        ))
    }
}

/// Injects custom tests, executes the notebook and scores every problem.
///
/// * `workdir`: current directory for the execution.
pub async fn evaluate<E: Executor>(
    mut notebook: Notebook,
    problems: &ProblemTable,
    alternatives: &Alternatives,
    executor: &E,
    workdir: &Path,
) -> Result<GradeRecord, GradeError> {
    let username = notebook.user();
    let eid = notebook.eid();

    inject_custom_tests(&mut notebook, problems);
    let executed = executor.execute(&notebook, workdir).await?;
    let units = problem_units(&executed, problems)?;

    let mut record = GradeRecord {
        username,
        eid,
        ..GradeRecord::default()
    };
    for spec in problems.iter() {
        let Some((idx, cell)) = units.get(&spec.problem_number) else {
            continue;
        };
        let (points, diagnostic) = score_unit(spec, *idx, cell, alternatives)?;
        record.points.insert(spec.problem_number, points);
        if let Some(diagnostic) = diagnostic {
            record.diagnostics.insert(spec.problem_number, diagnostic);
        }
    }

    tracing::debug!(user = %record.username, total = record.total(), "graded notebook");
    Ok(record)
}

/// Reads a notebook file and grades it.
///
/// Unreadable or invalid documents are not errors: they yield a zero record
/// with a diagnostic.
pub async fn grade_file<E: Executor>(
    path: &Path,
    problems: &ProblemTable,
    alternatives: &Alternatives,
    executor: &E,
    workdir: &Path,
) -> Result<GradeRecord, GradeError> {
    let bytes = std::fs::read(path)?;
    match Notebook::from_bytes(&bytes) {
        Ok(notebook) => evaluate(notebook, problems, alternatives, executor, workdir).await,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "cannot grade notebook");
            Ok(GradeRecord::from_notebook_error(&error))
        }
    }
}
