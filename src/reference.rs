#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Builds the problem table from an executed sample solution.

use std::{collections::BTreeMap, path::Path};

use bon::Builder;
use regex::Regex;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};

use crate::{
    canonical::output_type_name,
    constants::PROBLEM_TEST_MARKER,
    error::GradeError,
    executor::Executor,
    notebook::{Cell, CellType, Notebook},
    workdir::WorkDir,
};

/// Point-declaration marker, matched against lowercased source lines.
const POINTS_MARKER: &str = r"^.*#\s*problem\s*\((\d+)\).*$";

/// One graded problem of the sample solution.
#[derive(Debug, Clone, PartialEq, Builder, Serialize)]
pub struct ProblemSpec {
    /// Position among the problem units, starting at 1.
    #[builder(getter)]
    pub problem_number:   u32,
    /// Points awarded for a correct answer.
    #[builder(getter)]
    pub points:           u32,
    /// Raw text of the reference result; `None` when the unit had none.
    pub expected_output:  Option<String>,
    /// Literal type name of the expected output, unless a custom test is
    /// attached.
    pub output_type:      Option<String>,
    /// Whether the unit carries a custom test.
    #[builder(default)]
    #[builder(getter)]
    pub has_custom_test:  bool,
    /// Code appended to the student's unit before execution.
    pub custom_test_code: Option<String>,
}

/// Row of the problem overview table.
#[derive(Tabled)]
struct ProblemRow {
    /// Problem number.
    #[tabled(rename = "Problem")]
    number:   u32,
    /// Points.
    #[tabled(rename = "Points")]
    points:   u32,
    /// Expected output text.
    #[tabled(rename = "Expected")]
    expected: String,
    /// Output type or custom test marker.
    #[tabled(rename = "Check")]
    check:    String,
}

impl From<&ProblemSpec> for ProblemRow {
    fn from(spec: &ProblemSpec) -> Self {
        let check = if spec.has_custom_test {
            "custom test".to_string()
        } else {
            spec.output_type.clone().unwrap_or_default()
        };
        Self {
            number: spec.problem_number,
            points: spec.points,
            expected: spec
                .expected_output
                .clone()
                .unwrap_or_else(|| "None".to_string()),
            check,
        }
    }
}

/// Ordered, immutable collection of problems, numbered `1..=N`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProblemTable(BTreeMap<u32, ProblemSpec>);

impl ProblemTable {
    /// Builds a table; numbers must be contiguous from 1.
    pub fn new(problems: Vec<ProblemSpec>) -> Result<Self, GradeError> {
        let mut table = BTreeMap::new();
        for (idx, problem) in problems.into_iter().enumerate() {
            let expected = u32::try_from(idx + 1)
                .map_err(|_| GradeError::Configuration("too many problems".into()))?;
            if problem.problem_number != expected {
                return Err(GradeError::Configuration(format!(
                    "problem {} found where problem {expected} was expected",
                    problem.problem_number
                )));
            }
            table.insert(expected, problem);
        }
        Ok(Self(table))
    }

    /// Looks up a problem.
    pub fn get(&self, problem_number: u32) -> Option<&ProblemSpec> {
        self.0.get(&problem_number)
    }

    /// Number of problems.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table holds no problems.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Problems in number order.
    pub fn iter(&self) -> impl Iterator<Item = &ProblemSpec> {
        self.0.values()
    }

    /// Sum of all points.
    pub fn max_points(&self) -> u32 {
        self.iter().map(|p| p.points).sum()
    }

    /// Renders the table for the terminal.
    pub fn render(&self, eid: &str) -> String {
        let rows: Vec<ProblemRow> = self.iter().map(ProblemRow::from).collect();
        Table::new(&rows)
            .with(Panel::header(format!("Sample solution (eid {eid})")))
            .with(Panel::footer(format!(
                "{} problems, {} points",
                self.len(),
                self.max_points()
            )))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(32).keep_words(true)))
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

/// The executed and tagged sample solution.
#[derive(Debug, Clone)]
pub struct Reference {
    /// Problem table derived from the sample solution.
    pub problems: ProblemTable,
    /// Exercise identifier of the sample solution.
    pub eid:      String,
    /// The executed sample solution with problem units tagged.
    pub document: Notebook,
}

/// Points declared by the first marker line of a unit, if any.
fn declared_points(marker: &Regex, source: &str) -> Result<Option<u32>, GradeError> {
    for line in source.lines() {
        let lowered = line.to_lowercase();
        if let Some(caps) = marker.captures(&lowered) {
            let digits = &caps[1];
            return digits.parse::<u32>().map(Some).map_err(|_| {
                GradeError::Configuration(format!("point value {digits} is out of range"))
            });
        }
    }
    Ok(None)
}

/// Custom test code of a unit: `None` without a marker, `Some(None)` when the
/// marker is followed by nothing.
fn custom_test(source: &str) -> Option<Option<String>> {
    let mut lines = source.lines();
    lines.by_ref().find(|line| line.starts_with(PROBLEM_TEST_MARKER))?;
    let rest: Vec<&str> = lines
        .filter(|line| !line.starts_with(PROBLEM_TEST_MARKER))
        .collect();
    if rest.is_empty() {
        Some(None)
    } else {
        Some(Some(rest.join("\n")))
    }
}

/// Extracts the problem spec of one unit and tags the unit.
fn tag_unit(
    cell: &mut Cell,
    idx: usize,
    problem_number: u32,
    points: u32,
) -> Result<ProblemSpec, GradeError> {
    let expected_output = cell.execute_result(idx)?;
    let type_name = output_type_name(expected_output.as_deref());
    let test = custom_test(&cell.source);
    let has_custom_test = test.is_some();

    cell.tag_problem(problem_number, points, &type_name, has_custom_test);

    Ok(ProblemSpec::builder()
        .problem_number(problem_number)
        .points(points)
        .maybe_expected_output(expected_output)
        .maybe_output_type((!has_custom_test).then_some(type_name))
        .has_custom_test(has_custom_test)
        .maybe_custom_test_code(test.flatten())
        .build())
}

impl Reference {
    /// Executes the sample solution and derives the problem table.
    ///
    /// Failures are configuration errors: nothing can be graded without a
    /// reference. Ambiguous outputs are reported as such.
    pub async fn build<E: Executor>(
        notebook: &Notebook,
        executor: &E,
        workdir: &Path,
    ) -> Result<Self, GradeError> {
        let marker = Regex::new(POINTS_MARKER)
            .map_err(|e| GradeError::Configuration(format!("bad marker pattern: {e}")))?;

        let mut document = executor
            .execute(notebook, workdir)
            .await
            .map_err(|e| GradeError::Configuration(format!("sample solution did not run: {e}")))?;

        let mut problems = Vec::new();
        for (idx, cell) in document.cells.iter_mut().enumerate() {
            if cell.cell_type != CellType::Code {
                continue;
            }
            let Some(points) = declared_points(&marker, &cell.source)? else {
                continue;
            };
            let problem_number = u32::try_from(problems.len() + 1)
                .map_err(|_| GradeError::Configuration("too many problems".into()))?;
            let spec = tag_unit(cell, idx, problem_number, points)?;
            tracing::debug!(problem = problem_number, points, "found problem unit");
            problems.push(spec);
        }

        let eid = document.eid();
        tracing::info!(problems = problems.len(), %eid, "built sample solution");
        Ok(Self {
            problems: ProblemTable::new(problems)?,
            eid,
            document,
        })
    }

    /// Reads, executes and tags a sample solution file in a scratch
    /// directory.
    pub async fn load<E: Executor>(path: &Path, executor: &E) -> Result<Self, GradeError> {
        let notebook = Notebook::read(path).map_err(|e| {
            GradeError::Configuration(format!("{}: {e}", path.display()))
        })?;
        let workdir = WorkDir::fresh()?;
        let reference = Self::build(&notebook, executor, workdir.path()).await?;
        workdir.close()?;
        Ok(reference)
    }
}
