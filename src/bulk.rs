#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grades every submission folder of an archive, one at a time.

use std::{path::Path, time::Duration};

use bon::Builder;
use colored::Colorize;
use itertools::Itertools;

use crate::{
    archive::Submissions,
    constants::{
        CONTAINER_MARKERS, DEFAULT_WATCHDOG, DOCKER_MARKER, FEEDBACK_BREAK, MISSING_METADATA,
        MISSING_SUBMISSION_FEEDBACK, NOTEBOOK_EXTENSION, TIMEOUT_FEEDBACK,
    },
    error::GradeError,
    executor::Executor,
    grade::{Alternatives, GradeRecord, grade_file},
    reference::Reference,
    util::{find_files, sanitize},
    watchdog::Watchdog,
    workdir::WorkDir,
};

/// Proof that the process runs inside a containment environment.
///
/// Bulk grading executes untrusted code and only starts with one of these.
#[derive(Debug)]
pub struct Containment(());

impl Containment {
    /// Checks the process environment for a container marker.
    pub fn detect() -> Result<Self, GradeError> {
        Self::detect_with(|key| std::env::var(key).ok())
    }

    /// Checks for a container marker using `lookup` to read variables.
    pub fn detect_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GradeError> {
        let in_container = CONTAINER_MARKERS
            .iter()
            .any(|key| lookup(key).is_some_and(|value| !value.is_empty()))
            || lookup(DOCKER_MARKER).as_deref() == Some("1");

        if in_container {
            Ok(Self(()))
        } else {
            Err(GradeError::Containment)
        }
    }
}

/// Knobs of a bulk run.
#[derive(Debug, Clone, Builder)]
pub struct BulkOptions {
    /// Folders whose sanitized name contains one of these are skipped.
    #[builder(default)]
    #[builder(with = FromIterator::from_iter)]
    #[builder(getter)]
    pub skip_names:   Vec<String>,
    /// Skip every folder up to and including the first one whose sanitized
    /// name contains this text.
    #[builder(into)]
    #[builder(getter)]
    pub debug_after:  Option<String>,
    /// Wall-clock limit per submission.
    #[builder(default = DEFAULT_WATCHDOG)]
    #[builder(getter)]
    pub timeout:      Duration,
    /// Extra accepted answers.
    #[builder(default)]
    pub alternatives: Alternatives,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One graded submission folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResult {
    /// Participant identifier parsed from the folder name.
    pub participant_id: u64,
    /// Username from the notebook metadata.
    pub username:       String,
    /// Total points.
    pub total_grade:    u32,
    /// Feedback text for the gradebook.
    pub feedback:       String,
    /// Whether the notebook's eid matches the sample solution's.
    pub eid_matches:    bool,
}

impl BulkResult {
    /// Zero-grade row that carries no notebook information.
    fn zero(participant_id: u64, feedback: impl Into<String>) -> Self {
        Self {
            participant_id,
            username: MISSING_METADATA.to_string(),
            total_grade: 0,
            feedback: feedback.into(),
            eid_matches: true,
        }
    }

    /// Row for a folder without exactly one notebook.
    pub fn missing(participant_id: u64) -> Self {
        Self::zero(participant_id, MISSING_SUBMISSION_FEEDBACK)
    }

    /// Row for a submission stopped by the watchdog.
    pub fn timed_out(participant_id: u64) -> Self {
        Self::zero(participant_id, TIMEOUT_FEEDBACK)
    }

    /// Row for a submission the execution adapter could not run.
    pub fn not_executed(participant_id: u64, reason: &str) -> Self {
        Self::zero(
            participant_id,
            format!("Notebook could not be executed: {reason}").replace('\n', FEEDBACK_BREAK),
        )
    }

    /// Row for a graded notebook.
    ///
    /// Unparseable documents carry no eid and are never reported as a
    /// mismatch.
    pub fn graded(participant_id: u64, record: &GradeRecord, sample_eid: &str) -> Self {
        Self {
            participant_id,
            username: record.username.clone(),
            total_grade: record.total(),
            feedback: record.feedback().replace('\n', FEEDBACK_BREAK),
            eid_matches: record.is_document_error() || record.eid == sample_eid,
        }
    }
}

/// Everything a bulk run produced.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    /// One row per graded folder, in folder order.
    pub results:      Vec<BulkResult>,
    /// Sanitized names of folders without a participant identifier.
    pub unidentified: Vec<String>,
}

/// Participant identifier: the third `_`-separated token of a folder name.
pub fn participant_id(folder_name: &str) -> Option<u64> {
    folder_name.split('_').nth(2)?.parse().ok()
}

/// Grades one folder that holds exactly one notebook.
async fn grade_folder<E: Executor>(
    participant_id: u64,
    notebook: &Path,
    reference: &Reference,
    options: &BulkOptions,
    executor: &E,
) -> Result<BulkResult, GradeError> {
    let watchdog = Watchdog::new(options.timeout);
    let workdir = WorkDir::fresh()?;
    let outcome = watchdog
        .guard(grade_file(
            notebook,
            &reference.problems,
            &options.alternatives,
            executor,
            workdir.path(),
        ))
        .await;
    workdir.close()?;

    match outcome {
        Ok(record) => {
            let result = BulkResult::graded(participant_id, &record, &reference.eid);
            println!(" ({}, {participant_id})", result.username);
            println!("   {} {}", result.total_grade, result.feedback);
            if !result.eid_matches {
                println!(
                    "{}",
                    format!(
                        "WARNING: eid {} does not match sample eid {}",
                        record.eid, reference.eid
                    )
                    .yellow()
                );
            }
            Ok(result)
        }
        Err(GradeError::Timeout(_)) => {
            println!("\n{}", "Execution timeout!".red());
            Ok(BulkResult::timed_out(participant_id))
        }
        Err(GradeError::Execution(reason)) => {
            println!("\n{} {reason}", "Execution failed:".red());
            Ok(BulkResult::not_executed(participant_id, &reason))
        }
        Err(other) => Err(other),
    }
}

/// Grades every submission folder in lexical order.
///
/// Missing notebooks, timeouts and adapter failures give a zero row and the
/// run continues. Integrity and I/O errors abort the run.
pub async fn run_bulk<E: Executor>(
    _containment: &Containment,
    submissions: &Submissions,
    reference: &Reference,
    options: &BulkOptions,
    executor: &E,
) -> Result<BulkOutcome, GradeError> {
    println!("grading {}", submissions.root().display());
    println!("skipping {:?}", options.skip_names);

    let mut cursor = options.debug_after.clone();
    let mut outcome = BulkOutcome::default();

    for folder in submissions.folders()? {
        let raw_name = folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = sanitize(&raw_name);

        if let Some(after) = &cursor {
            println!("skipping {name}");
            if name.contains(after.as_str()) {
                cursor = None;
            }
            continue;
        }
        if options.skip_names.iter().any(|skip| name.contains(skip.as_str())) {
            println!("skipping {name}");
            continue;
        }

        let Some(id) = participant_id(&raw_name) else {
            println!("{}", format!("{name}: no participant identifier, skipped").yellow());
            tracing::warn!(folder = %name, "cannot parse participant identifier");
            outcome.unidentified.push(name);
            continue;
        };
        print!("{name}");

        let notebooks =
            find_files(NOTEBOOK_EXTENSION, 0, &folder).map_err(|e| GradeError::Archive {
                path:   folder.clone(),
                reason: format!("{e:#}"),
            })?;
        let [notebook] = notebooks.as_slice() else {
            let files = std::fs::read_dir(&folder)?
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .sorted()
                .collect::<Vec<_>>();
            println!("\n   {} {files:?}", "Does not contain =1 notebook:".yellow());
            outcome.results.push(BulkResult::missing(id));
            continue;
        };

        let result = grade_folder(id, notebook, reference, options, executor).await?;
        outcome.results.push(result);
    }

    if cursor.is_some() {
        tracing::warn!("debug cursor never matched a folder");
    }
    Ok(outcome)
}
