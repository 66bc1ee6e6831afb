//! # nbgrade
//!
//! Grades Jupyter notebooks against an executed sample solution, one at a
//! time or in bulk from a course-platform download, and merges the results
//! into the course gradebook.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Submission archives: directories or zip files of per-student folders
pub mod archive;
/// Bulk grading of an archive
pub mod bulk;
/// Turning raw outputs into comparable values
pub mod canonical;
/// Environment-driven runtime configuration
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Error types
pub mod error;
/// Running notebooks
pub mod executor;
/// Grading a single notebook
pub mod grade;
/// Gradebook CSV handling and reconciliation
pub mod gradebook;
/// Literal values and their parser
pub mod literal;
/// The notebook document model
pub mod notebook;
/// Subprocess helpers
pub mod process;
/// Building the problem table from the sample solution
pub mod reference;
/// Utility functions for convenience
pub mod util;
/// Per-submission time limits
pub mod watchdog;
/// Per-submission scratch directories
pub mod workdir;

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::{
    archive::Submissions,
    bulk::{BulkOptions, Containment, run_bulk},
    executor::Executor,
    grade::{Alternatives, GradeRecord, grade_file},
    gradebook::{Gradebook, Reconciliation, reconcile},
    reference::Reference,
    watchdog::Watchdog,
    workdir::WorkDir,
};

/// Builds the reference and prints its problem table.
pub async fn show_reference<E: Executor>(
    sample_solution: &Path,
    json: bool,
    executor: &E,
) -> Result<Reference> {
    let reference = Reference::load(sample_solution, executor)
        .await
        .with_context(|| format!("Failed to build reference {}", sample_solution.display()))?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reference.problems)
                .context("Failed to serialize problem table")?
        );
    } else {
        println!("{}", reference.problems.render(&reference.eid));
    }
    Ok(reference)
}

/// Grades one notebook and prints username, eid warning, score and
/// feedback.
///
/// * `watchdog`: limit for executing the student notebook.
pub async fn grade_single<E: Executor>(
    sample_solution: &Path,
    notebook: &Path,
    alternatives: &Alternatives,
    watchdog: Watchdog,
    executor: &E,
) -> Result<GradeRecord> {
    let reference = Reference::load(sample_solution, executor)
        .await
        .with_context(|| format!("Failed to build reference {}", sample_solution.display()))?;

    let workdir = WorkDir::fresh()?;
    let record = watchdog
        .guard(grade_file(
            notebook,
            &reference.problems,
            alternatives,
            executor,
            workdir.path(),
        ))
        .await
        .with_context(|| format!("Failed to grade {}", notebook.display()))?;
    workdir.close()?;

    eprintln!("{}", record.render(&reference.problems));
    println!("Username: {}", record.username);
    if record.eid != reference.eid {
        println!(
            "{}",
            format!(
                "WARNING: eid {} does not match sample eid {}",
                record.eid, reference.eid
            )
            .yellow()
        );
    }
    println!(
        "{} / {} {}",
        record.total(),
        reference.problems.max_points(),
        record.feedback()
    );
    Ok(record)
}

/// Grades an archive and writes the results into the gradebook.
///
/// Returns `None` for a debug run, which never touches the gradebook.
pub async fn grade_bulk<E: Executor>(
    containment: &Containment,
    sample_solution: &Path,
    archive: &Path,
    grading_csv: &Path,
    options: &BulkOptions,
    force_eid: bool,
    executor: &E,
) -> Result<Option<Reconciliation>> {
    let reference = Reference::load(sample_solution, executor)
        .await
        .with_context(|| format!("Failed to build reference {}", sample_solution.display()))?;
    let submissions = Submissions::open(archive)?;

    let outcome = run_bulk(containment, &submissions, &reference, options, executor)
        .await
        .context("Bulk grading aborted")?;
    println!();

    if options.debug_after.is_some() {
        println!("debugging finished");
        return Ok(None);
    }

    let mut gradebook = Gradebook::load(grading_csv)?;
    let summary = reconcile(&mut gradebook, &outcome.results, force_eid)?;
    gradebook.save()?;

    println!();
    print!("{summary}");
    if !outcome.unidentified.is_empty() {
        println!(
            "{}",
            format!(
                "{} folder(s) without participant identifier: {:?}",
                outcome.unidentified.len(),
                outcome.unidentified
            )
            .yellow()
        );
    }
    tracing::info!(graded = outcome.results.len(), "gradebook updated");
    Ok(Some(summary))
}
