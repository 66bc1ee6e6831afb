#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Error taxonomy for grading runs.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a notebook file could not be turned into a [`crate::notebook::Notebook`].
///
/// Both variants are recoverable inside a bulk run: the submission receives
/// a zero grade with a diagnostic and grading moves on.
#[derive(Debug, Error)]
pub enum NotebookError {
    /// The file is not valid UTF-8 text.
    #[error("notebook is not readable text: {0}")]
    Unreadable(String),
    /// The file is not a structurally valid notebook.
    #[error("not a valid notebook: {0}")]
    Invalid(String),
}

/// Errors raised while building references and grading submissions.
#[derive(Debug, Error)]
pub enum GradeError {
    /// The sample solution cannot be used; nothing can be graded.
    #[error("invalid sample solution: {0}")]
    Configuration(String),
    /// A submission's problem units do not line up with the reference.
    ///
    /// This points at a tampered or corrupted notebook and always aborts,
    /// in bulk mode too.
    #[error("problem units do not match the sample solution: {0}")]
    Integrity(String),
    /// A unit carries more than one result of a kind.
    #[error("cell {cell} has an ambiguous output: {reason}")]
    AmbiguousOutput {
        /// Zero-based index of the offending unit.
        cell:   usize,
        /// What was found.
        reason: String,
    },
    /// Bulk grading was attempted outside a containment environment.
    #[error(
        "Run bulk grading in a singularity/apptainer/docker container (with --containall --net \
         --network=none).\nDo not execute arbitrary notebooks blindly on your own system!"
    )]
    Containment,
    /// The watchdog fired before the evaluation finished.
    #[error("evaluation did not finish within {0:?}")]
    Timeout(std::time::Duration),
    /// The execution adapter itself failed.
    #[error("notebook execution failed: {0}")]
    Execution(String),
    /// The gradebook could not be read, matched, or written.
    #[error("gradebook {}: {reason}", path.display())]
    Gradebook {
        /// Gradebook file.
        path:   PathBuf,
        /// What went wrong.
        reason: String,
    },
    /// The submission archive could not be opened or extracted.
    #[error("archive {}: {reason}", path.display())]
    Archive {
        /// Archive file or directory.
        path:   PathBuf,
        /// What went wrong.
        reason: String,
    },
    /// A document failed to parse or validate.
    #[error(transparent)]
    Notebook(#[from] NotebookError),
    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
