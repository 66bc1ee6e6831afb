#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

/// Tag attached to every unit that holds a graded problem.
pub const PROBLEM_TAG: &str = "problem";

/// Line prefix that starts the custom test of a problem unit.
pub const PROBLEM_TEST_MARKER: &str = "# PROBLEM-TEST";

/// Type name recorded when a unit has no literal output.
pub const NO_OUTPUT_TYPE: &str = "none";

/// Placeholder used for absent document metadata and missing usernames.
pub const MISSING_METADATA: &str = "None";

/// Username reported for documents that could not be read at all.
pub const UNKNOWN_USER: &str = "unknown-user";

/// Diagnostic for a document that is not valid UTF-8 text.
pub const UNREADABLE_DIAGNOSTIC: &str = "UNREADABLE";

/// Diagnostic for a document that fails structural validation.
pub const INVALID_DIAGNOSTIC: &str = "NOT A VALID NOTEBOOK FILE";

/// Feedback for a submission folder without exactly one notebook.
pub const MISSING_SUBMISSION_FEEDBACK: &str = "No .ipynb file was submitted.";

/// Feedback for a submission that tripped the watchdog.
pub const TIMEOUT_FEEDBACK: &str =
    "Notebook could not be executed. Does it contain an infinite loop?";

/// Feedback that replaces the grade when `--force-eid` rejects a submission.
pub const INELIGIBLE_FEEDBACK: &str =
    "Submitting notebooks from previous semesters is not allowed.";

/// Header line introducing the per-problem diagnostics in feedback text.
pub const FEEDBACK_LEGEND: &str = "problem_no: expected / yours";

/// Line separator used in gradebook feedback.
pub const FEEDBACK_BREAK: &str = "<br>";

/// File extension of executable documents.
pub const NOTEBOOK_EXTENSION: &str = "ipynb";

/// Largest total size a submission archive may extract to.
pub const MAX_ARCHIVE_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Default wall-clock limit for grading one submission.
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(60);

/// Default kernel used to execute notebooks.
pub const DEFAULT_KERNEL: &str = "python3";

/// Environment variables that, when non-empty, mark an apptainer or
/// singularity container.
pub const CONTAINER_MARKERS: [&str; 2] = ["SINGULARITY_CONTAINER", "APPTAINER_CONTAINER"];

/// Environment variable set to `1` inside the course docker image.
pub const DOCKER_MARKER: &str = "DOCKER_PYTHON_ABK";

/// Gradebook column holding the participant identifier.
pub const COLUMN_IDENTIFIER: &str = "Identifier";

/// Gradebook column holding the participant's full name.
pub const COLUMN_FULL_NAME: &str = "Full name";

/// Gradebook column receiving the feedback text.
pub const COLUMN_FEEDBACK: &str = "Feedback comments";

/// Gradebook column receiving the grade.
pub const COLUMN_GRADE: &str = "Grade";
