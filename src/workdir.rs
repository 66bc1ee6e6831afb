#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::Path;

use tempfile::TempDir;

use crate::error::GradeError;

/// A fresh, empty working directory for one evaluation.
///
/// The directory and everything written into it are removed when the guard
/// is dropped, whichever way the evaluation ends.
#[derive(Debug)]
pub struct WorkDir(TempDir);

impl WorkDir {
    /// Creates a new scratch directory under the system temp dir.
    pub fn fresh() -> Result<Self, GradeError> {
        let dir = tempfile::Builder::new().prefix("nbgrade-").tempdir()?;
        tracing::debug!(dir = %dir.path().display(), "created working directory");
        Ok(Self(dir))
    }

    /// Path of the directory.
    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Removes the directory, reporting failures instead of ignoring them.
    pub fn close(self) -> Result<(), GradeError> {
        Ok(self.0.close()?)
    }
}
