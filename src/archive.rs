#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Access to a bulk download of submissions.

use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use zip::read::ZipArchive;

use crate::{constants::MAX_ARCHIVE_BYTES, error::GradeError};

/// Submission folders, either in place or extracted from a zip file.
#[derive(Debug)]
pub struct Submissions {
    /// Directory holding one folder per submission.
    root:     PathBuf,
    /// Scratch directory owning the extracted files, if any.
    _scratch: Option<TempDir>,
}

/// Builds an archive error for `path`.
fn archive_error(path: &Path, reason: impl ToString) -> GradeError {
    GradeError::Archive {
        path:   path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Extracts every entry of a zip file below `destination`, failing once the
/// extracted bytes exceed `max_uncompressed`.
fn extract_zip(path: &Path, destination: &Path, max_uncompressed: u64) -> Result<(), GradeError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| archive_error(path, e))?;
    let mut total: u64 = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| archive_error(path, e))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(archive_error(
                path,
                format!("entry {} escapes the extraction directory", entry.name()),
            ));
        };
        let outpath = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        let budget = max_uncompressed - total;
        if entry.size() > budget {
            return Err(archive_error(path, "uncompressed size exceeds allowed maximum"));
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        // the declared size is not trusted
        let mut limited = (&mut entry).take(budget.saturating_add(1));
        let written = std::io::copy(&mut limited, &mut outfile)?;
        if written > budget {
            return Err(archive_error(path, "uncompressed size exceeds allowed maximum"));
        }
        total += written;
    }

    Ok(())
}

impl Submissions {
    /// Opens a directory of submissions, or extracts a zip file of them into a
    /// scratch directory that lives as long as the returned value.
    pub fn open(path: &Path) -> Result<Self, GradeError> {
        Self::open_with_limit(path, MAX_ARCHIVE_BYTES)
    }

    /// Like [`Submissions::open`], with a custom cap on the extracted size.
    pub fn open_with_limit(path: &Path, max_uncompressed: u64) -> Result<Self, GradeError> {
        if path.is_dir() {
            return Ok(Self {
                root:     path.to_path_buf(),
                _scratch: None,
            });
        }
        if !path.is_file() {
            return Err(archive_error(path, "no such file or directory"));
        }

        let scratch = tempfile::Builder::new().prefix("nbgrade-archive-").tempdir()?;
        extract_zip(path, scratch.path(), max_uncompressed)?;
        tracing::debug!(archive = %path.display(), into = %scratch.path().display(), "extracted");
        Ok(Self {
            root:     scratch.path().to_path_buf(),
            _scratch: Some(scratch),
        })
    }

    /// Directory holding the submission folders.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Submission folders in lexical order; plain files are ignored.
    pub fn folders(&self) -> Result<Vec<PathBuf>, GradeError> {
        let mut folders = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                folders.push(entry.path());
            }
        }
        folders.sort();
        Ok(folders)
    }
}
