#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::{Pattern, glob};
use which::which;

/// Finds and returns the path to the `jupyter` launcher.
pub fn jupyter_path() -> Result<PathBuf> {
    which("jupyter").context("Cannot find a Jupyter installation on path (jupyter)")
}

/// A glob utility function to find paths to files with certain extension
///
/// * `extension`: the file extension to find paths for
/// * `search_depth`: how many folders deep to search for
/// * `root_dir`: the root directory where search starts
pub fn find_files(extension: &str, search_depth: i8, root_dir: &Path) -> Result<Vec<PathBuf>> {
    let root = root_dir
        .to_str()
        .context("Could not convert root_dir to string")?;
    let mut pattern = PathBuf::from(Pattern::escape(root));

    for _ in 0..search_depth {
        pattern.push("**");
    }

    pattern.push(format!("*.{extension}"));
    let pattern = pattern
        .to_str()
        .context("Could not convert glob pattern to string")?
        .to_string();

    let mut files: Vec<PathBuf> = glob(&pattern)
        .context("Could not create glob")?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Replaces every character outside `[A-Za-z0-9_+-]` with `+`, so folder
/// names are safe to print and match against.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-') {
                c
            } else {
                '+'
            }
        })
        .collect()
}
