#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Execution adapter: runs every code cell of a notebook and returns the
//! executed notebook.

use std::{ffi::OsString, future::Future, path::Path, path::PathBuf, time::Duration};

use anyhow::Result;
use bon::Builder;

use crate::{config, error::GradeError, notebook::Notebook, process};

/// File name the notebook is written to inside the working directory.
const INPUT_FILE: &str = "input.ipynb";
/// File name `nbconvert` writes the executed notebook to.
const OUTPUT_FILE: &str = "executed.ipynb";

/// Runs notebooks.
///
/// Runtime errors raised by the code inside a cell are recorded as `error`
/// outputs on that cell. An `Err` means the adapter itself failed.
pub trait Executor {
    /// Executes `notebook` with `workdir` as its current directory.
    fn execute(
        &self,
        notebook: &Notebook,
        workdir: &Path,
    ) -> impl Future<Output = Result<Notebook, GradeError>>;
}

/// Executes notebooks through `jupyter nbconvert --execute`.
#[derive(Debug, Clone, Builder)]
pub struct JupyterExecutor {
    /// The `jupyter` launcher.
    #[builder(into)]
    #[builder(getter)]
    jupyter:      PathBuf,
    /// Kernel name, e.g. `python3`.
    #[builder(into)]
    #[builder(getter)]
    kernel:       String,
    /// Per-cell limit enforced by the kernel preprocessor.
    #[builder(getter)]
    cell_timeout: Option<Duration>,
}

impl JupyterExecutor {
    /// Builds an executor from the process configuration.
    pub fn from_config() -> Result<Self> {
        let cfg = config::get();
        Ok(Self::builder()
            .jupyter(cfg.jupyter()?)
            .kernel(cfg.kernel())
            .maybe_cell_timeout(cfg.cell_timeout())
            .build())
    }

    /// Command-line arguments for one `nbconvert` run.
    fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "nbconvert".into(),
            "--to".into(),
            "notebook".into(),
            "--execute".into(),
            "--allow-errors".into(),
            format!("--ExecutePreprocessor.kernel_name={}", self.kernel).into(),
        ];
        if let Some(limit) = self.cell_timeout {
            args.push(format!("--ExecutePreprocessor.timeout={}", limit.as_secs()).into());
        }
        args.extend(["--output".into(), OUTPUT_FILE.into(), INPUT_FILE.into()]);
        args
    }
}

impl Executor for JupyterExecutor {
    async fn execute(&self, notebook: &Notebook, workdir: &Path) -> Result<Notebook, GradeError> {
        let input = workdir.join(INPUT_FILE);
        std::fs::write(&input, notebook.to_json()?)?;

        tracing::debug!(dir = %workdir.display(), kernel = %self.kernel, "executing notebook");
        let collected = process::run_collect(&self.jupyter, &self.args(), Some(workdir))
            .await
            .map_err(|e| GradeError::Execution(format!("{e:#}")))?;

        if !collected.status.success() {
            return Err(GradeError::Execution(format!(
                "nbconvert exited with {}: {}",
                collected.status,
                collected.stderr_tail(5)
            )));
        }

        let bytes = std::fs::read(workdir.join(OUTPUT_FILE))
            .map_err(|e| GradeError::Execution(format!("executed notebook missing: {e}")))?;
        Notebook::from_bytes(&bytes).map_err(|e| GradeError::Execution(e.to_string()))
    }
}
