#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::Result;

use crate::{
    constants::{DEFAULT_KERNEL, DEFAULT_WATCHDOG},
    util::jupyter_path,
};

/// Runtime settings sourced from the environment.
pub struct ConfigState {
    /// Wall-clock limit for grading one submission.
    watchdog:     Duration,
    /// Kernel name handed to the execution adapter.
    kernel:       String,
    /// Explicit path to the `jupyter` launcher, if configured.
    jupyter:      Option<PathBuf>,
    /// Optional per-cell limit enforced by the adapter itself.
    cell_timeout: Option<Duration>,
}

impl ConfigState {
    /// Reads the configuration from environment variables.
    fn new() -> Self {
        let watchdog = read_timeout_secs("NBGRADE_TIMEOUT_SECS", DEFAULT_WATCHDOG.as_secs());
        let kernel = std::env::var("NBGRADE_KERNEL")
            .map(|value| value.trim().to_owned())
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_KERNEL.to_string());
        let jupyter = std::env::var("NBGRADE_JUPYTER")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let cell_timeout = std::env::var("NBGRADE_CELL_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);

        Self {
            watchdog,
            kernel,
            jupyter,
            cell_timeout,
        }
    }

    /// Returns the per-submission watchdog limit.
    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    /// Returns the kernel name.
    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    /// Returns the `jupyter` launcher, searching `PATH` when none is
    /// configured.
    pub fn jupyter(&self) -> Result<PathBuf> {
        match &self.jupyter {
            Some(path) => Ok(path.clone()),
            None => jupyter_path(),
        }
    }

    /// Returns the per-cell limit, if configured.
    pub fn cell_timeout(&self) -> Option<Duration> {
        self.cell_timeout
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Returns the active configuration, initializing it on demand.
pub fn get() -> ConfigHandle {
    let mut guard = slot()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(cfg) = guard.as_ref() {
        return ConfigHandle(Arc::clone(cfg));
    }

    let cfg = Arc::new(ConfigState::new());
    *guard = Some(Arc::clone(&cfg));
    ConfigHandle(cfg)
}

/// Returns the configured per-submission watchdog limit.
pub fn watchdog() -> Duration {
    get().watchdog()
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}
