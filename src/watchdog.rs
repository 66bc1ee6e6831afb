#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{future::Future, time::Duration};

use crate::error::GradeError;

/// Wall-clock limit for one evaluation.
///
/// The timer lives only as long as the guarded future: when the limit
/// passes, the evaluation future is dropped, which kills any subprocess it
/// owns; on every other exit the timer is dropped with it.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    /// Time an evaluation may take.
    limit: Duration,
}

impl Watchdog {
    /// Creates a watchdog with the given limit.
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    /// Runs `fut` to completion or fails with [`GradeError::Timeout`].
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, GradeError>
    where
        F: Future<Output = Result<T, GradeError>>,
    {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(limit = ?self.limit, "watchdog fired");
                Err(GradeError::Timeout(self.limit))
            }
        }
    }
}
