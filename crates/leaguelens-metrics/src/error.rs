// Engine error taxonomy and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Errors that abort a whole computation.
///
/// Missing rows, zero costs and degenerate statistics are not errors; each
/// computation handles them in place. Solver failures are contained to the
/// (week, manager) unit that produced them.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The league store could not be read or written.
    #[error(transparent)]
    UpstreamUnavailable(#[from] anyhow::Error),

    #[error("computation cancelled")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Shared cancellation flag, checked between weeks and between simulation
/// batches. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(EngineError::Cancelled)` once `cancel` has been called.
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
