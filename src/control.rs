//! Cancellation and time ceilings for long-running solves.

use crate::types::{BeamError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Checked once per fixed-point iteration and once per objective
/// evaluation of every optimisation.
#[derive(Debug, Clone, Default)]
pub struct SolveControl {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl SolveControl {
    /// No deadline, no cancellation.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Share a flag another thread may raise to stop the solve.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn check(&self) -> Result<()> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(BeamError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BeamError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}
