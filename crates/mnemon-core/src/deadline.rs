//! Operation deadlines
//!
//! Every public operation accepts a deadline. Pure computation checks it
//! between steps; the embedding gateway bounds its awaits with the
//! remaining time.

use std::time::{Duration, Instant};

use crate::error::{MemoryError, Result};

/// A point in time after which an operation must stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No deadline
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Deadline `duration` from now
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Some(Instant::now() + duration),
        }
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Remaining time; `None` means unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Err(`Cancelled`) once expired
    pub fn check(&self) -> Result<()> {
        if self.expired() {
            Err(MemoryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

// ============================================================================
// TESTS
// ============================================================================
