//! Injected progress reporting and cancellation.
//!
//! The core calls an implementor periodically during guessing and parsing.
//! Returning `false` from either callback requests cancellation: guessing
//! converts it to [`Error::GuessCancelled`](crate::error::Error::GuessCancelled)
//! with the best-effort schema retained, parsing to a hard
//! [`Error::Cancelled`](crate::error::Error::Cancelled).

/// Progress collaborator interface.
pub trait Progress {
    /// Advance by one unit of work. Returns `false` to cancel.
    fn advance(&mut self) -> bool;

    /// Report overall fractional completion in `[0, 1]`. Returns `false`
    /// to cancel.
    fn fraction(&mut self, _done: f64) -> bool {
        true
    }
}

/// No-op collaborator that never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&mut self) -> bool {
        true
    }
}

/// Collaborator that logs fractional progress at debug level.
#[derive(Debug, Default)]
pub struct LogProgress {
    steps: u64,
}

impl Progress for LogProgress {
    fn advance(&mut self) -> bool {
        self.steps += 1;
        true
    }

    fn fraction(&mut self, done: f64) -> bool {
        log::debug!("progress {:.0}% after {} steps", done * 100.0, self.steps);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CancelAfter(usize);

    impl Progress for CancelAfter {
        fn advance(&mut self) -> bool {
            if self.0 == 0 {
                return false;
            }
            self.0 -= 1;
            true
        }
    }

    #[test]
    fn cancel_after_budget() {
        let mut p = CancelAfter(2);
        assert!(p.advance());
        assert!(p.advance());
        assert!(!p.advance());
    }

    #[test]
    fn no_progress_never_cancels() {
        let mut p = NoProgress;
        assert!(p.advance());
        assert!(p.fraction(0.5));
    }
}
