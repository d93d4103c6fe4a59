use crate::error::{GarageError, Result};
use crate::models::JobStatus;

/// Trait for the job status transition rules of the board.
///
/// The policy only looks at statuses. Financial gates (a job may only be
/// completed once its invoice is settled) belong to the caller.
pub trait TransitionPolicy {
    /// Returns whether a job in `from` may be moved to `to`.
    fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool;

    /// Same as [`TransitionPolicy::is_valid_transition`] but reports the
    /// rejected pair as an error.
    fn ensure_transition(from: JobStatus, to: JobStatus) -> Result<()> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(GarageError::InvalidTransition { from, to })
        }
    }
}

/// Default board policy:
/// - Received -> Received, Working
/// - Working -> Received, Working, Ready
/// - Ready -> Working, Ready, Completed
/// - Completed -> Completed (terminal)
pub struct BoardPolicy;

impl TransitionPolicy for BoardPolicy {
    fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool {
        use JobStatus::*;

        match from {
            Received => matches!(to, Received | Working),
            Working => matches!(to, Received | Working | Ready),
            Ready => matches!(to, Working | Ready | Completed),
            Completed => matches!(to, Completed),
        }
    }
}

impl JobStatus {
    /// Columns a job in this status may be dropped on, itself included.
    pub fn allowed_targets(&self) -> Vec<JobStatus> {
        JobStatus::ALL
            .into_iter()
            .filter(|to| BoardPolicy::is_valid_transition(*self, *to))
            .collect()
    }
}

/// Shorthand for [`BoardPolicy::is_valid_transition`].
pub fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool {
    BoardPolicy::is_valid_transition(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    const ALLOWED: &[(JobStatus, JobStatus)] = &[
        (Received, Received),
        (Received, Working),
        (Working, Received),
        (Working, Working),
        (Working, Ready),
        (Ready, Working),
        (Ready, Ready),
        (Ready, Completed),
        (Completed, Completed),
    ];

    #[test]
    fn test_transition_table_is_exact() {
        for from in JobStatus::ALL {
            for to in JobStatus::ALL {
                let expected = ALLOWED.contains(&(from, to));
                assert_eq!(
                    is_valid_transition(from, to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_completed_is_terminal() {
        assert_eq!(Completed.allowed_targets(), vec![Completed]);
    }

    #[test]
    fn test_skipping_a_column_is_rejected() {
        let err = BoardPolicy::ensure_transition(Received, Ready).unwrap_err();
        assert!(matches!(
            err,
            GarageError::InvalidTransition { from: Received, to: Ready }
        ));
    }

    #[test]
    fn test_allowed_targets_for_working() {
        assert_eq!(Working.allowed_targets(), vec![Received, Working, Ready]);
    }
}
