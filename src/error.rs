//! Error kinds reported by the solvers.
//!
//! Public functions return `anyhow::Result`; the errors raised by this crate carry an
//! [`AuctionError`] so callers can recover the kind with `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuctionError {
    /// Input file missing, unreadable or malformed.
    #[error("Input unavailable: {0}")]
    InputUnavailable(String),
    /// Capacities can't be saturated exactly (b-factor only).
    #[error("Infeasible capacity: {0}")]
    InfeasibleCapacity(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// The iteration or time budget of the auction ran out.
    #[error("Deadline exceeded after {iterations} iterations")]
    DeadlineExceeded { iterations: u64 },
    /// Internal bookkeeping found in an impossible state.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Returns the [`AuctionError`] carried by `err`, if any.
pub fn kind(err: &anyhow::Error) -> Option<&AuctionError> {
    err.downcast_ref::<AuctionError>()
}

#[cfg(test)]
mod tests {
    use super::{kind, AuctionError};
    use anyhow::anyhow;

    #[test]
    fn test_kind_roundtrips_through_anyhow() {
        let err = anyhow!(AuctionError::InvalidParameter("epsilon".into()));
        assert_eq!(
            kind(&err),
            Some(&AuctionError::InvalidParameter("epsilon".into()))
        );
        assert_eq!(kind(&anyhow!("plain")), None);
    }

    #[test]
    fn test_display() {
        let err = AuctionError::DeadlineExceeded { iterations: 3 };
        assert_eq!(err.to_string(), "Deadline exceeded after 3 iterations");
        let err = AuctionError::InfeasibleCapacity("left 3 right 2".into());
        assert_eq!(err.to_string(), "Infeasible capacity: left 3 right 2");
    }
}
