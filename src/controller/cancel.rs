//! Cooperative cancellation for decision computations
//!
//! Computations run on blocking threads and poll a [`CancellationToken`] at
//! every controller state boundary.

pub use tokio_util::sync::CancellationToken;

use crate::core::error::{EngineError, Result};

pub trait CancelCheck {
    /// `Err(Cancelled)` once cancelled
    fn check(&self) -> Result<()>;
}

impl CancelCheck for CancellationToken {
    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_follows_parent_token() {
        let token = CancellationToken::new();
        let worker = token.child_token();
        assert!(worker.check().is_ok());
        token.cancel();
        assert!(matches!(worker.check(), Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_dropped_guard_stops_the_worker() {
        let token = CancellationToken::new();
        let worker = token.clone();
        {
            let _guard = token.drop_guard();
            assert!(worker.check().is_ok());
        }
        assert!(worker.is_cancelled());
    }
}
