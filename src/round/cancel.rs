use std::sync::Arc;

use tokio::sync::watch;

/// Handle to request the cancellation of the rounds run with the matching
/// [`CancelToken`]. Cancellation takes effect at the end of the current batch, or
/// before the first batch if no round is running.
#[derive(Debug, Clone)]
pub struct Canceller(Arc<watch::Sender<bool>>);

/// Checked by the round executor before each batch.
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl Canceller {
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self(Arc::new(tx)), CancelToken(rx))
    }

    pub fn cancel(&self) {
        // only fails if all the tokens are gone, in which case there is nothing to cancel
        let _ = self.0.send(true);
    }

    /// Withdraw a pending cancellation request, so that the next round can run.
    pub fn reset(&self) {
        let _ = self.0.send(false);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken(self.0.subscribe())
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel() {
        let (canceller, token) = Canceller::new();
        let other = canceller.token();
        assert!(!token.is_cancelled());
        canceller.cancel();
        assert!(token.is_cancelled());
        assert!(other.is_cancelled());

        canceller.reset();
        assert!(!token.is_cancelled());
        assert!(!other.is_cancelled());
    }
}
