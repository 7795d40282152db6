//! Accounting of the working parameter tensors of a round.
//!
//! The working copy of the model is held in a [`ParamSet`]. Replacing the set with the
//! output of a plan invocation releases the previous tensors in the same step, and
//! dropping the set, on any exit path of the round, releases the remaining ones. Every
//! acquisition and release is recorded in a [`TensorLedger`].

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::model::Tensor;

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
}

/// Shared record of working tensors acquired and released.
#[derive(Debug, Clone, Default)]
pub struct TensorLedger(Arc<Counters>);

/// A snapshot of a [`TensorLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerStats {
    /// Total number of tensors acquired.
    pub acquired: usize,
    /// Total number of tensors released.
    pub released: usize,
    /// Number of tensors currently held.
    pub live: usize,
    /// Highest number of tensors held at once.
    pub peak: usize,
}

impl TensorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            acquired: self.0.acquired.load(Ordering::SeqCst),
            released: self.0.released.load(Ordering::SeqCst),
            live: self.0.live.load(Ordering::SeqCst),
            peak: self.0.peak.load(Ordering::SeqCst),
        }
    }

    fn acquire(&self, count: usize) {
        self.0.acquired.fetch_add(count, Ordering::SeqCst);
        let live = self.0.live.fetch_add(count, Ordering::SeqCst) + count;
        self.0.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn release(&self, count: usize) {
        self.0.released.fetch_add(count, Ordering::SeqCst);
        self.0.live.fetch_sub(count, Ordering::SeqCst);
    }
}

/// The current working parameters of a round.
#[derive(Debug)]
pub struct ParamSet {
    tensors: Vec<Tensor>,
    ledger: TensorLedger,
}

impl ParamSet {
    /// Take ownership of `tensors` and record them as acquired.
    pub fn acquire(tensors: Vec<Tensor>, ledger: &TensorLedger) -> Self {
        ledger.acquire(tensors.len());
        Self {
            tensors,
            ledger: ledger.clone(),
        }
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Adopt `tensors` as the current parameters. The previous ones are released
    /// before this returns.
    pub fn replace(&mut self, tensors: Vec<Tensor>) {
        let next = ParamSet::acquire(tensors, &self.ledger);
        drop(std::mem::replace(self, next));
    }
}

impl Drop for ParamSet {
    fn drop(&mut self) {
        self.ledger.release(self.tensors.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensors(n: usize) -> Vec<Tensor> {
        (0..n).map(|_| Tensor::zeros(vec![2])).collect()
    }

    #[test]
    fn test_replace_releases_previous_set() {
        let ledger = TensorLedger::new();
        let mut set = ParamSet::acquire(tensors(3), &ledger);
        assert_eq!(
            ledger.stats(),
            LedgerStats {
                acquired: 3,
                released: 0,
                live: 3,
                peak: 3
            }
        );

        set.replace(tensors(3));
        assert_eq!(ledger.stats().live, 3);
        assert_eq!(ledger.stats().released, 3);
        assert_eq!(ledger.stats().peak, 6);

        drop(set);
        assert_eq!(
            ledger.stats(),
            LedgerStats {
                acquired: 6,
                released: 6,
                live: 0,
                peak: 6
            }
        );
    }
}
