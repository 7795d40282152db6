use std::fmt;

use serde::{Deserialize, Serialize};

use crate::settings::ClientConfig;

/// Number of batches, epochs and updates of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub dataset_size: usize,
    pub batch_size: usize,
    /// `ceil(dataset_size / batch_size)`
    pub num_batches: usize,
    /// Total number of plan invocations in the round.
    pub num_updates: usize,
}

impl Schedule {
    /// Compute the schedule of a round over `dataset_size` samples.
    ///
    /// The number of updates is the tighter of `max_updates` and `max_epochs` full
    /// epochs. `max_epochs` defaults to one epoch even when `max_updates` is set.
    ///
    /// Returns `None` if the dataset is empty or the batch size is zero.
    pub fn new(dataset_size: usize, config: &ClientConfig) -> Option<Self> {
        let batch_size = config.batch_size;
        if dataset_size == 0 || batch_size == 0 {
            return None;
        }
        let num_batches = (dataset_size + batch_size - 1) / batch_size;
        let epoch_cap = config.max_epochs().saturating_mul(num_batches);
        let max_updates = config.max_updates.unwrap_or(epoch_cap);
        Some(Self {
            dataset_size,
            batch_size,
            num_batches,
            num_updates: max_updates.min(epoch_cap),
        })
    }

    /// Size of the batch at `batch`, which is shorter than `batch_size` for the last
    /// batch of a dataset that is not evenly divisible.
    pub fn chunk_size(&self, batch: usize) -> usize {
        self.batch_size
            .min(self.dataset_size.saturating_sub(batch * self.batch_size))
    }

    /// Index of the first sample of `batch`.
    pub fn offset(&self, batch: usize) -> usize {
        batch * self.batch_size
    }

    /// Number of epochs completed by the round. A partial trailing epoch doesn't count.
    pub fn full_epochs(&self) -> usize {
        self.num_updates / self.num_batches
    }
}

/// Position of a round, reset at the beginning of every round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub update: usize,
    pub batch: usize,
    pub epoch: usize,
}

impl RoundState {
    /// Move past the current batch. If it was the last batch of the epoch, the state
    /// at the epoch boundary is returned (with `batch == num_batches`), and `self`
    /// wraps to the first batch of the next epoch.
    pub fn advance(&mut self, num_batches: usize) -> Option<RoundState> {
        self.batch += 1;
        let boundary = if self.batch == num_batches {
            let at = *self;
            self.batch = 0;
            self.epoch += 1;
            Some(at)
        } else {
            None
        };
        self.update += 1;
        boundary
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "update {} (epoch {}, batch {})",
            self.update, self.epoch, self.batch
        )
    }
}
