//! Execution of a training round.
//!
//! A round runs the training plan of the assignment over the local dataset, batch
//! by batch and epoch by epoch, and produces the difference between the canonical
//! model and the trained parameters. See [`RoundExecutor`].

mod cancel;
mod executor;
mod ledger;
mod schedule;

pub use self::{
    cancel::{CancelToken, Canceller},
    executor::{BatchEnd, EpochEnd, RoundError, RoundExecutor},
    ledger::{LedgerStats, ParamSet, TensorLedger},
    schedule::{RoundState, Schedule},
};
