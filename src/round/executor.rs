use std::error::Error as StdError;

use thiserror::Error;
use tracing::{debug, info};

use super::{CancelToken, ParamSet, RoundState, Schedule, TensorLedger};
use crate::{
    dataset::Dataset,
    identity::WorkerIdentity,
    model::{Model, ParameterDelta, Tensor, TensorError},
    settings::ClientConfig,
    traits::{PlanExecutor, PlanInput, RoundObserver},
};

/// Progress event emitted at the end of every update.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEnd {
    pub update: usize,
    pub batch: usize,
    pub epoch: usize,
    pub accuracy: f64,
    pub loss: f64,
}

/// Progress event emitted at the end of every completed epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochEnd {
    pub update: usize,
    /// Equal to the number of batches per epoch.
    pub batch: usize,
    pub epoch: usize,
    /// Snapshot of the working parameters at the end of the epoch.
    pub model: Model,
}

/// Errors which abort a round.
#[derive(Error, Debug)]
pub enum RoundError {
    #[error("the dataset is empty")]
    EmptyDataset,
    #[error("failed to slice the batch of {at}: {source}")]
    Batch {
        at: RoundState,
        #[source]
        source: TensorError,
    },
    #[error("plan `{plan}` rejected {at}: {source}")]
    PlanRejected {
        plan: String,
        at: RoundState,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("plan returned {got} parameters at {at}, expected {expected}")]
    ParamCountMismatch {
        at: RoundState,
        expected: usize,
        got: usize,
    },
    #[error("plan returned parameter {index} with shape {got:?} at {at}, expected {expected:?}")]
    ShapeMismatch {
        at: RoundState,
        index: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("round cancelled before {at}")]
    Cancelled { at: RoundState },
    #[error("failed to assemble the trained model: {0}")]
    Model(#[from] TensorError),
}

impl RoundError {
    /// Position of the round at which the error occurred, if it occurred within the
    /// training loop.
    pub fn at(&self) -> Option<RoundState> {
        match self {
            RoundError::Batch { at, .. }
            | RoundError::PlanRejected { at, .. }
            | RoundError::ParamCountMismatch { at, .. }
            | RoundError::ShapeMismatch { at, .. }
            | RoundError::Cancelled { at } => Some(*at),
            RoundError::EmptyDataset | RoundError::Model(_) => None,
        }
    }
}

/// Runs the training loop of a round.
///
/// The executor resolves the training plan by name on its [`PlanExecutor`] and invokes
/// it once per update, strictly sequentially, each invocation consuming the parameters
/// produced by the previous one. The canonical model is only read: the working copy
/// lives in a [`ParamSet`] that is released on every exit path.
pub struct RoundExecutor<'a, P: ?Sized> {
    plans: &'a mut P,
    plan: &'a str,
    worker: &'a WorkerIdentity,
    ledger: TensorLedger,
    cancel: Option<CancelToken>,
}

impl<'a, P> RoundExecutor<'a, P>
where
    P: PlanExecutor + Send + ?Sized,
{
    pub fn new(plans: &'a mut P, plan: &'a str, worker: &'a WorkerIdentity) -> Self {
        Self {
            plans,
            plan,
            worker,
            ledger: TensorLedger::new(),
            cancel: None,
        }
    }

    /// Record the working tensors in the given ledger.
    pub fn with_ledger(mut self, ledger: TensorLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Check `token` before each batch, and abort the round if it is cancelled.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn ledger(&self) -> &TensorLedger {
        &self.ledger
    }

    /// Train on `dataset` starting from `model`, and return the difference between
    /// `model` and the trained parameters.
    pub async fn run<O>(
        &mut self,
        model: &Model,
        dataset: &Dataset,
        config: &ClientConfig,
        observer: &mut O,
    ) -> Result<ParameterDelta, RoundError>
    where
        O: RoundObserver + ?Sized,
    {
        let schedule = Schedule::new(dataset.len(), config).ok_or(RoundError::EmptyDataset)?;
        info!(
            "starting round: {} samples, {} batches per epoch, {} updates",
            schedule.dataset_size, schedule.num_batches, schedule.num_updates
        );

        let mut working = ParamSet::acquire(model.tensors().cloned().collect(), &self.ledger);
        let mut state = RoundState::default();

        while state.update < schedule.num_updates {
            if self.is_cancelled() {
                info!("round cancelled before {}", state);
                return Err(RoundError::Cancelled { at: state });
            }

            let chunk_size = schedule.chunk_size(state.batch);
            let batch = dataset
                .batch(schedule.offset(state.batch), chunk_size)
                .map_err(|source| RoundError::Batch { at: state, source })?;

            debug!("invoking plan `{}` for {}", self.plan, state);
            let input = PlanInput {
                worker: self.worker,
                data: batch.data,
                targets: batch.targets,
                batch_size: chunk_size,
                lr: config.lr,
                params: working.tensors(),
            };
            let output = self
                .plans
                .invoke(self.plan, input)
                .await
                .map_err(|e| RoundError::PlanRejected {
                    plan: self.plan.to_string(),
                    at: state,
                    source: Box::new(e),
                })?;

            check_params(&working, &output.params, state)?;
            working.replace(output.params);

            observer
                .on_batch_end(BatchEnd {
                    update: state.update,
                    batch: state.batch,
                    epoch: state.epoch,
                    accuracy: output.accuracy,
                    loss: output.loss,
                })
                .await;

            if let Some(boundary) = state.advance(schedule.num_batches) {
                debug!("completed epoch {}", boundary.epoch);
                let snapshot = model.with_tensors(working.tensors())?;
                observer
                    .on_epoch_end(EpochEnd {
                        update: boundary.update,
                        batch: boundary.batch,
                        epoch: boundary.epoch,
                        model: snapshot,
                    })
                    .await;
            }
        }

        let delta = ParameterDelta::between(model, working.tensors())?;
        drop(working);
        info!("round completed after {} updates", state.update);
        Ok(delta)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancelToken::is_cancelled)
            .unwrap_or(false)
    }
}

fn check_params(current: &ParamSet, new: &[Tensor], at: RoundState) -> Result<(), RoundError> {
    if current.len() != new.len() {
        return Err(RoundError::ParamCountMismatch {
            at,
            expected: current.len(),
            got: new.len(),
        });
    }
    for (index, (old, new)) in current.tensors().iter().zip(new.iter()).enumerate() {
        if old.shape() != new.shape() {
            return Err(RoundError::ShapeMismatch {
                at,
                index,
                expected: old.shape().to_vec(),
                got: new.shape().to_vec(),
            });
        }
    }
    Ok(())
}
