//! In-process implementations of the collaborators of a worker.
//!
//! They are used by the `worker` binary to run a scope of workers in a single
//! process, and by the tests.

mod coordinator;
mod dataset;
mod mesh;
mod plans;
mod reporter;

pub use self::{
    coordinator::LocalCoordinator,
    dataset::{synthetic_dataset, StaticDataset},
    mesh::LoopbackMesh,
    plans::{softmax_model, LocalPlans, PlanFn},
    reporter::MemoryReporter,
};

use thiserror::Error;

use crate::{
    identity::{ScopeId, WorkerId},
    model::TensorError,
};

/// Errors of the local collaborators.
#[derive(Error, Debug)]
pub enum LocalError {
    #[error("unknown scope {0}")]
    UnknownScope(ScopeId),
    #[error("worker {worker} is not part of scope {scope}")]
    UnknownWorker { worker: WorkerId, scope: ScopeId },
    #[error("no plan named `{0}`")]
    UnknownPlan(String),
    #[error("invalid plan input: {0}")]
    InvalidInput(String),
    #[error("the delta was rejected")]
    Rejected,
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
