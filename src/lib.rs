#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/xaynetwork/xaynet/master/assets/logo.png",
    issue_tracker_base_url = "https://github.com/xaynetwork/xaynet/issues",
    html_favicon_url = "https://raw.githubusercontent.com/xaynetwork/xaynet/master/assets/favicon.png"
)]
//! This crate provides a worker for federated learning jobs.
//!
//! A worker joins a scope of workers through a coordinator, fetches its
//! assignment, connects to the other workers of the scope, trains the model
//! of the job on local data, and hands over the resulting parameter delta.
//!
//! The first worker of a scope is its **creator**: the coordinator creates
//! the scope when it connects without naming one. The workers that name an
//! existing scope are **participants**.
//!
//! # Running a worker
//!
//! The job is driven by a [`StateMachine`], which talks to the outside
//! world through a handful of traits:
//!
//! - a [`Coordinator`] that performs the handshake and serves the
//!   assignment
//! - a [`Mesh`] that manages the connections with the other workers
//! - a [`PlanExecutor`] that runs the plans of the assignment on a batch
//! - a [`Reporter`] to which the delta of the round is handed over
//! - a [`DatasetStore`] from which the training data is loaded once the
//!   worker is ready
//! - a notifier, implementing [`Notify`] and [`RoundObserver`], that
//!   receives the events of the job
//!
//! In-process implementations of all of them are available in the
//! [`local`] module, and [`events::EventSender`] is a notifier that forwards
//! the events to a channel.
//!
//! The state machine is advanced by an agent, which is a simple loop:
//!
//! ```rust
//! use std::time::Duration;
//!
//! use xaynet_worker::{StateMachine, StateName, TransitionOutcome};
//!
//! async fn run_agent(mut state_machine: StateMachine, tick: Duration) -> StateMachine {
//!     loop {
//!         state_machine = match state_machine.transition().await {
//!             // Nothing can be done for now, for instance because the
//!             // dataset is not available yet. Wait a little and try again.
//!             TransitionOutcome::Pending(state_machine) => {
//!                 match state_machine.state_name() {
//!                     StateName::Done | StateName::Failed => return state_machine,
//!                     _ => tokio::time::sleep(tick).await,
//!                 }
//!                 state_machine
//!             }
//!             TransitionOutcome::Complete(state_machine) => state_machine,
//!         };
//!     }
//! }
//! ```
//!
//! A failed job can be resumed with [`StateMachine::retry()`] when the
//! failure happened while training or reporting. The state machine can also
//! be saved with [`StateMachine::save()`] and restored later with
//! [`StateMachine::restore()`].

pub mod assignment;
pub mod dataset;
pub mod events;
pub mod identity;
pub mod local;
pub mod membership;
pub mod model;
pub mod round;
pub mod settings;

mod state_machine;
pub use self::state_machine::{
    ErrorKind,
    JobError,
    MeshError,
    Phase,
    SerializableState,
    StateMachine,
    StateName,
    TransitionOutcome,
};

mod traits;
pub use self::traits::{
    Coordinator,
    DatasetStore,
    Mesh,
    Notify,
    PlanExecutor,
    PlanInput,
    PlanOutput,
    ReportAck,
    Reporter,
    RoundObserver,
};
