use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    assignment::Assignment,
    dataset::Dataset,
    identity::{SessionRequest, WorkerId, WorkerIdentity},
    membership::{Roster, RosterSubscriber},
    model::{Model, ParameterDelta, Tensor},
    round::{BatchEnd, EpochEnd},
    settings::ClientConfig,
    state_machine::JobError,
};

/// A trait used by the [`StateMachine`] to talk with the coordinator.
///
/// [`StateMachine`]: crate::StateMachine
#[async_trait]
pub trait Coordinator {
    type Error: ::std::error::Error + Send + Sync + 'static;

    /// Perform the session handshake. Identity fields missing from `request` are
    /// assigned by the coordinator, which also decides the role of the worker.
    async fn connect(&mut self, request: SessionRequest) -> Result<WorkerIdentity, Self::Error>;

    /// Fetch the protocol, plans, job and roster assigned to the worker.
    async fn fetch_assignment(
        &mut self,
        identity: &WorkerIdentity,
    ) -> Result<Assignment, Self::Error>;
}

/// Inputs of a training plan invocation.
#[derive(Debug)]
pub struct PlanInput<'a> {
    pub worker: &'a WorkerIdentity,
    pub data: Tensor,
    pub targets: Tensor,
    /// Number of samples in `data`. May be smaller than the configured batch size for
    /// the last batch of an epoch.
    pub batch_size: usize,
    pub lr: f64,
    pub params: &'a [Tensor],
}

/// Outputs of a training plan invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutput {
    pub loss: f64,
    pub accuracy: f64,
    /// Exactly one new tensor per input parameter, in the same order.
    pub params: Vec<Tensor>,
}

/// A trait used to invoke the plans of an assignment, resolved by name.
#[async_trait]
pub trait PlanExecutor {
    type Error: ::std::error::Error + Send + Sync + 'static;

    async fn invoke(&mut self, plan: &str, input: PlanInput<'_>)
        -> Result<PlanOutput, Self::Error>;
}

/// Acknowledgment of a reported delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAck {
    pub id: String,
}

/// A trait used by the [`StateMachine`] to hand over the delta computed in a round.
///
/// [`StateMachine`]: crate::StateMachine
#[async_trait]
pub trait Reporter {
    type Error: ::std::error::Error + Send + Sync + 'static;

    async fn report(&mut self, delta: &ParameterDelta) -> Result<ReportAck, Self::Error>;
}

/// A trait used by the [`StateMachine`] to manage the connections with the other
/// workers of the scope.
///
/// Membership changes are not returned by these methods. They are delivered as
/// events to a [`MembershipTracker`], and observed through [`Mesh::roster()`].
///
/// [`StateMachine`]: crate::StateMachine
/// [`MembershipTracker`]: crate::membership::MembershipTracker
#[async_trait]
pub trait Mesh {
    type Error: ::std::error::Error + Send + Sync + 'static;

    /// Initiate connections toward the given peers.
    async fn connect_to_participants(&mut self, peers: &[WorkerId]) -> Result<(), Self::Error>;

    /// Close all the peer connections.
    async fn disconnect_from_participants(&mut self) -> Result<(), Self::Error>;

    /// Send `payload` to all the connected peers, on a best effort basis.
    async fn send_to_participants(&mut self, payload: Vec<u8>) -> Result<(), Self::Error>;

    /// Subscribe to roster updates.
    fn roster(&self) -> RosterSubscriber;
}

/// A trait used by the [`StateMachine`] to obtain the data to train on, once the worker
/// is ready.
///
/// [`StateMachine`]: crate::StateMachine
#[async_trait]
pub trait DatasetStore {
    type Error: ::std::error::Error + Send + Sync + 'static;

    /// Attempt to load the dataset. If it is not yet available, `Ok(None)` should be
    /// returned.
    async fn load_dataset(&mut self) -> Result<Option<Dataset>, Self::Error>;
}

/// A trait used by the [`StateMachine`] to emit notifications upon
/// certain events.
///
/// [`StateMachine`]: crate::StateMachine
pub trait Notify {
    /// Emit a notification when the coordinator assigned an identity that was not
    /// supplied by the worker. It should be persisted to rejoin the scope later.
    fn identified(&mut self, _identity: &WorkerIdentity) {}
    /// Emit a notification when the assignment has been fetched
    fn assignment(&mut self, _assignment: &Assignment) {}
    /// Emit a notification with the full roster, when the worker is the creator of
    /// its scope and is ready. The roster should be distributed to the other workers.
    fn roster(&mut self, _roster: &[WorkerId]) {}
    /// Emit a notification when the worker is ready to train. The embedder is
    /// expected to provide a dataset through the [`DatasetStore`].
    fn ready(&mut self, _model: &Model, _config: &ClientConfig) {}
    /// Emit a notification when a round starts
    fn training(&mut self) {}
    /// Emit a notification when the delta is being reported
    fn reporting(&mut self) {}
    /// Emit a notification when the delta has been accepted
    fn done(&mut self, _ack: &ReportAck) {}
    /// Emit a notification when the job failed
    fn failed(&mut self, _error: &JobError) {}
    /// Emit a notification when the set of connected peers changed
    fn peers_changed(&mut self, _roster: &Roster) {}
}

/// Callbacks invoked by the [`RoundExecutor`]. Each call is awaited before the round
/// continues.
///
/// [`RoundExecutor`]: crate::round::RoundExecutor
#[async_trait]
pub trait RoundObserver: Send {
    /// Called once per update, in order.
    async fn on_batch_end(&mut self, _event: BatchEnd) {}
    /// Called once per completed epoch, after the `on_batch_end` call of its last
    /// batch. Never called for a partial trailing epoch.
    async fn on_epoch_end(&mut self, _event: EpochEnd) {}
    /// Called once the delta of the round has been accepted by the reporter.
    async fn on_done(&mut self) {}
}

#[async_trait]
impl RoundObserver for () {}
