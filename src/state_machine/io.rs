use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::{
    assignment::Assignment,
    dataset::Dataset,
    identity::{SessionRequest, WorkerId, WorkerIdentity},
    membership::{Roster, RosterSubscriber},
    model::{Model, ParameterDelta},
    round::{CancelToken, Canceller, RoundError, RoundExecutor, TensorLedger},
    settings::ClientConfig,
    traits::{
        Coordinator,
        DatasetStore,
        Mesh,
        Notify,
        PlanExecutor,
        ReportAck,
        Reporter,
        RoundObserver,
    },
};

use super::JobError;

/// Error returned by the collaborators of the state machine.
pub(crate) type IoError = Box<dyn StdError + Send + Sync>;

/// Everything a round needs.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RoundRequest {
    pub identity: WorkerIdentity,
    pub plan: String,
    pub model: Model,
    pub dataset: Dataset,
    pub config: ClientConfig,
}

/// A rejected report. The delta is handed back so that it can be reported again.
#[derive(Error, Debug)]
#[error("report rejected: {error}")]
pub(crate) struct ReportFailure {
    pub delta: ParameterDelta,
    #[source]
    pub error: IoError,
}

/// Returned a dynamically dispatched [`IO`] object
pub(crate) fn boxed_io<C, M, P, R, D, N>(
    coordinator: C,
    mesh: M,
    plans: P,
    reporter: R,
    datasets: D,
    notifier: N,
) -> Box<dyn IO>
where
    C: Coordinator + Send + 'static,
    M: Mesh + Send + 'static,
    P: PlanExecutor + Send + 'static,
    R: Reporter + Send + 'static,
    D: DatasetStore + Send + 'static,
    N: Notify + RoundObserver + Send + 'static,
{
    Box::new(StateMachineIO::new(
        coordinator,
        mesh,
        plans,
        reporter,
        datasets,
        notifier,
    ))
}

/// A trait that gathers all the methods of the collaborators of the state machine.
///
/// It is not exposed: it keeps the state machine free of generic parameters, since a
/// `Box<dyn IO>` can be used where `Box<dyn Coordinator + Mesh + ...>` is not allowed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait IO: Send + 'static {
    /// Perform the handshake with the coordinator
    async fn connect(&mut self, request: SessionRequest) -> Result<WorkerIdentity, IoError>;
    /// Fetch the assignment of the worker from the coordinator
    async fn fetch_assignment(&mut self, identity: WorkerIdentity)
        -> Result<Assignment, IoError>;

    /// Initiate the connections toward the given peers
    async fn connect_to_participants(&mut self, peers: Vec<WorkerId>) -> Result<(), IoError>;
    /// Close all the peer connections
    async fn disconnect_from_participants(&mut self) -> Result<(), IoError>;
    /// Send a payload to the connected peers
    async fn send_to_participants(&mut self, payload: Vec<u8>) -> Result<(), IoError>;
    /// Get the roster if it changed since the last call. This never blocks.
    fn roster_update(&mut self) -> Option<Roster>;

    /// Attempt to load the dataset from the store
    async fn load_dataset(&mut self) -> Result<Option<Dataset>, IoError>;
    /// Run a training round
    async fn run_round(&mut self, round: RoundRequest) -> Result<ParameterDelta, RoundError>;
    /// Get a handle to cancel the running round
    fn canceller(&self) -> Canceller;
    /// Report the delta of the round
    async fn report(&mut self, delta: ParameterDelta) -> Result<ReportAck, ReportFailure>;
    /// Notify the round observer that the delta has been accepted
    async fn notify_round_done(&mut self);

    /// Notify the worker of its assigned identity
    fn notify_identified(&mut self, identity: &WorkerIdentity);
    /// Notify the worker of its assignment
    fn notify_assignment(&mut self, assignment: &Assignment);
    /// Notify the creator of a scope of the full roster
    fn notify_roster(&mut self, roster: &[WorkerId]);
    /// Notify the worker that it should provide a dataset
    fn notify_ready(&mut self, model: &Model, config: &ClientConfig);
    /// Notify the worker that a round started
    fn notify_training(&mut self);
    /// Notify the worker that the delta is being reported
    fn notify_reporting(&mut self);
    /// Notify the worker that the delta was accepted
    fn notify_done(&mut self, ack: &ReportAck);
    /// Notify the worker that the job failed
    fn notify_failed(&mut self, error: &JobError);
    /// Notify the worker that the connected peers changed
    fn notify_peers_changed(&mut self, roster: &Roster);
}

/// Internal struct that implements the [`IO`] trait. It is not used as is in the state
/// machine. Instead, we box it and use it as a `dyn IO` object.
struct StateMachineIO<C, M, P, R, D, N> {
    coordinator: C,
    mesh: M,
    plans: P,
    reporter: R,
    datasets: D,
    notifier: N,
    roster: RosterSubscriber,
    canceller: Canceller,
    cancel: CancelToken,
}

impl<C, M, P, R, D, N> StateMachineIO<C, M, P, R, D, N>
where
    M: Mesh,
{
    fn new(coordinator: C, mesh: M, plans: P, reporter: R, datasets: D, notifier: N) -> Self {
        let roster = mesh.roster();
        let (canceller, cancel) = Canceller::new();
        Self {
            coordinator,
            mesh,
            plans,
            reporter,
            datasets,
            notifier,
            roster,
            canceller,
            cancel,
        }
    }
}

fn boxed<E: StdError + Send + Sync + 'static>(e: E) -> IoError {
    Box::new(e)
}

#[async_trait]
impl<C, M, P, R, D, N> IO for StateMachineIO<C, M, P, R, D, N>
where
    C: Coordinator + Send + 'static,
    M: Mesh + Send + 'static,
    P: PlanExecutor + Send + 'static,
    R: Reporter + Send + 'static,
    D: DatasetStore + Send + 'static,
    N: Notify + RoundObserver + Send + 'static,
{
    async fn connect(&mut self, request: SessionRequest) -> Result<WorkerIdentity, IoError> {
        self.coordinator.connect(request).await.map_err(boxed)
    }

    async fn fetch_assignment(
        &mut self,
        identity: WorkerIdentity,
    ) -> Result<Assignment, IoError> {
        self.coordinator
            .fetch_assignment(&identity)
            .await
            .map_err(boxed)
    }

    async fn connect_to_participants(&mut self, peers: Vec<WorkerId>) -> Result<(), IoError> {
        self.mesh.connect_to_participants(&peers).await.map_err(boxed)
    }

    async fn disconnect_from_participants(&mut self) -> Result<(), IoError> {
        self.mesh.disconnect_from_participants().await.map_err(boxed)
    }

    async fn send_to_participants(&mut self, payload: Vec<u8>) -> Result<(), IoError> {
        self.mesh.send_to_participants(payload).await.map_err(boxed)
    }

    fn roster_update(&mut self) -> Option<Roster> {
        self.roster.try_update()
    }

    async fn load_dataset(&mut self) -> Result<Option<Dataset>, IoError> {
        self.datasets.load_dataset().await.map_err(boxed)
    }

    async fn run_round(&mut self, round: RoundRequest) -> Result<ParameterDelta, RoundError> {
        let ledger = TensorLedger::new();
        let result = RoundExecutor::new(&mut self.plans, &round.plan, &round.identity)
            .with_ledger(ledger.clone())
            .with_cancel_token(self.cancel.clone())
            .run(&round.model, &round.dataset, &round.config, &mut self.notifier)
            .await;
        debug!("working tensors of the round: {:?}", ledger.stats());
        // a cancellation only applies to a single round
        self.canceller.reset();
        result
    }

    fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    async fn report(&mut self, delta: ParameterDelta) -> Result<ReportAck, ReportFailure> {
        match self.reporter.report(&delta).await {
            Ok(ack) => Ok(ack),
            Err(e) => Err(ReportFailure {
                delta,
                error: boxed(e),
            }),
        }
    }

    async fn notify_round_done(&mut self) {
        self.notifier.on_done().await
    }

    fn notify_identified(&mut self, identity: &WorkerIdentity) {
        self.notifier.identified(identity)
    }

    fn notify_assignment(&mut self, assignment: &Assignment) {
        self.notifier.assignment(assignment)
    }

    fn notify_roster(&mut self, roster: &[WorkerId]) {
        self.notifier.roster(roster)
    }

    fn notify_ready(&mut self, model: &Model, config: &ClientConfig) {
        self.notifier.ready(model, config)
    }

    fn notify_training(&mut self) {
        self.notifier.training()
    }

    fn notify_reporting(&mut self) {
        self.notifier.reporting()
    }

    fn notify_done(&mut self, ack: &ReportAck) {
        self.notifier.done(ack)
    }

    fn notify_failed(&mut self, error: &JobError) {
        self.notifier.failed(error)
    }

    fn notify_peers_changed(&mut self, roster: &Roster) {
        self.notifier.peers_changed(roster)
    }
}
