use derive_more::From;
use thiserror::Error;
use tracing::{info, warn};

use super::{
    boxed_io,
    AssignmentReady,
    Connecting,
    Done,
    Failed,
    Identified,
    IntoPhase,
    MeshConnecting,
    Phase,
    PhaseIo,
    Ready,
    Reporting,
    SerializableState,
    SharedState,
    State,
    StateName,
    Training,
};
use crate::{
    identity::WorkerIdentity,
    round::Canceller,
    settings::WorkerSettings,
    traits::{Coordinator, DatasetStore, Mesh, Notify, PlanExecutor, Reporter, RoundObserver},
};

/// Outcome of a state machine transition attempt.
#[derive(Debug)]
pub enum TransitionOutcome {
    /// Outcome when the state machine cannot make immediate progress. The state machine
    /// is returned unchanged.
    Pending(StateMachine),
    /// Outcome when a transition occured and the state machine was updated.
    Complete(StateMachine),
}

/// Error returned by the mesh operations of the [`StateMachine`].
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("the worker has no identity yet")]
    NotIdentified,
    #[error("mesh transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Job lifecycle state machine.
#[derive(From, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum StateMachine {
    /// State machine in the "connecting" phase
    Connecting(Phase<Connecting>),
    /// State machine in the "identified" phase
    Identified(Phase<Identified>),
    /// State machine in the "assignment ready" phase
    AssignmentReady(Phase<AssignmentReady>),
    /// State machine in the "mesh connecting" phase
    MeshConnecting(Phase<MeshConnecting>),
    /// State machine in the "ready" phase
    Ready(Phase<Ready>),
    /// State machine in the "training" phase
    Training(Phase<Training>),
    /// State machine in the "reporting" phase
    Reporting(Phase<Reporting>),
    /// State machine in the "done" phase
    Done(Phase<Done>),
    /// State machine in the "failed" phase
    Failed(Phase<Failed>),
}

impl StateMachine {
    /// Try to make progress in the job
    pub async fn transition(self) -> TransitionOutcome {
        match self {
            StateMachine::Connecting(phase) => phase.step().await,
            StateMachine::Identified(phase) => phase.step().await,
            StateMachine::AssignmentReady(phase) => phase.step().await,
            StateMachine::MeshConnecting(phase) => phase.step().await,
            StateMachine::Ready(phase) => phase.step().await,
            StateMachine::Training(phase) => phase.step().await,
            StateMachine::Reporting(phase) => phase.step().await,
            StateMachine::Done(phase) => phase.step().await,
            StateMachine::Failed(phase) => phase.step().await,
        }
    }

    /// Convert the state machine into a serializable data structure so
    /// that it can be saved.
    pub fn save(self) -> SerializableState {
        match self {
            StateMachine::Connecting(phase) => phase.state.into(),
            StateMachine::Identified(phase) => phase.state.into(),
            StateMachine::AssignmentReady(phase) => phase.state.into(),
            StateMachine::MeshConnecting(phase) => phase.state.into(),
            StateMachine::Ready(phase) => phase.state.into(),
            StateMachine::Training(phase) => phase.state.into(),
            StateMachine::Reporting(phase) => phase.state.into(),
            StateMachine::Done(phase) => phase.state.into(),
            StateMachine::Failed(phase) => phase.state.into(),
        }
    }

    /// Resume a failed job. Training failures go back to the ready phase, and report
    /// failures report the kept delta again. In any other case, including when the
    /// state machine is not in the failed phase, it is returned unchanged as an error.
    pub fn retry(self) -> Result<StateMachine, StateMachine> {
        match self {
            StateMachine::Failed(phase) => phase.retry(),
            other => {
                warn!("cannot retry from the {} phase", other.state_name());
                Err(other)
            }
        }
    }

    /// Close the connections with the other workers. This can be called in any phase
    /// and does not change it.
    pub async fn disconnect(&mut self) -> Result<(), MeshError> {
        info!("disconnecting from the other workers");
        self.io_mut()
            .disconnect_from_participants()
            .await
            .map_err(MeshError::Transport)
    }

    /// Send `payload` to the connected workers, on a best effort basis. This requires
    /// the worker to be identified.
    pub async fn send_to_participants(&mut self, payload: Vec<u8>) -> Result<(), MeshError> {
        if self.identity().is_none() {
            return Err(MeshError::NotIdentified);
        }
        self.io_mut()
            .send_to_participants(payload)
            .await
            .map_err(MeshError::Transport)
    }

    /// Get a handle to cancel the training round. The round stops before its next
    /// batch, and the job fails with a training error. The request is withdrawn once
    /// the round ended, so that the round runs again after a retry.
    pub fn canceller(&self) -> Canceller {
        self.io().canceller()
    }

    /// Name of the current phase.
    pub fn state_name(&self) -> StateName {
        match self {
            StateMachine::Connecting(_) => StateName::Connecting,
            StateMachine::Identified(_) => StateName::Identified,
            StateMachine::AssignmentReady(_) => StateName::AssignmentReady,
            StateMachine::MeshConnecting(_) => StateName::MeshConnecting,
            StateMachine::Ready(_) => StateName::Ready,
            StateMachine::Training(_) => StateName::Training,
            StateMachine::Reporting(_) => StateName::Reporting,
            StateMachine::Done(_) => StateName::Done,
            StateMachine::Failed(_) => StateName::Failed,
        }
    }

    /// Identity of the worker, once the handshake succeeded.
    pub fn identity(&self) -> Option<&WorkerIdentity> {
        match self {
            StateMachine::Connecting(_) => None,
            StateMachine::Identified(phase) => Some(&phase.state.private.identity),
            StateMachine::AssignmentReady(phase) => Some(&phase.state.private.session.identity),
            StateMachine::MeshConnecting(phase) => Some(&phase.state.private.session.identity),
            StateMachine::Ready(phase) => Some(&phase.state.private.session.identity),
            StateMachine::Training(phase) => Some(&phase.state.private.session.identity),
            StateMachine::Reporting(phase) => Some(&phase.state.private.session.identity),
            StateMachine::Done(phase) => Some(&phase.state.private.session.identity),
            StateMachine::Failed(phase) => phase.state.private.identity.as_ref(),
        }
    }

    fn io(&self) -> &PhaseIo {
        match self {
            StateMachine::Connecting(phase) => &phase.io,
            StateMachine::Identified(phase) => &phase.io,
            StateMachine::AssignmentReady(phase) => &phase.io,
            StateMachine::MeshConnecting(phase) => &phase.io,
            StateMachine::Ready(phase) => &phase.io,
            StateMachine::Training(phase) => &phase.io,
            StateMachine::Reporting(phase) => &phase.io,
            StateMachine::Done(phase) => &phase.io,
            StateMachine::Failed(phase) => &phase.io,
        }
    }

    fn io_mut(&mut self) -> &mut PhaseIo {
        match self {
            StateMachine::Connecting(phase) => &mut phase.io,
            StateMachine::Identified(phase) => &mut phase.io,
            StateMachine::AssignmentReady(phase) => &mut phase.io,
            StateMachine::MeshConnecting(phase) => &mut phase.io,
            StateMachine::Ready(phase) => &mut phase.io,
            StateMachine::Training(phase) => &mut phase.io,
            StateMachine::Reporting(phase) => &mut phase.io,
            StateMachine::Done(phase) => &mut phase.io,
            StateMachine::Failed(phase) => &mut phase.io,
        }
    }
}

impl StateMachine {
    /// Instantiate a new job state machine.
    ///
    /// # Args
    ///
    /// - `settings`: worker settings
    /// - `coordinator`: a client for the session API of the coordinator
    /// - `mesh`: the transport to the other workers of the scope
    /// - `plans`: the executor of the plans of the assignment
    /// - `reporter`: the sink to which the delta of the round is reported
    /// - `datasets`: a store from which the dataset is loaded, once the worker is
    ///   ready
    /// - `notifier`: a type that the state machine can use to emit notifications and
    ///   to observe the progress of the round
    pub fn new<C, M, P, R, D, N>(
        settings: &WorkerSettings,
        coordinator: C,
        mesh: M,
        plans: P,
        reporter: R,
        datasets: D,
        notifier: N,
    ) -> Self
    where
        C: Coordinator + Send + 'static,
        M: Mesh + Send + 'static,
        P: PlanExecutor + Send + 'static,
        R: Reporter + Send + 'static,
        D: DatasetStore + Send + 'static,
        N: Notify + RoundObserver + Send + 'static,
    {
        let io = boxed_io(coordinator, mesh, plans, reporter, datasets, notifier);
        let state = State::new(Box::new(SharedState::new(settings)), Box::new(Connecting));
        state.into_phase(io).into()
    }

    /// Restore the state machine from the given `state`.
    pub fn restore<C, M, P, R, D, N>(
        state: SerializableState,
        coordinator: C,
        mesh: M,
        plans: P,
        reporter: R,
        datasets: D,
        notifier: N,
    ) -> Self
    where
        C: Coordinator + Send + 'static,
        M: Mesh + Send + 'static,
        P: PlanExecutor + Send + 'static,
        R: Reporter + Send + 'static,
        D: DatasetStore + Send + 'static,
        N: Notify + RoundObserver + Send + 'static,
    {
        let io = boxed_io(coordinator, mesh, plans, reporter, datasets, notifier);
        restore_with_io(state, io)
    }
}

pub(crate) fn restore_with_io(state: SerializableState, io: PhaseIo) -> StateMachine {
    match state {
        SerializableState::Connecting(state) => state.into_phase(io).into(),
        SerializableState::Identified(state) => state.into_phase(io).into(),
        SerializableState::AssignmentReady(state) => state.into_phase(io).into(),
        SerializableState::MeshConnecting(state) => state.into_phase(io).into(),
        SerializableState::Ready(state) => state.into_phase(io).into(),
        SerializableState::Training(state) => state.into_phase(io).into(),
        SerializableState::Reporting(state) => state.into_phase(io).into(),
        SerializableState::Done(state) => state.into_phase(io).into(),
        SerializableState::Failed(state) => state.into_phase(io).into(),
    }
}
