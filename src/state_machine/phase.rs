use async_trait::async_trait;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    AssignmentReady,
    Connecting,
    Done,
    Failed,
    Identified,
    MeshConnecting,
    Ready,
    Reporting,
    Training,
    IO,
};
use crate::{
    assignment::Assignment,
    identity::{SessionRequest, WorkerIdentity},
    settings::WorkerSettings,
    state_machine::{StateMachine, TransitionOutcome},
};

/// State of the state machine
#[derive(Debug, Serialize, Deserialize)]
pub struct State<P> {
    /// data specific to the current phase
    pub private: Box<P>,
    /// data common to all the phases
    pub shared: Box<SharedState>,
}

impl<P> State<P> {
    /// Create a new state
    pub fn new(shared: Box<SharedState>, private: Box<P>) -> Self {
        Self { shared, private }
    }
}

/// A dynamically dispatched [`IO`] object.
pub(crate) type PhaseIo = Box<dyn IO>;

/// Represent the state machine in a specific phase
pub struct Phase<P> {
    /// State of the phase.
    pub(super) state: State<P>,
    /// Opaque client for performing IO tasks: talking with the coordinator and the
    /// peers, running rounds, etc.
    pub(super) io: PhaseIo,
}

impl<P> std::fmt::Debug for Phase<P>
where
    P: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("state", &self.state)
            .field("io", &"PhaseIo")
            .finish()
    }
}

/// Store for all the data that are common to all the phases
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SharedState {
    /// Identity presented to the coordinator during the handshake
    pub request: SessionRequest,
    /// Name of the plan run in the training rounds
    pub training_plan: String,
}

impl SharedState {
    pub fn new(settings: &WorkerSettings) -> Self {
        Self {
            request: settings.session_request(),
            training_plan: settings.training_plan.clone(),
        }
    }
}

/// The identity and assignment of a worker, which every phase following the
/// assignment carries around.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: WorkerIdentity,
    pub assignment: Assignment,
}

/// A trait that each `Phase<P>` implements. When `Step::step` is called, the phase
/// tries to do a small piece of work.
#[async_trait]
pub trait Step {
    /// Represent an attempt to make progress within a phase. If the step results in a
    /// change in the phase state, the updated state machine is returned as
    /// `TransitionOutcome::Complete`. If no progress can be made, the state machine is
    /// returned unchanged as `TransitionOutcome::Pending`.
    async fn step(mut self) -> TransitionOutcome;
}

impl<P> Phase<P>
where
    Phase<P>: Step + Into<StateMachine>,
{
    /// Try to make some progress in the job.
    ///
    /// Changes in the peer connections are published first, whatever the phase. They
    /// never block nor alter the progress of the job.
    pub async fn step(mut self) -> TransitionOutcome {
        if let Some(roster) = self.io.roster_update() {
            info!(
                "peers changed: {} known, {} connected",
                roster.len(),
                roster.connected().count()
            );
            self.io.notify_peers_changed(&roster);
        }
        <Self as Step>::step(self).await
    }
}

/// Trait for building [`Phase<P>`] from a [`State<P>`].
///
/// Each phase can customize the conversion, for instance to emit notifications when
/// it is entered.
pub(crate) trait IntoPhase<P> {
    /// Build the phase with the given `io` object
    fn into_phase(self, io: PhaseIo) -> Phase<P>;
}

impl<P> Phase<P> {
    /// Build a new phase with the given state and io object. This should not be called
    /// directly. Instead, use the [`IntoPhase`] trait to construct a phase.
    pub(crate) fn new(state: State<P>, io: PhaseIo) -> Self {
        Phase { state, io }
    }

    /// Transition to the failed phase.
    pub(crate) fn into_failed(self, failed: Failed) -> Phase<Failed> {
        State::new(self.state.shared, Box::new(failed)).into_phase(self.io)
    }

    #[cfg(test)]
    pub(crate) fn with_io_mock<F>(&mut self, f: F)
    where
        F: FnOnce(&mut super::MockIO),
    {
        let mut mock = super::MockIO::new();
        f(&mut mock);
        self.io = Box::new(mock);
    }

    #[cfg(test)]
    pub(crate) fn check_io_mock(&mut self) {
        // dropping the mock forces the checks to run. We replace it
        // by an empty one, so that we detect if a method is called
        // un-expectedly afterwards
        let _ = std::mem::replace(&mut self.io, Box::new(super::MockIO::new()));
    }
}

/// A serializable representation of a phase state.
///
/// We cannot serialize the state directly, even though it implements `Serialize`,
/// because deserializing it would require knowing its type in advance.
#[derive(Serialize, Deserialize, From, Debug)]
pub enum SerializableState {
    Connecting(State<Connecting>),
    Identified(State<Identified>),
    AssignmentReady(State<AssignmentReady>),
    MeshConnecting(State<MeshConnecting>),
    Ready(State<Ready>),
    Training(State<Training>),
    Reporting(State<Reporting>),
    Done(State<Done>),
    Failed(State<Failed>),
}

impl SerializableState {
    /// Encode the state with `bincode`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode a state encoded with [`SerializableState::to_bytes()`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

impl<P> Into<SerializableState> for Phase<P>
where
    State<P>: Into<SerializableState>,
{
    fn into(self) -> SerializableState {
        self.state.into()
    }
}

/// Name of the phase the state machine is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum StateName {
    #[display(fmt = "connecting")]
    Connecting,
    #[display(fmt = "identified")]
    Identified,
    #[display(fmt = "assignment ready")]
    AssignmentReady,
    #[display(fmt = "mesh connecting")]
    MeshConnecting,
    #[display(fmt = "ready")]
    Ready,
    #[display(fmt = "training")]
    Training,
    #[display(fmt = "reporting")]
    Reporting,
    #[display(fmt = "done")]
    Done,
    #[display(fmt = "failed")]
    Failed,
}
