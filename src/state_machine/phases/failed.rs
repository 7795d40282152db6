use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    identity::WorkerIdentity,
    model::ParameterDelta,
    state_machine::{
        IntoPhase,
        JobError,
        Phase,
        PhaseIo,
        Ready,
        Reporting,
        Session,
        State,
        StateMachine,
        Step,
        TransitionOutcome,
    },
};

/// The phase from which a failed job can be resumed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Resume {
    /// Run the round again, with a new dataset.
    Ready(Session),
    /// Report the delta again.
    Reporting(Session, ParameterDelta),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Failed {
    pub error: JobError,
    /// Identity of the worker, if the handshake succeeded.
    pub identity: Option<WorkerIdentity>,
    pub resume: Option<Resume>,
}

impl Failed {
    pub fn new(error: JobError) -> Self {
        Self {
            error,
            identity: None,
            resume: None,
        }
    }

    pub fn with_identity(mut self, identity: WorkerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_resume(mut self, resume: Resume) -> Self {
        self.resume = Some(resume);
        self
    }
}

impl IntoPhase<Failed> for State<Failed> {
    fn into_phase(self, mut io: PhaseIo) -> Phase<Failed> {
        error!("job failed: {}", self.private.error);
        io.notify_failed(&self.private.error);
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<Failed> {
    async fn step(mut self) -> TransitionOutcome {
        debug!("job failed, waiting to be retried or dropped");
        TransitionOutcome::Pending(self.into())
    }
}

impl Phase<Failed> {
    /// Resume the job from the phase in which it failed. Errors of the connection and
    /// assignment steps are fatal, in which case the state machine is handed back
    /// unchanged.
    pub(crate) fn retry(mut self) -> Result<StateMachine, StateMachine> {
        let resume = match self.state.private.resume.take() {
            Some(resume) if self.state.private.error.is_retryable() => resume,
            resume => {
                warn!("{} errors cannot be retried", self.state.private.error.kind());
                self.state.private.resume = resume;
                return Err(self.into());
            }
        };

        let shared = self.state.shared;
        let next = match resume {
            Resume::Ready(session) => {
                info!("retrying the round");
                State::new(shared, Box::new(Ready::new(session)))
                    .into_phase(self.io)
                    .into()
            }
            Resume::Reporting(session, delta) => {
                info!("reporting the delta again");
                State::new(shared, Box::new(Reporting::new(session, delta)))
                    .into_phase(self.io)
                    .into()
            }
        };
        Ok(next)
    }
}
