use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    identity::WorkerIdentity,
    state_machine::{
        Failed,
        Identified,
        IntoPhase,
        JobError,
        Phase,
        PhaseIo,
        State,
        Step,
        TransitionOutcome,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Connecting;

impl IntoPhase<Connecting> for State<Connecting> {
    fn into_phase(self, io: PhaseIo) -> Phase<Connecting> {
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<Connecting> {
    async fn step(mut self) -> TransitionOutcome {
        info!("connecting to the coordinator");
        let request = self.state.shared.request.clone();
        match self.io.connect(request).await {
            Ok(identity) => {
                info!(
                    "connected as {} of scope {} ({})",
                    identity.worker_id, identity.scope_id, identity.role
                );
                TransitionOutcome::Complete(self.into_identified(identity).into())
            }
            Err(e) => {
                error!("handshake failed: {}", e);
                let error = JobError::Connection {
                    message: e.to_string(),
                };
                TransitionOutcome::Complete(self.into_failed(Failed::new(error)).into())
            }
        }
    }
}

impl Phase<Connecting> {
    fn into_identified(self, identity: WorkerIdentity) -> Phase<Identified> {
        State::new(self.state.shared, Box::new(Identified::new(identity))).into_phase(self.io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::{Role, ScopeId, WorkerId},
        state_machine::{
            tests::utils::{identity, shared_state},
            MockIO,
        },
        unwrap_step,
    };

    fn make_phase(io: MockIO) -> Phase<Connecting> {
        State::new(shared_state(), Box::new(Connecting)).into_phase(Box::new(io))
    }

    #[tokio::test]
    async fn test_connected() {
        let mut io = MockIO::new();
        io.expect_connect()
            .times(1)
            .returning(|_| Ok(identity(Role::Creator)));
        // the identity was not supplied: it is published
        io.expect_notify_identified().times(1).return_const(());
        let phase = make_phase(io);

        let mut phase = unwrap_step!(phase, complete, Identified);
        phase.check_io_mock();
        assert_eq!(phase.state.private.identity, identity(Role::Creator));
    }

    #[tokio::test]
    async fn test_supplied_identity_is_not_published() {
        let mut shared = shared_state();
        shared.request.worker_id = Some(WorkerId::new("worker"));
        shared.request.scope_id = Some(ScopeId::new("scope"));

        let mut io = MockIO::new();
        io.expect_connect()
            .withf(|request| request.is_complete())
            .times(1)
            .returning(|_| Ok(identity(Role::Participant)));
        let phase = State::new(shared, Box::new(Connecting)).into_phase(Box::new(io));

        let mut phase = unwrap_step!(phase, complete, Identified);
        phase.check_io_mock();
    }

    #[tokio::test]
    async fn test_handshake_failed() {
        let mut io = MockIO::new();
        io.expect_connect()
            .times(1)
            .returning(|_| Err("unknown scope".into()));
        io.expect_notify_failed()
            .withf(|error| matches!(error, JobError::Connection { .. }))
            .times(1)
            .return_const(());
        let phase = make_phase(io);

        let mut phase = unwrap_step!(phase, complete, Failed);
        phase.check_io_mock();
        assert!(phase.state.private.resume.is_none());
        assert!(phase.state.private.identity.is_none());
    }
}
