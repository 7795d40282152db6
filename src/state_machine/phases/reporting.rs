use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    model::ParameterDelta,
    state_machine::{
        Done,
        Failed,
        IntoPhase,
        JobError,
        Phase,
        PhaseIo,
        Resume,
        Session,
        State,
        StateMachine,
        Step,
        TransitionOutcome,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Reporting {
    pub session: Session,
    pub delta: ParameterDelta,
}

impl Reporting {
    pub fn new(session: Session, delta: ParameterDelta) -> Self {
        Self { session, delta }
    }
}

impl IntoPhase<Reporting> for State<Reporting> {
    fn into_phase(self, mut io: PhaseIo) -> Phase<Reporting> {
        io.notify_reporting();
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<Reporting> {
    async fn step(mut self) -> TransitionOutcome {
        info!("reporting task");
        let Reporting { session, delta } = *self.state.private;

        let next: StateMachine = match self.io.report(delta).await {
            Ok(ack) => {
                info!("delta accepted: {}", ack.id);
                self.io.notify_round_done().await;
                State::new(self.state.shared, Box::new(Done::new(session, ack)))
                    .into_phase(self.io)
                    .into()
            }
            Err(failure) => {
                error!("{}", failure);
                let error = JobError::Report {
                    message: failure.error.to_string(),
                };
                let failed = Failed::new(error)
                    .with_identity(session.identity.clone())
                    .with_resume(Resume::Reporting(session, failure.delta));
                State::new(self.state.shared, Box::new(failed))
                    .into_phase(self.io)
                    .into()
            }
        };
        TransitionOutcome::Complete(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::Role,
        state_machine::{
            io::ReportFailure,
            tests::utils::{delta, session, shared_state},
            MockIO,
        },
        traits::ReportAck,
        unwrap_step,
    };

    fn make_phase(io: MockIO) -> Phase<Reporting> {
        let mut mock = MockIO::new();
        mock.expect_notify_reporting().times(1).return_const(());
        let reporting = Reporting::new(session(Role::Participant), delta());
        let mut phase = State::new(shared_state(), Box::new(reporting)).into_phase(Box::new(mock));
        let _ = std::mem::replace(&mut phase.io, Box::new(io));
        phase
    }

    #[tokio::test]
    async fn test_delta_accepted() {
        let mut io = MockIO::new();
        let mut seq = mockall::Sequence::new();
        io.expect_report()
            .withf(|d| *d == delta())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ReportAck { id: "ack".into() }));
        io.expect_notify_round_done()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        io.expect_notify_done()
            .withf(|ack| ack.id == "ack")
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let phase = make_phase(io);

        let mut phase = unwrap_step!(phase, complete, Done);
        phase.check_io_mock();
    }

    #[tokio::test]
    async fn test_rejected_delta_is_kept() {
        let mut io = MockIO::new();
        io.expect_report().times(1).returning(|delta| {
            Err(ReportFailure {
                delta,
                error: "sink unavailable".into(),
            })
        });
        io.expect_notify_failed()
            .withf(|error| matches!(error, JobError::Report { .. }))
            .times(1)
            .return_const(());
        let phase = make_phase(io);

        let mut phase = unwrap_step!(phase, complete, Failed);
        phase.check_io_mock();
        match phase.state.private.resume {
            Some(Resume::Reporting(_, ref kept)) => assert_eq!(*kept, delta()),
            ref other => panic!("unexpected resume point: {:?}", other),
        }
    }
}
