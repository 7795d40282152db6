use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use validator::Validate;

use crate::{
    assignment::Assignment,
    identity::WorkerIdentity,
    state_machine::{
        AssignmentReady,
        Failed,
        IntoPhase,
        JobError,
        Phase,
        PhaseIo,
        Session,
        State,
        Step,
        TransitionOutcome,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Identified {
    pub identity: WorkerIdentity,
}

impl Identified {
    pub fn new(identity: WorkerIdentity) -> Self {
        Self { identity }
    }
}

impl IntoPhase<Identified> for State<Identified> {
    fn into_phase(self, mut io: PhaseIo) -> Phase<Identified> {
        if !self.shared.request.is_complete() {
            info!("publishing the identity assigned by the coordinator");
            io.notify_identified(&self.private.identity);
        }
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<Identified> {
    async fn step(mut self) -> TransitionOutcome {
        info!("fetching the assignment");
        let identity = self.state.private.identity.clone();
        let result = self
            .io
            .fetch_assignment(identity)
            .await
            .map_err(|e| e.to_string())
            .and_then(|assignment| self.check_assignment(assignment));

        match result {
            Ok(assignment) => {
                info!(
                    "assigned job {} v{} with protocol {} and {} workers",
                    assignment.job.name,
                    assignment.job.version,
                    assignment.protocol,
                    assignment.roster.len()
                );
                TransitionOutcome::Complete(self.into_assignment_ready(assignment).into())
            }
            Err(message) => {
                error!("failed to get a valid assignment: {}", message);
                let identity = self.state.private.identity.clone();
                let failed = Failed::new(JobError::Assignment { message }).with_identity(identity);
                TransitionOutcome::Complete(self.into_failed(failed).into())
            }
        }
    }
}

impl Phase<Identified> {
    /// Check that the assignment can be run by this worker.
    fn check_assignment(&self, assignment: Assignment) -> Result<Assignment, String> {
        let plan = &self.state.shared.training_plan;
        if assignment.plan(plan).is_none() {
            return Err(format!("the assignment has no plan named `{}`", plan));
        }
        if let Err(e) = assignment.job.client_config.validate() {
            return Err(format!("invalid client config: {}", e));
        }
        if assignment.job.model.is_empty() {
            return Err("the model has no parameters".to_string());
        }
        Ok(assignment)
    }

    fn into_assignment_ready(self, assignment: Assignment) -> Phase<AssignmentReady> {
        let session = Session {
            identity: self.state.private.identity,
            assignment,
        };
        State::new(self.state.shared, Box::new(AssignmentReady::new(session))).into_phase(self.io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::Role,
        model::Model,
        state_machine::{
            tests::utils::{assignment, identity, shared_state},
            MockIO,
        },
        unwrap_step,
    };

    fn make_phase(io: MockIO) -> Phase<Identified> {
        let mut mock = MockIO::new();
        mock.expect_notify_identified().times(1).return_const(());
        let mut phase = State::new(shared_state(), Box::new(Identified::new(identity(Role::Creator))))
            .into_phase(Box::new(mock));
        let _ = std::mem::replace(&mut phase.io, Box::new(io));
        phase
    }

    #[tokio::test]
    async fn test_assignment_ready() {
        let mut io = MockIO::new();
        io.expect_fetch_assignment()
            .withf(|id| *id == identity(Role::Creator))
            .times(1)
            .returning(|_| Ok(assignment()));
        io.expect_notify_assignment().times(1).return_const(());
        let phase = make_phase(io);

        let mut phase = unwrap_step!(phase, complete, AssignmentReady);
        phase.check_io_mock();
        assert_eq!(phase.state.private.session.assignment, assignment());
    }

    async fn assert_rejected(assignment: Assignment) {
        let mut io = MockIO::new();
        io.expect_fetch_assignment()
            .times(1)
            .returning(move |_| Ok(assignment.clone()));
        io.expect_notify_failed()
            .withf(|error| matches!(error, JobError::Assignment { .. }))
            .times(1)
            .return_const(());
        let phase = make_phase(io);

        let mut phase = unwrap_step!(phase, complete, Failed);
        phase.check_io_mock();
        assert_eq!(
            phase.state.private.identity,
            Some(identity(Role::Creator))
        );
        assert!(phase.state.private.resume.is_none());
    }

    #[tokio::test]
    async fn test_missing_plan() {
        let mut assignment = assignment();
        assignment.plans.clear();
        assert_rejected(assignment).await;
    }

    #[tokio::test]
    async fn test_invalid_client_config() {
        let mut assignment = assignment();
        assignment.job.client_config.lr = 0.0;
        assert_rejected(assignment).await;
    }

    #[tokio::test]
    async fn test_empty_model() {
        let mut assignment = assignment();
        assignment.job.model = Model::default();
        assert_rejected(assignment).await;
    }

    #[tokio::test]
    async fn test_fetch_failed() {
        let mut io = MockIO::new();
        io.expect_fetch_assignment()
            .times(1)
            .returning(|_| Err("timeout".into()));
        io.expect_notify_failed().times(1).return_const(());
        let phase = make_phase(io);

        let phase = unwrap_step!(phase, complete, Failed);
        assert_eq!(
            phase.state.private.error,
            JobError::Assignment {
                message: "timeout".into()
            }
        );
    }
}
