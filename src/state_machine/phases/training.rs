use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    dataset::Dataset,
    state_machine::{
        io::RoundRequest,
        Failed,
        IntoPhase,
        JobError,
        Phase,
        PhaseIo,
        Reporting,
        Resume,
        Session,
        State,
        StateMachine,
        Step,
        TransitionOutcome,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Training {
    pub session: Session,
    pub dataset: Dataset,
}

impl Training {
    pub fn new(session: Session, dataset: Dataset) -> Self {
        Self { session, dataset }
    }
}

impl IntoPhase<Training> for State<Training> {
    fn into_phase(self, mut io: PhaseIo) -> Phase<Training> {
        io.notify_training();
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<Training> {
    async fn step(mut self) -> TransitionOutcome {
        info!("training task");
        let Training { session, dataset } = *self.state.private;
        let request = RoundRequest {
            identity: session.identity.clone(),
            plan: self.state.shared.training_plan.clone(),
            model: session.assignment.job.model.clone(),
            dataset,
            config: session.assignment.job.client_config.clone(),
        };

        let next: StateMachine = match self.io.run_round(request).await {
            Ok(delta) => {
                info!("round completed, reporting the delta");
                let reporting = Reporting::new(session, delta);
                State::new(self.state.shared, Box::new(reporting))
                    .into_phase(self.io)
                    .into()
            }
            Err(e) => {
                error!("round failed: {}", e);
                let error = JobError::Training {
                    at: e.at(),
                    message: e.to_string(),
                };
                let failed = Failed::new(error)
                    .with_identity(session.identity.clone())
                    .with_resume(Resume::Ready(session));
                State::new(self.state.shared, Box::new(failed))
                    .into_phase(self.io)
                    .into()
            }
        };
        TransitionOutcome::Complete(next)
    }
}
