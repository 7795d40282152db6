use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    dataset::Dataset,
    state_machine::{
        IntoPhase,
        Phase,
        PhaseIo,
        Session,
        State,
        Step,
        Training,
        TransitionOutcome,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Ready {
    pub session: Session,
}

impl Ready {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl IntoPhase<Ready> for State<Ready> {
    fn into_phase(self, mut io: PhaseIo) -> Phase<Ready> {
        let Session {
            identity,
            assignment,
        } = &self.private.session;
        io.notify_ready(&assignment.job.model, &assignment.job.client_config);
        if identity.is_creator() {
            info!("publishing the roster of scope {}", identity.scope_id);
            io.notify_roster(&assignment.roster);
        }
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<Ready> {
    async fn step(mut self) -> TransitionOutcome {
        match self.io.load_dataset().await {
            Ok(Some(dataset)) => {
                info!("loaded a dataset of {} samples", dataset.len());
                TransitionOutcome::Complete(self.into_training(dataset).into())
            }
            Ok(None) => {
                debug!("waiting for a dataset");
                TransitionOutcome::Pending(self.into())
            }
            Err(e) => {
                warn!("failed to load the dataset: {}", e);
                TransitionOutcome::Pending(self.into())
            }
        }
    }
}

impl Phase<Ready> {
    fn into_training(self, dataset: Dataset) -> Phase<Training> {
        let training = Training::new(self.state.private.session, dataset);
        State::new(self.state.shared, Box::new(training)).into_phase(self.io)
    }
}
