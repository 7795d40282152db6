use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    state_machine::{IntoPhase, Phase, PhaseIo, Session, State, Step, TransitionOutcome},
    traits::ReportAck,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Done {
    pub session: Session,
    pub ack: ReportAck,
}

impl Done {
    pub fn new(session: Session, ack: ReportAck) -> Self {
        Self { session, ack }
    }
}

impl IntoPhase<Done> for State<Done> {
    fn into_phase(self, mut io: PhaseIo) -> Phase<Done> {
        info!("job {} done", self.private.session.assignment.job.name);
        io.notify_done(&self.private.ack);
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<Done> {
    async fn step(mut self) -> TransitionOutcome {
        debug!("job done, nothing left to do");
        TransitionOutcome::Pending(self.into())
    }
}
