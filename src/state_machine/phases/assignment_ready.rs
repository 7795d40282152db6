use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state_machine::{
    IntoPhase,
    MeshConnecting,
    Phase,
    PhaseIo,
    Session,
    State,
    Step,
    TransitionOutcome,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssignmentReady {
    pub session: Session,
}

impl AssignmentReady {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl IntoPhase<AssignmentReady> for State<AssignmentReady> {
    fn into_phase(self, mut io: PhaseIo) -> Phase<AssignmentReady> {
        io.notify_assignment(&self.private.session.assignment);
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<AssignmentReady> {
    async fn step(mut self) -> TransitionOutcome {
        info!("assignment ready, connecting to the other workers");
        TransitionOutcome::Complete(self.into_mesh_connecting().into())
    }
}

impl Phase<AssignmentReady> {
    fn into_mesh_connecting(self) -> Phase<MeshConnecting> {
        let mesh_connecting = MeshConnecting::new(self.state.private.session);
        State::new(self.state.shared, Box::new(mesh_connecting)).into_phase(self.io)
    }
}
