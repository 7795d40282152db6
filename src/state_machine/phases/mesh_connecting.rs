use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    identity::WorkerId,
    state_machine::{
        IntoPhase,
        Phase,
        PhaseIo,
        Ready,
        Session,
        State,
        Step,
        TransitionOutcome,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeshConnecting {
    pub session: Session,
}

impl MeshConnecting {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl IntoPhase<MeshConnecting> for State<MeshConnecting> {
    fn into_phase(self, io: PhaseIo) -> Phase<MeshConnecting> {
        Phase::<_>::new(self, io)
    }
}

#[async_trait]
impl Step for Phase<MeshConnecting> {
    async fn step(mut self) -> TransitionOutcome {
        let session = &self.state.private.session;
        let peers: Vec<WorkerId> = session
            .assignment
            .peers(&session.identity.worker_id)
            .cloned()
            .collect();

        // readiness requires no quorum: the connections are only initiated here and
        // their outcome is reported by the membership tracker
        if peers.is_empty() {
            debug!("no peers to connect to");
        } else {
            info!("connecting to {} peers", peers.len());
            if let Err(e) = self.io.connect_to_participants(peers).await {
                warn!("failed to connect to the peers: {}", e);
            }
        }
        TransitionOutcome::Complete(self.into_ready().into())
    }
}

impl Phase<MeshConnecting> {
    fn into_ready(self) -> Phase<Ready> {
        let ready = Ready::new(self.state.private.session);
        State::new(self.state.shared, Box::new(ready)).into_phase(self.io)
    }
}
