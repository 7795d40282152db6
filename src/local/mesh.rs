use std::{convert::Infallible, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    identity::WorkerId,
    membership::{MembershipEvent, MembershipSender, MembershipTracker, RosterSubscriber},
    traits::Mesh,
};

/// A mesh that considers every peer reachable.
///
/// Connecting to a peer immediately reports it as connected to the membership
/// tracker. Payloads sent to the peers are kept in an outbox.
#[derive(Debug, Clone)]
pub struct LoopbackMesh {
    events: MembershipSender,
    roster: RosterSubscriber,
    outbox: Arc<Mutex<Vec<(WorkerId, Vec<u8>)>>>,
}

impl LoopbackMesh {
    /// Create a mesh and the tracker of its membership. The tracker must be run for
    /// the roster to be updated.
    pub fn new() -> (Self, MembershipTracker) {
        let (tracker, events, roster) = MembershipTracker::new();
        let mesh = Self {
            events,
            roster,
            outbox: Arc::new(Mutex::new(Vec::new())),
        };
        (mesh, tracker)
    }

    /// Handle to report membership events, for instance to simulate a lost connection.
    pub fn events(&self) -> MembershipSender {
        self.events.clone()
    }

    /// The payloads sent so far, with their recipient.
    pub async fn sent(&self) -> Vec<(WorkerId, Vec<u8>)> {
        self.outbox.lock().await.clone()
    }
}

#[async_trait]
impl Mesh for LoopbackMesh {
    type Error = Infallible;

    async fn connect_to_participants(&mut self, peers: &[WorkerId]) -> Result<(), Self::Error> {
        for peer in peers {
            self.events.send(MembershipEvent::Connected(peer.clone()));
        }
        Ok(())
    }

    async fn disconnect_from_participants(&mut self) -> Result<(), Self::Error> {
        for (peer, _) in self.roster.current().iter() {
            self.events.send(MembershipEvent::Disconnected(peer.clone()));
        }
        Ok(())
    }

    async fn send_to_participants(&mut self, payload: Vec<u8>) -> Result<(), Self::Error> {
        let roster = self.roster.current();
        let mut outbox = self.outbox.lock().await;
        for peer in roster.connected() {
            debug!("sending {} bytes to {}", payload.len(), peer);
            outbox.push((peer.clone(), payload.clone()));
        }
        Ok(())
    }

    fn roster(&self) -> RosterSubscriber {
        self.roster.clone()
    }
}
