//! Tracking of the peer connections of a worker.
//!
//! The mesh transport reports connection changes as [`MembershipEvent`]s through a
//! [`MembershipSender`]. The [`MembershipTracker`] applies them to the [`Roster`],
//! which it is the only one to write, and publishes a snapshot after every change.
//! Readers hold a [`RosterSubscriber`].

use std::collections::{btree_map, BTreeMap};

use derive_more::Display;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::identity::WorkerId;

/// Connection status of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PeerStatus {
    #[display(fmt = "connected")]
    Connected,
    #[display(fmt = "reconnecting")]
    Reconnecting,
}

/// A change in the connection with a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// The peer connected, or reconnected after a [`MembershipEvent::Reconnecting`].
    Connected(WorkerId),
    /// The connection with the peer was lost and is being reestablished.
    Reconnecting(WorkerId),
    /// The peer left.
    Disconnected(WorkerId),
}

/// The known peers of a worker and the status of their connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster(BTreeMap<WorkerId, PeerStatus>);

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, peer: &WorkerId) -> Option<PeerStatus> {
        self.0.get(peer).copied()
    }

    /// The peers whose connection is currently established.
    pub fn connected(&self) -> impl Iterator<Item = &WorkerId> {
        self.0
            .iter()
            .filter(|(_, status)| **status == PeerStatus::Connected)
            .map(|(peer, _)| peer)
    }

    pub fn iter(&self) -> btree_map::Iter<WorkerId, PeerStatus> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply `event` and return whether the roster changed.
    ///
    /// A reconnection is only recorded for a known peer. Events about unknown peers
    /// leaving are ignored.
    fn apply(&mut self, event: MembershipEvent) -> bool {
        match event {
            MembershipEvent::Connected(peer) => {
                self.0.insert(peer, PeerStatus::Connected) != Some(PeerStatus::Connected)
            }
            MembershipEvent::Reconnecting(peer) => match self.0.get_mut(&peer) {
                Some(status) if *status != PeerStatus::Reconnecting => {
                    *status = PeerStatus::Reconnecting;
                    true
                }
                _ => false,
            },
            MembershipEvent::Disconnected(peer) => self.0.remove(&peer).is_some(),
        }
    }
}

/// Handle used by the mesh transport to report membership events.
#[derive(Debug, Clone)]
pub struct MembershipSender(mpsc::UnboundedSender<MembershipEvent>);

impl MembershipSender {
    /// Send `event` to the tracker. Events sent after the tracker stopped are dropped.
    pub fn send(&self, event: MembershipEvent) {
        if self.0.send(event).is_err() {
            warn!("membership tracker is gone, dropping event");
        }
    }
}

/// Read access to the latest [`Roster`] snapshot.
#[derive(Debug, Clone)]
pub struct RosterSubscriber(watch::Receiver<Roster>);

impl RosterSubscriber {
    /// Get a copy of the latest roster.
    pub fn current(&self) -> Roster {
        self.0.borrow().clone()
    }

    /// Get the latest roster if it changed since the last time it was seen through
    /// this subscriber. This never blocks.
    pub fn try_update(&mut self) -> Option<Roster> {
        match self.0.changed().now_or_never() {
            Some(Ok(())) => Some(self.current()),
            _ => None,
        }
    }

    /// Wait for the next change of the roster. Returns `None` once the tracker
    /// stopped.
    pub async fn updated(&mut self) -> Option<Roster> {
        self.0.changed().await.ok()?;
        Some(self.current())
    }
}

/// The single writer of the [`Roster`].
#[derive(Debug)]
pub struct MembershipTracker {
    roster: Roster,
    events_rx: mpsc::UnboundedReceiver<MembershipEvent>,
    roster_tx: watch::Sender<Roster>,
    // keeps the channel open while there are no external subscribers
    roster_rx: watch::Receiver<Roster>,
}

impl MembershipTracker {
    /// Create a tracker with an empty roster.
    pub fn new() -> (Self, MembershipSender, RosterSubscriber) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (roster_tx, roster_rx) = watch::channel(Roster::new());
        let subscriber = RosterSubscriber(roster_rx.clone());
        let tracker = Self {
            roster: Roster::new(),
            events_rx,
            roster_tx,
            roster_rx,
        };
        (tracker, MembershipSender(events_tx), subscriber)
    }

    /// Get a new subscriber to the roster.
    pub fn subscribe(&self) -> RosterSubscriber {
        RosterSubscriber(self.roster_rx.clone())
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Apply `event` to the roster, and publish the roster if it changed.
    pub fn apply(&mut self, event: MembershipEvent) -> bool {
        debug!("membership event: {:?}", event);
        let changed = self.roster.apply(event);
        if changed {
            // cannot fail, we hold a receiver
            let _ = self.roster_tx.send(self.roster.clone());
        }
        changed
    }

    /// Process the events until all the [`MembershipSender`]s are dropped.
    pub async fn run(mut self) {
        info!("membership tracker started");
        while let Some(event) = self.events_rx.recv().await {
            self.apply(event);
        }
        info!("membership tracker stopped: all the senders are gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str) -> WorkerId {
        WorkerId::new(id)
    }

    #[test]
    fn test_apply_events() {
        let (mut tracker, _tx, _roster) = MembershipTracker::new();

        assert!(tracker.apply(MembershipEvent::Connected(peer("a"))));
        assert!(tracker.apply(MembershipEvent::Connected(peer("b"))));
        assert!(!tracker.apply(MembershipEvent::Connected(peer("a"))));
        assert_eq!(tracker.roster().len(), 2);

        assert!(tracker.apply(MembershipEvent::Reconnecting(peer("a"))));
        assert!(!tracker.apply(MembershipEvent::Reconnecting(peer("a"))));
        assert_eq!(
            tracker.roster().status(&peer("a")),
            Some(PeerStatus::Reconnecting)
        );
        let connected: Vec<_> = tracker.roster().connected().cloned().collect();
        assert_eq!(connected, vec![peer("b")]);

        assert!(tracker.apply(MembershipEvent::Connected(peer("a"))));
        assert_eq!(
            tracker.roster().status(&peer("a")),
            Some(PeerStatus::Connected)
        );

        assert!(tracker.apply(MembershipEvent::Disconnected(peer("b"))));
        assert!(!tracker.apply(MembershipEvent::Disconnected(peer("b"))));
        assert_eq!(tracker.roster().status(&peer("b")), None);
    }

    #[test]
    fn test_reconnecting_unknown_peer_is_ignored() {
        let (mut tracker, _tx, _roster) = MembershipTracker::new();
        assert!(!tracker.apply(MembershipEvent::Reconnecting(peer("a"))));
        assert!(tracker.roster().is_empty());
    }

    #[test]
    fn test_subscriber_sees_changes_once() {
        let (mut tracker, _tx, mut roster) = MembershipTracker::new();
        assert!(roster.try_update().is_none());

        tracker.apply(MembershipEvent::Connected(peer("a")));
        let update = roster.try_update().unwrap();
        assert_eq!(update.status(&peer("a")), Some(PeerStatus::Connected));
        assert!(roster.try_update().is_none());

        // no change, nothing published
        tracker.apply(MembershipEvent::Connected(peer("a")));
        assert!(roster.try_update().is_none());
    }

    #[tokio::test]
    async fn test_run_until_senders_are_dropped() {
        let (tracker, tx, mut roster) = MembershipTracker::new();
        let handle = tokio::spawn(tracker.run());

        tx.send(MembershipEvent::Connected(peer("a")));
        let update = roster.updated().await.unwrap();
        assert_eq!(update.len(), 1);

        tx.send(MembershipEvent::Disconnected(peer("a")));
        let update = roster.updated().await.unwrap();
        assert!(update.is_empty());

        drop(tx);
        handle.await.unwrap();
        assert!(roster.updated().await.is_none());
    }
}
