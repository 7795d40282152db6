//! An ordered channel of the events emitted by a worker.
//!
//! [`EventSender`] implements both [`Notify`] and [`RoundObserver`], so that the
//! lifecycle notifications and the progress of the round are received through a
//! single [`Events`] receiver, in the order they were emitted.
//!
//! Lifecycle events are never dropped nor delayed. Only round events count against
//! the capacity of the channel: once `capacity` of them are pending, the round waits
//! until the receiver catches up.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

use crate::{
    assignment::Assignment,
    identity::{WorkerId, WorkerIdentity},
    membership::Roster,
    model::Model,
    round::{BatchEnd, EpochEnd},
    settings::ClientConfig,
    state_machine::JobError,
    traits::{Notify, ReportAck, RoundObserver},
};

/// Event emitted by a worker as it advances through its job.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The coordinator assigned an identity to the worker.
    Identified(WorkerIdentity),
    /// The assignment was fetched.
    Assignment(Box<Assignment>),
    /// The full roster of the scope, emitted for the creator of the scope.
    Roster(Vec<WorkerId>),
    /// The worker is ready and waits for a dataset.
    Ready {
        model: Model,
        client_config: ClientConfig,
    },
    Training,
    BatchEnd(BatchEnd),
    EpochEnd(EpochEnd),
    Reporting,
    Done(ReportAck),
    Failed(JobError),
    PeersChanged(Roster),
}

/// Sending half of the event channel. It is passed to the state machine as notifier
/// and round observer.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
    /// Free slots for round events.
    slots: Arc<Semaphore>,
}

impl EventSender {
    fn notify(&mut self, event: Event) {
        if let Err(e) = self.tx.send(event) {
            warn!("failed to emit event: {}", e);
        }
    }

    async fn notify_round(&mut self, event: Event) {
        match self.slots.acquire().await {
            // the slot is handed back by the receiver
            Ok(permit) => permit.forget(),
            Err(_) => {
                warn!("failed to emit round event: receiver dropped");
                return;
            }
        }
        if self.tx.send(event).is_err() {
            warn!("failed to emit round event: receiver dropped");
        }
    }
}

/// Receiving half of the event channel.
#[derive(Debug)]
pub struct Events {
    rx: mpsc::UnboundedReceiver<Event>,
    slots: Arc<Semaphore>,
}

impl Events {
    /// Create an event channel that buffers up to `capacity` round events.
    pub fn new(capacity: usize) -> (Self, EventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let slots = Arc::new(Semaphore::new(capacity.max(1)));
        let events = Self {
            rx,
            slots: slots.clone(),
        };
        (events, EventSender { tx, slots })
    }

    /// Wait for the next event. Returns `None` once all the senders are dropped.
    pub async fn next(&mut self) -> Option<Event> {
        let event = self.rx.recv().await;
        self.received(event)
    }

    /// Pop the next event, if there is one.
    pub fn try_next(&mut self) -> Option<Event> {
        let event = self.rx.recv().now_or_never().flatten();
        self.received(event)
    }

    fn received(&self, event: Option<Event>) -> Option<Event> {
        if let Some(Event::BatchEnd(_)) | Some(Event::EpochEnd(_)) = event {
            self.slots.add_permits(1);
        }
        event
    }
}

impl Drop for Events {
    fn drop(&mut self) {
        // wakes up a round that waits for a free slot
        self.slots.close();
    }
}

impl Notify for EventSender {
    fn identified(&mut self, identity: &WorkerIdentity) {
        self.notify(Event::Identified(identity.clone()))
    }
    fn assignment(&mut self, assignment: &Assignment) {
        self.notify(Event::Assignment(Box::new(assignment.clone())))
    }
    fn roster(&mut self, roster: &[WorkerId]) {
        self.notify(Event::Roster(roster.to_vec()))
    }
    fn ready(&mut self, model: &Model, config: &ClientConfig) {
        self.notify(Event::Ready {
            model: model.clone(),
            client_config: config.clone(),
        })
    }
    fn training(&mut self) {
        self.notify(Event::Training)
    }
    fn reporting(&mut self) {
        self.notify(Event::Reporting)
    }
    fn done(&mut self, ack: &ReportAck) {
        self.notify(Event::Done(ack.clone()))
    }
    fn failed(&mut self, error: &JobError) {
        self.notify(Event::Failed(error.clone()))
    }
    fn peers_changed(&mut self, roster: &Roster) {
        self.notify(Event::PeersChanged(roster.clone()))
    }
}

// A slow consumer slows the round down instead of losing progress events. Completion
// is reported through `Notify::done`.
#[async_trait]
impl RoundObserver for EventSender {
    async fn on_batch_end(&mut self, event: BatchEnd) {
        self.notify_round(Event::BatchEnd(event)).await
    }

    async fn on_epoch_end(&mut self, event: EpochEnd) {
        self.notify_round(Event::EpochEnd(event)).await
    }
}
