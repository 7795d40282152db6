use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::LocalError;
use crate::{
    model::ParameterDelta,
    traits::{ReportAck, Reporter},
};

#[derive(Debug, Default)]
struct Inbox {
    deltas: Vec<(ReportAck, ParameterDelta)>,
    reject: usize,
}

/// A reporter that keeps the deltas in memory. Clones share the same deltas.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter(Arc<Mutex<Inbox>>);

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` reports.
    pub async fn reject_next(&self, count: usize) {
        self.0.lock().await.reject = count;
    }

    /// The accepted deltas, in the order they were reported.
    pub async fn deltas(&self) -> Vec<(ReportAck, ParameterDelta)> {
        self.0.lock().await.deltas.clone()
    }
}

#[async_trait]
impl Reporter for MemoryReporter {
    type Error = LocalError;

    async fn report(&mut self, delta: &ParameterDelta) -> Result<ReportAck, Self::Error> {
        let mut inbox = self.0.lock().await;
        if inbox.reject > 0 {
            inbox.reject -= 1;
            warn!("rejecting delta");
            return Err(LocalError::Rejected);
        }
        let ack = ReportAck {
            id: Uuid::new_v4().to_string(),
        };
        info!("accepted delta {}", ack.id);
        inbox.deltas.push((ack.clone(), delta.clone()));
        Ok(ack)
    }
}
