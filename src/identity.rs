//! Worker and collaboration scope identities.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Identifier of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a collaboration scope, shared by all the workers taking part in the
/// same job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Role of a worker within its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Role {
    /// The worker created the scope. It is expected to distribute the roster to the
    /// other workers.
    #[display(fmt = "creator")]
    Creator,
    /// The worker joined an existing scope.
    #[display(fmt = "participant")]
    Participant,
}

/// Identity resolved by the coordinator during the handshake. It never changes for
/// the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub worker_id: WorkerId,
    pub role: Role,
    pub scope_id: ScopeId,
}

impl WorkerIdentity {
    pub fn is_creator(&self) -> bool {
        self.role == Role::Creator
    }
}

/// Identity the worker presents to the coordinator. Missing fields are assigned by
/// the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub worker_id: Option<WorkerId>,
    pub scope_id: Option<ScopeId>,
}

impl SessionRequest {
    /// Whether the full identity was supplied, i.e. whether the worker is resuming a
    /// previous session.
    pub fn is_complete(&self) -> bool {
        self.worker_id.is_some() && self.scope_id.is_some()
    }
}
