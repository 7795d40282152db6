use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::LocalError;
use crate::{
    assignment::{Assignment, JobDescriptor, PlanHandle},
    identity::{Role, ScopeId, SessionRequest, WorkerId, WorkerIdentity},
    traits::Coordinator,
};

#[derive(Debug)]
struct Registry {
    protocol: String,
    plans: Vec<PlanHandle>,
    job: JobDescriptor,
    /// Members of each scope, the creator first.
    scopes: HashMap<ScopeId, Vec<WorkerId>>,
}

/// A coordinator that serves a single job to any number of scopes.
///
/// A worker that doesn't name a scope creates a new one. A worker that names a known
/// scope joins it, and an unknown scope is rejected. Clones share the same registry.
#[derive(Debug, Clone)]
pub struct LocalCoordinator(Arc<Mutex<Registry>>);

impl LocalCoordinator {
    pub fn new(protocol: impl Into<String>, plans: Vec<PlanHandle>, job: JobDescriptor) -> Self {
        Self(Arc::new(Mutex::new(Registry {
            protocol: protocol.into(),
            plans,
            job,
            scopes: HashMap::new(),
        })))
    }

    /// The members of `scope`, the creator first.
    pub async fn members(&self, scope: &ScopeId) -> Option<Vec<WorkerId>> {
        self.0.lock().await.scopes.get(scope).cloned()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl Coordinator for LocalCoordinator {
    type Error = LocalError;

    async fn connect(&mut self, request: SessionRequest) -> Result<WorkerIdentity, Self::Error> {
        let mut registry = self.0.lock().await;
        let worker_id = request
            .worker_id
            .unwrap_or_else(|| WorkerId::new(new_id()));

        let scope_id = match request.scope_id {
            None => {
                let scope_id = ScopeId::new(new_id());
                info!("worker {} created scope {}", worker_id, scope_id);
                registry
                    .scopes
                    .insert(scope_id.clone(), vec![worker_id.clone()]);
                scope_id
            }
            Some(scope_id) => {
                let members = registry
                    .scopes
                    .get_mut(&scope_id)
                    .ok_or_else(|| LocalError::UnknownScope(scope_id.clone()))?;
                if members.contains(&worker_id) {
                    debug!("worker {} rejoined scope {}", worker_id, scope_id);
                } else {
                    info!("worker {} joined scope {}", worker_id, scope_id);
                    members.push(worker_id.clone());
                }
                scope_id
            }
        };

        let creator = registry
            .scopes
            .get(&scope_id)
            .and_then(|members| members.first());
        let role = if creator == Some(&worker_id) {
            Role::Creator
        } else {
            Role::Participant
        };
        Ok(WorkerIdentity {
            worker_id,
            role,
            scope_id,
        })
    }

    async fn fetch_assignment(
        &mut self,
        identity: &WorkerIdentity,
    ) -> Result<Assignment, Self::Error> {
        let registry = self.0.lock().await;
        let members = registry
            .scopes
            .get(&identity.scope_id)
            .ok_or_else(|| LocalError::UnknownScope(identity.scope_id.clone()))?;
        if !members.contains(&identity.worker_id) {
            return Err(LocalError::UnknownWorker {
                worker: identity.worker_id.clone(),
                scope: identity.scope_id.clone(),
            });
        }
        Ok(Assignment {
            protocol: registry.protocol.clone(),
            plans: registry.plans.clone(),
            job: registry.job.clone(),
            roster: members.clone(),
        })
    }
}
