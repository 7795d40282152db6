//! Job assignment served by the coordinator.

use serde::{Deserialize, Serialize};

use crate::{identity::WorkerId, model::Model, settings::ClientConfig};

/// A named, server-assigned computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanHandle {
    pub name: String,
}

impl PlanHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The job the worker takes part in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub version: String,
    /// The canonical model. It is never mutated by the worker.
    pub model: Model,
    pub client_config: ClientConfig,
}

/// Everything the coordinator assigns to a worker. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub protocol: String,
    pub plans: Vec<PlanHandle>,
    pub job: JobDescriptor,
    /// All the workers of the scope, including this one.
    pub roster: Vec<WorkerId>,
}

impl Assignment {
    /// Resolve a plan by name.
    pub fn plan(&self, name: &str) -> Option<&PlanHandle> {
        self.plans.iter().find(|plan| plan.name == name)
    }

    /// The workers of the scope, except `me`.
    pub fn peers<'a>(&'a self, me: &'a WorkerId) -> impl Iterator<Item = &'a WorkerId> + 'a {
        self.roster.iter().filter(move |id| *id != me)
    }
}
