//! The job lifecycle state machine.
//!
//! A worker goes through the following phases:
//!
//! ```text
//! Connecting -> Identified -> AssignmentReady -> MeshConnecting -> Ready -> Training -> Reporting -> Done
//! ```
//!
//! Any phase but `Done` can lead to `Failed`. The state machine does not run by
//! itself: it must be driven by calling [`StateMachine::transition()`] until it is
//! done or failed.

mod error;
mod io;
mod phase;
mod phases;
#[allow(clippy::module_inception)]
mod state_machine;


// It is useful to re-export everything within this module because
// there are lot of interdependencies between all the sub-modules
#[cfg(test)]
use self::io::MockIO;
use self::{
    io::{boxed_io, IO},
    phase::{IntoPhase, PhaseIo, Session, SharedState, State, Step},
    phases::{
        AssignmentReady,
        Connecting,
        Done,
        Failed,
        Identified,
        MeshConnecting,
        Ready,
        Reporting,
        Resume,
        Training,
    },
};

pub use self::{
    error::{ErrorKind, JobError},
    phase::{Phase, SerializableState, StateName},
    state_machine::{MeshError, StateMachine, TransitionOutcome},
};
