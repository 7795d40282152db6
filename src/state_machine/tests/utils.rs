use crate::{
    assignment::{Assignment, JobDescriptor, PlanHandle},
    dataset::Dataset,
    identity::{Role, ScopeId, SessionRequest, WorkerId, WorkerIdentity},
    model::{Model, Parameter, ParameterDelta, Tensor},
    settings::ClientConfig,
    state_machine::{Session, SharedState},
};

#[macro_export]
macro_rules! unwrap_as {
    ($e:expr, $p:path) => {
        match $e {
            $p(s) => s,
            x => panic!("Not a {}: {:?}", stringify!($p), x),
        }
    };
}

#[macro_export]
macro_rules! unwrap_step {
    ($phase:expr, complete, $state_machine:ident) => {
        unwrap_step!(
            $phase,
            $crate::state_machine::TransitionOutcome::Complete,
            $state_machine
        )
    };
    ($phase:expr, pending, $state_machine:ident) => {
        unwrap_step!(
            $phase,
            $crate::state_machine::TransitionOutcome::Pending,
            $state_machine
        )
    };
    ($phase:expr, $transition_outcome:path, $state_machine:ident) => {{
        let x = $crate::unwrap_as!(
            $crate::state_machine::Step::step($phase).await,
            $transition_outcome
        );
        $crate::unwrap_as!(x, $crate::state_machine::StateMachine::$state_machine)
    }};
}

#[macro_export]
macro_rules! save_and_restore {
    ($phase:expr, $state:tt) => {{
        let mut phase = $phase;
        let io_mock = std::mem::replace(&mut phase.io, Box::new(MockIO::new()));
        let serializable_state = Into::<$crate::state_machine::SerializableState>::into(phase);
        let bytes = serializable_state.to_bytes().unwrap();
        let serializable_state =
            $crate::state_machine::SerializableState::from_bytes(&bytes).unwrap();
        let state = $crate::unwrap_as!(
            serializable_state,
            $crate::state_machine::SerializableState::$state
        );
        let mut phase = $crate::state_machine::IntoPhase::<$state>::into_phase(state, io_mock);
        phase.check_io_mock();
        phase
    }};
}

pub fn shared_state() -> Box<SharedState> {
    Box::new(SharedState {
        request: SessionRequest::default(),
        training_plan: "training_plan".into(),
    })
}

pub fn identity(role: Role) -> WorkerIdentity {
    WorkerIdentity {
        worker_id: WorkerId::new("worker"),
        role,
        scope_id: ScopeId::new("scope"),
    }
}

pub fn model() -> Model {
    Model::new(vec![
        Parameter::new("w", Tensor::new(vec![2, 2], vec![1., 2., 3., 4.]).unwrap()),
        Parameter::new("b", Tensor::new(vec![2], vec![0., 0.]).unwrap()),
    ])
}

pub fn assignment() -> Assignment {
    Assignment {
        protocol: "protocol".into(),
        plans: vec![PlanHandle::new("training_plan")],
        job: JobDescriptor {
            name: "job".into(),
            version: "1.0".into(),
            model: model(),
            client_config: ClientConfig::new(4, 0.1),
        },
        roster: vec![
            WorkerId::new("peer-1"),
            WorkerId::new("worker"),
            WorkerId::new("peer-2"),
        ],
    }
}

pub fn session(role: Role) -> Session {
    Session {
        identity: identity(role),
        assignment: assignment(),
    }
}

pub fn dataset(size: usize) -> Dataset {
    let inputs = Tensor::new(vec![size, 2], vec![1.0; size * 2]).unwrap();
    let targets = Tensor::new(vec![size, 2], vec![0.5; size * 2]).unwrap();
    Dataset::new(inputs, targets).unwrap()
}

pub fn delta() -> ParameterDelta {
    let trained = [
        Tensor::new(vec![2, 2], vec![0.5, 1.5, 2.5, 3.5]).unwrap(),
        Tensor::new(vec![2], vec![-0.5, 0.5]).unwrap(),
    ];
    ParameterDelta::between(&model(), &trained).unwrap()
}
