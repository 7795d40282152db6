use xaynet_worker::{
    assignment::JobDescriptor,
    dataset::Dataset,
    events::{Event, Events},
    identity::{Role, ScopeId},
    local::{
        softmax_model,
        synthetic_dataset,
        LocalCoordinator,
        LocalPlans,
        LoopbackMesh,
        MemoryReporter,
        StaticDataset,
    },
    settings::{ClientConfig, WorkerSettings},
    ErrorKind,
    SerializableState,
    StateMachine,
    StateName,
    TransitionOutcome,
};

fn coordinator() -> LocalCoordinator {
    let job = JobDescriptor {
        name: "softmax".into(),
        version: "1".into(),
        model: softmax_model(2, 2),
        client_config: ClientConfig::new(4, 0.1),
    };
    LocalCoordinator::new("local", LocalPlans::default().handles(), job)
}

fn dataset(seed: u64) -> Dataset {
    synthetic_dataset(8, 2, 2, seed).unwrap()
}

fn participant_settings(scope_id: &ScopeId) -> WorkerSettings {
    WorkerSettings {
        scope_id: Some(scope_id.to_string()),
        ..WorkerSettings::default()
    }
}

fn worker(
    settings: &WorkerSettings,
    coordinator: &LocalCoordinator,
    reporter: &MemoryReporter,
    datasets: &StaticDataset,
) -> (StateMachine, Events) {
    let (mesh, tracker) = LoopbackMesh::new();
    tokio::spawn(tracker.run());
    let (events, notifier) = Events::new(64);
    let state_machine = StateMachine::new(
        settings,
        coordinator.clone(),
        mesh,
        LocalPlans::default(),
        reporter.clone(),
        datasets.clone(),
        notifier,
    );
    (state_machine, events)
}

/// Advance the state machine until it can't make progress anymore.
async fn settle(mut state_machine: StateMachine) -> StateMachine {
    for _ in 0..100 {
        state_machine = match state_machine.transition().await {
            TransitionOutcome::Complete(state_machine) => state_machine,
            TransitionOutcome::Pending(state_machine) => return state_machine,
        };
    }
    panic!("the state machine kept making progress");
}

/// The names of the events received so far, without the peer changes which depend
/// on the scheduling of the membership tracker.
fn drain(events: &mut Events) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Some(event) = events.try_next() {
        let name = match event {
            Event::Identified(_) => "identified",
            Event::Assignment(_) => "assignment",
            Event::Roster(_) => "roster",
            Event::Ready { .. } => "ready",
            Event::Training => "training",
            Event::BatchEnd(_) => "batch_end",
            Event::EpochEnd(_) => "epoch_end",
            Event::Reporting => "reporting",
            Event::Done(_) => "done",
            Event::Failed(_) => "failed",
            Event::PeersChanged(_) => continue,
        };
        names.push(name);
    }
    names
}

#[tokio::test]
async fn test_creator_and_participant_complete_the_job() {
    let coordinator = coordinator();
    let reporter = MemoryReporter::new();

    let datasets = StaticDataset::with_dataset(dataset(0));
    let (creator, mut creator_events) = worker(
        &WorkerSettings::default(),
        &coordinator,
        &reporter,
        &datasets,
    );
    let creator = settle(creator).await;
    assert_eq!(creator.state_name(), StateName::Done);
    let identity = creator.identity().unwrap().clone();
    assert_eq!(identity.role, Role::Creator);
    assert_eq!(
        drain(&mut creator_events),
        vec![
            "identified",
            "assignment",
            "ready",
            "roster",
            "training",
            "batch_end",
            "batch_end",
            "epoch_end",
            "reporting",
            "done",
        ]
    );

    let datasets = StaticDataset::with_dataset(dataset(1));
    let (participant, mut participant_events) = worker(
        &participant_settings(&identity.scope_id),
        &coordinator,
        &reporter,
        &datasets,
    );
    let participant = settle(participant).await;
    assert_eq!(participant.state_name(), StateName::Done);
    let participant_identity = participant.identity().unwrap();
    assert_eq!(participant_identity.role, Role::Participant);
    assert_eq!(participant_identity.scope_id, identity.scope_id);
    assert_eq!(
        drain(&mut participant_events),
        vec![
            "identified",
            "assignment",
            "ready",
            "training",
            "batch_end",
            "batch_end",
            "epoch_end",
            "reporting",
            "done",
        ]
    );

    let members = coordinator.members(&identity.scope_id).await.unwrap();
    assert_eq!(members.len(), 2);

    let deltas = reporter.deltas().await;
    assert_eq!(deltas.len(), 2);
    assert_ne!(deltas[0].0, deltas[1].0);
    for (_, delta) in deltas {
        assert_eq!(delta.len(), 2);
        assert!(delta.get("w").is_some());
        assert!(delta.get("b").is_some());
    }
}

#[tokio::test]
async fn test_retry_after_rejected_report() {
    let coordinator = coordinator();
    let reporter = MemoryReporter::new();
    reporter.reject_next(1).await;

    let datasets = StaticDataset::with_dataset(dataset(0));
    let (state_machine, mut events) = worker(
        &WorkerSettings::default(),
        &coordinator,
        &reporter,
        &datasets,
    );
    let state_machine = settle(state_machine).await;
    assert_eq!(state_machine.state_name(), StateName::Failed);
    assert_eq!(drain(&mut events).last(), Some(&"failed"));
    assert!(reporter.deltas().await.is_empty());

    // the delta is reported again, without training another round
    let state_machine = settle(state_machine.retry().unwrap()).await;
    assert_eq!(state_machine.state_name(), StateName::Done);
    assert_eq!(drain(&mut events), vec!["reporting", "done"]);
    assert_eq!(reporter.deltas().await.len(), 1);
}

#[tokio::test]
async fn test_unknown_scope() {
    let coordinator = coordinator();
    let reporter = MemoryReporter::new();
    let datasets = StaticDataset::with_dataset(dataset(0));
    let (state_machine, mut events) = worker(
        &participant_settings(&ScopeId::new("nowhere")),
        &coordinator,
        &reporter,
        &datasets,
    );

    let state_machine = settle(state_machine).await;
    assert_eq!(state_machine.state_name(), StateName::Failed);
    assert!(state_machine.identity().is_none());
    match events.try_next() {
        Some(Event::Failed(error)) => assert_eq!(error.kind(), ErrorKind::Connection),
        event => panic!("unexpected event {:?}", event),
    }

    // connection failures can't be resumed
    let state_machine = state_machine.retry().unwrap_err();
    assert_eq!(state_machine.state_name(), StateName::Failed);
}

#[tokio::test]
async fn test_retry_after_cancelled_round() {
    let coordinator = coordinator();
    let reporter = MemoryReporter::new();
    let datasets = StaticDataset::with_dataset(dataset(0));
    let (state_machine, mut events) = worker(
        &WorkerSettings::default(),
        &coordinator,
        &reporter,
        &datasets,
    );

    state_machine.canceller().cancel();
    let state_machine = settle(state_machine).await;
    assert_eq!(state_machine.state_name(), StateName::Failed);

    let names = drain(&mut events);
    assert!(!names.contains(&"batch_end"));
    assert_eq!(names.last(), Some(&"failed"));
    assert!(reporter.deltas().await.is_empty());

    // the cancellation was consumed by the aborted round
    let state_machine = state_machine.retry().unwrap();
    assert_eq!(state_machine.state_name(), StateName::Ready);
    datasets.set(dataset(0)).await;
    let state_machine = settle(state_machine).await;
    assert_eq!(state_machine.state_name(), StateName::Done);
    assert!(drain(&mut events).contains(&"batch_end"));
    assert_eq!(reporter.deltas().await.len(), 1);
}

#[tokio::test]
async fn test_save_and_restore_while_waiting_for_data() {
    let coordinator = coordinator();
    let reporter = MemoryReporter::new();

    let datasets = StaticDataset::new();
    let (state_machine, mut events) = worker(
        &WorkerSettings::default(),
        &coordinator,
        &reporter,
        &datasets,
    );
    let state_machine = settle(state_machine).await;
    assert_eq!(state_machine.state_name(), StateName::Ready);
    assert!(drain(&mut events).ends_with(&["ready", "roster"]));

    let bytes = state_machine.save().to_bytes().unwrap();
    let state = SerializableState::from_bytes(&bytes).unwrap();

    let (mesh, tracker) = LoopbackMesh::new();
    tokio::spawn(tracker.run());
    let (mut events, notifier) = Events::new(64);
    let state_machine = StateMachine::restore(
        state,
        coordinator.clone(),
        mesh,
        LocalPlans::default(),
        reporter.clone(),
        StaticDataset::with_dataset(dataset(0)),
        notifier,
    );
    assert_eq!(state_machine.state_name(), StateName::Ready);

    let state_machine = settle(state_machine).await;
    assert_eq!(state_machine.state_name(), StateName::Done);
    assert_eq!(drain(&mut events).first(), Some(&"ready"));
    assert_eq!(reporter.deltas().await.len(), 1);
}
