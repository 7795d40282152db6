use std::{path::PathBuf, process, time::Duration};

use futures::future::join_all;
use structopt::StructOpt;
use tokio::{signal, sync::oneshot, task::JoinHandle, time::sleep};
use tracing_futures::Instrument;
use tracing_subscriber::FmtSubscriber;
use xaynet_worker::{
    assignment::JobDescriptor,
    dataset::Dataset,
    events::{Event, Events},
    identity::ScopeId,
    local::{
        softmax_model,
        synthetic_dataset,
        LocalCoordinator,
        LocalPlans,
        LoopbackMesh,
        MemoryReporter,
        StaticDataset,
    },
    settings::{Settings, WorkerSettings},
    StateMachine,
    StateName,
    TransitionOutcome,
};

#[macro_use]
extern crate tracing;

/// Number of times a failed job is resumed before giving up.
const MAX_RETRIES: usize = 3;

#[derive(Debug, StructOpt)]
#[structopt(name = "Worker")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

/// Drive the state machine until the job is done, or failed for good.
async fn run_agent(mut state_machine: StateMachine, tick: Duration) -> StateMachine {
    let mut retries = 0;
    loop {
        state_machine = match state_machine.transition().await {
            TransitionOutcome::Complete(state_machine) => state_machine,
            TransitionOutcome::Pending(state_machine) => match state_machine.state_name() {
                StateName::Done => return state_machine,
                StateName::Failed if retries < MAX_RETRIES => {
                    retries += 1;
                    match state_machine.retry() {
                        Ok(state_machine) => {
                            warn!("resuming the job ({}/{})", retries, MAX_RETRIES);
                            state_machine
                        }
                        Err(state_machine) => return state_machine,
                    }
                }
                StateName::Failed => return state_machine,
                _ => {
                    sleep(tick).await;
                    state_machine
                }
            },
        };
    }
}

/// Reacts to the events of a worker: provides the dataset once the worker is ready,
/// and logs the progress of the job.
struct EventHandler {
    events: Events,
    datasets: StaticDataset,
    dataset: Dataset,
    scope_tx: Option<oneshot::Sender<ScopeId>>,
}

impl EventHandler {
    async fn run(mut self) {
        while let Some(event) = self.events.next().await {
            match event {
                Event::Identified(identity) => {
                    info!("identified as {} in scope {}", identity.worker_id, identity.scope_id);
                    if let Some(tx) = self.scope_tx.take() {
                        let _ = tx.send(identity.scope_id);
                    }
                }
                Event::Ready {
                    model,
                    client_config,
                } => {
                    info!(
                        "ready to train {} parameters with batches of {}",
                        model.len(),
                        client_config.batch_size
                    );
                    self.datasets.set(self.dataset.clone()).await;
                }
                Event::BatchEnd(batch) => debug!(
                    "update {} (epoch {}, batch {}): loss {:.4}, accuracy {:.2}",
                    batch.update, batch.epoch, batch.batch, batch.loss, batch.accuracy
                ),
                Event::EpochEnd(epoch) => info!("epoch {} completed", epoch.epoch),
                Event::Done(ack) => info!("delta accepted: {}", ack.id),
                Event::Failed(error) => {
                    error!("job failed: {}", error);
                    // nobody will join a scope that was never created
                    self.scope_tx.take();
                }
                event => debug!("{:?}", event),
            }
        }
    }
}

/// Spawn the tasks of a worker and return the handle of its agent.
fn spawn_worker(
    id: usize,
    settings: &WorkerSettings,
    coordinator: &LocalCoordinator,
    reporter: &MemoryReporter,
    dataset: Dataset,
    scope_tx: Option<oneshot::Sender<ScopeId>>,
) -> JoinHandle<StateMachine> {
    let (mesh, tracker) = LoopbackMesh::new();
    tokio::spawn(tracker.run().instrument(error_span!("membership", id = id)));

    let (events, notifier) = Events::new(settings.event_buffer);
    let datasets = StaticDataset::new();
    let handler = EventHandler {
        events,
        datasets: datasets.clone(),
        dataset,
        scope_tx,
    };
    tokio::spawn(handler.run().instrument(error_span!("events", id = id)));

    let state_machine = StateMachine::new(
        settings,
        coordinator.clone(),
        mesh,
        LocalPlans::default(),
        reporter.clone(),
        datasets,
        notifier,
    );
    let tick = Duration::from_millis(settings.tick_ms);
    tokio::spawn(run_agent(state_machine, tick).instrument(error_span!("worker", id = id)))
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        worker: worker_settings,
        job: job_settings,
        local: local_settings,
        log: log_settings,
    } = settings;

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(log_settings.filter)
        .with_ansi(true)
        .init();

    let job = JobDescriptor {
        name: job_settings.name,
        version: job_settings.version,
        model: softmax_model(local_settings.features, local_settings.classes),
        client_config: job_settings.client_config,
    };
    let coordinator =
        LocalCoordinator::new(job_settings.protocol, LocalPlans::default().handles(), job);
    let reporter = MemoryReporter::new();

    let datasets = (0..local_settings.workers)
        .map(|i| {
            synthetic_dataset(
                local_settings.samples,
                local_settings.features,
                local_settings.classes,
                local_settings.seed.wrapping_add(i as u64),
            )
        })
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|err| {
            eprintln!("failed to generate the datasets: {}", err);
            process::exit(1);
        });

    let mut datasets = datasets.into_iter();
    let creator_dataset = datasets.next().unwrap_or_else(|| {
        eprintln!("at least one worker is required");
        process::exit(1);
    });

    // the creator connects without a scope and the others join the scope it created
    let (scope_tx, scope_rx) = oneshot::channel();
    let creator_settings = WorkerSettings {
        scope_id: None,
        ..worker_settings.clone()
    };
    let mut handles = vec![spawn_worker(
        0,
        &creator_settings,
        &coordinator,
        &reporter,
        creator_dataset,
        Some(scope_tx),
    )];

    let scope_id = match scope_rx.await {
        Ok(scope_id) => scope_id,
        Err(_) => {
            error!("the creator failed before creating a scope");
            process::exit(1);
        }
    };

    for (i, dataset) in datasets.enumerate() {
        let participant_settings = WorkerSettings {
            worker_id: None,
            scope_id: Some(scope_id.to_string()),
            ..worker_settings.clone()
        };
        handles.push(spawn_worker(
            i + 1,
            &participant_settings,
            &coordinator,
            &reporter,
            dataset,
            None,
        ));
    }

    tokio::select! {
        results = join_all(handles) => {
            for result in results {
                match result {
                    Ok(mut state_machine) => {
                        if let Err(err) = state_machine.disconnect().await {
                            warn!("failed to disconnect: {}", err);
                        }
                        info!("worker finished in the {} phase", state_machine.state_name());
                    }
                    Err(err) => error!("worker panicked: {}", err),
                }
            }
            info!("{} deltas reported", reporter.deltas().await.len());
        }
        _ = signal::ctrl_c() => {
            warn!("shutting down: interrupted");
        }
    }
}
