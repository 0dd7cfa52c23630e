//! Supervisor actor for a pool of workers, and the pool handle.

use std::collections::HashMap;
use std::sync::Arc;

use db::repositories::JobRepository;
use queuectl_core::{Clock, JobEvent, QueueConfig, SystemClock};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::executor::CommandExecutor;
use crate::messages::{SupervisorMessage, WorkerError};
use crate::worker::WorkerLoop;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Everything needed to build (and rebuild) a worker.
pub struct WorkerTemplate {
    pub jobs: JobRepository,
    pub executor: Arc<dyn CommandExecutor>,
    pub config: QueueConfig,
    pub clock: Arc<dyn Clock>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

impl WorkerTemplate {
    fn build(&self, worker_id: &str) -> WorkerLoop {
        WorkerLoop::new(
            worker_id,
            self.jobs.clone(),
            self.executor.clone(),
            &self.config,
        )
        .with_clock(self.clock.clone())
        .with_event_tx(self.event_tx.clone())
    }
}

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub template: WorkerTemplate,
    pub worker_ids: Vec<String>,
    pub cancel: CancellationToken,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    template: WorkerTemplate,
    cancel: CancellationToken,
    /// Running workers by actor ID.
    workers: HashMap<ActorId, String>,
    /// Callers waiting for every worker to stop.
    shutdown_waiters: Vec<RpcReplyPort<()>>,
}

impl SupervisorState {
    fn drained(&self) -> bool {
        self.cancel.is_cancelled() && self.workers.is_empty()
    }

    fn finish(&mut self, myself: &ActorRef<SupervisorMessage>) {
        for reply in self.shutdown_waiters.drain(..) {
            let _ = reply.send(());
        }
        tracing::info!("All workers stopped");
        myself.stop(None);
    }
}

async fn spawn_worker(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    worker_id: String,
) -> Result<(), ActorProcessingErr> {
    let args = WorkerArgs {
        worker: state.template.build(&worker_id),
        cancel: state.cancel.clone(),
    };

    let (actor, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
        .await
        .map_err(|e| {
            ActorProcessingErr::from(format!("Failed to spawn worker {}: {}", worker_id, e))
        })?;

    state.workers.insert(actor.get_id(), worker_id);
    Ok(())
}

/// Supervisor actor that owns the workers of one pool.
///
/// Workers that panic are logged and restarted under the same worker ID
/// until shutdown begins. The supervisor stops once the cancellation token
/// has fired and every worker has finished its in-flight job.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(count = args.worker_ids.len(), "Starting worker supervisor");

        let mut state = SupervisorState {
            template: args.template,
            cancel: args.cancel,
            workers: HashMap::new(),
            shutdown_waiters: Vec::new(),
        };

        for worker_id in args.worker_ids {
            spawn_worker(&myself, &mut state, worker_id).await?;
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::ListWorkers { reply } => {
                let mut ids: Vec<String> = state.workers.values().cloned().collect();
                ids.sort();
                let _ = reply.send(ids);
            }

            SupervisorMessage::Shutdown { reply } => {
                tracing::info!(
                    running = state.workers.len(),
                    "Shutting down workers after their current job"
                );
                state.cancel.cancel();
                state.shutdown_waiters.push(reply);
                if state.drained() {
                    state.finish(&myself);
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, _) => {
                state.workers.remove(&cell.get_id());
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                let worker_id = state.workers.remove(&cell.get_id());
                tracing::error!(
                    worker_id = worker_id.as_deref().unwrap_or_default(),
                    error = %error,
                    "Worker failed"
                );
                if let Some(worker_id) = worker_id
                    && !state.cancel.is_cancelled()
                {
                    tracing::info!(worker_id = %worker_id, "Restarting worker");
                    spawn_worker(&myself, state, worker_id).await?;
                }
            }
            _ => {}
        }

        if state.drained() {
            state.finish(&myself);
        }
        Ok(())
    }
}

/// Handle to a running pool of workers.
pub struct WorkerPool {
    supervisor: ActorRef<SupervisorMessage>,
    handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<JobEvent>,
}

/// Builder for [`WorkerPool`].
pub struct WorkerPoolBuilder {
    jobs: JobRepository,
    executor: Arc<dyn CommandExecutor>,
    config: QueueConfig,
    count: usize,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl WorkerPoolBuilder {
    /// Number of workers to run.
    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Stop the pool when `cancel` fires, e.g. from [`crate::install_shutdown_handler`].
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish events on `tx` instead of a channel owned by the pool.
    pub fn events(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Spawn the supervisor and its workers.
    pub async fn start(self) -> Result<WorkerPool, WorkerError> {
        if self.count == 0 {
            return Err(WorkerError::NoWorkers);
        }

        let event_tx = self
            .event_tx
            .unwrap_or_else(|| broadcast::channel(1024).0);

        // Unique per pool so that pools in different processes never share a lease owner.
        let tag = ulid::Ulid::new().to_string().to_lowercase();
        let tag = &tag[tag.len() - 8..];
        let worker_ids = (1..=self.count)
            .map(|i| format!("worker-{}-{}", tag, i))
            .collect();

        let args = SupervisorArgs {
            template: WorkerTemplate {
                jobs: self.jobs,
                executor: self.executor,
                config: self.config,
                clock: self.clock,
                event_tx: event_tx.clone(),
            },
            worker_ids,
            cancel: self.cancel.clone(),
        };

        let (supervisor, handle) = Actor::spawn(None, Supervisor, args).await?;

        Ok(WorkerPool {
            supervisor,
            handle,
            cancel: self.cancel,
            event_tx,
        })
    }
}

impl WorkerPool {
    pub fn builder(
        jobs: JobRepository,
        executor: Arc<dyn CommandExecutor>,
        config: QueueConfig,
    ) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            jobs,
            executor,
            config,
            count: 1,
            cancel: CancellationToken::new(),
            clock: Arc::new(SystemClock),
            event_tx: None,
        }
    }

    /// Start `count` workers with default options.
    pub async fn start(
        jobs: JobRepository,
        executor: Arc<dyn CommandExecutor>,
        config: QueueConfig,
        count: usize,
    ) -> Result<Self, WorkerError> {
        Self::builder(jobs, executor, config).count(count).start().await
    }

    /// IDs of the workers currently running.
    pub async fn worker_ids(&self) -> Result<Vec<String>, WorkerError> {
        let result = self
            .supervisor
            .call(|reply| SupervisorMessage::ListWorkers { reply }, None)
            .await
            .map_err(|e| WorkerError::Actor(e.to_string()))?;

        match result {
            ractor::rpc::CallResult::Success(ids) => Ok(ids),
            _ => Err(WorkerError::Actor("Supervisor did not reply".into())),
        }
    }

    /// Receive every event published by this pool's workers from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all workers and wait until each has finished its current job.
    pub async fn shutdown(self) -> Result<(), WorkerError> {
        self.cancel.cancel();
        // The supervisor may already have stopped on its own after cancellation.
        let _ = self
            .supervisor
            .call(|reply| SupervisorMessage::Shutdown { reply }, None)
            .await;
        self.wait().await
    }

    /// Wait for the pool to stop, which happens once its token is cancelled.
    pub async fn wait(self) -> Result<(), WorkerError> {
        self.handle
            .await
            .map_err(|e| WorkerError::Actor(format!("Supervisor task failed: {}", e)))
    }
}
