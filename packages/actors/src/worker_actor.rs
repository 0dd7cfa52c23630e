//! Worker actor driving one [`WorkerLoop`].

use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio_util::sync::CancellationToken;

use crate::messages::WorkerMessage;
use crate::worker::WorkerLoop;

/// State for the worker actor.
pub struct WorkerActorState {
    pub worker: WorkerLoop,
    pub cancel: CancellationToken,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker: WorkerLoop,
    pub cancel: CancellationToken,
}

/// Worker actor that polls the store for jobs.
///
/// Each `Poll` runs one cycle of the loop. Follow-up polls are self-sent,
/// after the idle or back-off pause when there is one, so the actor never
/// sleeps inside a handler.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        args.worker.started();
        myself.send_message(WorkerMessage::Poll)?;

        Ok(WorkerActorState {
            worker: args.worker,
            cancel: args.cancel,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.worker.stopped();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                let outcome = state.worker.poll_once(&state.cancel).await;

                match state.worker.pause_after(&outcome, &state.cancel) {
                    None => myself.stop(None),
                    Some(pause) if pause.is_zero() => {
                        myself.send_message(WorkerMessage::Poll)?;
                    }
                    Some(pause) => {
                        // Cancellation cuts the pause short; the next Poll then stops the actor.
                        let myself_clone = myself.clone();
                        let cancel = state.cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                _ = tokio::time::sleep(pause) => {}
                            }
                            let _ = myself_clone.send_message(WorkerMessage::Poll);
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
