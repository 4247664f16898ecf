//! Async driver for [`GameRoom`].
//!
//! One task owns the room and consumes a merged queue one event at a time.
//! Network calls run in spawned tasks whose completions re-enter the queue.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use chess_core::{MoveRequest, RulesEngine};

use crate::clients::{LiveChannel, LiveInput, SnapshotSource};
use crate::controller::{Effect, GameRoom, Notice, RoomEvent, RoomView};
use crate::protocol::decode_frame;

/// Requests from the local player.
#[derive(Debug)]
pub enum Command {
    Move(MoveRequest),
    ExportPgn(oneshot::Sender<Option<String>>),
    Leave,
}

pub struct RoomHandle {
    pub commands: mpsc::Sender<Command>,
    pub views: watch::Receiver<RoomView>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub task: JoinHandle<()>,
}

/// Open `game_id` and drive the room until it is left.
pub fn spawn<R, S, L>(
    room: GameRoom<R>,
    game_id: String,
    api: S,
    live: L,
    live_inputs: mpsc::Receiver<LiveInput>,
) -> RoomHandle
where
    R: RulesEngine + Send + 'static,
    S: SnapshotSource,
    L: LiveChannel,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(room.view(Instant::now().into_std()));

    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let driver = Driver {
        room,
        api,
        live,
        joined: None,
        notices: notice_tx,
        views: view_tx,
        internal: internal_tx,
    };
    let task = tokio::spawn(driver.run(game_id, command_rx, internal_rx, live_inputs));

    RoomHandle {
        commands: command_tx,
        views: view_rx,
        notices: notice_rx,
        task,
    }
}

struct Driver<R, S, L> {
    room: GameRoom<R>,
    api: S,
    live: L,
    /// Room the live channel is subscribed to; frames are tagged with it
    joined: Option<String>,
    notices: mpsc::UnboundedSender<Notice>,
    views: watch::Sender<RoomView>,
    /// Completions of spawned work and rejoin timers
    internal: mpsc::UnboundedSender<RoomEvent>,
}

enum Next {
    Event(RoomEvent),
    Input(LiveInput),
}

impl<R, S, L> Driver<R, S, L>
where
    R: RulesEngine + Send + 'static,
    S: SnapshotSource,
    L: LiveChannel,
{
    async fn run(
        mut self,
        game_id: String,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<RoomEvent>,
        mut live_inputs: mpsc::Receiver<LiveInput>,
    ) {
        let mut tick = tokio::time::interval(self.room.timings().health_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let effects = self.room.open(&game_id);
        self.execute(effects);
        self.publish();

        loop {
            let next = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Move(request)) => Next::Event(RoomEvent::LocalMove(request)),
                    Some(Command::ExportPgn(reply)) => {
                        let _ = reply.send(self.room.pgn());
                        continue;
                    }
                    Some(Command::Leave) | None => Next::Event(RoomEvent::Leave),
                },
                Some(event) = internal.recv() => Next::Event(event),
                Some(input) = live_inputs.recv() => Next::Input(input),
                _ = tick.tick() => Next::Event(RoomEvent::HealthTick),
            };
            let event = match next {
                Next::Event(event) => event,
                Next::Input(input) => match self.translate(input) {
                    Some(event) => event,
                    None => continue,
                },
            };

            let leaving = matches!(event, RoomEvent::Leave);
            let effects = self.room.handle(event, Instant::now().into_std());
            self.execute(effects);
            self.publish();
            if leaving {
                info!(game_id, "Room driver stopped");
                return;
            }
        }
    }

    fn translate(&self, input: LiveInput) -> Option<RoomEvent> {
        match input {
            LiveInput::Transport(signal) => Some(RoomEvent::Transport(signal)),
            LiveInput::SendFailed { game_id, reason } => {
                Some(RoomEvent::MoveSendFailed { game_id, reason })
            }
            LiveInput::Frame(text) => {
                let Some(game_id) = self.joined.clone() else {
                    debug!("Frame received while not in a room");
                    return None;
                };
                match decode_frame(&text) {
                    Ok(Some(event)) => Some(RoomEvent::Live { game_id, event }),
                    Ok(None) => None,
                    Err(fault) => Some(RoomEvent::MalformedLive { game_id, fault }),
                }
            }
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::LoadSnapshot { game_id } => {
                    let api = self.api.clone();
                    let tx = self.internal.clone();
                    tokio::spawn(async move {
                        let event = match api.load(&game_id).await {
                            Ok(loaded) => RoomEvent::SnapshotLoaded { game_id, loaded },
                            Err(e) => RoomEvent::SnapshotFailed {
                                game_id,
                                reason: e.to_string(),
                            },
                        };
                        let _ = tx.send(event);
                    });
                }
                Effect::Join { game_id } => {
                    if let Err(e) = self.live.join(&game_id) {
                        warn!(game_id, error = %e, "Join failed");
                    }
                    self.joined = Some(game_id);
                }
                Effect::Leave { game_id } => {
                    if let Err(e) = self.live.leave(&game_id) {
                        warn!(game_id, error = %e, "Leave failed");
                    }
                    self.joined = None;
                }
                Effect::ScheduleRejoin { game_id, after } => {
                    let tx = self.internal.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(RoomEvent::RejoinDue { game_id });
                    });
                }
                Effect::SubmitMove(submission) => {
                    let game_id = submission.game_id.clone();
                    if let Err(e) = self.live.submit(submission) {
                        let _ = self.internal.send(RoomEvent::MoveSendFailed {
                            game_id,
                            reason: e.to_string(),
                        });
                    }
                }
                Effect::Notify(notice) => {
                    let _ = self.notices.send(notice);
                }
            }
        }
    }

    fn publish(&self) {
        self.views.send_replace(self.room.view(Instant::now().into_std()));
    }
}
