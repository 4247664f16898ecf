//! Websocket live channel with automatic reconnect.
//!
//! A background task owns the socket. It reconnects after a fixed backoff and
//! rejoins the last joined room, so callers only ever see [`LiveInput`]s.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::RoomError;
use crate::health::TransportSignal;
use crate::protocol::{MoveSubmission, Outbound};

/// What the live channel delivers to the room driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveInput {
    Transport(TransportSignal),
    /// Raw text frame, decoded by the driver
    Frame(String),
    SendFailed { game_id: String, reason: String },
}

/// Outbound side of the live channel.
pub trait LiveChannel: Send + 'static {
    /// Subscribe to a room. Joining the current room again is harmless.
    fn join(&self, game_id: &str) -> Result<(), RoomError>;

    /// Unsubscribe. Safe when not joined.
    fn leave(&self, game_id: &str) -> Result<(), RoomError>;

    fn submit(&self, submission: MoveSubmission) -> Result<(), RoomError>;
}

#[derive(Clone)]
pub struct WsLiveChannel {
    commands: mpsc::UnboundedSender<Outbound>,
}

impl WsLiveChannel {
    /// Start the connection task. Returns the channel and the stream of inputs.
    pub fn spawn(
        url: String,
        token: Option<String>,
        backoff: Duration,
    ) -> (Self, mpsc::Receiver<LiveInput>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::channel(256);

        let worker = LiveWorker {
            url,
            token,
            backoff,
            room: None,
            commands: command_rx,
            inputs: input_tx,
        };
        tokio::spawn(worker.run());

        (Self { commands }, input_rx)
    }

    fn send(&self, out: Outbound) -> Result<(), RoomError> {
        self.commands.send(out).map_err(|_| RoomError::ChannelClosed)
    }
}

impl LiveChannel for WsLiveChannel {
    fn join(&self, game_id: &str) -> Result<(), RoomError> {
        self.send(Outbound::Join {
            game_id: game_id.to_string(),
        })
    }

    fn leave(&self, game_id: &str) -> Result<(), RoomError> {
        self.send(Outbound::Leave {
            game_id: game_id.to_string(),
        })
    }

    fn submit(&self, submission: MoveSubmission) -> Result<(), RoomError> {
        self.send(Outbound::Move(submission))
    }
}

/// Why one connection ended.
enum Closed {
    /// Socket dropped; reconnect after the backoff
    Lost,
    /// Every handle is gone; stop for good
    Shutdown,
}

struct LiveWorker {
    url: String,
    token: Option<String>,
    backoff: Duration,
    /// Room to rejoin after a reconnect
    room: Option<String>,
    commands: mpsc::UnboundedReceiver<Outbound>,
    inputs: mpsc::Sender<LiveInput>,
}

impl LiveWorker {
    async fn run(mut self) {
        loop {
            if !self.emit(LiveInput::Transport(TransportSignal::Connecting)).await {
                return;
            }
            match self.connect_once().await {
                Ok(Closed::Shutdown) => return,
                Ok(Closed::Lost) => info!(url = %self.url, "Live channel closed"),
                Err(e) => warn!(url = %self.url, error = %e, "Live channel connect failed"),
            }
            if !self.emit(LiveInput::Transport(TransportSignal::Disconnected)).await {
                return;
            }
            if !self.wait_backoff().await {
                return;
            }
        }
    }

    async fn connect_once(&mut self) -> Result<Closed, RoomError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| RoomError::Config("AUTH_TOKEN is not a valid header value"))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws.split();
        info!(url = %self.url, "Live channel connected");
        if !self.emit(LiveInput::Transport(TransportSignal::Connected)).await {
            return Ok(Closed::Shutdown);
        }

        if let Some(game_id) = self.room.clone() {
            let frame = Outbound::Join { game_id }.to_frame()?;
            write.send(Message::Text(frame.into())).await?;
        }

        loop {
            tokio::select! {
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !self.emit(LiveInput::Frame(text.as_str().to_string())).await {
                            return Ok(Closed::Shutdown);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Server closed live channel");
                        return Ok(Closed::Lost);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Live channel read failed");
                        return Ok(Closed::Lost);
                    }
                    None => return Ok(Closed::Lost),
                },
                command = self.commands.recv() => {
                    let Some(out) = command else {
                        let _ = write.close().await;
                        return Ok(Closed::Shutdown);
                    };
                    self.track_room(&out);
                    let frame = out.to_frame()?;
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        warn!(error = %e, "Live channel write failed");
                        self.report_unsent(&out, e.to_string()).await;
                        return Ok(Closed::Lost);
                    }
                }
            }
        }
    }

    /// Sleep out the backoff while still accepting commands.
    async fn wait_backoff(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.backoff);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => {
                    let Some(out) = command else { return false };
                    self.track_room(&out);
                    self.report_unsent(&out, "live channel disconnected".to_string()).await;
                }
            }
        }
    }

    fn track_room(&mut self, out: &Outbound) {
        match out {
            Outbound::Join { game_id } => self.room = Some(game_id.clone()),
            Outbound::Leave { game_id } => {
                if self.room.as_deref() == Some(game_id.as_str()) {
                    self.room = None;
                }
            }
            Outbound::Move(_) => {}
        }
    }

    async fn report_unsent(&self, out: &Outbound, reason: String) {
        if let Outbound::Move(submission) = out {
            self.emit(LiveInput::SendFailed {
                game_id: submission.game_id.clone(),
                reason,
            })
            .await;
        }
    }

    async fn emit(&self, input: LiveInput) -> bool {
        self.inputs.send(input).await.is_ok()
    }
}
