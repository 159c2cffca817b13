//! Websocket connection handling.
//!
//! Each connection runs on its own task. The task owns the socket and the
//! connection's [`SubscriptionRegistry`], so no state is shared with other
//! connections beyond the broker pool and the path validator.
//!
//! The main loop races the next client frame against the next broker event
//! and acts on whichever arrives first. Both waits are cancel-safe, so the
//! losing side only loses its place in line, never a message.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{OriginalUri, State, WebSocketUpgrade};
use axum::response::Response;

use saladbar_proto::{decode_command, BrokerEvent, ChannelPath, Command, CommandError, ServerMessage};

use crate::error::Result;
use crate::registry::SubscriptionRegistry;
use crate::state::AppState;

/// Close code sent when the initial path is not a subscribable channel.
pub const INVALID_PATH_CLOSE_CODE: u16 = 4000;
const INVALID_PATH_CLOSE_REASON: &str = "Invalid path.";

/// Close code sent when no subscriber handle is free.
pub const TRY_AGAIN_CLOSE_CODE: u16 = 1013;
const TRY_AGAIN_CLOSE_REASON: &str = "Try again later.";

/// Close code sent when the broker fails mid-connection.
pub const INTERNAL_ERROR_CLOSE_CODE: u16 = 1011;
const INTERNAL_ERROR_CLOSE_REASON: &str = "Internal error.";

/// How long to wait for the client to acknowledge a close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Websocket upgrade handler. The request path is the connection's initial
/// channel.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let path = uri.path().to_string();
    ws.on_upgrade(move |socket| handle_socket(socket, state, path))
}

/// What one loop iteration produced.
enum Step {
    Frame(Option<std::result::Result<Message, axum::Error>>),
    Event(Result<BrokerEvent>),
}

/// Whether the loop keeps going after a step.
enum Flow {
    Continue,
    Stop,
    Fault,
}

async fn handle_socket(mut socket: WebSocket, state: AppState, raw_path: String) {
    let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    let initial = ChannelPath::parse(&raw_path);

    if let Some(channel) = &initial {
        if !channel.has_api_prefix() {
            tracing::info!(connection_id, path = %raw_path, "rejecting connection with invalid path");
            close(&mut socket, INVALID_PATH_CLOSE_CODE, INVALID_PATH_CLOSE_REASON).await;
            return;
        }
    }

    let subscriber = match state.broker.acquire_subscriber().await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            tracing::warn!(connection_id, error = %e, "no subscriber handle available");
            close(&mut socket, TRY_AGAIN_CLOSE_CODE, TRY_AGAIN_CLOSE_REASON).await;
            return;
        }
    };

    tracing::info!(connection_id, path = %raw_path, "connection opened");

    let mut handler = ConnectionHandler {
        connection_id,
        state,
        registry: SubscriptionRegistry::new(subscriber),
    };

    let flow = match initial {
        Some(channel) => {
            let command = Command::Subscribe {
                path: channel.into_string(),
            };
            handler.execute(&mut socket, command).await
        }
        None => Flow::Continue,
    };

    let flow = match flow {
        Flow::Continue => handler.run(&mut socket).await,
        other => other,
    };

    if let Flow::Fault = flow {
        close(&mut socket, INTERNAL_ERROR_CLOSE_CODE, INTERNAL_ERROR_CLOSE_REASON).await;
    }

    let released = handler.registry.clear();
    tracing::info!(connection_id, released, "connection closed");
}

/// One client connection.
struct ConnectionHandler {
    connection_id: u64,
    state: AppState,
    registry: SubscriptionRegistry,
}

impl ConnectionHandler {
    async fn run(&mut self, socket: &mut WebSocket) -> Flow {
        let poll_interval = self.state.config.poll_interval;

        loop {
            let step = tokio::select! {
                frame = socket.recv() => Step::Frame(frame),
                event = self.registry.next_event(poll_interval) => Step::Event(event),
            };

            let flow = match step {
                Step::Frame(frame) => self.consume(socket, frame).await,
                Step::Event(event) => self.produce(socket, event).await,
            };

            match flow {
                Flow::Continue => continue,
                other => return other,
            }
        }
    }

    /// Handle one inbound frame.
    async fn consume(
        &mut self,
        socket: &mut WebSocket,
        frame: Option<std::result::Result<Message, axum::Error>>,
    ) -> Flow {
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(_))) => {
                return self.send(socket, ServerMessage::error(CommandError::NotJson)).await;
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => return Flow::Continue,
            Some(Ok(Message::Close(_))) | None => return Flow::Stop,
            Some(Err(e)) => {
                tracing::debug!(connection_id = self.connection_id, error = %e, "websocket receive failed");
                return Flow::Stop;
            }
        };

        match decode_command(&text) {
            Ok(command) => self.execute(socket, command).await,
            Err(e) => {
                tracing::debug!(connection_id = self.connection_id, error = %e, "rejected frame");
                self.send(socket, ServerMessage::error(e)).await
            }
        }
    }

    /// Run a decoded command and send its reply, if it has one.
    ///
    /// Successful (un)subscriptions are confirmed by the broker event that
    /// follows, not by a direct reply.
    async fn execute(&mut self, socket: &mut WebSocket, command: Command) -> Flow {
        tracing::debug!(
            connection_id = self.connection_id,
            function = command.kind().name(),
            path = command.path().unwrap_or_default(),
            "command"
        );

        let outcome = match &command {
            Command::Ls => Ok(Some(ServerMessage::listing(self.registry.list()))),
            Command::Subscribe { path } => self
                .registry
                .subscribe(path, &self.state.validator)
                .await
                .map(|_| None),
            Command::Unsubscribe { path } => self.registry.unsubscribe(path).map(|_| None),
        };

        match outcome {
            Ok(Some(reply)) => self.send(socket, reply).await,
            Ok(None) => Flow::Continue,
            Err(e) => self.send(socket, ServerMessage::error(e)).await,
        }
    }

    /// Forward one broker event.
    async fn produce(&mut self, socket: &mut WebSocket, event: Result<BrokerEvent>) -> Flow {
        match event {
            Ok(event) => {
                tracing::debug!(
                    connection_id = self.connection_id,
                    channel = %event.channel,
                    function = event.kind.as_str(),
                    "forwarding event"
                );
                self.send(socket, ServerMessage::from(event)).await
            }
            Err(e) => {
                tracing::error!(connection_id = self.connection_id, error = %e, "broker receive failed");
                Flow::Fault
            }
        }
    }

    async fn send(&self, socket: &mut WebSocket, message: ServerMessage) -> Flow {
        match socket.send(Message::Text(message.to_json())).await {
            Ok(()) => Flow::Continue,
            Err(e) => {
                tracing::debug!(connection_id = self.connection_id, error = %e, "websocket send failed");
                Flow::Stop
            }
        }
    }
}

/// Send a close frame and give the client a moment to answer it.
async fn close(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    };
    if socket.send(Message::Close(Some(frame))).await.is_err() {
        return;
    }

    let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
        while let Some(Ok(_)) = socket.recv().await {}
    })
    .await;
}
