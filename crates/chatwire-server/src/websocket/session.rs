//! Per-connection relay state machine.
//!
//! ```text
//! Connecting ──start ok──▶ Active ──first relay ends──▶ Draining ──▶ Closed
//!      └──────────start failed──────────────────────────▲
//! ```
//!
//! `Active` runs two relay tasks: agent→client forwards runtime events as
//! frames, client→agent forwards socket text to the runtime's request queue.
//! Whichever finishes first ends `Active`; the other is cancelled through a
//! shared token and awaited for at most `cancel_timeout`. Both tasks run
//! inside the session's ambient scope, so tool code they drive can resolve
//! the session without an explicit id.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use chatwire_core::{ConnectionId, SessionId, scoped_session, spawn_in_session};
use chatwire_runtime::{AgentEventStream, AgentRuntime, AgentSession, LiveRequestQueue, RunConfig, UserContent};
use futures::{Sink, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use super::connection::{ConnectionHandle, LinkState, spawn_writer};
use super::frames::{LogLevel, OutboundFrame};
use super::registry::SessionRegistry;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::metrics::{
    AGENT_FRAMES_TOTAL, RELAY_CANCEL_TIMEOUTS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Lifecycle state of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake accepted, agent session starting.
    Connecting,
    /// Both relays running.
    Active,
    /// Relays stopped, resources being released.
    Draining,
    /// Terminal.
    Closed,
}

/// One relay direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Runtime events to the socket.
    AgentToClient,
    /// Socket text to the runtime.
    ClientToAgent,
}

/// Why a relay task stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayExit {
    /// The agent event stream ended.
    Finished,
    /// The client went away or the socket failed.
    Disconnected,
    /// The sibling finished first.
    Cancelled,
    /// Runtime fault or task panic.
    Failed(String),
}

/// What a finished session went through.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    /// Connection that served the session.
    pub connection_id: ConnectionId,
    /// Every state entered, in order.
    pub states: Vec<SessionState>,
    /// The relay that ended `Active`, if it was reached.
    pub first_exit: Option<(Direction, RelayExit)>,
}

/// Shared services a session needs.
#[derive(Clone)]
pub struct SessionDeps {
    /// Session → connection map.
    pub registry: Arc<SessionRegistry>,
    /// Agent backend.
    pub runtime: Arc<dyn AgentRuntime>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

/// Owns one client connection from upgrade to close.
pub struct ConnectionSession {
    session_id: SessionId,
    deps: SessionDeps,
    state: SessionState,
    history: Vec<SessionState>,
}

impl ConnectionSession {
    /// Create a session in `Connecting`.
    pub fn new(session_id: SessionId, deps: SessionDeps) -> Self {
        Self {
            session_id,
            deps,
            state: SessionState::Connecting,
            history: vec![SessionState::Connecting],
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session over an upgraded socket.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn serve(self, socket: WebSocket) -> SessionSummary {
        let (sink, stream) = socket.split();
        self.run(sink, stream).await
    }

    /// Run the session over any message sink/stream pair.
    pub async fn run<Tx, Rx, E>(mut self, sink: Tx, mut inbound: Rx) -> SessionSummary
    where
        Tx: Sink<Message> + Unpin + Send + 'static,
        Tx::Error: Display + Send,
        Rx: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let started_at = Instant::now();
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let config = Arc::clone(&self.deps.config);
        let (tx, rx) = mpsc::channel(config.outbound_queue_capacity);
        let handle = Arc::new(ConnectionHandle::new(self.session_id.clone(), tx));
        let mut writer = spawn_writer(sink, rx, handle.link(), config.ping_interval, config.pong_timeout);
        let _ = self.deps.registry.register(self.session_id.clone(), Arc::clone(&handle));
        info!(connection_id = %handle.id(), "client connected");
        self.server_log(&handle, LogLevel::Info, "Client connected");

        // The client may leave while the runtime is still starting; text it
        // sends meanwhile is held and forwarded once the session is up.
        let link = handle.link();
        let mut early = Vec::new();
        let started = tokio::select! {
            started = scoped_session(
                self.session_id.clone(),
                self.deps.runtime.start_session(&config.app_name, &self.session_id, RunConfig::default()),
            ) => Some(started),
            () = watch_while_connecting(&mut inbound, &mut early, &link) => None,
        };

        let mut first_exit = None;
        let mut requests = None;
        match started {
            Some(Ok(agent)) => {
                info!("agent session started");
                self.server_log(&handle, LogLevel::Info, "Agent session started");
                self.transition(SessionState::Active);
                for text in early {
                    if let Err(error) = agent.requests.send_content(UserContent::user_text(text)) {
                        warn!(%error, "dropping message sent before the agent started");
                    }
                }
                requests = Some(agent.requests.clone());
                first_exit = Some(self.relay(agent, inbound, &handle).await);
            }
            Some(Err(error)) => {
                error!(%error, "agent session failed to start");
                self.server_log(&handle, LogLevel::Error, &format!("Agent session failed to start: {error}"));
            }
            None => info!("client left before the agent session started"),
        }

        self.transition(SessionState::Draining);
        if let Some(requests) = requests {
            requests.close();
        }
        let released = self.deps.registry.release(&self.session_id, handle.id());
        if !released {
            debug!("registry entry already replaced by a newer connection");
        }

        self.transition(SessionState::Closed);
        if handle.is_connected() {
            handle.close();
        }
        let connection_id = handle.id().clone();
        drop(handle);
        if tokio::time::timeout(config.cancel_timeout, &mut writer).await.is_err() {
            debug!("socket writer still busy, aborting");
            writer.abort();
        }

        info!(connection_id = %connection_id, "client disconnected");
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(started_at.elapsed().as_secs_f64());

        SessionSummary {
            connection_id,
            states: self.history,
            first_exit,
        }
    }

    async fn relay<Rx, E>(
        &self,
        agent: AgentSession,
        inbound: Rx,
        handle: &Arc<ConnectionHandle>,
    ) -> (Direction, RelayExit)
    where
        Rx: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let AgentSession { events, requests } = agent;

        let mut outbound = spawn_in_session(
            self.session_id.clone(),
            agent_to_client(events, Arc::clone(handle), cancel.clone()).in_current_span(),
        );
        let mut from_client = spawn_in_session(
            self.session_id.clone(),
            client_to_agent(inbound, requests, handle.link(), cancel.clone()).in_current_span(),
        );

        let (direction, result) = tokio::select! {
            result = &mut outbound => (Direction::AgentToClient, result),
            result = &mut from_client => (Direction::ClientToAgent, result),
        };
        let sibling = match direction {
            Direction::AgentToClient => from_client,
            Direction::ClientToAgent => outbound,
        };

        let exit = join_exit(result);
        match &exit {
            RelayExit::Failed(reason) => {
                error!(?direction, reason = %reason, "relay failed");
                self.server_log(handle, LogLevel::Error, &format!("Relay failed: {reason}"));
            }
            other => info!(?direction, exit = ?other, "relay ended"),
        }

        let sibling_exit = cancel_with_timeout(sibling, &cancel, self.deps.config.cancel_timeout).await;
        debug!(exit = ?sibling_exit.map(join_exit), "sibling relay stopped");
        (direction, exit)
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
        self.history.push(next);
    }

    fn server_log(&self, handle: &ConnectionHandle, level: LogLevel, message: &str) {
        if !self.deps.config.forward_server_logs {
            return;
        }
        let frame = OutboundFrame::ServerLog {
            level,
            message: format!("[{}] {message}", self.session_id),
        };
        let _ = handle.try_send_frame(&frame);
    }
}

/// Cancel `token` and wait up to `limit` for `task` to finish.
///
/// Returns `None` when the task did not finish in time; it is then aborted
/// and left behind.
pub async fn cancel_with_timeout<T>(
    mut task: JoinHandle<T>,
    token: &CancellationToken,
    limit: Duration,
) -> Option<Result<T, JoinError>> {
    token.cancel();
    if let Ok(result) = tokio::time::timeout(limit, &mut task).await {
        Some(result)
    } else {
        warn!(timeout = ?limit, "relay task ignored cancellation, abandoning");
        counter!(RELAY_CANCEL_TIMEOUTS_TOTAL).increment(1);
        task.abort();
        None
    }
}

fn join_exit(result: Result<RelayExit, JoinError>) -> RelayExit {
    result.unwrap_or_else(|error| RelayExit::Failed(format!("relay task failed: {error}")))
}

async fn agent_to_client(
    mut events: AgentEventStream,
    handle: Arc<ConnectionHandle>,
    cancel: CancellationToken,
) -> RelayExit {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return RelayExit::Cancelled,
            next = events.next() => next,
        };
        let event = match next {
            None => return RelayExit::Finished,
            Some(Ok(event)) => event,
            Some(Err(error)) => return RelayExit::Failed(error.to_string()),
        };
        let kind = event.kind();
        let frame = OutboundFrame::from(event);
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return RelayExit::Cancelled,
            sent = handle.send_frame(&frame) => sent,
        };
        match sent {
            Ok(()) => counter!(AGENT_FRAMES_TOTAL, "kind" => kind).increment(1),
            Err(ServerError::ConnectionClosed) => return RelayExit::Disconnected,
            Err(error) => return RelayExit::Failed(error.to_string()),
        }
    }
}

async fn client_to_agent<Rx, E>(
    mut inbound: Rx,
    requests: LiveRequestQueue,
    link: Arc<LinkState>,
    cancel: CancellationToken,
) -> RelayExit
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let exit = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break RelayExit::Cancelled,
            () = link.closed() => break RelayExit::Disconnected,
            next = inbound.next() => next,
        };
        let message = match next {
            None => break RelayExit::Disconnected,
            Some(Err(error)) => {
                debug!(%error, "socket read failed");
                break RelayExit::Disconnected;
            }
            Some(Ok(message)) => message,
        };
        link.mark_seen();

        if matches!(message, Message::Close(_)) {
            debug!("client sent close frame");
            break RelayExit::Disconnected;
        }
        let Some(text) = user_text(message) else {
            continue;
        };

        debug!(len = text.len(), "client message");
        if let Err(error) = requests.send_content(UserContent::user_text(text)) {
            break RelayExit::Failed(error.to_string());
        }
    };
    if exit != RelayExit::Cancelled {
        requests.close();
    }
    exit
}

/// Read the socket while the agent session is starting. Returns once the
/// client is gone; text frames are collected into `early`.
async fn watch_while_connecting<Rx, E>(inbound: &mut Rx, early: &mut Vec<String>, link: &LinkState)
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            () = link.closed() => return,
            next = inbound.next() => next,
        };
        match next {
            None | Some(Ok(Message::Close(_))) => return,
            Some(Err(error)) => {
                debug!(%error, "socket read failed while connecting");
                return;
            }
            Some(Ok(message)) => {
                link.mark_seen();
                if let Some(text) = user_text(message) {
                    early.push(text);
                }
            }
        }
    }
}

/// Chat text carried by a data frame. Control frames and non-UTF8 binary
/// frames carry none.
fn user_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_owned()),
        Message::Binary(data) => {
            let text = std::str::from_utf8(&data).ok().map(str::to_owned);
            if text.is_none() {
                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
            }
            text
        }
        Message::Close(_) | Message::Ping(_) | Message::Pong(_) => None,
    }
}
