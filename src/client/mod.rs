// src/client/mod.rs

//! Orchestration client: the long-lived session to a per-HTG master.
//!
//! States:
//!
//! ```text
//! Unconnected --start--> Connected --send--> Sending --send--> Sending ...
//!      |                     |                  |
//!      +---------------------+------------------+--close--> Closed
//! any state --I/O failure--> Failed
//! ```
//!
//! The socket lives in a background Tokio task ([`session`]); the client
//! handle only exchanges commands and replies with it, so the orchestration
//! loop blocks on acknowledgements without ever blocking the session.

pub mod pacing;
mod session;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{HtgError, Result, SessionError};
use crate::metagraph::HtgJob;
use crate::protocol::{ClientMessage, ClientSessionInfo, ExecuteRequest, FrameCodec, NodeInfo};

pub use pacing::PacingPolicy;
use session::{ClientFramed, SessionCommand, SessionTask};

/// Default bound on connecting to the master.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of an [`OrchestrationClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Sending,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Connected => "connected",
            SessionState::Sending => "sending",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Connection and pacing settings for the client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub pacing: PacingPolicy,
    /// Placement metadata announced to the master.
    pub node_info: Option<NodeInfo>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pacing: PacingPolicy::default(),
            node_info: Some(NodeInfo::new(
                "htg.client.ip",
                Some("rack01".to_string()),
                None,
            )),
        }
    }
}

/// Read-only view of a running session, returned by
/// [`OrchestrationClient::start`].
#[derive(Debug, Clone)]
pub struct SessionView {
    endpoint: String,
    info_rx: watch::Receiver<ClientSessionInfo>,
}

impl SessionView {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current identity; reflects the master-assigned id once welcomed.
    pub fn client_info(&self) -> ClientSessionInfo {
        self.info_rx.borrow().clone()
    }
}

struct ActiveSession {
    commands: mpsc::Sender<SessionCommand>,
    view: SessionView,
    task: JoinHandle<()>,
}

/// Client driving one HTG run's execute requests to its master.
pub struct OrchestrationClient {
    job: HtgJob,
    options: ClientOptions,
    state: SessionState,
    session: Option<ActiveSession>,
}

impl fmt::Debug for OrchestrationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestrationClient")
            .field("job", &self.job.job_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl OrchestrationClient {
    pub fn new(job: HtgJob, options: ClientOptions) -> Self {
        Self {
            job,
            options,
            state: SessionState::Unconnected,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Current session identity, if a session was started.
    pub fn client_info(&self) -> Option<ClientSessionInfo> {
        self.session.as_ref().map(|s| s.view.client_info())
    }

    /// Connect to the master at `endpoint`, announce this client and its
    /// HTG, and hand the connection to a background session task.
    ///
    /// Returns once the session task is running; the master's `Welcome` may
    /// still be in flight.
    pub async fn start(&mut self, endpoint: &str) -> std::result::Result<SessionView, SessionError> {
        if self.state != SessionState::Unconnected {
            return Err(SessionError::Connect {
                endpoint: endpoint.to_string(),
                reason: format!("client already started (state: {})", self.state),
            });
        }

        match self.open_session(endpoint).await {
            Ok(view) => {
                self.state = SessionState::Connected;
                info!(endpoint, job = %self.job.job_name, "htg client connected to master");
                Ok(view)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                warn!(endpoint, error = %e, "htg client failed to connect");
                Err(e)
            }
        }
    }

    async fn open_session(&mut self, endpoint: &str) -> std::result::Result<SessionView, SessionError> {
        let timeout = self.options.connect_timeout;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| SessionError::ConnectTimeout {
                endpoint: endpoint.to_string(),
                millis: timeout.as_millis() as u64,
            })?
            .map_err(|e| SessionError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let identity = self.generate_identity(stream.local_addr().ok());
        debug!(?identity, "generated htg client identity");

        let mut framed: ClientFramed = Framed::new(stream, FrameCodec::new());
        framed
            .send(ClientMessage::Hello {
                client: identity.clone(),
                job: self.job.clone(),
            })
            .await
            .map_err(|e| SessionError::Connect {
                endpoint: endpoint.to_string(),
                reason: format!("sending hello: {e}"),
            })?;

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (info_tx, info_rx) = watch::channel(identity);
        let (alive_tx, alive_rx) = oneshot::channel();

        let task = tokio::spawn(SessionTask::new(framed, cmd_rx, info_tx).run(alive_tx));

        alive_rx.await.map_err(|_| SessionError::Connect {
            endpoint: endpoint.to_string(),
            reason: "session task exited before starting".to_string(),
        })?;

        let view = SessionView {
            endpoint: endpoint.to_string(),
            info_rx,
        };
        self.session = Some(ActiveSession {
            commands: cmd_tx,
            view: view.clone(),
            task,
        });
        Ok(view)
    }

    /// Identity with the unassigned sentinel id. The address is the local
    /// end of the connection; a random port in `10000..20000` stands in if
    /// the socket cannot report it.
    fn generate_identity(&self, local: Option<SocketAddr>) -> ClientSessionInfo {
        let (host, port) = match local {
            Some(addr) => (addr.ip().to_string(), addr.port()),
            None => (
                "127.0.0.1".to_string(),
                rand::rng().random_range(10000..20000),
            ),
        };
        ClientSessionInfo::unassigned(host, port, self.options.node_info.clone())
    }

    /// Send an execute request for `subgraph_name` and wait until the
    /// transport has flushed it. Does not wait for the master to act on it.
    pub async fn send_execute_request(
        &mut self,
        subgraph_name: &str,
    ) -> std::result::Result<(), SessionError> {
        let commands = self.sending_channel()?;
        self.state = SessionState::Sending;

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = commands
            .send(SessionCommand::Execute {
                request: ExecuteRequest::new(subgraph_name),
                reply: reply_tx,
            })
            .await;

        let result = match sent {
            Ok(()) => reply_rx.await.unwrap_or(Err(SessionError::Closed)),
            Err(_) => Err(SessionError::Closed),
        };

        if result.is_err() {
            self.state = SessionState::Failed;
        } else {
            info!(subgraph = %subgraph_name, "execute request sent");
        }
        result
    }

    /// Wait between two execute requests according to the pacing policy.
    ///
    /// `last_subgraph` is the subgraph whose request was just sent. A fired
    /// `cancel` token ends the wait with [`HtgError::Cancelled`].
    pub async fn pace(&mut self, last_subgraph: &str, cancel: &CancellationToken) -> Result<()> {
        let commands = self.sending_channel()?;

        match self.options.pacing {
            PacingPolicy::MasterAck { timeout } => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if commands
                    .send(SessionCommand::AwaitAck {
                        subgraph: last_subgraph.to_string(),
                        reply: reply_tx,
                    })
                    .await
                    .is_err()
                {
                    self.state = SessionState::Failed;
                    return Err(SessionError::Closed.into());
                }

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return Err(HtgError::Cancelled),
                    res = tokio::time::timeout(timeout, reply_rx) => res,
                };

                let result = match outcome {
                    Err(_) => Err(SessionError::AckTimeout {
                        subgraph: last_subgraph.to_string(),
                        millis: timeout.as_millis() as u64,
                    }),
                    Ok(Err(_)) => Err(SessionError::Closed),
                    Ok(Ok(res)) => res,
                };
                if result.is_err() {
                    self.state = SessionState::Failed;
                }
                result.map_err(HtgError::from)
            }
            PacingPolicy::RandomDelay { ceiling } => {
                let delay = PacingPolicy::random_delay(ceiling);
                info!(delay_ms = delay.as_millis() as u64, "pacing before next request");
                tokio::select! {
                    _ = cancel.cancelled() => Err(HtgError::Cancelled),
                    _ = tokio::time::sleep(delay) => Ok(()),
                }
            }
        }
    }

    /// Close the session and release the connection. Idempotent.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            debug!("htg client already closed");
            return;
        }

        if let Some(session) = self.session.take() {
            let (reply_tx, reply_rx) = oneshot::channel();
            if session
                .commands
                .send(SessionCommand::Close { reply: reply_tx })
                .await
                .is_ok()
            {
                let _ = reply_rx.await;
            }
            drop(session.commands);
            if let Err(e) = session.task.await {
                warn!(error = %e, "htg client session task ended abnormally");
            }
        }

        self.state = SessionState::Closed;
        info!(job = %self.job.job_name, "htg client closed");
    }

    fn sending_channel(&self) -> std::result::Result<mpsc::Sender<SessionCommand>, SessionError> {
        match (self.state, self.session.as_ref()) {
            (SessionState::Connected | SessionState::Sending, Some(session)) => {
                Ok(session.commands.clone())
            }
            (state, _) => Err(SessionError::NotConnected {
                state: state.to_string(),
            }),
        }
    }
}

impl Drop for OrchestrationClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}
