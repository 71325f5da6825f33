// src/client/session.rs

//! Background session task owning the TCP connection to the master.
//!
//! The orchestration loop never touches the socket or the session identity
//! directly. It sends [`SessionCommand`]s and waits on the oneshot reply;
//! the task publishes identity changes through a `watch` channel.

use std::collections::{HashMap, HashSet};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::errors::SessionError;
use crate::protocol::{ClientMessage, ClientSessionInfo, ExecuteRequest, FrameCodec, MasterMessage};

pub(crate) type ClientFramed = Framed<TcpStream, FrameCodec<MasterMessage, ClientMessage>>;

type Reply = oneshot::Sender<Result<(), SessionError>>;

/// Requests from the client handle to the session task.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Write an execute request; reply once the frame is flushed.
    Execute { request: ExecuteRequest, reply: Reply },
    /// Reply once the master has acknowledged (or rejected) `subgraph`.
    AwaitAck { subgraph: String, reply: Reply },
    /// Say goodbye and end the session.
    Close { reply: oneshot::Sender<()> },
}

pub(crate) struct SessionTask {
    framed: ClientFramed,
    commands: mpsc::Receiver<SessionCommand>,
    info_tx: watch::Sender<ClientSessionInfo>,
    /// Acks that arrived before anyone waited for them.
    acked: HashSet<String>,
    /// Rejections that arrived before anyone waited for them.
    rejected: HashMap<String, String>,
    waiters: HashMap<String, Reply>,
}

impl SessionTask {
    pub(crate) fn new(
        framed: ClientFramed,
        commands: mpsc::Receiver<SessionCommand>,
        info_tx: watch::Sender<ClientSessionInfo>,
    ) -> Self {
        Self {
            framed,
            commands,
            info_tx,
            acked: HashSet::new(),
            rejected: HashMap::new(),
            waiters: HashMap::new(),
        }
    }

    /// Drive the session until it is closed, the handle goes away, or the
    /// connection fails. `alive` fires as soon as the loop is running.
    pub(crate) async fn run(mut self, alive: oneshot::Sender<()>) {
        let _ = alive.send(());
        debug!("htg client session started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Execute { request, reply }) => {
                        if !self.write_execute(request, reply).await {
                            break;
                        }
                    }
                    Some(SessionCommand::AwaitAck { subgraph, reply }) => {
                        self.register_waiter(subgraph, reply);
                    }
                    Some(SessionCommand::Close { reply }) => {
                        self.say_goodbye().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        debug!("client handle dropped; ending session");
                        break;
                    }
                },
                frame = self.framed.next() => match frame {
                    Some(Ok(msg)) => {
                        if !self.handle_master_message(msg) {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "failed to read from master; ending session");
                        break;
                    }
                    None => {
                        info!("master closed the session");
                        break;
                    }
                },
            }
        }

        for (subgraph, reply) in self.waiters.drain() {
            debug!(subgraph = %subgraph, "session ended while waiting for ack");
            let _ = reply.send(Err(SessionError::Closed));
        }
        debug!("htg client session finished");
    }

    /// Returns `false` if the session cannot continue.
    async fn write_execute(&mut self, request: ExecuteRequest, reply: Reply) -> bool {
        let subgraph = request.subgraph_name.clone();
        match self.framed.send(ClientMessage::Execute(request)).await {
            Ok(()) => {
                debug!(subgraph = %subgraph, "execute request flushed to master");
                let _ = reply.send(Ok(()));
                true
            }
            Err(e) => {
                warn!(subgraph = %subgraph, error = %e, "writing execute request failed");
                let _ = reply.send(Err(SessionError::Write(e.to_string())));
                false
            }
        }
    }

    fn register_waiter(&mut self, subgraph: String, reply: Reply) {
        if self.acked.remove(&subgraph) {
            let _ = reply.send(Ok(()));
        } else if let Some(reason) = self.rejected.remove(&subgraph) {
            let _ = reply.send(Err(SessionError::Rejected { subgraph, reason }));
        } else {
            self.waiters.insert(subgraph, reply);
        }
    }

    /// Returns `false` if the master refused the whole session.
    fn handle_master_message(&mut self, msg: MasterMessage) -> bool {
        match msg {
            MasterMessage::Welcome { client_id } => {
                let rebound = self.info_tx.borrow().with_client_id(client_id);
                info!(client_id, "master assigned client id");
                self.info_tx.send_replace(rebound);
                true
            }
            MasterMessage::Ack { subgraph } => {
                debug!(subgraph = %subgraph, "master acknowledged subgraph");
                match self.waiters.remove(&subgraph) {
                    Some(reply) => {
                        let _ = reply.send(Ok(()));
                    }
                    None => {
                        self.acked.insert(subgraph);
                    }
                }
                true
            }
            MasterMessage::Rejected {
                subgraph: Some(subgraph),
                reason,
            } => {
                warn!(subgraph = %subgraph, reason = %reason, "master rejected subgraph");
                match self.waiters.remove(&subgraph) {
                    Some(reply) => {
                        let _ = reply.send(Err(SessionError::Rejected { subgraph, reason }));
                    }
                    None => {
                        self.rejected.insert(subgraph, reason);
                    }
                }
                true
            }
            MasterMessage::Rejected {
                subgraph: None,
                reason,
            } => {
                warn!(reason = %reason, "master refused the session");
                for (subgraph, reply) in self.waiters.drain() {
                    let _ = reply.send(Err(SessionError::Rejected {
                        subgraph,
                        reason: reason.clone(),
                    }));
                }
                false
            }
        }
    }

    async fn say_goodbye(&mut self) {
        if let Err(e) = self.framed.send(ClientMessage::Goodbye).await {
            debug!(error = %e, "could not send goodbye; master already gone");
            return;
        }
        if let Err(e) = self.framed.close().await {
            debug!(error = %e, "error shutting down session socket");
        }
    }
}
