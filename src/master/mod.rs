// src/master/mod.rs

//! Per-HTG master endpoint.
//!
//! Accepts the single orchestration client session of one HTG run, assigns
//! the client its id, and acknowledges each execute request after handing
//! it on as a [`MasterEvent`]. What happens to a requested subgraph after
//! that (worker scheduling) belongs to whoever consumes the events.
//!
//! Connections arriving while a session is active are refused with a
//! session-level `Rejected`. `serve` returns once the session has ended.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::protocol::{ClientMessage, ClientSessionInfo, FrameCodec, MasterMessage};

type MasterFramed = Framed<TcpStream, FrameCodec<ClientMessage, MasterMessage>>;

/// Id handed to the (only) client of a run.
pub const FIRST_CLIENT_ID: u32 = 1;

/// What the master observed on its session.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterEvent {
    ClientConnected {
        client: ClientSessionInfo,
        job_name: String,
    },
    /// The named subgraph should start executing.
    ExecuteRequested { subgraph: String },
    /// The client said goodbye.
    ClientClosed { client_id: u32 },
    /// The connection dropped without a goodbye.
    ClientDisconnected { client_id: u32 },
}

#[derive(Debug)]
pub struct MasterServer {
    listener: TcpListener,
}

impl MasterServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "htg master listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve one HTG run. Call again on the same server to accept the next
    /// run's client.
    pub async fn serve(
        &self,
        events: mpsc::Sender<MasterEvent>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut session: Option<tokio::task::JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("htg master shutting down");
                    if let Some(handle) = session.take() {
                        handle.abort();
                    }
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    if session.is_some() {
                        tokio::spawn(refuse(stream, peer));
                        continue;
                    }
                    debug!(%peer, "accepted htg client connection");
                    let events = events.clone();
                    session = Some(tokio::spawn(async move {
                        run_session(Framed::new(stream, FrameCodec::new()), events).await;
                    }));
                }
                _ = async {
                    match session.as_mut() {
                        Some(handle) => { let _ = handle.await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    info!("htg client session ended; master done");
                    return Ok(());
                }
            }
        }
    }
}

async fn refuse(stream: TcpStream, peer: SocketAddr) {
    warn!(%peer, "refusing second htg client while a session is active");
    let mut framed: MasterFramed = Framed::new(stream, FrameCodec::new());
    let _ = framed
        .send(MasterMessage::Rejected {
            subgraph: None,
            reason: "master already serves a client for this HTG run".to_string(),
        })
        .await;
}

async fn run_session(mut framed: MasterFramed, events: mpsc::Sender<MasterEvent>) {
    let (client, job) = match framed.next().await {
        Some(Ok(ClientMessage::Hello { client, job })) => (client, job),
        Some(Ok(other)) => {
            warn!(?other, "first frame was not a hello; dropping session");
            let _ = framed
                .send(MasterMessage::Rejected {
                    subgraph: None,
                    reason: "expected hello".to_string(),
                })
                .await;
            return;
        }
        Some(Err(e)) => {
            warn!(error = %e, "failed to read hello");
            return;
        }
        None => return,
    };

    let client = client.with_client_id(FIRST_CLIENT_ID);
    let client_id = client.client_id();
    if framed
        .send(MasterMessage::Welcome { client_id })
        .await
        .is_err()
    {
        return;
    }
    info!(client_id, job = %job.job_name, subgraphs = job.subgraphs.len(), "htg client registered");
    emit(
        &events,
        MasterEvent::ClientConnected {
            client,
            job_name: job.job_name.clone(),
        },
    )
    .await;

    while let Some(frame) = framed.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                warn!(client_id, error = %e, "bad frame from htg client");
                break;
            }
        };

        match msg {
            ClientMessage::Execute(request) => {
                let subgraph = request.subgraph_name;
                let reply = if job.has_subgraph(&subgraph) {
                    info!(client_id, subgraph = %subgraph, "execute request accepted");
                    emit(
                        &events,
                        MasterEvent::ExecuteRequested {
                            subgraph: subgraph.clone(),
                        },
                    )
                    .await;
                    MasterMessage::Ack { subgraph }
                } else {
                    warn!(client_id, subgraph = %subgraph, "execute request for unknown subgraph");
                    MasterMessage::Rejected {
                        reason: format!("subgraph '{subgraph}' is not part of job '{}'", job.job_name),
                        subgraph: Some(subgraph),
                    }
                };
                if framed.send(reply).await.is_err() {
                    break;
                }
            }
            ClientMessage::Hello { .. } => {
                warn!(client_id, "duplicate hello ignored");
            }
            ClientMessage::Goodbye => {
                info!(client_id, "htg client said goodbye");
                emit(&events, MasterEvent::ClientClosed { client_id }).await;
                return;
            }
        }
    }

    emit(&events, MasterEvent::ClientDisconnected { client_id }).await;
}

async fn emit(events: &mpsc::Sender<MasterEvent>, event: MasterEvent) {
    if events.send(event).await.is_err() {
        debug!("master event receiver dropped");
    }
}
