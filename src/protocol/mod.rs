// src/protocol/mod.rs

//! Control messages between the orchestration client and the per-HTG
//! master, plus the framing used to carry them over TCP.
//!
//! One session per HTG run:
//!
//! ```text
//! client                         master
//!   | -- Hello { client, job } -->  |
//!   | <-- Welcome { client_id } --  |
//!   | -- Execute { "G1" } ------->  |
//!   | <-- Ack { "G1" } -----------  |
//!   |            ...                |
//!   | -- Goodbye ---------------->  |
//! ```

pub mod codec;

use serde::{Deserialize, Serialize};

use crate::metagraph::HtgJob;

pub use codec::FrameCodec;

/// Client id carried before the master has assigned one.
pub const UNASSIGNED_CLIENT_ID: u32 = 0;

/// Placement metadata for the node the client runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_ip: String,
    pub rack: Option<String>,
    pub data_center: Option<String>,
}

impl NodeInfo {
    pub fn new(node_ip: impl Into<String>, rack: Option<String>, data_center: Option<String>) -> Self {
        Self {
            node_ip: node_ip.into(),
            rack,
            data_center,
        }
    }
}

/// Identity of the orchestration client as seen by the master.
///
/// Values are never mutated in place: rebinding to a master-assigned id
/// produces a new value via [`ClientSessionInfo::with_client_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSessionInfo {
    client_id: u32,
    host: String,
    port: u16,
    node_info: Option<NodeInfo>,
}

impl ClientSessionInfo {
    pub fn new(
        client_id: u32,
        host: impl Into<String>,
        port: u16,
        node_info: Option<NodeInfo>,
    ) -> Self {
        Self {
            client_id,
            host: host.into(),
            port,
            node_info,
        }
    }

    /// Identity with the unassigned sentinel id.
    pub fn unassigned(host: impl Into<String>, port: u16, node_info: Option<NodeInfo>) -> Self {
        Self::new(UNASSIGNED_CLIENT_ID, host, port, node_info)
    }

    /// Copy of `self` bound to `client_id`; every other field carries over.
    pub fn with_client_id(&self, client_id: u32) -> Self {
        Self::new(client_id, self.host.clone(), self.port, self.node_info.clone())
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    pub fn is_assigned(&self) -> bool {
        self.client_id != UNASSIGNED_CLIENT_ID
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    pub fn node_info(&self) -> Option<&NodeInfo> {
        self.node_info.as_ref()
    }
}

/// Request to start executing one subgraph's already-submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub subgraph_name: String,
}

impl ExecuteRequest {
    pub fn new(subgraph_name: impl Into<String>) -> Self {
        Self {
            subgraph_name: subgraph_name.into(),
        }
    }
}

/// Client -> master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First frame of a session: who we are and which HTG we drive.
    Hello {
        client: ClientSessionInfo,
        job: HtgJob,
    },
    Execute(ExecuteRequest),
    /// Last frame of a session.
    Goodbye,
}

/// Master -> client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterMessage {
    Welcome { client_id: u32 },
    /// The named subgraph was accepted and handed to its workers.
    Ack { subgraph: String },
    /// A request (or, with `subgraph: None`, the whole session) was refused.
    Rejected {
        subgraph: Option<String>,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_copies_every_other_field() {
        let node = NodeInfo::new("htg.client.ip", Some("rack01".to_string()), None);
        let original = ClientSessionInfo::unassigned("127.0.0.1", 12345, Some(node.clone()));
        assert!(!original.is_assigned());

        let rebound = original.with_client_id(7);

        assert_eq!(rebound.client_id(), 7);
        assert!(rebound.is_assigned());
        assert_eq!(rebound.address(), ("127.0.0.1", 12345));
        assert_eq!(rebound.node_info(), Some(&node));
        // The original value is untouched.
        assert_eq!(original.client_id(), UNASSIGNED_CLIENT_ID);
    }
}
