//! # Topology Graph
//!
//! Nodes are workloads identified by their context ID and IP address. Links are
//! observed flows between two known nodes. A [`GraphSnapshot`] is the complete
//! graph produced by one refresh cycle and is never mutated once published.

mod builder;

pub use builder::GraphBuilder;

use crate::events::{FlowAction, Timestamp};
use serde::{Deserialize, Serialize};

/// A workload in the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "time")]
    pub observed_at: Timestamp,
    #[serde(rename = "id")]
    pub context_id: String,
    #[serde(rename = "name")]
    pub pod_name: String,
    #[serde(rename = "ipaddress")]
    pub ip_address: String,
    pub namespace: String,
}

impl Node {
    pub fn identity(&self) -> String {
        identity_hash(&self.context_id, &self.ip_address)
    }
}

/// An observed flow between two nodes. Endpoints are context IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "time")]
    pub observed_at: Timestamp,
    pub source: String,
    pub target: String,
    pub action: FlowAction,
    pub namespace: String,
}

/// The complete graph as of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl GraphSnapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

/// Identity of a workload endpoint.
pub fn identity_hash(context_id: &str, ip_address: &str) -> String {
    format!("{context_id}:{ip_address}")
}

/// Identity of a link: the source and destination identity hashes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkKey(pub String, pub String);

impl LinkKey {
    pub fn new(source_hash: String, destination_hash: String) -> Self {
        Self(source_hash, destination_hash)
    }
}
