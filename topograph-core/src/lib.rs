//! # Topograph Core
//!
//! Graph construction engine for Topograph.
//! Reads container lifecycle and network flow events from an InfluxDB event
//! store, correlates them into a workload topology graph, refreshes that graph
//! periodically and serves time and namespace scoped views of it over HTTP.

pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod graph;
pub mod refresh;
pub mod server;
pub mod store;
pub mod tags;

// Re-export commonly used types at the crate root.
pub use config::{ConfigOverrides, LogFormat, TopographConfig, load_config};
pub use error::{ConfigError, DecodeError, Result, StoreError, TopographError};
pub use events::{ContainerEvent, ContainerEventKind, EventSource, FlowAction, FlowEvent};
pub use filter::{GraphFilter, GraphQuery};
pub use graph::{GraphBuilder, GraphSnapshot, Link, Node};
pub use refresh::{RefreshScheduler, SnapshotReader, SnapshotStore};
pub use server::AppState;
pub use store::{EventStore, InfluxClient, MockEventStore};
pub use tags::{KeyValueTags, TagParser};
