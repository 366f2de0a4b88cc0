//! Typed container and flow events decoded from event store rows.
//!
//! Rows are positional and loosely typed. Each event kind has a fixed column
//! layout; absent or `null` cells decode to the field's empty value, while a
//! cell of the wrong JSON type or a timestamp that is not strict RFC 3339 is a
//! [`DecodeError`].

use crate::error::{DecodeError, StoreError};
use crate::store::{
    CONTAINER_EVENTS_QUERY, CONTAINER_MEASUREMENT, EventStore, FLOW_EVENTS_QUERY,
    FLOW_MEASUREMENT,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Point in time attached to events, nodes and links.
pub type Timestamp = DateTime<Utc>;

/// Column positions of a `ContainerEvents` row.
#[derive(Debug, Clone, Copy)]
pub struct ContainerColumns {
    pub timestamp: usize,
    pub context_id: usize,
    pub kind: usize,
    pub ip_address: usize,
    pub tags: usize,
}

/// Column positions of a `FlowEvents` row.
#[derive(Debug, Clone, Copy)]
pub struct FlowColumns {
    pub timestamp: usize,
    pub action: usize,
    pub destination_id: usize,
    pub destination_ip: usize,
    pub source_id: usize,
    pub source_ip: usize,
    pub tags: usize,
}

pub const CONTAINER_COLUMNS: ContainerColumns = ContainerColumns {
    timestamp: 0,
    context_id: 1,
    kind: 2,
    ip_address: 5,
    tags: 6,
};

/// `time` first, then fields in alphabetical order. The destination identity
/// is read from the reporting `ContextID` column.
pub const FLOW_COLUMNS: FlowColumns = FlowColumns {
    timestamp: 0,
    action: 1,
    destination_id: 2,
    destination_ip: 5,
    source_id: 12,
    source_ip: 13,
    tags: 16,
};

/// Lifecycle event reported for a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEventKind {
    Create,
    Start,
    Update,
    Stop,
    Delete,
    Ignore,
    ForceStop,
    /// Delete reported for a container the agent never saw start.
    UnknownDelete,
    /// No event name recorded.
    Unspecified,
    Other(String),
}

impl ContainerEventKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "create" => Self::Create,
            "start" => Self::Start,
            "update" => Self::Update,
            "stop" => Self::Stop,
            "delete" => Self::Delete,
            "ignore" => Self::Ignore,
            "forcestop" => Self::ForceStop,
            "unknowncontainer" => Self::UnknownDelete,
            "" => Self::Unspecified,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Update => "update",
            Self::Stop => "stop",
            Self::Delete => "delete",
            Self::Ignore => "ignore",
            Self::ForceStop => "forcestop",
            Self::UnknownDelete => "unknowncontainer",
            Self::Unspecified => "",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for ContainerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy decision recorded for a flow, or derived for a link.
///
/// Actions the engine does not know are kept verbatim in [`FlowAction::Other`]
/// and serialized as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FlowAction {
    Accept,
    Reject,
    /// Derived: the same endpoint pair was seen both accepted and rejected.
    NowRejected,
    #[default]
    Unspecified,
    Other(String),
}

impl FlowAction {
    pub fn parse(value: &str) -> Self {
        match value {
            "accept" => Self::Accept,
            "reject" => Self::Reject,
            "nowrejected" => Self::NowRejected,
            "" => Self::Unspecified,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::NowRejected => "nowrejected",
            Self::Unspecified => "",
            Self::Other(other) => other,
        }
    }

    /// Combine the stored action with a newly observed one.
    ///
    /// Any disagreement yields [`FlowAction::NowRejected`], which then absorbs
    /// every later observation.
    pub fn merge(self, observed: FlowAction) -> FlowAction {
        if self == observed {
            self
        } else {
            FlowAction::NowRejected
        }
    }
}

impl From<String> for FlowAction {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<FlowAction> for String {
    fn from(action: FlowAction) -> Self {
        match action {
            FlowAction::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `ContainerEvents`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerEvent {
    pub timestamp: Option<Timestamp>,
    pub context_id: String,
    pub kind: ContainerEventKind,
    pub ip_address: String,
    pub tags: String,
}

impl ContainerEvent {
    pub fn from_row(row: &[Value]) -> Result<Self, DecodeError> {
        let columns = CONTAINER_COLUMNS;
        Ok(Self {
            timestamp: timestamp_cell(row, columns.timestamp)?,
            context_id: string_cell(row, columns.context_id)?.to_string(),
            kind: ContainerEventKind::parse(string_cell(row, columns.kind)?),
            ip_address: string_cell(row, columns.ip_address)?.to_string(),
            tags: string_cell(row, columns.tags)?.to_string(),
        })
    }
}

/// One row of `FlowEvents`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEvent {
    pub timestamp: Option<Timestamp>,
    pub source_id: String,
    pub source_ip: String,
    pub destination_id: String,
    pub destination_ip: String,
    pub action: FlowAction,
    pub tags: String,
}

impl FlowEvent {
    pub fn from_row(row: &[Value]) -> Result<Self, DecodeError> {
        let columns = FLOW_COLUMNS;
        Ok(Self {
            timestamp: timestamp_cell(row, columns.timestamp)?,
            source_id: string_cell(row, columns.source_id)?.to_string(),
            source_ip: string_cell(row, columns.source_ip)?.to_string(),
            destination_id: string_cell(row, columns.destination_id)?.to_string(),
            destination_ip: string_cell(row, columns.destination_ip)?.to_string(),
            action: FlowAction::parse(string_cell(row, columns.action)?),
            tags: string_cell(row, columns.tags)?.to_string(),
        })
    }
}

/// String value of a cell. Missing and `null` cells read as "".
pub fn string_cell(row: &[Value], column: usize) -> Result<&str, DecodeError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DecodeError::UnexpectedCellType {
            column,
            expected: "string",
        }),
    }
}

/// Strict RFC 3339 timestamp of a cell. Missing, `null` and "" read as `None`.
pub fn timestamp_cell(row: &[Value], column: usize) -> Result<Option<Timestamp>, DecodeError> {
    let raw = string_cell(row, column)?;
    if raw.is_empty() {
        return Ok(None);
    }
    parse_timestamp(raw).map(Some)
}

pub fn parse_timestamp(raw: &str) -> Result<Timestamp, DecodeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DecodeError::MalformedTimestamp {
            value: raw.to_string(),
            message: e.to_string(),
        })
}

/// Fetches and decodes events from an [`EventStore`].
#[derive(Clone)]
pub struct EventSource {
    store: Arc<dyn EventStore>,
    database: String,
    query_timeout: Duration,
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("database", &self.database)
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl EventSource {
    pub fn new(
        store: Arc<dyn EventStore>,
        database: impl Into<String>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            store,
            database: database.into(),
            query_timeout,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub async fn container_events(&self) -> crate::Result<Vec<ContainerEvent>> {
        info!("Retrieving container events");
        let response = self.execute(CONTAINER_EVENTS_QUERY).await?;
        let events = response
            .rows(CONTAINER_EVENTS_QUERY, CONTAINER_MEASUREMENT)?
            .iter()
            .map(|row| ContainerEvent::from_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub async fn flow_events(&self) -> crate::Result<Vec<FlowEvent>> {
        info!("Retrieving flow events");
        let response = self.execute(FLOW_EVENTS_QUERY).await?;
        let events = response
            .rows(FLOW_EVENTS_QUERY, FLOW_MEASUREMENT)?
            .iter()
            .map(|row| FlowEvent::from_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    async fn execute(&self, query: &str) -> Result<crate::store::QueryResponse, StoreError> {
        tokio::time::timeout(
            self.query_timeout,
            self.store.execute_query(query, &self.database),
        )
        .await
        .map_err(|_| StoreError::Timeout {
            timeout_secs: self.query_timeout.as_secs(),
        })?
    }
}
