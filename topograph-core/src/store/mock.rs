//! In-memory event store for tests and local runs.

use super::{
    CONTAINER_EVENTS_QUERY, CONTAINER_MEASUREMENT, EventStore, FLOW_EVENTS_QUERY,
    FLOW_MEASUREMENT, QueryResponse, QueryResult, Series,
};
use crate::error::StoreError;
use crate::events::{CONTAINER_COLUMNS, FLOW_COLUMNS};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

const CONTAINER_COLUMN_NAMES: [&str; 7] = [
    "time",
    "ContextID",
    "Event",
    "EventID",
    "EventName",
    "IPAddress",
    "Tags",
];

const FLOW_COLUMN_NAMES: [&str; 17] = [
    "time",
    "Action",
    "ContextID",
    "Counter",
    "DestinationID",
    "DestinationIP",
    "DestinationPort",
    "DestinationType",
    "DropReason",
    "EventID",
    "EventName",
    "PolicyID",
    "SourceID",
    "SourceIP",
    "SourcePort",
    "SourceType",
    "Tags",
];

/// `DestinationID` field, which mirrors the reporting `ContextID` on rows
/// written by an enforcer on the receiving side.
const FLOW_DESTINATION_FIELD: usize = 4;

/// A mock event store that answers queries from canned responses.
///
/// Queries without a configured response return a statement result with no
/// series. Every query is recorded and can be inspected with [`calls`](Self::calls).
#[derive(Debug, Default)]
pub struct MockEventStore {
    responses: Mutex<HashMap<String, Result<QueryResponse, StoreError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding container and flow rows.
    pub fn with_events(container_rows: Vec<Vec<Value>>, flow_rows: Vec<Vec<Value>>) -> Self {
        let store = Self::new();
        store.set_container_rows(container_rows);
        store.set_flow_rows(flow_rows);
        store
    }

    /// Answer `query` with `response` from now on.
    pub fn set_response(&self, query: &str, response: QueryResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.to_string(), Ok(response));
    }

    /// Fail `query` with `error` from now on.
    pub fn set_error(&self, query: &str, error: StoreError) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.to_string(), Err(error));
    }

    pub fn set_container_rows(&self, rows: Vec<Vec<Value>>) {
        self.set_response(
            CONTAINER_EVENTS_QUERY,
            series_response(CONTAINER_MEASUREMENT, &CONTAINER_COLUMN_NAMES, rows),
        );
    }

    pub fn set_flow_rows(&self, rows: Vec<Vec<Value>>) {
        self.set_response(
            FLOW_EVENTS_QUERY,
            series_response(FLOW_MEASUREMENT, &FLOW_COLUMN_NAMES, rows),
        );
    }

    /// Queries executed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn execute_query(
        &self,
        query: &str,
        _database: &str,
    ) -> Result<QueryResponse, StoreError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());

        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
            .cloned()
            .unwrap_or_else(|| {
                Ok(QueryResponse {
                    results: vec![QueryResult {
                        statement_id: Some(0),
                        ..Default::default()
                    }],
                    error: None,
                })
            })
    }
}

fn series_response(name: &str, columns: &[&str], values: Vec<Vec<Value>>) -> QueryResponse {
    QueryResponse::from_series(Series {
        name: name.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        values,
    })
}

fn cell(value: &str) -> Value {
    if value.is_empty() {
        Value::Null
    } else {
        Value::String(value.to_string())
    }
}

/// Build a `ContainerEvents` row. Empty strings become `null` cells.
pub fn container_row(
    timestamp: &str,
    context_id: &str,
    kind: &str,
    ip_address: &str,
    tags: &str,
) -> Vec<Value> {
    let mut row = vec![Value::Null; CONTAINER_COLUMN_NAMES.len()];
    row[CONTAINER_COLUMNS.timestamp] = cell(timestamp);
    row[CONTAINER_COLUMNS.context_id] = cell(context_id);
    row[CONTAINER_COLUMNS.kind] = cell(kind);
    row[CONTAINER_COLUMNS.ip_address] = cell(ip_address);
    row[CONTAINER_COLUMNS.tags] = cell(tags);
    row
}

/// Build a `FlowEvents` row. Empty strings become `null` cells.
pub fn flow_row(
    timestamp: &str,
    source_id: &str,
    source_ip: &str,
    destination_id: &str,
    destination_ip: &str,
    action: &str,
    tags: &str,
) -> Vec<Value> {
    let mut row = vec![Value::Null; FLOW_COLUMN_NAMES.len()];
    row[FLOW_COLUMNS.timestamp] = cell(timestamp);
    row[FLOW_COLUMNS.action] = cell(action);
    row[FLOW_COLUMNS.destination_id] = cell(destination_id);
    row[FLOW_DESTINATION_FIELD] = cell(destination_id);
    row[FLOW_COLUMNS.destination_ip] = cell(destination_ip);
    row[FLOW_COLUMNS.source_id] = cell(source_id);
    row[FLOW_COLUMNS.source_ip] = cell(source_ip);
    row[FLOW_COLUMNS.tags] = cell(tags);
    row
}
