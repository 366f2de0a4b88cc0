//! # Event Store
//!
//! The time-series backend holding container and flow events. Topograph only
//! needs one operation from it, [`EventStore::execute_query`], which returns
//! the tabular InfluxDB response for a query against a database.

mod influx;
pub mod mock;

pub use influx::InfluxClient;
pub use mock::MockEventStore;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query returning every recorded container lifecycle event.
pub const CONTAINER_EVENTS_QUERY: &str = "SELECT * FROM ContainerEvents";

/// Query returning every recorded network flow event.
pub const FLOW_EVENTS_QUERY: &str = "SELECT * FROM FlowEvents";

/// Measurement name of container events.
pub const CONTAINER_MEASUREMENT: &str = "ContainerEvents";

/// Measurement name of flow events.
pub const FLOW_MEASUREMENT: &str = "FlowEvents";

/// A backend able to run a query against a named database.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn execute_query(&self, query: &str, database: &str)
    -> Result<QueryResponse, StoreError>;
}

/// Response body of an InfluxDB `/query` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a single statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<u64>,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One measurement's rows. Cells are loosely typed and may be `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl QueryResponse {
    /// Build a single-statement response holding one series.
    pub fn from_series(series: Series) -> Self {
        Self {
            results: vec![QueryResult {
                statement_id: Some(0),
                series: vec![series],
                error: None,
            }],
            error: None,
        }
    }

    /// Rows of `measurement` in the first statement result.
    ///
    /// A response without any statement result is an error. A result without
    /// a matching series simply has no rows.
    pub fn rows(&self, query: &str, measurement: &str) -> Result<&[Vec<Value>], StoreError> {
        if let Some(message) = &self.error {
            return Err(StoreError::QueryRejected {
                message: message.clone(),
            });
        }
        let result = self.results.first().ok_or_else(|| StoreError::EmptyResponse {
            query: query.to_string(),
        })?;
        if let Some(message) = &result.error {
            return Err(StoreError::QueryRejected {
                message: message.clone(),
            });
        }
        Ok(result
            .series
            .iter()
            .find(|series| series.name == measurement)
            .map(|series| series.values.as_slice())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_response_deserializes_influx_body() {
        let body = json!({
            "results": [{
                "statement_id": 0,
                "series": [{
                    "name": "ContainerEvents",
                    "columns": ["time", "ContextID", "Event"],
                    "values": [["2017-11-08T06:14:44.843219756Z", "6f4b63dde673", "update"]]
                }]
            }]
        });
        let response: QueryResponse = serde_json::from_value(body).unwrap();
        let rows = response
            .rows(CONTAINER_EVENTS_QUERY, CONTAINER_MEASUREMENT)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], json!("6f4b63dde673"));
    }

    #[test]
    fn test_rows_of_other_measurement_are_empty() {
        let response = QueryResponse::from_series(Series {
            name: "FlowEvents".into(),
            columns: vec!["time".into()],
            values: vec![vec![json!("2017-11-08T06:14:44Z")]],
        });
        let rows = response
            .rows(CONTAINER_EVENTS_QUERY, CONTAINER_MEASUREMENT)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_result_without_series_has_no_rows() {
        let response: QueryResponse =
            serde_json::from_value(json!({"results": [{"statement_id": 0}]})).unwrap();
        assert!(
            response
                .rows(FLOW_EVENTS_QUERY, FLOW_MEASUREMENT)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_no_results_is_empty_response() {
        let response = QueryResponse::default();
        let err = response
            .rows(FLOW_EVENTS_QUERY, FLOW_MEASUREMENT)
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyResponse { query } if query == FLOW_EVENTS_QUERY));
    }

    #[test]
    fn test_statement_error_is_rejection() {
        let response: QueryResponse = serde_json::from_value(json!({
            "results": [{"statement_id": 0, "error": "database not found: flowDB"}]
        }))
        .unwrap();
        let err = response
            .rows(FLOW_EVENTS_QUERY, FLOW_MEASUREMENT)
            .unwrap_err();
        assert!(matches!(err, StoreError::QueryRejected { message } if message.contains("flowDB")));
    }
}
