//! # HTTP Server
//!
//! Serves the published snapshot over HTTP:
//!
//! - `GET /get` returns the graph as JSON, optionally narrowed by
//!   `starttime`, `endtime` and `namespace`.
//! - `GET /graph` and `GET /` return a page rendering the graph.
//! - `GET /health` reports refresh status.

pub mod html;

use crate::filter::{self, GraphQuery, keep_first};
use crate::refresh::SnapshotReader;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Address the graph page fetches data from when none is given.
pub const DEFAULT_DATA_ADDRESS: &str = "/get";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub reader: SnapshotReader,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(reader: SnapshotReader) -> Self {
        Self {
            reader,
            started_at: Instant::now(),
        }
    }
}

/// Build the axum router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/get", get(data_handler))
        .route("/graph", get(graph_handler))
        .route("/", get(graph_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Raw query pairs. Collecting pairs rather than a struct keeps repeated keys
/// from failing the request.
type QueryPairs = Query<Vec<(String, String)>>;

/// Graph JSON, filtered when any query parameter is set.
async fn data_handler(State(state): State<AppState>, Query(pairs): QueryPairs) -> Response {
    let query = GraphQuery::from_pairs(pairs);
    let snapshot = state.reader.current();
    let view = match filter::query(snapshot, &query).await {
        Ok(view) => view,
        Err(e) => {
            error!(error = %e, "Filtering graph failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    match serde_json::to_vec(view.as_ref()) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "Encoding graph failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Query string of the graph page.
#[derive(Debug, Clone, Default)]
pub struct GraphPageQuery {
    pub address: Option<String>,
    pub starttime: Option<String>,
    pub endtime: Option<String>,
    pub namespace: Option<String>,
}

impl GraphPageQuery {
    /// Collect raw query pairs; the first value of a repeated key wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "address" => &mut query.address,
                "starttime" => &mut query.starttime,
                "endtime" => &mut query.endtime,
                "namespace" => &mut query.namespace,
                _ => continue,
            };
            keep_first(slot, &key, value);
        }
        query
    }

    /// Data address with the filter parameters forwarded.
    ///
    /// Forwards all three parameters when all are present, otherwise the time
    /// pair when both bounds are present, otherwise the namespace alone.
    pub fn data_address(&self) -> String {
        let base = self
            .address
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_DATA_ADDRESS);

        let params: Vec<(&str, &str)> = match (
            self.starttime.as_deref(),
            self.endtime.as_deref(),
            self.namespace.as_deref(),
        ) {
            (Some(start), Some(end), Some(ns)) => {
                vec![("starttime", start), ("endtime", end), ("namespace", ns)]
            }
            (Some(start), Some(end), None) => vec![("starttime", start), ("endtime", end)],
            (_, _, Some(ns)) => vec![("namespace", ns)],
            _ => Vec::new(),
        };

        if params.is_empty() {
            return base.to_string();
        }
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}{query}")
    }
}

async fn graph_handler(Query(pairs): QueryPairs) -> Html<String> {
    let query = GraphPageQuery::from_pairs(pairs);
    Html(html::render(&query.data_address()))
}

/// Health check endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.reader.current();
    let refresh = state.reader.status();
    let body = serde_json::json!({
        "status": refresh.status(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "nodes": snapshot.nodes.len(),
        "links": snapshot.links.len(),
        "refresh": refresh,
    });
    Json(body)
}

/// Serve on `listener` until `shutdown` is cancelled.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let app = router(state, request_timeout);
    info!(address = %listener.local_addr()?, "Topograph server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::SnapshotStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn page_query(start: Option<&str>, end: Option<&str>, ns: Option<&str>) -> GraphPageQuery {
        GraphPageQuery {
            address: None,
            starttime: start.map(Into::into),
            endtime: end.map(Into::into),
            namespace: ns.map(Into::into),
        }
    }

    #[test]
    fn test_data_address_default() {
        assert_eq!(GraphPageQuery::default().data_address(), "/get");
    }

    #[test]
    fn test_data_address_forwards_all_three() {
        let q = page_query(Some("2017-11-08T09:00:00"), Some("2017-11-08T10:00:00"), Some("ns1"));
        assert_eq!(
            q.data_address(),
            "/get?starttime=2017-11-08T09%3A00%3A00&endtime=2017-11-08T10%3A00%3A00&namespace=ns1"
        );
    }

    #[test]
    fn test_data_address_time_pair_only() {
        let q = page_query(Some("a"), Some("b"), None);
        assert_eq!(q.data_address(), "/get?starttime=a&endtime=b");
    }

    #[test]
    fn test_data_address_namespace_without_full_window() {
        let q = page_query(Some("a"), None, Some("ns/1"));
        assert_eq!(q.data_address(), "/get?namespace=ns%2F1");
    }

    #[test]
    fn test_data_address_single_bound_is_dropped() {
        let q = page_query(None, Some("b"), None);
        assert_eq!(q.data_address(), "/get");
    }

    #[test]
    fn test_data_address_custom_base() {
        let q = GraphPageQuery {
            address: Some("http://graph.local/get?db=x".into()),
            namespace: Some("ns1".into()),
            ..Default::default()
        };
        assert_eq!(q.data_address(), "http://graph.local/get?db=x&namespace=ns1");
    }

    #[test]
    fn test_page_query_first_value_wins() {
        let q = GraphPageQuery::from_pairs(vec![
            ("namespace".to_string(), "a".to_string()),
            ("namespace".to_string(), "b".to_string()),
            ("other".to_string(), "x".to_string()),
        ]);
        assert_eq!(q.namespace.as_deref(), Some("a"));
        assert_eq!(q.data_address(), "/get?namespace=a");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let store = SnapshotStore::new();
        let app = router(AppState::new(store.reader()), Duration::from_secs(5));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "starting");
        assert_eq!(json["nodes"], 0);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let store = SnapshotStore::new();
        let app = router(AppState::new(store.reader()), Duration::from_secs(5));
        let req = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
