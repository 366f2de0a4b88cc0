//! Time window and namespace views of a published snapshot.
//!
//! An element is kept when it falls in the window and carries the requested
//! namespace, when it falls in the window and no namespace was requested, or
//! when it carries the requested namespace regardless of time. Nodes and links
//! are scanned concurrently on the blocking pool.

use crate::events::Timestamp;
use crate::graph::{GraphSnapshot, Link, Node};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Query string of a filtered read. Empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphQuery {
    pub starttime: Option<String>,
    pub endtime: Option<String>,
    pub namespace: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Store the first value seen for a query parameter; later repeats are logged.
pub(crate) fn keep_first(slot: &mut Option<String>, name: &str, value: String) {
    if slot.is_none() {
        *slot = Some(value);
    } else {
        warn!(parameter = name, value = %value, "Ignoring repeated query parameter");
    }
}

impl GraphQuery {
    /// Collect raw query pairs. Unknown keys are ignored and the first value
    /// of a repeated key wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "starttime" => &mut query.starttime,
                "endtime" => &mut query.endtime,
                "namespace" => &mut query.namespace,
                _ => continue,
            };
            keep_first(slot, &key, value);
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        non_empty(&self.starttime).is_none()
            && non_empty(&self.endtime).is_none()
            && non_empty(&self.namespace).is_none()
    }

    /// Resolve the raw parameters. Malformed times are logged and dropped.
    pub fn to_filter(&self) -> GraphFilter {
        let bound = |name: &str, raw: Option<&str>| {
            raw.and_then(|raw| match parse_query_time(raw) {
                Ok(time) => Some(time),
                Err(e) => {
                    warn!(parameter = name, value = raw, error = %e, "Ignoring malformed time bound");
                    None
                }
            })
        };
        GraphFilter {
            start: bound("starttime", non_empty(&self.starttime)),
            end: bound("endtime", non_empty(&self.endtime)),
            namespace: non_empty(&self.namespace).map(str::to_string),
        }
    }
}

/// Parse a `YYYY-MM-DDTHH:MM:SS` query bound as UTC.
///
/// A bound without seconds (`YYYY-MM-DDTHH:MM`, as browser date pickers send on
/// a whole minute) is read as `:00`.
pub fn parse_query_time(raw: &str) -> Result<Timestamp, chrono::ParseError> {
    let rfc3339 = match raw.split_once('T') {
        Some((_, time)) if time.matches(':').count() == 1 => format!("{raw}:00Z"),
        _ => format!("{raw}Z"),
    };
    DateTime::parse_from_rfc3339(&rfc3339).map(|t| t.with_timezone(&Utc))
}

/// Resolved filter. A `None` bound places no constraint on that side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphFilter {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub namespace: Option<String>,
}

impl GraphFilter {
    /// `start <= time < end`.
    pub fn in_window(&self, time: Timestamp) -> bool {
        self.start.is_none_or(|start| time >= start) && self.end.is_none_or(|end| time < end)
    }

    pub fn matches(&self, time: Timestamp, namespace: &str) -> bool {
        let in_window = self.in_window(time);
        match self.namespace.as_deref() {
            Some(requested) if in_window && namespace == requested => true,
            None if in_window => true,
            Some(requested) => namespace == requested,
            None => false,
        }
    }

    pub fn filter_nodes(&self, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .filter(|n| self.matches(n.observed_at, &n.namespace))
            .cloned()
            .collect()
    }

    pub fn filter_links(&self, links: &[Link]) -> Vec<Link> {
        links
            .iter()
            .filter(|l| self.matches(l.observed_at, &l.namespace))
            .cloned()
            .collect()
    }

    /// Scan nodes and links concurrently and join both results.
    pub async fn apply(self, snapshot: Arc<GraphSnapshot>) -> crate::Result<GraphSnapshot> {
        let filter = Arc::new(self);

        let node_scan = {
            let filter = Arc::clone(&filter);
            let snapshot = Arc::clone(&snapshot);
            tokio::task::spawn_blocking(move || filter.filter_nodes(&snapshot.nodes))
        };
        let link_scan = tokio::task::spawn_blocking(move || filter.filter_links(&snapshot.links));

        let (nodes, links) = tokio::try_join!(node_scan, link_scan)?;
        Ok(GraphSnapshot { nodes, links })
    }
}

/// Narrow `snapshot` by `query`. Without parameters the same snapshot is returned.
pub async fn query(
    snapshot: Arc<GraphSnapshot>,
    query: &GraphQuery,
) -> crate::Result<Arc<GraphSnapshot>> {
    if query.is_empty() {
        return Ok(snapshot);
    }
    let filtered = query.to_filter().apply(snapshot).await?;
    Ok(Arc::new(filtered))
}
