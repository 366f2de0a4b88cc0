//! Builds a [`GraphSnapshot`] from container and flow events.

use super::{GraphSnapshot, Link, LinkKey, Node, identity_hash};
use crate::error::DecodeError;
use crate::events::{ContainerEvent, ContainerEventKind, EventSource, FlowEvent, Timestamp};
use crate::tags::{FLOW_NAMESPACE_TAG, KeyValueTags, POD_NAME_TAG, POD_NAMESPACE_TAG, TagParser};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Working maps of one refresh cycle.
///
/// Every build starts from empty maps, so a snapshot only reflects the events
/// returned by the store during that cycle.
pub struct GraphBuilder {
    tags: Arc<dyn TagParser>,
    nodes: BTreeMap<String, Node>,
    links: BTreeMap<LinkKey, Link>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .finish()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::with_tag_parser(Arc::new(KeyValueTags))
    }

    pub fn with_tag_parser(tags: Arc<dyn TagParser>) -> Self {
        Self {
            tags,
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.links.clear();
    }

    /// Apply container events in row order.
    ///
    /// `update` creates a node for an unseen identity and is a no-op otherwise.
    /// `delete` removes every node of that context. Other kinds are ignored.
    pub fn apply_container_events(&mut self, events: &[ContainerEvent]) -> Result<(), DecodeError> {
        for event in events {
            match &event.kind {
                ContainerEventKind::Update => {
                    let hash = identity_hash(&event.context_id, &event.ip_address);
                    if self.nodes.contains_key(&hash) {
                        continue;
                    }
                    let node = Node {
                        observed_at: required_timestamp(event.timestamp)?,
                        context_id: event.context_id.clone(),
                        pod_name: self.tags.extract(&event.tags, POD_NAME_TAG),
                        ip_address: event.ip_address.clone(),
                        namespace: self.tags.extract(&event.tags, POD_NAMESPACE_TAG),
                    };
                    self.nodes.insert(hash, node);
                }
                ContainerEventKind::Delete => {
                    let before = self.nodes.len();
                    self.nodes
                        .retain(|_, node| node.context_id != event.context_id);
                    trace!(
                        context_id = %event.context_id,
                        removed = before - self.nodes.len(),
                        "Applied container delete"
                    );
                }
                other => {
                    trace!(context_id = %event.context_id, kind = %other, "Ignoring container event");
                }
            }
        }
        Ok(())
    }

    /// Apply flow events against the current node map.
    ///
    /// A link is created the first time both endpoints resolve to known nodes.
    /// Later events for the same pair merge their action into the stored one.
    pub fn apply_flow_events(&mut self, events: &[FlowEvent]) -> Result<(), DecodeError> {
        for event in events {
            let source_hash = identity_hash(&event.source_id, &event.source_ip);
            let destination_hash = identity_hash(&event.destination_id, &event.destination_ip);
            let key = LinkKey::new(source_hash, destination_hash);

            if let Some(link) = self.links.get_mut(&key) {
                link.action = std::mem::take(&mut link.action).merge(event.action.clone());
                continue;
            }

            let (Some(source), Some(target)) = (self.nodes.get(&key.0), self.nodes.get(&key.1))
            else {
                trace!(source = %key.0, target = %key.1, "Skipping flow with unknown endpoint");
                continue;
            };
            if source.context_id.is_empty() || target.context_id.is_empty() {
                continue;
            }

            let link = Link {
                observed_at: required_timestamp(event.timestamp)?,
                source: source.context_id.clone(),
                target: target.context_id.clone(),
                action: event.action.clone(),
                namespace: self.tags.extract(&event.tags, FLOW_NAMESPACE_TAG),
            };
            self.links.insert(key, link);
        }
        Ok(())
    }

    /// Materialize the working maps, ordered by identity.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            links: self.links.values().cloned().collect(),
        }
    }

    /// Build a snapshot from already fetched events.
    pub fn build_from_events(
        &mut self,
        containers: &[ContainerEvent],
        flows: &[FlowEvent],
    ) -> Result<GraphSnapshot, DecodeError> {
        self.reset();
        self.apply_container_events(containers)?;
        self.apply_flow_events(flows)?;
        Ok(self.snapshot())
    }

    /// Run one full build: apply `containers`, then query and apply flow events.
    ///
    /// Flow events are only requested once every container event is applied.
    pub async fn build(
        &mut self,
        containers: &[ContainerEvent],
        source: &EventSource,
    ) -> crate::Result<GraphSnapshot> {
        self.reset();
        self.apply_container_events(containers)?;
        let flows = source.flow_events().await?;
        self.apply_flow_events(&flows)?;
        let snapshot = self.snapshot();
        debug!(
            container_events = containers.len(),
            flow_events = flows.len(),
            nodes = snapshot.nodes.len(),
            links = snapshot.links.len(),
            "Built graph snapshot"
        );
        Ok(snapshot)
    }
}

fn required_timestamp(timestamp: Option<Timestamp>) -> Result<Timestamp, DecodeError> {
    timestamp.ok_or_else(|| DecodeError::MalformedTimestamp {
        value: String::new(),
        message: "missing timestamp".into(),
    })
}
