//! Property-based tests for tag parsing, the merge rule and graph building.

use proptest::prelude::*;

use topograph_core::events::{ContainerEvent, ContainerEventKind, FlowAction, FlowEvent};
use topograph_core::tags::extract_tag;
use topograph_core::{GraphBuilder, KeyValueTags, TagParser};

fn action() -> impl Strategy<Value = FlowAction> {
    prop_oneof![
        Just(FlowAction::Accept),
        Just(FlowAction::Reject),
        Just(FlowAction::NowRejected),
        Just(FlowAction::Unspecified),
        "[a-z]{1,8}".prop_map(|raw| FlowAction::parse(&raw)),
    ]
}

fn timestamp() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339("2017-11-08T06:14:44Z")
        .unwrap()
        .with_timezone(&chrono::Utc)
}

fn update(context_id: String, ip_address: String) -> ContainerEvent {
    ContainerEvent {
        timestamp: Some(timestamp()),
        context_id,
        kind: ContainerEventKind::Update,
        ip_address,
        tags: String::new(),
    }
}

// --- Tag parser properties ---

proptest! {
    #[test]
    fn tag_parser_never_panics(tags in ".*", key in ".*") {
        let _ = KeyValueTags.extract(&tags, &key);
    }

    #[test]
    fn tag_value_is_found_in_blob(
        key in "@[a-z.:]{1,20}",
        value in "[a-zA-Z0-9=_-]{0,20}",
        other in "[a-z]{1,10}=[a-z]{0,10}",
    ) {
        let blob = format!("&{{[{other} {key}={value}]}}");
        prop_assert_eq!(extract_tag(&blob, &key), value.as_str());
    }

    #[test]
    fn tag_value_never_contains_bracket_or_space(tags in ".*", key in "[a-z@.:]{1,10}") {
        let value = extract_tag(&tags, &key);
        prop_assert!(!value.contains(']'));
        prop_assert!(!value.chars().any(char::is_whitespace));
    }
}

// --- Merge rule properties ---

proptest! {
    #[test]
    fn nowrejected_is_absorbing(observed in prop::collection::vec(action(), 0..20)) {
        let merged = observed
            .into_iter()
            .fold(FlowAction::NowRejected, FlowAction::merge);
        prop_assert_eq!(merged, FlowAction::NowRejected);
    }

    #[test]
    fn merged_action_is_first_or_nowrejected(
        first in action(),
        rest in prop::collection::vec(action(), 0..20),
    ) {
        let all_same = rest.iter().all(|a| *a == first);
        let merged = rest.into_iter().fold(first.clone(), FlowAction::merge);
        if all_same {
            prop_assert_eq!(merged, first);
        } else {
            prop_assert_eq!(merged, FlowAction::NowRejected);
        }
    }
}

// --- Graph builder properties ---

proptest! {
    #[test]
    fn action_text_survives_parse(raw in "[a-z]{0,12}") {
        let parsed = FlowAction::parse(&raw);
        prop_assert_eq!(parsed.as_str(), raw.as_str());
    }

    #[test]
    fn links_always_have_both_endpoints(
        nodes in prop::collection::vec(("[a-c]{0,1}", "10\\.0\\.0\\.[1-3]"), 0..8),
        flows in prop::collection::vec(
            ("[a-c]{0,1}", "10\\.0\\.0\\.[1-3]", "[a-c]{0,1}", "10\\.0\\.0\\.[1-3]", action()),
            0..16,
        ),
    ) {
        let containers: Vec<_> = nodes
            .into_iter()
            .map(|(ctx, ip)| update(ctx, ip))
            .collect();
        let flows: Vec<_> = flows
            .into_iter()
            .map(|(src, src_ip, dst, dst_ip, action)| FlowEvent {
                timestamp: Some(timestamp()),
                source_id: src,
                source_ip: src_ip,
                destination_id: dst,
                destination_ip: dst_ip,
                action,
                tags: String::new(),
            })
            .collect();

        let snapshot = GraphBuilder::new().build_from_events(&containers, &flows).unwrap();
        for link in &snapshot.links {
            prop_assert!(!link.source.is_empty());
            prop_assert!(!link.target.is_empty());
            prop_assert!(snapshot.nodes.iter().any(|n| n.context_id == link.source));
            prop_assert!(snapshot.nodes.iter().any(|n| n.context_id == link.target));
        }
    }

    #[test]
    fn repeated_updates_yield_one_node_per_identity(
        events in prop::collection::vec(("[a-c]", "10\\.0\\.0\\.[1-2]"), 1..20),
    ) {
        let mut identities: Vec<String> = events
            .iter()
            .map(|(ctx, ip)| format!("{ctx}:{ip}"))
            .collect();
        identities.sort();
        identities.dedup();

        let containers: Vec<_> = events
            .into_iter()
            .map(|(ctx, ip)| update(ctx, ip))
            .collect();
        let snapshot = GraphBuilder::new().build_from_events(&containers, &[]).unwrap();
        let built: Vec<String> = snapshot.nodes.iter().map(|n| n.identity()).collect();
        prop_assert_eq!(built, identities);
    }
}
