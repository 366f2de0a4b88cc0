//! Tag blob parsing.
//!
//! Workload tags reach the event store as one string that looks like a
//! serialized map literal, e.g.
//! `&{[@usr:io.kubernetes.pod.name=foo-123 @usr:io.kubernetes.pod.namespace=bar]}`.
//! The parser here is best-effort: it never fails, it only returns an empty
//! string when the key cannot be found.

/// Tag carrying the pod name in container event tags.
pub const POD_NAME_TAG: &str = "@usr:io.kubernetes.pod.name";

/// Tag carrying the pod namespace in container event tags.
pub const POD_NAMESPACE_TAG: &str = "@usr:io.kubernetes.pod.namespace";

/// Tag carrying the namespace in flow event tags.
pub const FLOW_NAMESPACE_TAG: &str = "@namespace";

/// Leading marker the collector prepends to the first tag of a blob.
const BLOB_PREFIX: &str = "&{[";

/// Extracts named attributes from a raw tag blob.
///
/// Implementations must be tolerant of malformed input and return an empty
/// string for anything they cannot resolve.
pub trait TagParser: Send + Sync {
    fn extract(&self, tags: &str, key: &str) -> String;
}

/// The default parser for whitespace-delimited `key=value` blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueTags;

impl TagParser for KeyValueTags {
    fn extract(&self, tags: &str, key: &str) -> String {
        extract_tag(tags, key).to_string()
    }
}

/// Return the value of `key` in `tags`, or `""` when absent.
///
/// Each whitespace-separated token is split after its first `=`. A token
/// matches when the left side is `key=` or `&{[key=`. The value runs up to
/// the first `]`, so the closing brackets of the blob are dropped. When a key
/// appears more than once the last occurrence wins.
pub fn extract_tag<'a>(tags: &'a str, key: &str) -> &'a str {
    if key.is_empty() {
        return "";
    }

    let mut value = "";
    for token in tags.split_whitespace() {
        let Some(eq) = token.find('=') else {
            continue;
        };
        let (lhs, rest) = token.split_at(eq);
        let lhs = lhs.strip_prefix(BLOB_PREFIX).unwrap_or(lhs);
        if lhs != key {
            continue;
        }
        let rest = &rest[1..];
        value = match rest.find(']') {
            Some(end) => &rest[..end],
            None => rest,
        };
    }
    value
}
