//! Pure node/edge predicates used by the filtering pipeline.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::ir::{Edge, Node};

use super::catalog::AttributeFilter;
use super::state::ConnectionFilter;

/// Status filter values and the container states each one accepts.
static STATUS_ALIASES: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    map.insert("running", &["running", "up"]);
    map.insert("stopped", &["exited", "stopped", "dead"]);
    map.insert("exited", &["exited"]);
    map.insert("paused", &["paused"]);
    map.insert("created", &["created"]);
    map.insert("restarting", &["restarting"]);
    map.insert("in-use", &["in-use", "in_use"]);
    map.insert("unused", &["unused"]);
    map
});

pub fn is_orphaned(node_id: &str, edges: &[Edge]) -> bool {
    !edges.iter().any(|edge| edge.touches(node_id))
}

pub fn matches_status(node: &Node, filter: &str) -> bool {
    let filter = filter.trim().to_ascii_lowercase();
    if filter.is_empty() || filter == "all" {
        return true;
    }
    let Some(accepted) = STATUS_ALIASES.get(filter.as_str()) else {
        return true;
    };
    let Some(status) = node.status() else {
        return false;
    };
    let status = status.to_ascii_lowercase();
    accepted.iter().any(|candidate| *candidate == status)
}

pub fn matches_connection(node_id: &str, filter: ConnectionFilter, edges: &[Edge]) -> bool {
    match filter {
        ConnectionFilter::All => true,
        ConnectionFilter::Connected => !is_orphaned(node_id, edges),
        ConnectionFilter::Orphaned => is_orphaned(node_id, edges),
    }
}

pub fn matches_search(node: &Node, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    let query = query.to_lowercase();
    node.name.to_lowercase().contains(&query) || node.id.to_lowercase().contains(&query)
}

pub fn matches_attribute_filters(
    node: &Node,
    values: &BTreeMap<String, Value>,
    filters: &[AttributeFilter],
) -> bool {
    filters.iter().all(|filter| {
        let value = values.get(&filter.name).or(filter.default.as_ref());
        match value {
            Some(value) => (filter.predicate)(node, value),
            None => true,
        }
    })
}

pub fn matches_running_only(node: &Node, enabled: bool) -> bool {
    !enabled || node.status() == Some("running")
}

pub fn matches_in_use_only(node: &Node, enabled: bool) -> bool {
    if !enabled {
        return true;
    }
    node.status() == Some("in-use")
        || node.attributes.get("in_use").and_then(Value::as_bool) == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn container(id: &str, status: &str) -> Node {
        Node::new(id, "container").with_attribute("status", status)
    }

    #[test]
    fn orphan_invariant_matches_edge_scan() {
        let edges = vec![Edge::new("a", "b", "k"), Edge::new("b", "c", "k")];
        for id in ["a", "b", "c", "d"] {
            let expected = !edges.iter().any(|e| e.src == id || e.dst == id);
            assert_eq!(is_orphaned(id, &edges), expected, "{id}");
        }
        assert!(is_orphaned("a", &[]));
    }

    #[test]
    fn status_is_case_insensitive_and_permissive() {
        let node = container("web", "Running");
        assert!(matches_status(&node, "running"));
        assert!(matches_status(&node, "ALL"));
        assert!(!matches_status(&node, "stopped"));
        assert!(matches_status(&node, "something-new"));
        assert!(matches_status(&container("old", "exited"), "stopped"));
        assert!(!matches_status(&Node::new("n", "network"), "running"));
    }

    #[test]
    fn connection_filter_variants() {
        let edges = vec![Edge::new("a", "b", "k")];
        assert!(matches_connection("a", ConnectionFilter::Connected, &edges));
        assert!(!matches_connection("c", ConnectionFilter::Connected, &edges));
        assert!(matches_connection("c", ConnectionFilter::Orphaned, &edges));
        assert!(matches_connection("c", ConnectionFilter::All, &edges));
    }

    #[test]
    fn search_matches_name_or_id() {
        let node = Node::new("c-42", "container").with_name("Web Frontend");
        assert!(matches_search(&node, "front"));
        assert!(matches_search(&node, "C-4"));
        assert!(matches_search(&node, "   "));
        assert!(!matches_search(&node, "database"));
    }

    #[test]
    fn attribute_filters_use_defaults_or_skip() {
        let only_tagged = AttributeFilter::new("tag", Some(json!("prod")), |node, value| {
            node.attributes.get("tag") == Some(value)
        });
        let no_default = AttributeFilter::new("owner", None, |_, _| false);
        let filters = vec![only_tagged, no_default];

        let prod = Node::new("a", "x").with_attribute("tag", "prod");
        let dev = Node::new("b", "x").with_attribute("tag", "dev");
        let empty = BTreeMap::new();
        assert!(matches_attribute_filters(&prod, &empty, &filters));
        assert!(!matches_attribute_filters(&dev, &empty, &filters));

        let mut values = BTreeMap::new();
        values.insert("tag".to_string(), json!("dev"));
        assert!(matches_attribute_filters(&dev, &values, &filters));
        values.insert("owner".to_string(), json!("me"));
        assert!(!matches_attribute_filters(&dev, &values, &filters));
    }

    #[test]
    fn toggles_require_exact_status() {
        assert!(matches_running_only(&container("a", "running"), true));
        assert!(!matches_running_only(&container("a", "Running"), true));
        assert!(matches_running_only(&container("a", "exited"), false));
        let volume = Node::new("v", "volume").with_attribute("in_use", true);
        assert!(matches_in_use_only(&volume, true));
        assert!(!matches_in_use_only(&Node::new("w", "volume"), true));
    }
}
