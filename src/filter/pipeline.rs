use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::ir::{Edge, GraphData, Node};

use super::catalog::GraphConfig;
use super::predicates::{
    is_orphaned, matches_attribute_filters, matches_connection, matches_in_use_only,
    matches_running_only, matches_search, matches_status,
};
use super::state::{ConnectionFilter, Filters};

/// Why nodes were left out of a filtered snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub visible_nodes: usize,
    pub visible_edges: usize,
    pub excluded: usize,
    pub hidden_kind: usize,
    pub failed_predicates: usize,
    pub failed_connection: usize,
}

pub fn filter_graph(data: &GraphData, filters: &Filters, config: &GraphConfig) -> GraphData {
    filter_graph_with_stats(data, filters, config).0
}

/// Derive the visible subgraph. Evaluation order is fixed: explicit
/// exclusion, kind visibility, node predicates, then the connection pass
/// against the surviving edge set.
pub fn filter_graph_with_stats(
    data: &GraphData,
    filters: &Filters,
    config: &GraphConfig,
) -> (GraphData, FilterStats) {
    let mut stats = FilterStats {
        total_nodes: data.nodes.len(),
        total_edges: data.edges.len(),
        ..FilterStats::default()
    };
    let excluded: HashSet<&str> = filters.excluded_node_ids.iter().map(String::as_str).collect();

    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
    for (id, node) in &data.nodes {
        if excluded.contains(id.as_str()) {
            stats.excluded += 1;
            continue;
        }
        if !filters.node_kind_visible(&node.kind) {
            stats.hidden_kind += 1;
            continue;
        }
        let passes = matches_status(node, &filters.status)
            && matches_search(node, &filters.search)
            && matches_running_only(node, filters.running_only)
            && matches_in_use_only(node, filters.in_use_only)
            && matches_attribute_filters(
                node,
                &filters.attribute_values,
                &config.attribute_filters,
            );
        if !passes {
            stats.failed_predicates += 1;
            continue;
        }
        nodes.insert(id.clone(), node.clone());
    }

    let mut edges = surviving_edges(&data.edges, &nodes, filters);

    if filters.needs_connection_pass() {
        let before = nodes.len();
        nodes.retain(|id, _| {
            let connection_ok = matches_connection(id, filters.connection, &edges);
            let orphan_ok = !filters.orphaned_only || is_orphaned(id, &edges);
            connection_ok && orphan_ok
        });
        stats.failed_connection = before - nodes.len();
        if filters.connection != ConnectionFilter::All || stats.failed_connection > 0 {
            edges = surviving_edges(&edges, &nodes, filters);
        }
    }

    stats.visible_nodes = nodes.len();
    stats.visible_edges = edges.len();
    tracing::debug!(
        total = stats.total_nodes,
        visible = stats.visible_nodes,
        edges = stats.visible_edges,
        "filtered graph"
    );

    (GraphData { nodes, edges }, stats)
}

fn surviving_edges(edges: &[Edge], nodes: &BTreeMap<String, Node>, filters: &Filters) -> Vec<Edge> {
    edges
        .iter()
        .filter(|edge| {
            filters.edge_kind_visible(&edge.kind)
                && nodes.contains_key(&edge.src)
                && nodes.contains_key(&edge.dst)
        })
        .cloned()
        .collect()
}
