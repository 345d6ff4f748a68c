//! Rank-based layout. The network-simplex ranker goes through dagre; the
//! longest-path ranker and every dagre failure use the in-crate ranking.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};

use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};

use crate::config::{HierarchicalConfig, LayoutDirection, NodePlacement, Ranker, Viewport};
use crate::ir::GraphData;

use super::ranking::{LayerGeometry, RankEdge, layered_positions};
use super::types::{Positions, apply_pinned, recenter};

fn dagre_rankdir(direction: LayoutDirection) -> &'static str {
    match direction {
        LayoutDirection::Down => "tb",
        LayoutDirection::Up => "bt",
        LayoutDirection::Right => "lr",
        LayoutDirection::Left => "rl",
    }
}

pub(super) fn rank_edges(data: &GraphData) -> Vec<RankEdge> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    data.valid_edges()
        .filter(|edge| edge.src != edge.dst)
        .filter(|edge| seen.insert((edge.src.as_str(), edge.dst.as_str())))
        .map(|edge| (edge.src.clone(), edge.dst.clone()))
        .collect()
}

/// Centers from dagre, or `None` when dagre panicked or skipped a node.
///
/// The panic is caught, but the process panic hook still runs first. With
/// the default hook that prints the message to stderr before the fallback
/// warning; the `topo` binary installs a hook that logs through `tracing`.
fn dagre_positions(
    node_ids: &[String],
    edges: &[RankEdge],
    config: &HierarchicalConfig,
) -> Option<Positions> {
    let run = || {
        let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
            DagreGraph::new(Some(GraphOption {
                directed: Some(true),
                multigraph: Some(false),
                compound: Some(false),
            }));

        let mut graph_config = DagreConfig::default();
        graph_config.rankdir = Some(dagre_rankdir(config.direction).to_string());
        graph_config.nodesep = Some(config.node_spacing);
        graph_config.ranksep = Some(config.rank_spacing);
        graph_config.marginx = Some(8.0);
        graph_config.marginy = Some(8.0);
        dagre_graph.set_graph(graph_config);

        for node_id in node_ids {
            let mut node = DagreNode::default();
            node.width = config.node_width;
            node.height = config.node_height;
            dagre_graph.set_node(node_id.clone(), Some(node));
        }
        for (from, to) in edges {
            let _ = dagre_graph.set_edge(from, to, Some(DagreEdge::default()), None);
        }

        dagre_layout::run_layout(&mut dagre_graph);

        let mut positions = Positions::new();
        for node_id in node_ids {
            let node = dagre_graph.node(node_id)?;
            if !node.x.is_finite() || !node.y.is_finite() {
                return None;
            }
            positions.insert(node_id.clone(), (node.x, node.y));
        }
        Some(positions)
    };
    catch_unwind(AssertUnwindSafe(run)).ok().flatten()
}

fn fallback_positions(
    node_ids: &[String],
    edges: &[RankEdge],
    config: &HierarchicalConfig,
) -> Positions {
    let geometry = LayerGeometry {
        direction: config.direction,
        node_width: config.node_width,
        node_height: config.node_height,
        rank_spacing: config.rank_spacing,
        node_spacing: config.node_spacing,
        placement: NodePlacement::Balanced,
    };
    layered_positions(node_ids, edges, geometry, config.ordering_passes)
}

/// Centers for every node, offset so the drawing sits on the viewport center.
pub fn hierarchical_positions(
    data: &GraphData,
    config: &HierarchicalConfig,
    viewport: Viewport,
) -> Positions {
    let node_ids: Vec<String> = data.nodes.keys().cloned().collect();
    if node_ids.is_empty() {
        return Positions::new();
    }
    let edges = rank_edges(data);

    let mut positions = match config.ranker {
        Ranker::NetworkSimplex => match dagre_positions(&node_ids, &edges, config) {
            Some(positions) => positions,
            None => {
                tracing::warn!(
                    nodes = node_ids.len(),
                    "dagre layout failed; using longest-path ranking"
                );
                fallback_positions(&node_ids, &edges, config)
            }
        },
        Ranker::LongestPath => fallback_positions(&node_ids, &edges, config),
    };

    let (cx, cy) = viewport.center();
    recenter(&mut positions, cx, cy);
    positions
}

pub fn hierarchical_layout(data: &mut GraphData, config: &HierarchicalConfig, viewport: Viewport) {
    let positions = hierarchical_positions(data, config, viewport);
    apply_pinned(data, &positions);
    tracing::debug!(
        nodes = positions.len(),
        ranker = config.ranker.as_str(),
        "hierarchical layout"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Node;

    fn chain() -> GraphData {
        GraphData::new()
            .with_node(Node::new("a", "image"))
            .with_node(Node::new("b", "container"))
            .with_node(Node::new("c", "volume"))
            .with_edge("a", "b", "derived_from")
            .with_edge("b", "c", "mounted_into")
    }

    fn config(ranker: Ranker, direction: LayoutDirection) -> HierarchicalConfig {
        HierarchicalConfig {
            ranker,
            direction,
            ..HierarchicalConfig::default()
        }
    }

    #[test]
    fn longest_path_pins_nodes_named_like_dummies() {
        let mut data = GraphData::new()
            .with_node(Node::new("a", "image"))
            .with_node(Node::new("__dummy_x", "container"))
            .with_node(Node::new("__dummy_0__", "network"))
            .with_node(Node::new("c", "volume"))
            .with_edge("a", "__dummy_x", "derived_from")
            .with_edge("__dummy_x", "c", "mounted_into")
            .with_edge("a", "c", "connected_to");
        let config = config(Ranker::LongestPath, LayoutDirection::Down);
        hierarchical_layout(&mut data, &config, Viewport::default());
        assert!(data.nodes.values().all(|n| n.is_pinned()));
        assert!(data.nodes["a"].y < data.nodes["__dummy_x"].y);
        assert!(data.nodes["__dummy_x"].y < data.nodes["c"].y);
    }

    #[test]
    fn rankdir_matches_direction() {
        assert_eq!(dagre_rankdir(LayoutDirection::Down), "tb");
        assert_eq!(dagre_rankdir(LayoutDirection::Up), "bt");
        assert_eq!(dagre_rankdir(LayoutDirection::Right), "lr");
        assert_eq!(dagre_rankdir(LayoutDirection::Left), "rl");
    }

    #[test]
    fn children_sit_below_parents_for_both_rankers() {
        for ranker in [Ranker::NetworkSimplex, Ranker::LongestPath] {
            let mut data = chain();
            let config = config(ranker, LayoutDirection::Down);
            hierarchical_layout(&mut data, &config, Viewport::new(800.0, 600.0));
            let a = &data.nodes["a"];
            let b = &data.nodes["b"];
            let c = &data.nodes["c"];
            assert!(a.y < b.y && b.y < c.y, "{ranker:?}");
            assert!(data.nodes.values().all(|n| n.fx == Some(n.x) && n.fy == Some(n.y)));
        }
    }

    #[test]
    fn longest_path_left_runs_right_to_left() {
        let positions = hierarchical_positions(
            &chain(),
            &config(Ranker::LongestPath, LayoutDirection::Left),
            Viewport::new(800.0, 600.0),
        );
        assert!(positions["a"].0 > positions["b"].0);
        assert!(positions["b"].0 > positions["c"].0);
        assert!((positions["a"].1 - positions["c"].1).abs() < 1e-3);
    }

    #[test]
    fn result_is_centered_on_viewport() {
        let positions = hierarchical_positions(
            &chain(),
            &config(Ranker::LongestPath, LayoutDirection::Down),
            Viewport::new(800.0, 600.0),
        );
        let ys: Vec<f32> = positions.values().map(|p| p.1).collect();
        let min = ys.iter().copied().fold(f32::MAX, f32::min);
        let max = ys.iter().copied().fold(f32::MIN, f32::max);
        assert!(((min + max) / 2.0 - 300.0).abs() < 1e-3);
        assert!((positions["b"].0 - 400.0).abs() < 1e-3);
    }

    #[test]
    fn cycles_and_self_loops_still_place_every_node() {
        let data = chain()
            .with_edge("c", "a", "connected_to")
            .with_edge("b", "b", "connected_to");
        for ranker in [Ranker::NetworkSimplex, Ranker::LongestPath] {
            let config = config(ranker, LayoutDirection::Down);
            let positions = hierarchical_positions(&data, &config, Viewport::default());
            assert_eq!(positions.len(), 3);
        }
    }

    #[test]
    fn empty_graph_is_a_no_op() {
        let mut data = GraphData::new();
        hierarchical_layout(&mut data, &HierarchicalConfig::default(), Viewport::default());
        assert!(data.is_empty());
    }
}
