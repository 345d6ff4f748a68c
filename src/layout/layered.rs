//! Layered algorithm suite: Sugiyama layering, a force pass, a tidy tree
//! and radial rings. `compute_positions` is the synchronous core;
//! `LayeredRunner` moves it off the async executor.

use std::collections::{HashMap, HashSet, VecDeque};
use std::f32::consts::PI;

use crate::config::{ForceConfig, LayeredAlgorithm, LayeredConfig, LayoutDirection, Viewport};
use crate::ir::GraphData;

use super::LayoutError;
use super::force::{Body, ForceParams, ForceSimulation, Link, spiral_point};
use super::hierarchical::rank_edges;
use super::ranking::{LayerGeometry, RankEdge, layered_positions};
use super::types::{NodeBox, Positions, apply_pinned, recenter};

const FORCE_TICKS: u32 = 300;

/// Reject edges whose endpoints are missing; the suite does not drop them
/// silently the way enrichment does.
pub fn validate(data: &GraphData) -> Result<(), LayoutError> {
    for edge in &data.edges {
        for endpoint in [&edge.src, &edge.dst] {
            if !data.nodes.contains_key(endpoint) {
                return Err(LayoutError::MalformedGraph(format!(
                    "edge {} -> {} references missing node {endpoint}",
                    edge.src, edge.dst
                )));
            }
        }
    }
    Ok(())
}

pub fn compute_positions(
    data: &GraphData,
    config: &LayeredConfig,
    viewport: Viewport,
) -> Result<Positions, LayoutError> {
    validate(data)?;
    let node_ids: Vec<String> = data.nodes.keys().cloned().collect();
    if node_ids.is_empty() {
        return Ok(Positions::new());
    }
    let edges = rank_edges(data);

    let boxes = match config.algorithm {
        LayeredAlgorithm::Layered => layered_boxes(&node_ids, &edges, config),
        LayeredAlgorithm::Force => force_boxes(&node_ids, &edges, config),
        LayeredAlgorithm::Tree => tree_boxes(&node_ids, &edges, config),
        LayeredAlgorithm::Radial => radial_boxes(&node_ids, &edges, config),
    };

    let mut positions: Positions = boxes
        .into_iter()
        .map(|(id, node_box)| (id, node_box.center()))
        .collect();
    let (cx, cy) = viewport.center();
    recenter(&mut positions, cx, cy);
    Ok(positions)
}

/// Synchronous layered layout; nodes are only touched when layout succeeds.
pub fn layered_layout(
    data: &mut GraphData,
    config: &LayeredConfig,
    viewport: Viewport,
) -> Result<Positions, LayoutError> {
    let positions = compute_positions(data, config, viewport)?;
    apply_pinned(data, &positions);
    tracing::debug!(
        nodes = positions.len(),
        algorithm = ?config.algorithm,
        "layered layout"
    );
    Ok(positions)
}

fn boxes_from_centers(centers: Positions, config: &LayeredConfig) -> Vec<(String, NodeBox)> {
    centers
        .into_iter()
        .map(|(id, (x, y))| (id, NodeBox::centered(x, y, config.node_width, config.node_height)))
        .collect()
}

fn layered_boxes(
    node_ids: &[String],
    edges: &[RankEdge],
    config: &LayeredConfig,
) -> Vec<(String, NodeBox)> {
    let geometry = LayerGeometry {
        direction: config.direction,
        node_width: config.node_width,
        node_height: config.node_height,
        rank_spacing: config.layer_spacing,
        node_spacing: config.node_spacing,
        placement: config.placement,
    };
    let centers = layered_positions(node_ids, edges, geometry, config.ordering_passes);
    boxes_from_centers(centers, config)
}

fn force_boxes(
    node_ids: &[String],
    edges: &[RankEdge],
    config: &LayeredConfig,
) -> Vec<(String, NodeBox)> {
    let index: HashMap<&str, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();
    let radius = config.node_width.max(config.node_height) / 2.0;
    let bodies: Vec<Body> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| {
            let (x, y) = spiral_point((0.0, 0.0), idx);
            Body::new(id.as_str(), x, y, radius)
        })
        .collect();
    let distance = config.layer_spacing + radius * 2.0;
    let links: Vec<Link> = edges
        .iter()
        .filter_map(|(from, to)| {
            Some(Link {
                source: *index.get(from.as_str())?,
                target: *index.get(to.as_str())?,
                distance,
            })
        })
        .collect();
    let mut sim = ForceSimulation::with_bodies(
        bodies,
        links,
        ForceParams::from_config(&ForceConfig::default(), Some((0.0, 0.0))),
    );
    sim.run(FORCE_TICKS);
    let centers: Positions = sim
        .bodies()
        .iter()
        .map(|body| (body.id.clone(), (body.x, body.y)))
        .collect();
    boxes_from_centers(centers, config)
}

/// Breadth-first spanning forest. Roots are nodes without incoming edges
/// in id order; nodes left over by cycles start new trees.
struct SpanningForest {
    order: Vec<String>,
    depth: HashMap<String, usize>,
    children: HashMap<String, Vec<String>>,
    roots: Vec<String>,
}

fn spanning_forest(node_ids: &[String], edges: &[RankEdge]) -> SpanningForest {
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_incoming: HashSet<&str> = HashSet::new();
    for (from, to) in edges {
        outgoing.entry(from.as_str()).or_default().push(to.as_str());
        has_incoming.insert(to.as_str());
    }

    let mut forest = SpanningForest {
        order: Vec::with_capacity(node_ids.len()),
        depth: HashMap::new(),
        children: HashMap::new(),
        roots: Vec::new(),
    };
    let candidates = node_ids
        .iter()
        .filter(|id| !has_incoming.contains(id.as_str()))
        .chain(node_ids.iter());
    for root in candidates {
        if forest.depth.contains_key(root) {
            continue;
        }
        forest.roots.push(root.clone());
        forest.depth.insert(root.clone(), 0);
        let mut queue: VecDeque<String> = VecDeque::from([root.clone()]);
        while let Some(id) = queue.pop_front() {
            let depth = forest.depth[&id];
            for next in outgoing.get(id.as_str()).map(Vec::as_slice).unwrap_or(&[]) {
                if forest.depth.contains_key(*next) {
                    continue;
                }
                forest.depth.insert((*next).to_string(), depth + 1);
                forest.children.entry(id.clone()).or_default().push((*next).to_string());
                queue.push_back((*next).to_string());
            }
            forest.order.push(id);
        }
    }
    forest
}

fn orient(direction: LayoutDirection, main: f32, cross: f32) -> (f32, f32) {
    match direction {
        LayoutDirection::Down => (cross, main),
        LayoutDirection::Up => (cross, -main),
        LayoutDirection::Right => (main, cross),
        LayoutDirection::Left => (-main, cross),
    }
}

/// Tidy tree: every subtree gets a band as wide as its leaf count and the
/// parent sits over the middle of its band.
fn tree_boxes(
    node_ids: &[String],
    edges: &[RankEdge],
    config: &LayeredConfig,
) -> Vec<(String, NodeBox)> {
    let forest = spanning_forest(node_ids, edges);
    let mut leaves: HashMap<&str, usize> = HashMap::new();
    for id in forest.order.iter().rev() {
        let count = forest
            .children
            .get(id)
            .map(|kids| kids.iter().map(|kid| leaves[kid.as_str()]).sum::<usize>())
            .unwrap_or(0);
        leaves.insert(id.as_str(), count.max(1));
    }

    let horizontal = config.direction.is_horizontal();
    let (along, across) = if horizontal {
        (config.node_width, config.node_height)
    } else {
        (config.node_height, config.node_width)
    };
    let slot = across + config.node_spacing;
    let level = along + config.layer_spacing;

    let mut start: HashMap<&str, usize> = HashMap::new();
    let mut cursor = 0usize;
    for root in &forest.roots {
        start.insert(root.as_str(), cursor);
        cursor += leaves[root.as_str()];
    }
    let mut centers = Positions::new();
    for id in &forest.order {
        let first = start[id.as_str()];
        let cross = (first as f32 + leaves[id.as_str()] as f32 / 2.0) * slot;
        let main = forest.depth[id] as f32 * level;
        centers.insert(id.clone(), orient(config.direction, main, cross));
        let mut next = first;
        for kid in forest.children.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            start.insert(kid.as_str(), next);
            next += leaves[kid.as_str()];
        }
    }
    boxes_from_centers(centers, config)
}

/// Concentric rings by breadth-first depth. A lone root sits in the
/// middle; several roots share the first ring.
fn radial_boxes(
    node_ids: &[String],
    edges: &[RankEdge],
    config: &LayeredConfig,
) -> Vec<(String, NodeBox)> {
    let forest = spanning_forest(node_ids, edges);
    let offset = usize::from(forest.roots.len() > 1);
    let mut rings: Vec<Vec<&str>> = Vec::new();
    for id in &forest.order {
        let ring = forest.depth[id] + offset;
        if rings.len() <= ring {
            rings.resize(ring + 1, Vec::new());
        }
        rings[ring].push(id.as_str());
    }

    let size = config.node_width.max(config.node_height);
    let gap = size + config.layer_spacing;
    let mut centers = Positions::new();
    let mut radius = 0.0f32;
    for (ring, members) in rings.iter().enumerate() {
        if ring == 0 && members.len() == 1 {
            centers.insert(members[0].to_string(), (0.0, 0.0));
            continue;
        }
        if members.is_empty() {
            continue;
        }
        let needed = members.len() as f32 * (size + config.node_spacing) / (2.0 * PI);
        radius = (radius + gap).max(needed);
        for (idx, id) in members.iter().enumerate() {
            let angle = 2.0 * PI * idx as f32 / members.len() as f32 - PI / 2.0;
            centers.insert((*id).to_string(), (radius * angle.cos(), radius * angle.sin()));
        }
    }
    boxes_from_centers(centers, config)
}

#[cfg(feature = "async")]
pub use runner::LayeredRunner;

#[cfg(feature = "async")]
mod runner {
    use std::future::Future;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    /// Runs the layered suite on the blocking pool. Each request takes a new
    /// generation; a request that finishes after a newer one started
    /// resolves to `LayoutError::Superseded`.
    #[derive(Debug, Clone, Default)]
    pub struct LayeredRunner {
        generation: Arc<AtomicU64>,
    }

    impl LayeredRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn generation(&self) -> u64 {
            self.generation.load(Ordering::SeqCst)
        }

        /// Supersede whatever is in flight without starting new work.
        pub fn cancel(&self) {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        /// Claims a generation immediately, so the order of `run` calls decides
        /// which request wins even before the futures are polled.
        pub fn run(
            &self,
            data: &GraphData,
            config: &LayeredConfig,
            viewport: Viewport,
        ) -> impl Future<Output = Result<Positions, LayoutError>> + Send + 'static {
            let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let current = Arc::clone(&self.generation);
            let snapshot = data.clone();
            let config = config.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    compute_positions(&snapshot, &config, viewport)
                })
                .await
                .map_err(|_| LayoutError::Cancelled)?;
                if current.load(Ordering::SeqCst) != ticket {
                    tracing::debug!(ticket, "layered layout superseded");
                    return Err(LayoutError::Superseded);
                }
                result
            }
        }

        /// Run and write positions back, pinning every node. On error the
        /// graph keeps its previous layout.
        pub async fn run_into(
            &self,
            data: &mut GraphData,
            config: &LayeredConfig,
            viewport: Viewport,
        ) -> Result<Positions, LayoutError> {
            let positions = self.run(data, config, viewport).await?;
            apply_pinned(data, &positions);
            Ok(positions)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodePlacement;
    use crate::ir::{Edge, Node};

    fn tree() -> GraphData {
        GraphData::new()
            .with_node(Node::new("root", "network"))
            .with_node(Node::new("a", "container"))
            .with_node(Node::new("b", "container"))
            .with_node(Node::new("a1", "volume"))
            .with_node(Node::new("a2", "volume"))
            .with_edge("root", "a", "connected_to")
            .with_edge("root", "b", "connected_to")
            .with_edge("a", "a1", "mounted_into")
            .with_edge("a", "a2", "mounted_into")
    }

    fn config(algorithm: LayeredAlgorithm) -> LayeredConfig {
        LayeredConfig {
            algorithm,
            ..LayeredConfig::default()
        }
    }

    fn assert_no_overlap(positions: &Positions, config: &LayeredConfig) {
        let boxes: Vec<NodeBox> = positions
            .values()
            .map(|(x, y)| NodeBox::centered(*x, *y, config.node_width, config.node_height))
            .collect();
        for i in 0..boxes.len() {
            for j in i + 1..boxes.len() {
                assert!(!boxes[i].overlaps(&boxes[j]), "{i} overlaps {j}");
            }
        }
    }

    #[test]
    fn node_ids_resembling_dummies_are_pinned() {
        let mut data = GraphData::new()
            .with_node(Node::new("a", "container"))
            .with_node(Node::new("__dummy_x", "network"))
            .with_node(Node::new("__dummy_0__", "volume"))
            .with_node(Node::new("c", "image"))
            .with_edge("a", "__dummy_x", "connected_to")
            .with_edge("__dummy_x", "c", "connected_to")
            .with_edge("a", "c", "derived_from");
        let positions =
            layered_layout(&mut data, &LayeredConfig::default(), Viewport::default()).unwrap();
        assert_eq!(positions.len(), 4);
        assert!(data.nodes.values().all(|n| n.is_pinned()));
    }

    #[test]
    fn every_algorithm_places_and_pins_all_nodes() {
        for algorithm in [
            LayeredAlgorithm::Layered,
            LayeredAlgorithm::Force,
            LayeredAlgorithm::Tree,
            LayeredAlgorithm::Radial,
        ] {
            let mut data = tree();
            let positions =
                layered_layout(&mut data, &config(algorithm), Viewport::default()).unwrap();
            assert_eq!(positions.len(), 5, "{algorithm:?}");
            assert!(data.nodes.values().all(|n| n.fx == Some(n.x) && n.fy == Some(n.y)));
        }
    }

    #[test]
    fn layered_places_children_below_parents() {
        for placement in [NodePlacement::Simple, NodePlacement::Balanced] {
            let config = LayeredConfig {
                placement,
                ..LayeredConfig::default()
            };
            let positions = compute_positions(&tree(), &config, Viewport::default()).unwrap();
            assert!(positions["root"].1 < positions["a"].1);
            assert!(positions["a"].1 < positions["a1"].1);
            assert_no_overlap(&positions, &config);
        }
    }

    #[test]
    fn tree_centers_parent_over_its_leaves() {
        let config = config(LayeredAlgorithm::Tree);
        let positions = compute_positions(&tree(), &config, Viewport::default()).unwrap();
        let a = positions["a"].0;
        let mid = (positions["a1"].0 + positions["a2"].0) / 2.0;
        assert!((a - mid).abs() < 1e-3);
        assert!(positions["root"].0 > a && positions["root"].0 < positions["b"].0);
        assert_no_overlap(&positions, &config);
    }

    #[test]
    fn radial_puts_single_root_in_the_middle() {
        let config = config(LayeredAlgorithm::Radial);
        let viewport = Viewport::new(2000.0, 2000.0);
        let positions = compute_positions(&tree(), &config, viewport).unwrap();
        let (rx, ry) = positions["root"];
        let ring =
            |id: &str| ((positions[id].0 - rx).powi(2) + (positions[id].1 - ry).powi(2)).sqrt();
        assert!((ring("a") - ring("b")).abs() < 1e-2);
        assert!(ring("a1") > ring("a"));
        assert_no_overlap(&positions, &config);
    }

    #[test]
    fn result_is_centered_on_viewport() {
        let viewport = Viewport::new(1000.0, 700.0);
        let positions = compute_positions(&tree(), &LayeredConfig::default(), viewport).unwrap();
        let xs: Vec<f32> = positions.values().map(|p| p.0).collect();
        let min = xs.iter().copied().fold(f32::MAX, f32::min);
        let max = xs.iter().copied().fold(f32::MIN, f32::max);
        assert!(((min + max) / 2.0 - 500.0).abs() < 1e-3);
    }

    #[test]
    fn missing_endpoint_is_rejected_and_positions_untouched() {
        let mut data = tree().with_node(Node::new("x", "image").with_position(5.0, 6.0));
        data.push_edge(Edge::new("x", "ghost", "derived_from"));
        let err =
            layered_layout(&mut data, &LayeredConfig::default(), Viewport::default()).unwrap_err();
        assert!(matches!(err, LayoutError::MalformedGraph(_)));
        assert_eq!((data.nodes["x"].x, data.nodes["x"].y), (5.0, 6.0));
        assert!(data.nodes.values().all(|n| !n.is_pinned()));
    }

    #[test]
    fn cyclic_graph_still_lays_out_as_tree() {
        let data = GraphData::new()
            .with_node(Node::new("a", "k"))
            .with_node(Node::new("b", "k"))
            .with_edge("a", "b", "k")
            .with_edge("b", "a", "k");
        let positions =
            compute_positions(&data, &config(LayeredAlgorithm::Tree), Viewport::default())
                .unwrap();
        assert_eq!(positions.len(), 2);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn newer_request_supersedes_older_one() {
        let runner = LayeredRunner::new();
        let first = runner.run(&tree(), &LayeredConfig::default(), Viewport::default());
        let second = runner.run(&tree(), &config(LayeredAlgorithm::Tree), Viewport::default());
        assert!(matches!(first.await, Err(LayoutError::Superseded)));
        assert_eq!(second.await.unwrap().len(), 5);
        assert_eq!(runner.generation(), 2);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn run_into_writes_only_on_success() {
        let runner = LayeredRunner::new();
        let mut data = tree();
        runner.run_into(&mut data, &LayeredConfig::default(), Viewport::default()).await.unwrap();
        assert!(data.nodes.values().all(|n| n.is_pinned()));

        let mut broken = tree();
        broken.push_edge(Edge::new("root", "ghost", "connected_to"));
        let result = runner
            .run_into(&mut broken, &LayeredConfig::default(), Viewport::default())
            .await;
        assert!(matches!(result, Err(LayoutError::MalformedGraph(_))));
        assert!(broken.nodes.values().all(|n| !n.is_pinned()));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn cancel_supersedes_in_flight_work() {
        let runner = LayeredRunner::new();
        let pending = runner.run(&tree(), &LayeredConfig::default(), Viewport::default());
        runner.cancel();
        assert!(matches!(pending.await, Err(LayoutError::Superseded)));
    }
}
