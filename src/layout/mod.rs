mod community;
mod force;
mod hierarchical;
mod layered;
mod ranking;
mod routing;
mod structured;
pub(crate) mod types;

pub use community::*;
pub use force::*;
pub use hierarchical::{hierarchical_layout, hierarchical_positions};
pub use layered::*;
pub use routing::{
    EdgeSide, RouteShape, RoutedEdge, arc_midpoint, compress_path, handles_between, nearest_handle,
    path_collides, path_length, route_between, route_edges, sample_path, svg_path,
};
pub use structured::*;
pub use types::*;

use thiserror::Error;

use crate::config::{LayoutConfig, Viewport};
use crate::ir::GraphData;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("malformed graph: {0}")]
    MalformedGraph(String),
    #[error("layout superseded by a newer request")]
    Superseded,
    #[error("layout cancelled")]
    Cancelled,
    #[error("unknown layout `{0}`")]
    UnknownLayout(String),
}

pub fn parse_layout_kind(token: &str) -> Result<LayoutKind, LayoutError> {
    LayoutKind::from_token(token).ok_or_else(|| LayoutError::UnknownLayout(token.to_string()))
}

/// Run one layout to completion, writing positions into `data`. Static
/// layouts pin every node; the force layout runs until it settles or hits
/// `force.max_ticks` and leaves nodes unpinned.
pub fn apply_layout(
    kind: LayoutKind,
    data: &mut GraphData,
    config: &LayoutConfig,
    viewport: Viewport,
) -> Result<Positions, LayoutError> {
    tracing::debug!(layout = kind.as_str(), nodes = data.node_count(), "layout start");
    let positions = match kind {
        LayoutKind::Force => {
            let mut sim = ForceSimulation::new(data, &config.force, viewport);
            let ticks = sim.run(config.force.max_ticks);
            sim.write_back(data);
            tracing::trace!(ticks, "force simulation stopped");
            data.nodes
                .values()
                .map(|node| (node.id.clone(), (node.x, node.y)))
                .collect()
        }
        LayoutKind::Structured => {
            structured_layout(data, &config.structured, viewport);
            structured_positions(data, &config.structured, viewport)
        }
        LayoutKind::Community => {
            let communities = detect_communities(data, &config.community);
            community_layout(data, &communities, &config.community, &config.force, viewport)
        }
        LayoutKind::Hierarchical => {
            let positions = hierarchical_positions(data, &config.hierarchical, viewport);
            apply_pinned(data, &positions);
            positions
        }
        LayoutKind::Layered => layered_layout(data, &config.layered, viewport)?,
    };
    tracing::debug!(layout = kind.as_str(), placed = positions.len(), "layout finished");
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Node;

    fn sample() -> GraphData {
        GraphData::new()
            .with_node(Node::new("web", "container"))
            .with_node(Node::new("db", "container"))
            .with_node(Node::new("net", "network"))
            .with_node(Node::new("img", "image"))
            .with_edge("web", "net", "connected_to")
            .with_edge("db", "net", "connected_to")
            .with_edge("web", "img", "derived_from")
    }

    #[test]
    fn every_kind_places_every_node() {
        for kind in LayoutKind::ALL {
            let mut data = sample();
            let layout = LayoutConfig::default();
            let positions = apply_layout(kind, &mut data, &layout, Viewport::default()).unwrap();
            assert_eq!(positions.len(), 4, "{kind:?}");
            assert!(data.nodes.values().all(|n| n.x.is_finite() && n.y.is_finite()));
            assert_eq!(
                data.nodes.values().all(|n| n.is_pinned()),
                kind.is_static(),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn unknown_layout_token_is_an_error() {
        assert_eq!(parse_layout_kind("Community").unwrap(), LayoutKind::Community);
        assert_eq!(
            parse_layout_kind("spiral"),
            Err(LayoutError::UnknownLayout("spiral".to_string()))
        );
    }

    #[test]
    fn empty_graph_is_fine_for_every_kind() {
        for kind in LayoutKind::ALL {
            let mut data = GraphData::new();
            let layout = LayoutConfig::default();
            let positions = apply_layout(kind, &mut data, &layout, Viewport::default()).unwrap();
            assert!(positions.is_empty());
        }
    }
}
