use crate::config::{Config, Viewport};
use crate::filter::{FilterStats, Filters, GraphConfig, filter_graph_with_stats};
use crate::ir::GraphData;
use crate::layout::{
    Community, EdgeSide, LayoutError, LayoutKind, RouteShape, RoutedEdge, apply_layout,
    community_layout, detect_communities, route_edges,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub layout: String,
    pub width: f32,
    pub height: f32,
    pub stats: FilterStats,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub communities: Vec<Community>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub kind: String,
    pub handles: [EdgeSide; 2],
    pub shape: RouteShape,
    pub path: String,
    pub label: [f32; 2],
    pub points: Vec<[f32; 2]>,
    pub collides: bool,
}

impl LayoutDump {
    pub fn from_graph(
        kind: LayoutKind,
        viewport: Viewport,
        data: &GraphData,
        routed: &[RoutedEdge],
        stats: FilterStats,
    ) -> Self {
        let nodes = data
            .nodes
            .values()
            .map(|node| NodeDump {
                id: node.id.clone(),
                kind: node.kind.clone(),
                name: node.name.clone(),
                x: node.x,
                y: node.y,
                pinned: node.is_pinned(),
                status: node.status().map(str::to_string),
                attributes: node.attributes.clone(),
            })
            .collect();

        let edges = routed
            .iter()
            .map(|edge| EdgeDump {
                from: edge.from.clone(),
                to: edge.to.clone(),
                kind: edge.kind.clone(),
                handles: [edge.handles.0, edge.handles.1],
                shape: edge.shape,
                path: edge.path.clone(),
                label: [edge.label.0, edge.label.1],
                points: edge.points.iter().map(|(x, y)| [*x, *y]).collect(),
                collides: edge.collides,
            })
            .collect();

        LayoutDump {
            layout: kind.as_str().to_string(),
            width: viewport.width,
            height: viewport.height,
            stats,
            nodes,
            edges,
            communities: Vec::new(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Filter, lay out and route `data` in one pass. Returns the laid-out
/// snapshot next to its dump so callers can persist positions.
pub fn build_layout_dump(
    data: &GraphData,
    filters: &Filters,
    graph_config: &GraphConfig,
    config: &Config,
    kind: LayoutKind,
) -> Result<(GraphData, LayoutDump), LayoutError> {
    let (mut visible, stats) = filter_graph_with_stats(data, filters, graph_config);
    let mut communities = Vec::new();
    if kind == LayoutKind::Community {
        // Lay out the same partition the dump reports.
        communities = detect_communities(&visible, &config.layout.community);
        community_layout(
            &mut visible,
            &communities,
            &config.layout.community,
            &config.layout.force,
            config.viewport,
        );
    } else {
        apply_layout(kind, &mut visible, &config.layout, config.viewport)?;
    }
    let routed = route_edges(&visible, &config.layout.routing);
    let mut dump = LayoutDump::from_graph(kind, config.viewport, &visible, &routed, stats);
    dump.communities = communities;
    Ok((visible, dump))
}

pub fn write_layout_dump(path: &Path, dump: &LayoutDump) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, dump)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Node;

    #[test]
    fn dump_lists_visible_nodes_and_routed_edges() {
        let data = GraphData::new()
            .with_node(Node::new("web", "container").with_attribute("status", "running"))
            .with_node(Node::new("cache", "container").with_attribute("status", "exited"))
            .with_node(Node::new("net", "network"))
            .with_edge("web", "net", "connected_to")
            .with_edge("cache", "net", "connected_to");
        let mut filters = Filters::default();
        filters.excluded_node_ids.insert("cache".to_string());
        let (visible, dump) = build_layout_dump(
            &data,
            &filters,
            &GraphConfig::default(),
            &Config::default(),
            LayoutKind::Structured,
        )
        .unwrap();

        assert_eq!(dump.layout, "structured");
        let ids: Vec<&str> = dump.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["net", "web"]);
        assert_eq!(dump.edges.len(), 1);
        assert!(dump.edges[0].path.starts_with("M "));
        assert_eq!(dump.stats.excluded, 1);
        assert!(visible.nodes.values().all(|n| n.is_pinned()));

        let json = dump.to_json().unwrap();
        assert!(json.contains("\"layout\": \"structured\""));
        assert!(!json.contains("communities"));
    }

    #[test]
    fn community_dump_carries_partition() {
        let data = GraphData::new()
            .with_node(Node::new("a", "container"))
            .with_node(Node::new("b", "container"))
            .with_edge("a", "b", "connected_to");
        let mut config = Config::default();
        config.layout.community.seed = Some(3);
        let (_, dump) = build_layout_dump(
            &data,
            &Filters::default(),
            &GraphConfig::default(),
            &config,
            LayoutKind::Community,
        )
        .unwrap();
        assert_eq!(dump.communities.len(), 1);
    }
}
