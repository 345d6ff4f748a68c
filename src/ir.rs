use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type Attributes = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
    /// Center position. A node at the origin with no pin counts as
    /// unplaced and is seeded by the force layout; pin it to keep it there.
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f32>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: kind.into(),
            attributes: Attributes::new(),
            x: 0.0,
            y: 0.0,
            fx: None,
            fy: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn status(&self) -> Option<&str> {
        self.attributes.get("status").and_then(Value::as_str)
    }

    /// True for an unpinned node at the origin, the default for input
    /// without positions.
    pub fn is_unplaced(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && !self.is_pinned()
    }

    pub fn is_pinned(&self) -> bool {
        self.fx.is_some() && self.fy.is_some()
    }

    pub fn pin(&mut self) {
        self.fx = Some(self.x);
        self.fy = Some(self.y);
    }

    pub fn place_pinned(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.pin();
    }

    pub fn release(&mut self) {
        self.fx = None;
        self.fy = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl Edge {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            kind: kind.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.src == node_id || self.dst == node_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default, with = "node_map")]
    pub nodes: BTreeMap<String, Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.insert_node(node);
        self
    }

    pub fn with_edge(mut self, src: &str, dst: &str, kind: &str) -> Self {
        self.push_edge(Edge::new(src, dst, kind));
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges whose endpoints both resolve to a node.
    pub fn valid_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(|edge| self.nodes.contains_key(&edge.src) && self.nodes.contains_key(&edge.dst))
    }
}

/// Nodes serialize as a list; the id field is the map key.
mod node_map {
    use super::Node;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NodeCollection {
        List(Vec<Node>),
        Map(BTreeMap<String, Node>),
    }

    pub fn serialize<S: Serializer>(
        nodes: &BTreeMap<String, Node>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&Node> = nodes.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Node>, D::Error> {
        let nodes = match NodeCollection::deserialize(deserializer)? {
            NodeCollection::List(list) => list
                .into_iter()
                .map(|node| (node.id.clone(), node))
                .collect(),
            NodeCollection::Map(map) => map
                .into_iter()
                .map(|(key, mut node)| {
                    node.id = key.clone();
                    (key, node)
                })
                .collect(),
        };
        Ok(nodes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryNodeKind {
    Container,
    Network,
    Image,
    Volume,
}

impl InventoryNodeKind {
    pub const ALL: [InventoryNodeKind; 4] = [
        InventoryNodeKind::Container,
        InventoryNodeKind::Network,
        InventoryNodeKind::Image,
        InventoryNodeKind::Volume,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Network => "network",
            Self::Image => "image",
            Self::Volume => "volume",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "container" => Some(Self::Container),
            "network" => Some(Self::Network),
            "image" => Some(Self::Image),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryEdgeKind {
    DerivedFrom,
    ConnectedTo,
    MountedInto,
}

impl InventoryEdgeKind {
    pub const ALL: [InventoryEdgeKind; 3] = [
        InventoryEdgeKind::DerivedFrom,
        InventoryEdgeKind::ConnectedTo,
        InventoryEdgeKind::MountedInto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DerivedFrom => "derived_from",
            Self::ConnectedTo => "connected_to",
            Self::MountedInto => "mounted_into",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "derived_from" => Some(Self::DerivedFrom),
            "connected_to" => Some(Self::ConnectedTo),
            "mounted_into" => Some(Self::MountedInto),
            _ => None,
        }
    }
}

impl From<InventoryNodeKind> for String {
    fn from(kind: InventoryNodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl From<InventoryEdgeKind> for String {
    fn from(kind: InventoryEdgeKind) -> Self {
        kind.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_node_list_and_map() {
        let list = r#"{"nodes":[{"id":"a","kind":"container"}],"edges":[]}"#;
        let data: GraphData = serde_json::from_str(list).unwrap();
        assert!(data.nodes.contains_key("a"));

        let map = r#"{"nodes":{"b":{"id":"ignored","kind":"volume","name":"data"}}}"#;
        let data: GraphData = serde_json::from_str(map).unwrap();
        assert_eq!(data.nodes["b"].id, "b");
        assert_eq!(data.nodes["b"].name, "data");
        assert!(data.edges.is_empty());
    }

    #[test]
    fn inventory_kinds_round_trip_tokens() {
        for kind in InventoryNodeKind::ALL {
            assert_eq!(InventoryNodeKind::from_token(kind.as_str()), Some(kind));
        }
        for kind in InventoryEdgeKind::ALL {
            assert_eq!(InventoryEdgeKind::from_token(kind.as_str()), Some(kind));
        }
        assert_eq!(InventoryNodeKind::from_token("pod"), None);
    }

    #[test]
    fn origin_counts_as_unplaced_unless_pinned() {
        let mut node = Node::new("a", "container");
        assert!(node.is_unplaced());
        node.pin();
        assert!(!node.is_unplaced());
        node.release();
        assert!(node.is_unplaced());
        assert!(!node.with_position(0.0, 5.0).is_unplaced());
    }

    #[test]
    fn valid_edges_skip_dangling_endpoints() {
        let data = GraphData::new()
            .with_node(Node::new("a", "image"))
            .with_node(Node::new("b", "container"))
            .with_edge("b", "a", "derived_from")
            .with_edge("b", "ghost", "connected_to");
        assert_eq!(data.valid_edges().count(), 1);
    }
}
