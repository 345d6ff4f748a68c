//! Read-only navigation over a [`GraphData`] snapshot.
//!
//! Enrichment resolves every edge to its endpoint nodes and indexes incident
//! edges per node. Edges whose endpoints are missing never appear in the
//! enriched view.

use std::collections::{HashMap, HashSet};

use crate::ir::{Edge, GraphData, Node};

#[derive(Debug, Clone, Copy)]
pub struct EnrichedEdge<'a> {
    /// Position of the edge in the original edge sequence.
    pub index: usize,
    pub edge: &'a Edge,
    pub source: &'a Node,
    pub target: &'a Node,
}

#[derive(Debug, Default, Clone)]
struct Adjacency {
    incoming: Vec<usize>,
    outgoing: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct EnrichedGraph<'a> {
    data: &'a GraphData,
    edges: Vec<EnrichedEdge<'a>>,
    adjacency: HashMap<&'a str, Adjacency>,
}

impl<'a> EnrichedGraph<'a> {
    pub fn new(data: &'a GraphData) -> Self {
        let mut edges = Vec::with_capacity(data.edges.len());
        let mut adjacency: HashMap<&'a str, Adjacency> = data
            .nodes
            .keys()
            .map(|id| (id.as_str(), Adjacency::default()))
            .collect();

        for (index, edge) in data.edges.iter().enumerate() {
            let (Some(source), Some(target)) =
                (data.nodes.get(&edge.src), data.nodes.get(&edge.dst))
            else {
                continue;
            };
            let slot = edges.len();
            edges.push(EnrichedEdge {
                index,
                edge,
                source,
                target,
            });
            if let Some(adj) = adjacency.get_mut(source.id.as_str()) {
                adj.outgoing.push(slot);
            }
            if let Some(adj) = adjacency.get_mut(target.id.as_str()) {
                adj.incoming.push(slot);
            }
        }

        Self {
            data,
            edges,
            adjacency,
        }
    }

    pub fn data(&self) -> &'a GraphData {
        self.data
    }

    pub fn node(&self, id: &str) -> Option<&'a Node> {
        self.data.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &'a Node> + '_ {
        self.data.nodes.values()
    }

    pub fn edges(&self) -> &[EnrichedEdge<'a>] {
        &self.edges
    }

    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &EnrichedEdge<'a>> + '_ {
        self.adjacency
            .get(id)
            .map(|adj| adj.outgoing.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|slot| &self.edges[*slot])
    }

    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &EnrichedEdge<'a>> + '_ {
        self.adjacency
            .get(id)
            .map(|adj| adj.incoming.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|slot| &self.edges[*slot])
    }

    /// Incoming sources followed by outgoing targets, each node once.
    pub fn neighbors(&self, id: &str) -> Vec<&'a Node> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let sources = self.incoming(id).map(|edge| edge.source);
        let targets = self.outgoing(id).map(|edge| edge.target);
        for node in sources.chain(targets) {
            if seen.insert(node.id.as_str()) {
                out.push(node);
            }
        }
        out
    }

    pub fn degree(&self, id: &str) -> usize {
        self.adjacency
            .get(id)
            .map(|adj| adj.incoming.len() + adj.outgoing.len())
            .unwrap_or(0)
    }

    /// Undirected adjacency by node id, used by clustering and tree layouts.
    pub fn undirected_adjacency(&self) -> HashMap<&'a str, Vec<&'a str>> {
        let mut adj: HashMap<&'a str, Vec<&'a str>> = self
            .data
            .nodes
            .keys()
            .map(|id| (id.as_str(), Vec::new()))
            .collect();
        for edge in &self.edges {
            let src = edge.source.id.as_str();
            let dst = edge.target.id.as_str();
            if src == dst {
                continue;
            }
            adj.entry(src).or_default().push(dst);
            adj.entry(dst).or_default().push(src);
        }
        adj
    }
}
