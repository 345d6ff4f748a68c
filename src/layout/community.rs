//! Greedy community detection and the two-level community layout.
//!
//! Detection visits nodes in shuffled order, so graphs with ties can land in
//! different partitions across runs. A configured seed fixes the order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::{CommunityConfig, ForceConfig, Viewport};
use crate::graph::EnrichedGraph;
use crate::ir::GraphData;

use super::force::{Body, ForceParams, ForceSimulation, Link};
use super::types::{NodeBox, Positions, apply_pinned, bounds_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Community {
    pub id: usize,
    pub members: BTreeSet<String>,
}

pub fn detect_communities(data: &GraphData, config: &CommunityConfig) -> Vec<Community> {
    match config.seed {
        Some(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            detect_communities_with(data, config.max_iterations, &mut rng)
        }
        None => detect_communities_with(data, config.max_iterations, &mut rand::thread_rng()),
    }
}

pub fn detect_communities_with<R: Rng + ?Sized>(
    data: &GraphData,
    max_iterations: usize,
    rng: &mut R,
) -> Vec<Community> {
    let graph = EnrichedGraph::new(data);
    let adjacency = graph.undirected_adjacency();
    let ids: Vec<&str> = data.nodes.keys().map(String::as_str).collect();
    let mut assignment: HashMap<&str, usize> =
        ids.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();

    let mut order = ids.clone();
    let mut passes = 0;
    for _ in 0..max_iterations {
        passes += 1;
        order.shuffle(rng);
        let mut moved = false;
        for id in &order {
            let Some(neighbors) = adjacency.get(id) else {
                continue;
            };
            if neighbors.is_empty() {
                continue;
            }
            let current = assignment[id];
            let mut weights: BTreeMap<usize, usize> = BTreeMap::new();
            for neighbor in neighbors {
                *weights.entry(assignment[neighbor]).or_insert(0) += 1;
            }
            let mut best = current;
            let mut best_weight = weights.get(&current).copied().unwrap_or(0);
            for (community, weight) in &weights {
                if *weight > best_weight {
                    best = *community;
                    best_weight = *weight;
                }
            }
            if best != current {
                assignment.insert(*id, best);
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    let mut dense: HashMap<usize, usize> = HashMap::new();
    let mut communities: Vec<Community> = Vec::new();
    for id in &ids {
        let raw = assignment[id];
        let next = dense.len();
        let slot = *dense.entry(raw).or_insert(next);
        if slot == communities.len() {
            communities.push(Community {
                id: slot,
                members: BTreeSet::new(),
            });
        }
        communities[slot].members.insert((*id).to_string());
    }
    tracing::debug!(
        nodes = ids.len(),
        communities = communities.len(),
        passes,
        "detected communities"
    );
    communities
}

/// Lay out each community locally, pack the clusters with a second
/// simulation, then translate and pin every node.
pub fn community_layout(
    data: &mut GraphData,
    communities: &[Community],
    config: &CommunityConfig,
    force: &ForceConfig,
    viewport: Viewport,
) -> Positions {
    let positions = community_positions(data, communities, config, force, viewport);
    apply_pinned(data, &positions);
    positions
}

pub fn community_positions(
    data: &GraphData,
    communities: &[Community],
    config: &CommunityConfig,
    force: &ForceConfig,
    viewport: Viewport,
) -> Positions {
    let center = viewport.center();
    let mut locals: Vec<(Positions, NodeBox)> = Vec::with_capacity(communities.len());
    for community in communities {
        locals.push(local_cluster_layout(data, community, config, force));
    }

    let centers = place_clusters(&locals, config, force, center);
    let mut positions = Positions::new();
    for ((local, _), (cx, cy)) in locals.iter().zip(centers) {
        for (id, (x, y)) in local {
            positions.insert(id.clone(), (x + cx, y + cy));
        }
    }
    positions
}

fn local_cluster_layout(
    data: &GraphData,
    community: &Community,
    config: &CommunityConfig,
    force: &ForceConfig,
) -> (Positions, NodeBox) {
    let members: Vec<&String> = community.members.iter().collect();
    let count = members.len();
    let index: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();

    let bodies: Vec<Body> = members
        .iter()
        .enumerate()
        .map(|(idx, id)| {
            let (x, y) = if count == 1 {
                (0.0, 0.0)
            } else {
                let angle = 2.0 * PI * idx as f32 / count as f32;
                (config.local_radius * angle.cos(), config.local_radius * angle.sin())
            };
            Body::new(id.as_str(), x, y, config.node_radius)
        })
        .collect();
    let links: Vec<Link> = data
        .valid_edges()
        .filter_map(|edge| {
            let source = *index.get(edge.src.as_str())?;
            let target = *index.get(edge.dst.as_str())?;
            (source != target).then_some(Link {
                source,
                target,
                distance: config.local_link_distance,
            })
        })
        .collect();

    let params = ForceParams {
        repulsion: config.local_repulsion,
        center: Some((0.0, 0.0)),
        ..ForceParams::from_config(force, None)
    };
    let mut sim = ForceSimulation::with_bodies(bodies, links, params);
    if count > 1 {
        sim.run(config.local_ticks);
    }

    let mut local: Positions = sim
        .bodies()
        .iter()
        .map(|body| (body.id.clone(), (body.x, body.y)))
        .collect();
    let r = config.node_radius;
    let bounds = bounds_of(local.values().copied(), r, r).unwrap_or(NodeBox {
        x: -r,
        y: -r,
        width: 2.0 * r,
        height: 2.0 * r,
    });
    let (bx, by) = bounds.center();
    for pos in local.values_mut() {
        pos.0 -= bx;
        pos.1 -= by;
    }
    let centered = NodeBox::centered(0.0, 0.0, bounds.width, bounds.height);
    (local, centered)
}

fn place_clusters(
    locals: &[(Positions, NodeBox)],
    config: &CommunityConfig,
    force: &ForceConfig,
    center: (f32, f32),
) -> Vec<(f32, f32)> {
    if locals.len() <= 1 {
        return vec![center; locals.len()];
    }
    let radii: Vec<f32> = locals
        .iter()
        .map(|(_, bounds)| {
            let half_diag =
                (bounds.width * bounds.width + bounds.height * bounds.height).sqrt() / 2.0;
            half_diag + config.cluster_padding / 2.0
        })
        .collect();
    let ring = radii.iter().sum::<f32>() / PI;
    let count = locals.len();
    let bodies: Vec<Body> = radii
        .iter()
        .enumerate()
        .map(|(idx, radius)| {
            let angle = 2.0 * PI * idx as f32 / count as f32;
            Body::new(
                format!("community-{idx}"),
                center.0 + ring * angle.cos(),
                center.1 + ring * angle.sin(),
                *radius,
            )
        })
        .collect();
    let params = ForceParams {
        repulsion: config.cluster_repulsion,
        gravity: config.cluster_center_strength,
        ..ForceParams::from_config(force, Some(center))
    };
    let mut sim = ForceSimulation::with_bodies(bodies, Vec::new(), params);
    sim.run(config.cluster_ticks);
    sim.bodies().iter().map(|body| (body.x, body.y)).collect()
}
