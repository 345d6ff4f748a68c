use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::config::{LayoutDirection, NodePlacement};

use super::types::Positions;

/// Directed edge between two layout node ids.
pub(super) type RankEdge = (String, String);

/// Longest-path ranks over a declaration-ordered topological sort. Cycles
/// are broken at the remaining node earliest in `node_ids`; its incoming
/// edges are treated as back-edges.
pub(super) fn compute_ranks(node_ids: &[String], edges: &[RankEdge]) -> HashMap<String, usize> {
    let order_key: HashMap<&str, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indeg: HashMap<&str, usize> = node_ids.iter().map(|id| (id.as_str(), 0)).collect();
    for (from, to) in edges {
        if from == to
            || !order_key.contains_key(from.as_str())
            || !order_key.contains_key(to.as_str())
        {
            continue;
        }
        adj.entry(from.as_str()).or_default().push(to.as_str());
        *indeg.entry(to.as_str()).or_insert(0) += 1;
    }

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = BinaryHeap::new();
    for id in node_ids {
        if indeg[id.as_str()] == 0 {
            ready.push(Reverse((order_key[id.as_str()], id.as_str())));
        }
    }

    let mut order: Vec<&str> = Vec::with_capacity(node_ids.len());
    let mut processed: HashSet<&str> = HashSet::new();
    loop {
        while let Some(Reverse((_, id))) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            for next in adj.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                if processed.contains(next) {
                    continue;
                }
                if let Some(deg) = indeg.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse((order_key[next], *next)));
                    }
                }
            }
        }
        if processed.len() >= node_ids.len() {
            break;
        }
        let Some(breaker) = node_ids.iter().find(|id| !processed.contains(id.as_str())) else {
            break;
        };
        ready.push(Reverse((order_key[breaker.as_str()], breaker.as_str())));
    }

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(idx, id)| (*id, idx))
        .collect();
    let mut ranks: HashMap<String, usize> = HashMap::new();
    for id in &order {
        let rank = *ranks.entry((*id).to_string()).or_insert(0);
        let from_idx = position[id];
        for next in adj.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            if position[next] <= from_idx {
                continue;
            }
            let entry = ranks.entry((*next).to_string()).or_insert(0);
            *entry = (*entry).max(rank + 1);
        }
    }
    ranks
}

/// Group ids by rank, keeping `node_ids` order inside each bucket.
pub(super) fn rank_buckets(
    node_ids: &[String],
    ranks: &HashMap<String, usize>,
) -> Vec<Vec<String>> {
    let depth = ranks.values().copied().max().map(|max| max + 1).unwrap_or(0);
    let mut buckets: Vec<Vec<String>> = vec![Vec::new(); depth];
    for id in node_ids {
        if let Some(rank) = ranks.get(id) {
            buckets[*rank].push(id.clone());
        }
    }
    buckets
}

/// Median-heuristic crossing reduction, alternating downward and upward
/// sweeps. Ties keep the current order, then declaration order.
pub(super) fn order_rank_nodes(
    rank_nodes: &mut [Vec<String>],
    edges: &[RankEdge],
    node_order: &HashMap<String, usize>,
    passes: usize,
) {
    if rank_nodes.len() <= 1 {
        return;
    }
    let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
    let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
    for (from, to) in edges {
        outgoing.entry(from.clone()).or_default().push(to.clone());
        incoming.entry(to.clone()).or_default().push(from.clone());
    }

    let mut positions = bucket_positions(rank_nodes);
    let sort_bucket = |bucket: &mut Vec<String>,
                       neighbors: &HashMap<String, Vec<String>>,
                       positions: &HashMap<String, usize>| {
        let current: HashMap<String, usize> = bucket
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        bucket.sort_by(|a, b| {
            let a_score = median_position(a, neighbors, positions, &current);
            let b_score = median_position(b, neighbors, positions, &current);
            a_score
                .partial_cmp(&b_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| current[a].cmp(&current[b]))
                .then_with(|| {
                    let a_order = node_order.get(a).copied().unwrap_or(usize::MAX);
                    let b_order = node_order.get(b).copied().unwrap_or(usize::MAX);
                    a_order.cmp(&b_order)
                })
        });
    };

    for _ in 0..passes.max(1) {
        for rank in 1..rank_nodes.len() {
            if rank_nodes[rank].len() > 1 {
                sort_bucket(&mut rank_nodes[rank], &incoming, &positions);
                positions = bucket_positions(rank_nodes);
            }
        }
        for rank in (0..rank_nodes.len() - 1).rev() {
            if rank_nodes[rank].len() > 1 {
                sort_bucket(&mut rank_nodes[rank], &outgoing, &positions);
                positions = bucket_positions(rank_nodes);
            }
        }
    }
}

fn bucket_positions(rank_nodes: &[Vec<String>]) -> HashMap<String, usize> {
    let mut positions = HashMap::new();
    for bucket in rank_nodes {
        for (idx, id) in bucket.iter().enumerate() {
            positions.insert(id.clone(), idx);
        }
    }
    positions
}

pub(super) fn median_position(
    node_id: &str,
    neighbors: &HashMap<String, Vec<String>>,
    positions: &HashMap<String, usize>,
    current: &HashMap<String, usize>,
) -> f32 {
    let fallback = *current.get(node_id).unwrap_or(&0) as f32;
    let Some(list) = neighbors.get(node_id) else {
        return fallback;
    };
    let mut values: Vec<f32> = list
        .iter()
        .filter_map(|neighbor| positions.get(neighbor).map(|pos| *pos as f32))
        .collect();
    if values.is_empty() {
        return fallback;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}

/// Spacing and box size used to turn ordered rank buckets into centers.
#[derive(Debug, Clone, Copy)]
pub(super) struct LayerGeometry {
    pub direction: LayoutDirection,
    pub node_width: f32,
    pub node_height: f32,
    pub rank_spacing: f32,
    pub node_spacing: f32,
    pub placement: NodePlacement,
}

/// Assign centers to ordered buckets. Output is centered on the origin
/// along the cross axis of each layer.
pub(super) fn place_layers(
    rank_nodes: &[Vec<String>],
    edges: &[RankEdge],
    geometry: LayerGeometry,
) -> Positions {
    let horizontal = geometry.direction.is_horizontal();
    let (along, across) = if horizontal {
        (geometry.node_width, geometry.node_height)
    } else {
        (geometry.node_height, geometry.node_width)
    };
    let step = across + geometry.node_spacing;

    let mut cross: Vec<Vec<f32>> = rank_nodes
        .iter()
        .map(|bucket| {
            let offset = (bucket.len() as f32 - 1.0) * step / 2.0;
            (0..bucket.len()).map(|idx| idx as f32 * step - offset).collect()
        })
        .collect();

    if geometry.placement == NodePlacement::Balanced {
        balance_layers(rank_nodes, edges, &mut cross, step);
    }

    let mut positions = Positions::new();
    for (rank, bucket) in rank_nodes.iter().enumerate() {
        let main = rank as f32 * (along + geometry.rank_spacing);
        for (idx, id) in bucket.iter().enumerate() {
            let c = cross[rank][idx];
            let pos = match geometry.direction {
                LayoutDirection::Down => (c, main),
                LayoutDirection::Up => (c, -main),
                LayoutDirection::Right => (main, c),
                LayoutDirection::Left => (-main, c),
            };
            positions.insert(id.clone(), pos);
        }
    }
    positions
}

/// Pull each node towards the mean of its neighbours in adjacent layers
/// while keeping bucket order and a minimum gap of `step`.
fn balance_layers(
    rank_nodes: &[Vec<String>],
    edges: &[RankEdge],
    cross: &mut [Vec<f32>],
    step: f32,
) {
    let mut slot: HashMap<&str, (usize, usize)> = HashMap::new();
    for (rank, bucket) in rank_nodes.iter().enumerate() {
        for (idx, id) in bucket.iter().enumerate() {
            slot.insert(id.as_str(), (rank, idx));
        }
    }
    let mut neighbors: HashMap<(usize, usize), Vec<(usize, usize)>> = HashMap::new();
    for (from, to) in edges {
        let (Some(a), Some(b)) = (slot.get(from.as_str()), slot.get(to.as_str())) else {
            continue;
        };
        if a.0.abs_diff(b.0) != 1 {
            continue;
        }
        neighbors.entry(*a).or_default().push(*b);
        neighbors.entry(*b).or_default().push(*a);
    }

    for _ in 0..4 {
        for rank in 0..rank_nodes.len() {
            let len = rank_nodes[rank].len();
            if len == 0 {
                continue;
            }
            let desired: Vec<f32> = (0..len)
                .map(|idx| match neighbors.get(&(rank, idx)) {
                    Some(list) if !list.is_empty() => {
                        list.iter().map(|(r, i)| cross[*r][*i]).sum::<f32>() / list.len() as f32
                    }
                    _ => cross[rank][idx],
                })
                .collect();
            let mut placed = desired.clone();
            for idx in 1..len {
                placed[idx] = placed[idx].max(placed[idx - 1] + step);
            }
            // Shift the packed row so its mean matches the desired mean.
            let shift = (desired.iter().sum::<f32>() - placed.iter().sum::<f32>()) / len as f32;
            for (idx, value) in placed.iter().enumerate() {
                cross[rank][idx] = value + shift;
            }
        }
    }
}

/// Full rank-based pass: ranks, dummy chains for edges spanning several
/// ranks, crossing reduction, then placement. Dummy ids skip any id already
/// in `node_ids` and never reach the returned positions.
pub(super) fn layered_positions(
    node_ids: &[String],
    edges: &[RankEdge],
    geometry: LayerGeometry,
    passes: usize,
) -> Positions {
    let ranks = compute_ranks(node_ids, edges);
    let mut rank_nodes = rank_buckets(node_ids, &ranks);
    let mut order_map: HashMap<String, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.clone(), idx))
        .collect();

    let mut expanded: Vec<RankEdge> = Vec::new();
    let mut dummies: HashSet<String> = HashSet::new();
    let mut dummy_counter = 0usize;
    for (from, to) in edges {
        let (Some(&from_rank), Some(&to_rank)) = (ranks.get(from), ranks.get(to)) else {
            continue;
        };
        if to_rank <= from_rank {
            continue;
        }
        let span = to_rank - from_rank;
        if span == 1 {
            expanded.push((from.clone(), to.clone()));
            continue;
        }
        let mut prev = from.clone();
        for step in 1..span {
            let dummy = loop {
                let candidate = format!("__dummy_{dummy_counter}__");
                dummy_counter += 1;
                if !order_map.contains_key(&candidate) {
                    break candidate;
                }
            };
            dummies.insert(dummy.clone());
            let order_idx = order_map.len();
            order_map.insert(dummy.clone(), order_idx);
            rank_nodes[from_rank + step].push(dummy.clone());
            expanded.push((prev, dummy.clone()));
            prev = dummy;
        }
        expanded.push((prev, to.clone()));
    }

    order_rank_nodes(&mut rank_nodes, &expanded, &order_map, passes);
    let mut positions = place_layers(&rank_nodes, &expanded, geometry);
    positions.retain(|id, _| !dummies.contains(id));
    positions
}
