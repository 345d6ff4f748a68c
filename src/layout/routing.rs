//! Edge routing over laid-out node boxes: four-handle endpoint selection,
//! right-angle candidates with obstacle sampling and an arc-length label
//! anchor.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::RoutingConfig;
use crate::ir::{Edge, GraphData};

use super::types::NodeBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl EdgeSide {
    pub const ALL: [EdgeSide; 4] = [
        EdgeSide::Top,
        EdgeSide::Bottom,
        EdgeSide::Left,
        EdgeSide::Right,
    ];

    pub fn point(self, node: &NodeBox) -> (f32, f32) {
        let (cx, cy) = node.center();
        match self {
            Self::Top => (cx, node.y),
            Self::Bottom => (cx, node.y + node.height),
            Self::Left => (node.x, cy),
            Self::Right => (node.x + node.width, cy),
        }
    }
}

/// Ranked candidate shapes. Lower is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteShape {
    HorizontalFirst,
    VerticalFirst,
    Corridor,
    SideCorridor,
    Fallback,
    Straight,
    SelfLoop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedEdge {
    pub from: String,
    pub to: String,
    pub kind: String,
    /// Index among edges joining the same unordered pair, in edge order.
    pub parallel_index: usize,
    pub handles: (EdgeSide, EdgeSide),
    pub shape: RouteShape,
    pub points: Vec<(f32, f32)>,
    pub path: String,
    pub label: (f32, f32),
    /// Set when no candidate avoided every obstacle.
    pub collides: bool,
}

#[derive(Debug, Clone)]
struct Candidate {
    priority: u8,
    shape: RouteShape,
    points: Vec<(f32, f32)>,
}

/// Handle on `node` nearest (Euclidean) to `toward`. Ties keep the
/// `EdgeSide::ALL` order.
pub fn nearest_handle(node: &NodeBox, toward: (f32, f32)) -> EdgeSide {
    let mut best = EdgeSide::Top;
    let mut best_dist = f32::MAX;
    for side in EdgeSide::ALL {
        let (x, y) = side.point(node);
        let dist = (x - toward.0).powi(2) + (y - toward.1).powi(2);
        if dist < best_dist {
            best = side;
            best_dist = dist;
        }
    }
    best
}

pub fn handles_between(from: &NodeBox, to: &NodeBox) -> (EdgeSide, EdgeSide) {
    (nearest_handle(from, to.center()), nearest_handle(to, from.center()))
}

fn orthogonal_candidates(
    start: (f32, f32),
    end: (f32, f32),
    edge_index: usize,
    config: &RoutingConfig,
) -> Vec<Candidate> {
    let (sx, sy) = start;
    let (tx, ty) = end;
    let horizontal_major = (tx - sx).abs() >= (ty - sy).abs();
    let (h_priority, v_priority) = if horizontal_major { (0, 1) } else { (1, 0) };

    let offset = (edge_index as f32 + 1.0) * config.detour_step;
    let sign = if edge_index % 2 == 0 { 1.0 } else { -1.0 };
    let corridor_y = if sign > 0.0 { sy.max(ty) + offset } else { sy.min(ty) - offset };
    let corridor_x = if sign > 0.0 { sx.max(tx) + offset } else { sx.min(tx) - offset };

    let fallback = if horizontal_major {
        let mid = (sx + tx) / 2.0 + config.fallback_offset;
        vec![start, (mid, sy), (mid, ty), end]
    } else {
        let mid = (sy + ty) / 2.0 + config.fallback_offset;
        vec![start, (sx, mid), (tx, mid), end]
    };

    vec![
        Candidate {
            priority: h_priority,
            shape: RouteShape::HorizontalFirst,
            points: vec![start, (tx, sy), end],
        },
        Candidate {
            priority: v_priority,
            shape: RouteShape::VerticalFirst,
            points: vec![start, (sx, ty), end],
        },
        Candidate {
            priority: 2,
            shape: RouteShape::Corridor,
            points: vec![start, (sx, corridor_y), (tx, corridor_y), end],
        },
        Candidate {
            priority: 3,
            shape: RouteShape::SideCorridor,
            points: vec![start, (corridor_x, sy), (corridor_x, ty), end],
        },
        Candidate {
            priority: 4,
            shape: RouteShape::Fallback,
            points: fallback,
        },
    ]
}

/// `samples` evenly spaced points per segment, both ends included.
pub fn sample_path(points: &[(f32, f32)], samples: usize) -> Vec<(f32, f32)> {
    let samples = samples.max(2);
    let mut out = Vec::with_capacity(points.len().saturating_sub(1) * samples);
    for segment in points.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        for step in 0..samples {
            let t = step as f32 / (samples - 1) as f32;
            out.push((a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t));
        }
    }
    out
}

pub fn path_collides(points: &[(f32, f32)], obstacles: &[NodeBox], samples: usize) -> bool {
    sample_path(points, samples)
        .into_iter()
        .any(|point| obstacles.iter().any(|obstacle| obstacle.contains(point)))
}

/// Drop repeated points and interior points on a straight run.
pub fn compress_path(points: &[(f32, f32)]) -> Vec<(f32, f32)> {
    let mut out: Vec<(f32, f32)> = Vec::with_capacity(points.len());
    for &curr in points {
        if let Some(&prev) = out.last() {
            if (curr.0 - prev.0).abs() <= 1e-4 && (curr.1 - prev.1).abs() <= 1e-4 {
                continue;
            }
        }
        if out.len() >= 2 {
            let prev = out[out.len() - 1];
            let before = out[out.len() - 2];
            let (ax, ay) = (prev.0 - before.0, prev.1 - before.1);
            let (bx, by) = (curr.0 - prev.0, curr.1 - prev.1);
            let cross = ax * by - ay * bx;
            let forward = ax * bx + ay * by;
            if cross.abs() <= 1e-4 && forward > 0.0 {
                out.pop();
            }
        }
        out.push(curr);
    }
    out
}

pub fn path_length(points: &[(f32, f32)]) -> f32 {
    let mut length = 0.0;
    for segment in points.windows(2) {
        let dx = segment[1].0 - segment[0].0;
        let dy = segment[1].1 - segment[0].1;
        length += (dx * dx + dy * dy).sqrt();
    }
    length
}

/// Point halfway along the path measured by arc length.
pub fn arc_midpoint(points: &[(f32, f32)]) -> Option<(f32, f32)> {
    let first = *points.first()?;
    let mut remaining = path_length(points) / 2.0;
    for segment in points.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        let len = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
        if len > 0.0 && remaining <= len {
            let t = remaining / len;
            return Some((a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t));
        }
        remaining -= len;
    }
    Some(points.last().copied().unwrap_or(first))
}

pub fn svg_path(points: &[(f32, f32)]) -> String {
    let mut path = String::new();
    for (idx, (x, y)) in points.iter().enumerate() {
        if idx > 0 {
            path.push(' ');
        }
        path.push_str(if idx == 0 { "M " } else { "L " });
        path.push_str(&format!("{} {}", round2(*x), round2(*y)));
    }
    path
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Route one edge between two boxes. `obstacles` must already exclude the
/// endpoint boxes.
pub fn route_between(
    from: &NodeBox,
    to: &NodeBox,
    edge_index: usize,
    obstacles: &[NodeBox],
    config: &RoutingConfig,
) -> (EdgeSide, EdgeSide, RouteShape, Vec<(f32, f32)>, bool) {
    let (start_side, end_side) = handles_between(from, to);
    let start = start_side.point(from);
    let end = end_side.point(to);
    if !config.orthogonal {
        return (start_side, end_side, RouteShape::Straight, vec![start, end], false);
    }

    let padded: Vec<NodeBox> = obstacles
        .iter()
        .map(|obstacle| obstacle.padded(config.obstacle_padding))
        .collect();
    let mut candidates = orthogonal_candidates(start, end, edge_index, config);
    candidates.sort_by_key(|candidate| candidate.priority);

    let winner = candidates
        .iter()
        .find(|candidate| !path_collides(&candidate.points, &padded, config.samples_per_segment));
    let (chosen, collides) = match winner {
        Some(candidate) => (candidate, false),
        None => match candidates.last() {
            Some(candidate) => (candidate, true),
            None => return (start_side, end_side, RouteShape::Straight, vec![start, end], false),
        },
    };
    (
        start_side,
        end_side,
        chosen.shape,
        compress_path(&chosen.points),
        collides,
    )
}

fn route_self_loop(node: &NodeBox, edge_index: usize, config: &RoutingConfig) -> Vec<(f32, f32)> {
    let reach = config.fallback_offset / 2.0 + edge_index as f32 * config.detour_step / 2.0;
    let start = EdgeSide::Right.point(node);
    let end = EdgeSide::Top.point(node);
    vec![
        start,
        (start.0 + reach, start.1),
        (start.0 + reach, end.1 - reach),
        (end.0, end.1 - reach),
        end,
    ]
}

pub(super) fn edge_pair_key(edge: &Edge) -> (String, String) {
    if edge.src <= edge.dst {
        (edge.src.clone(), edge.dst.clone())
    } else {
        (edge.dst.clone(), edge.src.clone())
    }
}

/// Route every valid edge of `data` against its current node positions.
pub fn route_edges(data: &GraphData, config: &RoutingConfig) -> Vec<RoutedEdge> {
    let boxes: HashMap<&str, NodeBox> = data
        .nodes
        .values()
        .map(|node| {
            (
                node.id.as_str(),
                NodeBox::centered(node.x, node.y, config.node_width, config.node_height),
            )
        })
        .collect();
    let mut pair_seen: HashMap<(String, String), usize> = HashMap::new();
    let mut routed = Vec::new();
    let mut fallbacks = 0usize;

    for edge in data.valid_edges() {
        let (Some(&from), Some(&to)) = (boxes.get(edge.src.as_str()), boxes.get(edge.dst.as_str()))
        else {
            continue;
        };
        let counter = pair_seen.entry(edge_pair_key(edge)).or_insert(0);
        let parallel_index = *counter;
        *counter += 1;

        let (handles, shape, points, collides) = if edge.src == edge.dst {
            let points = route_self_loop(&from, parallel_index, config);
            ((EdgeSide::Right, EdgeSide::Top), RouteShape::SelfLoop, points, false)
        } else {
            let obstacles: Vec<NodeBox> = boxes
                .iter()
                .filter(|(id, _)| **id != edge.src && **id != edge.dst)
                .map(|(_, node_box)| *node_box)
                .collect();
            let (start, end, shape, points, collides) =
                route_between(&from, &to, parallel_index, &obstacles, config);
            ((start, end), shape, points, collides)
        };
        if collides {
            fallbacks += 1;
        }
        let label = arc_midpoint(&points).unwrap_or(from.center());
        routed.push(RoutedEdge {
            from: edge.src.clone(),
            to: edge.dst.clone(),
            kind: edge.kind.clone(),
            parallel_index,
            handles,
            shape,
            path: svg_path(&points),
            points,
            label,
            collides,
        });
    }
    if fallbacks > 0 {
        tracing::debug!(fallbacks, edges = routed.len(), "routing used fallback paths");
    }
    routed
}
