use std::collections::BTreeMap;

use crate::config::{StructuredConfig, Viewport};
use crate::ir::GraphData;

use super::types::{Positions, apply_pinned};

/// Kinds in column order: configured kinds first (if present), then the
/// remaining kinds sorted.
pub fn column_kinds(data: &GraphData, config: &StructuredConfig) -> Vec<String> {
    let mut present: Vec<String> = Vec::new();
    for node in data.nodes.values() {
        if !present.contains(&node.kind) {
            present.push(node.kind.clone());
        }
    }
    let mut ordered: Vec<String> = config
        .kind_order
        .iter()
        .filter(|kind| present.contains(kind))
        .cloned()
        .collect();
    let mut rest: Vec<String> = present
        .into_iter()
        .filter(|kind| !ordered.contains(kind))
        .collect();
    rest.sort();
    ordered.extend(rest);
    ordered
}

pub fn structured_positions(
    data: &GraphData,
    config: &StructuredConfig,
    viewport: Viewport,
) -> Positions {
    let kinds = column_kinds(data, config);
    let mut positions = Positions::new();
    if kinds.is_empty() {
        return positions;
    }

    let mut columns: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for node in data.nodes.values() {
        columns.entry(node.kind.as_str()).or_default().push(node.id.as_str());
    }

    let column_width = viewport.width / kinds.len() as f32;
    for (col, kind) in kinds.iter().enumerate() {
        let Some(members) = columns.get(kind.as_str()) else {
            continue;
        };
        let x = column_width * (col as f32 + 0.5);
        let count = members.len() as f32;
        let spacing = (viewport.height / (count + 1.0)).max(config.min_spacing);
        let span = spacing * (count - 1.0);
        let top = viewport.height / 2.0 - span / 2.0;
        for (row, id) in members.iter().enumerate() {
            positions.insert((*id).to_string(), (x, top + spacing * row as f32));
        }
    }
    positions
}

/// Columnar layout by kind. Deterministic; every node is pinned.
pub fn structured_layout(data: &mut GraphData, config: &StructuredConfig, viewport: Viewport) {
    let positions = structured_positions(data, config, viewport);
    apply_pinned(data, &positions);
    tracing::debug!(nodes = positions.len(), "structured layout");
}
