use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ir::GraphData;

/// Center positions keyed by node id.
pub type Positions = BTreeMap<String, (f32, f32)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Force,
    Structured,
    Community,
    Hierarchical,
    Layered,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 5] = [
        LayoutKind::Force,
        LayoutKind::Structured,
        LayoutKind::Community,
        LayoutKind::Hierarchical,
        LayoutKind::Layered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Force => "force",
            Self::Structured => "structured",
            Self::Community => "community",
            Self::Hierarchical => "hierarchical",
            Self::Layered => "layered",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(token))
    }

    /// Static layouts pin every node they place.
    pub fn is_static(self) -> bool {
        !matches!(self, Self::Force)
    }
}

/// Axis-aligned box, top-left origin, as used by routing and layered layouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NodeBox {
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn padded(&self, pad: f32) -> Self {
        Self {
            x: self.x - pad,
            y: self.y - pad,
            width: self.width + pad * 2.0,
            height: self.height + pad * 2.0,
        }
    }

    /// Strict interior test; points on the border are outside.
    pub fn contains(&self, point: (f32, f32)) -> bool {
        point.0 > self.x
            && point.0 < self.x + self.width
            && point.1 > self.y
            && point.1 < self.y + self.height
    }

    pub fn overlaps(&self, other: &NodeBox) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Bounding box of a set of centers, each grown by half the node size.
pub fn bounds_of(
    points: impl IntoIterator<Item = (f32, f32)>,
    half_w: f32,
    half_h: f32,
) -> Option<NodeBox> {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    let mut any = false;
    for (x, y) in points {
        any = true;
        min_x = min_x.min(x - half_w);
        min_y = min_y.min(y - half_h);
        max_x = max_x.max(x + half_w);
        max_y = max_y.max(y + half_h);
    }
    any.then(|| NodeBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

/// Write centers into the graph, pinning each placed node.
pub fn apply_pinned(data: &mut GraphData, positions: &Positions) {
    for (id, (x, y)) in positions {
        if let Some(node) = data.nodes.get_mut(id) {
            node.place_pinned(*x, *y);
        }
    }
}

/// Shift positions so their bounding box is centered on `(cx, cy)`.
pub fn recenter(positions: &mut Positions, cx: f32, cy: f32) {
    let Some(bounds) = bounds_of(positions.values().copied(), 0.0, 0.0) else {
        return;
    };
    let (bx, by) = bounds.center();
    let (dx, dy) = (cx - bx, cy - by);
    for pos in positions.values_mut() {
        pos.0 += dx;
        pos.1 += dy;
    }
}
