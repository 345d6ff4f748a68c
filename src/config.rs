use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::filter::{AttributeFilter, AttributeRule};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayoutDirection {
    #[default]
    Down,
    Up,
    Left,
    Right,
}

impl LayoutDirection {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "down" | "tb" | "td" => Some(Self::Down),
            "up" | "bt" => Some(Self::Up),
            "left" | "rl" => Some(Self::Left),
            "right" | "lr" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForceConfig {
    pub repulsion: f32,
    pub link_distance: f32,
    pub link_distances: BTreeMap<String, f32>,
    pub link_strength: f32,
    pub collision_radius: f32,
    pub center_strength: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub velocity_decay: f32,
    pub drag_alpha_target: f32,
    pub max_growth_boost: f32,
    pub settle_window_ticks: u32,
    pub max_ticks: u32,
}

impl ForceConfig {
    pub fn link_distance_for(&self, kind: &str) -> f32 {
        self.link_distances
            .get(kind)
            .copied()
            .unwrap_or(self.link_distance)
    }
}

impl Default for ForceConfig {
    fn default() -> Self {
        let mut link_distances = BTreeMap::new();
        link_distances.insert("derived_from".to_string(), 200.0);
        link_distances.insert("connected_to".to_string(), 250.0);
        link_distances.insert("mounted_into".to_string(), 220.0);
        Self {
            repulsion: 150.0,
            link_distance: 220.0,
            link_distances,
            link_strength: 0.1,
            collision_radius: 65.0,
            center_strength: 0.05,
            alpha_min: 0.001,
            // Reaches alpha_min from 1.0 in roughly 300 ticks.
            alpha_decay: 1.0 - 0.001f32.powf(1.0 / 300.0),
            velocity_decay: 0.4,
            drag_alpha_target: 0.3,
            max_growth_boost: 3.0,
            settle_window_ticks: 120,
            max_ticks: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StructuredConfig {
    pub min_spacing: f32,
    /// Column order; kinds not listed follow in sorted order.
    pub kind_order: Vec<String>,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            min_spacing: 100.0,
            kind_order: vec![
                "container".to_string(),
                "network".to_string(),
                "image".to_string(),
                "volume".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommunityConfig {
    pub max_iterations: usize,
    /// Fixed shuffle seed; `None` keeps the visit order randomized per run.
    pub seed: Option<u64>,
    pub local_radius: f32,
    pub local_repulsion: f32,
    pub local_link_distance: f32,
    pub local_ticks: u32,
    pub cluster_repulsion: f32,
    pub cluster_padding: f32,
    pub cluster_center_strength: f32,
    pub cluster_ticks: u32,
    pub node_radius: f32,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            seed: None,
            local_radius: 80.0,
            local_repulsion: 120.0,
            local_link_distance: 90.0,
            local_ticks: 200,
            cluster_repulsion: 600.0,
            cluster_padding: 40.0,
            cluster_center_strength: 0.02,
            cluster_ticks: 300,
            node_radius: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Ranker {
    #[default]
    NetworkSimplex,
    LongestPath,
}

impl Ranker {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkSimplex => "network-simplex",
            Self::LongestPath => "longest-path",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HierarchicalConfig {
    pub direction: LayoutDirection,
    pub rank_spacing: f32,
    pub node_spacing: f32,
    pub ranker: Ranker,
    pub node_width: f32,
    pub node_height: f32,
    pub ordering_passes: usize,
}

impl Default for HierarchicalConfig {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::Down,
            rank_spacing: 80.0,
            node_spacing: 50.0,
            ranker: Ranker::NetworkSimplex,
            node_width: 150.0,
            node_height: 50.0,
            ordering_passes: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayeredAlgorithm {
    #[default]
    Layered,
    Force,
    Tree,
    Radial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodePlacement {
    Simple,
    #[default]
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayeredConfig {
    pub algorithm: LayeredAlgorithm,
    pub direction: LayoutDirection,
    pub layer_spacing: f32,
    pub node_spacing: f32,
    pub placement: NodePlacement,
    pub node_width: f32,
    pub node_height: f32,
    pub ordering_passes: usize,
}

impl Default for LayeredConfig {
    fn default() -> Self {
        Self {
            algorithm: LayeredAlgorithm::Layered,
            direction: LayoutDirection::Down,
            layer_spacing: 100.0,
            node_spacing: 60.0,
            placement: NodePlacement::Balanced,
            node_width: 150.0,
            node_height: 50.0,
            ordering_passes: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoutingConfig {
    pub orthogonal: bool,
    pub obstacle_padding: f32,
    pub samples_per_segment: usize,
    pub detour_step: f32,
    pub fallback_offset: f32,
    pub node_width: f32,
    pub node_height: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            orthogonal: false,
            obstacle_padding: 8.0,
            samples_per_segment: 15,
            detour_step: 30.0,
            fallback_offset: 40.0,
            node_width: 120.0,
            node_height: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistConfig {
    pub debounce_ms: u64,
    pub key_prefix: String,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            key_prefix: "topograph.v1.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub force: ForceConfig,
    pub structured: StructuredConfig,
    pub community: CommunityConfig,
    pub hierarchical: HierarchicalConfig,
    pub layered: LayeredConfig,
    pub routing: RoutingConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub layout: LayoutConfig,
    pub viewport: Viewport,
    pub persist: PersistConfig,
    pub attribute_rules: Vec<AttributeRule>,
}

impl Config {
    /// Attribute filters declared in the config file, in declaration order.
    pub fn attribute_filters(&self) -> anyhow::Result<Vec<AttributeFilter>> {
        self.attribute_rules
            .iter()
            .map(|rule| rule.compile())
            .collect()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    force: Option<ForceConfig>,
    structured: Option<StructuredConfig>,
    community: Option<CommunityConfig>,
    hierarchical: Option<HierarchicalConfig>,
    layered: Option<LayeredConfig>,
    routing: Option<RoutingConfig>,
    persist: Option<PersistConfig>,
    width: Option<f32>,
    height: Option<f32>,
    #[serde(default)]
    attribute_filters: Vec<AttributeRule>,
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let parsed: ConfigFile = json5::from_str(contents)?;
    let mut config = Config::default();

    if let Some(force) = parsed.force {
        config.layout.force = force;
    }
    if let Some(structured) = parsed.structured {
        config.layout.structured = structured;
    }
    if let Some(community) = parsed.community {
        config.layout.community = community;
    }
    if let Some(hierarchical) = parsed.hierarchical {
        config.layout.hierarchical = hierarchical;
    }
    if let Some(layered) = parsed.layered {
        config.layout.layered = layered;
    }
    if let Some(routing) = parsed.routing {
        config.layout.routing = routing;
    }
    if let Some(persist) = parsed.persist {
        config.persist = persist;
    }
    if let Some(width) = parsed.width {
        config.viewport.width = width.max(1.0);
    }
    if let Some(height) = parsed.height {
        config.viewport.height = height.max(1.0);
    }
    config.attribute_rules = parsed.attribute_filters;
    // Reject bad patterns at load time rather than on first filter pass.
    config.attribute_filters()?;

    Ok(config)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}
