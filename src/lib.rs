#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod filter;
pub mod graph;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod persist;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, Viewport, load_config, parse_config};
pub use filter::{FilterStats, Filters, GraphConfig, filter_graph, filter_graph_with_stats};
pub use graph::EnrichedGraph;
pub use ir::{Edge, GraphData, Node};
pub use layout::{LayoutError, LayoutKind, Positions, apply_layout, route_edges};
pub use layout_dump::{LayoutDump, build_layout_dump};
