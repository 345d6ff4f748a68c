use serde::Deserialize;
use topograph::filter::{Filters, GraphConfig, apply_quick_filter};
use topograph::layout::parse_layout_kind;
use topograph::{GraphData, build_layout_dump, filter_graph_with_stats, parse_config};
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutOptions {
    layout: Option<String>,
    /// JSON5 config text, same format as the CLI config file.
    config: Option<String>,
    filters: Option<Filters>,
    quick_filter: Option<String>,
    width: Option<f32>,
    height: Option<f32>,
    orthogonal: Option<bool>,
    seed: Option<u64>,
}

fn js_error(error: impl ToString) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_options(options_json: Option<String>) -> Result<LayoutOptions, String> {
    match options_json {
        Some(raw) => serde_json::from_str(&raw).map_err(|error| error.to_string()),
        None => Ok(LayoutOptions::default()),
    }
}

fn resolve_filters(options: &LayoutOptions, graph_config: &GraphConfig) -> Result<Filters, String> {
    let filters = options
        .filters
        .clone()
        .unwrap_or_else(|| Filters::for_config(graph_config));
    match &options.quick_filter {
        Some(name) => apply_quick_filter(&filters, graph_config, name)
            .ok_or_else(|| format!("unknown quick filter `{name}`")),
        None => Ok(filters),
    }
}

fn filter_json(graph_json: &str, filters_json: Option<String>) -> Result<String, String> {
    let data: GraphData = serde_json::from_str(graph_json).map_err(|error| error.to_string())?;
    let graph_config = GraphConfig::inventory();
    let filters = match filters_json {
        Some(raw) => serde_json::from_str(&raw).map_err(|error| error.to_string())?,
        None => Filters::for_config(&graph_config),
    };
    let (visible, stats) = filter_graph_with_stats(&data, &filters, &graph_config);
    let out = serde_json::json!({ "graph": visible, "stats": stats });
    serde_json::to_string(&out).map_err(|error| error.to_string())
}

fn layout_json(graph_json: &str, options_json: Option<String>) -> Result<String, String> {
    let data: GraphData = serde_json::from_str(graph_json).map_err(|error| error.to_string())?;
    let options = parse_options(options_json)?;
    let mut config = match &options.config {
        Some(raw) => parse_config(raw).map_err(|error| error.to_string())?,
        None => topograph::Config::default(),
    };
    if let Some(width) = options.width {
        config.viewport.width = width.max(1.0);
    }
    if let Some(height) = options.height {
        config.viewport.height = height.max(1.0);
    }
    if let Some(orthogonal) = options.orthogonal {
        config.layout.routing.orthogonal = orthogonal;
    }
    if options.seed.is_some() {
        config.layout.community.seed = options.seed;
    }
    let kind = parse_layout_kind(options.layout.as_deref().unwrap_or("structured"))
        .map_err(|error| error.to_string())?;
    let attribute_filters = config.attribute_filters().map_err(|error| error.to_string())?;
    let graph_config = GraphConfig::inventory().with_attribute_filters(attribute_filters);
    let filters = resolve_filters(&options, &graph_config)?;

    let (_, dump) = build_layout_dump(&data, &filters, &graph_config, &config, kind)
        .map_err(|error| error.to_string())?;
    serde_json::to_string(&dump).map_err(|error| error.to_string())
}

/// Filter a graph JSON document. Returns `{ graph, stats }`.
#[wasm_bindgen]
pub fn filter_graph_json(
    graph_json: &str,
    filters_json: Option<String>,
) -> Result<String, JsValue> {
    filter_json(graph_json, filters_json).map_err(js_error)
}

/// Filter, lay out and route a graph JSON document. Returns the layout dump.
#[wasm_bindgen]
pub fn layout_graph_json(
    graph_json: &str,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    layout_json(graph_json, options_json).map_err(js_error)
}
