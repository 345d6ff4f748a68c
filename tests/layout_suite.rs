use std::collections::BTreeSet;
use std::path::Path;

use topograph::config::{LayeredConfig, RoutingConfig, Viewport};
use topograph::filter::{
    ConnectionFilter, FilterCommand, Filters, GraphConfig, apply_quick_filter, filter_graph, reduce,
};
use topograph::layout::{
    LayoutError, LayoutKind, NodeBox, apply_layout, compute_positions, path_collides, route_edges,
    sample_path,
};
use topograph::{EnrichedGraph, GraphData, LayoutConfig};

fn load_fixture(name: &str) -> GraphData {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let input = std::fs::read_to_string(&path).expect("fixture read failed");
    serde_json::from_str(&input).expect("fixture parse failed")
}

fn visible_ids(data: &GraphData) -> BTreeSet<&str> {
    data.nodes.keys().map(String::as_str).collect()
}

fn assert_projection(input: &GraphData, output: &GraphData, label: &str) {
    for id in output.nodes.keys() {
        assert!(input.nodes.contains_key(id), "{label}: {id} not in input");
    }
    for edge in &output.edges {
        assert!(output.nodes.contains_key(&edge.src), "{label}: dangling src {}", edge.src);
        assert!(output.nodes.contains_key(&edge.dst), "{label}: dangling dst {}", edge.dst);
    }
}

#[test]
fn default_inventory_filters_hide_system_containers() {
    let data = load_fixture("inventory.json");
    let config = GraphConfig::inventory();
    let visible = filter_graph(&data, &Filters::for_config(&config), &config);
    assert_eq!(visible.nodes.len(), 13);
    assert!(!visible.nodes.contains_key("c-agent"));
    assert_eq!(visible.edges.len(), 10);
}

#[test]
fn quick_filters_select_expected_nodes() {
    let data = load_fixture("inventory.json");
    let config = GraphConfig::inventory();
    let base = Filters::for_config(&config);

    let running = apply_quick_filter(&base, &config, "running").unwrap();
    let visible = filter_graph(&data, &running, &config);
    assert_eq!(visible_ids(&visible), BTreeSet::from(["c-api", "c-web"]));

    let orphans = apply_quick_filter(&base, &config, "orphans").unwrap();
    let visible = filter_graph(&data, &orphans, &config);
    assert_eq!(
        visible_ids(&visible),
        BTreeSet::from(["i-dangling", "n-unused", "v-cache"])
    );
    assert!(visible.edges.is_empty());

    let containers = apply_quick_filter(&base, &config, "containers").unwrap();
    let visible = filter_graph(&data, &containers, &config);
    assert!(visible.nodes.values().all(|n| n.kind == "container"));
    assert!(apply_quick_filter(&base, &config, "nope").is_none());
}

#[test]
fn every_filter_combination_is_a_projection() {
    let data = load_fixture("inventory.json");
    let config = GraphConfig::inventory();
    let base = Filters::for_config(&config);
    let commands = [
        FilterCommand::SetNodeKindVisible {
            kind: "image".to_string(),
            visible: false,
        },
        FilterCommand::SetEdgeKindVisible {
            kind: "connected_to".to_string(),
            visible: false,
        },
        FilterCommand::SetConnection(ConnectionFilter::Connected),
        FilterCommand::SetSearch("PY".to_string()),
        FilterCommand::SetInUseOnly(true),
        FilterCommand::ExcludeNode("n-back".to_string()),
        FilterCommand::SetOrphanedOnly(true),
    ];
    let mut state = base.clone();
    for command in commands {
        state = reduce(&state, command);
        let once = filter_graph(&data, &state, &config);
        assert_projection(&data, &once, &format!("{state:?}"));
        let twice = filter_graph(&once, &state, &config);
        assert_eq!(visible_ids(&once), visible_ids(&twice));
    }
}

#[test]
fn every_layout_places_every_fixture() {
    let config = GraphConfig::inventory();
    for fixture in ["inventory.json", "flow.json", "dangling.json"] {
        let data = load_fixture(fixture);
        let visible = filter_graph(&data, &Filters::for_config(&config), &config);
        for kind in LayoutKind::ALL {
            let mut laid_out = visible.clone();
            let mut layout = LayoutConfig::default();
            layout.community.seed = Some(11);
            let positions = apply_layout(kind, &mut laid_out, &layout, Viewport::default())
                .unwrap_or_else(|err| panic!("{fixture} {kind:?}: {err}"));
            assert_eq!(positions.len(), laid_out.nodes.len(), "{fixture} {kind:?}");
            for node in laid_out.nodes.values() {
                assert!(node.x.is_finite() && node.y.is_finite(), "{fixture} {kind:?} {}", node.id);
                assert_eq!(node.is_pinned(), kind.is_static(), "{fixture} {kind:?} {}", node.id);
            }
        }
    }
}

#[test]
fn structured_layout_is_deterministic_on_fixtures() {
    let data = load_fixture("inventory.json");
    let layout = LayoutConfig::default();
    let mut first = data.clone();
    let mut second = data.clone();
    let a = apply_layout(LayoutKind::Structured, &mut first, &layout, Viewport::default()).unwrap();
    let b =
        apply_layout(LayoutKind::Structured, &mut second, &layout, Viewport::default()).unwrap();
    assert_eq!(a, b);

    let column_x = |kind: &str| -> BTreeSet<i64> {
        first
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .map(|n| n.x.round() as i64)
            .collect()
    };
    assert_eq!(column_x("container"), BTreeSet::from([150]));
    assert_eq!(column_x("volume"), BTreeSet::from([1050]));
}

#[test]
fn orthogonal_routes_avoid_obstacles_when_they_can() {
    let mut data = load_fixture("flow.json");
    let mut layout = LayoutConfig::default();
    layout.hierarchical.ranker = topograph::config::Ranker::LongestPath;
    apply_layout(LayoutKind::Hierarchical, &mut data, &layout, Viewport::default()).unwrap();

    let routing = RoutingConfig {
        orthogonal: true,
        ..RoutingConfig::default()
    };
    let routed = route_edges(&data, &routing);
    assert_eq!(routed.len(), data.edges.len());
    for edge in &routed {
        assert!(edge.path.starts_with("M "));
        let obstacles: Vec<NodeBox> = data
            .nodes
            .values()
            .filter(|n| n.id != edge.from && n.id != edge.to)
            .map(|n| {
                NodeBox::centered(n.x, n.y, routing.node_width, routing.node_height)
                    .padded(routing.obstacle_padding)
            })
            .collect();
        if !edge.collides {
            assert!(!path_collides(&edge.points, &obstacles, routing.samples_per_segment));
            for point in sample_path(&edge.points, routing.samples_per_segment) {
                assert!(obstacles.iter().all(|o| !o.contains(point)));
            }
        }
        for pair in edge.points.windows(2) {
            let straight =
                (pair[0].0 - pair[1].0).abs() < 1e-3 || (pair[0].1 - pair[1].1).abs() < 1e-3;
            assert!(straight, "{} -> {} is not orthogonal", edge.from, edge.to);
        }
    }
}

#[test]
fn dangling_edges_are_dropped_but_layered_suite_rejects_raw_input() {
    let data = load_fixture("dangling.json");
    let graph = EnrichedGraph::new(&data);
    assert_eq!(graph.edges().len(), 1);
    assert_eq!(graph.degree("a"), 1);

    let err = compute_positions(&data, &LayeredConfig::default(), Viewport::default()).unwrap_err();
    assert!(matches!(err, LayoutError::MalformedGraph(_)));

    let config = GraphConfig::inventory();
    let visible = filter_graph(&data, &Filters::for_config(&config), &config);
    assert_eq!(visible.edges.len(), 1);
    let positions =
        compute_positions(&visible, &LayeredConfig::default(), Viewport::default()).unwrap();
    assert_eq!(positions.len(), 2);
}
