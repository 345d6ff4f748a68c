use crate::config::{Config, load_config};
use crate::filter::{Filters, GraphConfig, apply_quick_filter};
use crate::ir::GraphData;
use crate::layout::{LayoutKind, parse_layout_kind};
use crate::layout_dump::{build_layout_dump, write_layout_dump};
use crate::persist::{FileStore, PositionStore};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "topo", version, about = "Filter and lay out node-link graphs")]
pub struct Args {
    /// Graph JSON file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Filter state JSON file
    #[arg(short = 'f', long = "filters")]
    pub filters: Option<PathBuf>,

    /// Quick filter preset applied on top of the filter state
    #[arg(short = 'q', long = "quick")]
    pub quick: Option<String>,

    /// Config JSON5 file
    #[arg(short = 'c', long = "config", alias = "configFile")]
    pub config: Option<PathBuf>,

    /// force, structured, community, hierarchical or layered
    #[arg(short = 'l', long = "layout", default_value = "force")]
    pub layout: String,

    /// Width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,

    /// Route edges with right-angle paths
    #[arg(long = "orthogonal")]
    pub orthogonal: bool,

    /// Tick budget for the force simulation
    #[arg(long = "ticks")]
    pub ticks: Option<u32>,

    /// Seed for community detection
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Output JSON file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Directory for persisted positions and filter state
    #[arg(short = 'p', long = "positions")]
    pub positions: Option<PathBuf>,
}

impl Args {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(width) = self.width {
            config.viewport.width = width.max(1.0);
        }
        if let Some(height) = self.height {
            config.viewport.height = height.max(1.0);
        }
        if self.orthogonal {
            config.layout.routing.orthogonal = true;
        }
        if let Some(ticks) = self.ticks {
            config.layout.force.max_ticks = ticks;
        }
        if let Some(seed) = self.seed {
            config.layout.community.seed = Some(seed);
        }
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .try_init();
    install_panic_hook();
}

/// Route panic reports through `tracing`, so a dagre panic that the
/// hierarchical layout recovers from shows up as a log line.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(%info, "panic");
    }));
}

pub fn run() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    let kind = parse_layout_kind(&args.layout)?;
    let graph_config = GraphConfig::inventory().with_attribute_filters(config.attribute_filters()?);

    let input = read_input(args.input.as_deref())?;
    let mut data: GraphData = serde_json::from_str(&input).context("invalid graph JSON")?;

    let mut store = args
        .positions
        .as_ref()
        .map(|dir| PositionStore::new(FileStore::new(dir), &config.persist));

    let mut filters = match (&args.filters, &store) {
        (Some(path), _) => read_filters(path)?,
        (None, Some(store)) => store.load_filters(&graph_config),
        (None, None) => Filters::for_config(&graph_config),
    };
    if let Some(name) = &args.quick {
        filters = apply_quick_filter(&filters, &graph_config, name)
            .ok_or_else(|| anyhow::anyhow!("Unknown quick filter `{name}`"))?;
    }

    if let (Some(store), LayoutKind::Force) = (&store, kind) {
        let restored = store.restore(kind, &mut data);
        tracing::debug!(restored, "restored force positions");
    }

    let (visible, dump) = build_layout_dump(&data, &filters, &graph_config, &config, kind)?;

    if let Some(store) = store.as_mut() {
        store.schedule(kind, &visible, Instant::now());
        store.flush_all();
        store.save_filters(&filters);
    }

    match args.output.as_deref() {
        Some(path) => write_layout_dump(path, &dump)?,
        None => println!("{}", dump.to_json()?),
    }
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()));
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn read_filters(path: &Path) -> Result<Filters> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filters = serde_json::from_str(&contents).context("invalid filter JSON")?;
    Ok(filters)
}
