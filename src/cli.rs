use crate::config::{CACHE_FILE_NAME, Config, load_config};
use crate::coordinator::{Diagnostic, LayoutCoordinator};
use crate::hierarchy::{Entry, Hierarchy, load_hierarchy};
use crate::layout_dump::{LayoutDump, write_layout_dump};
use crate::projector::{
    ProjectionOptions, ViewMode, default_expansion, full_expansion, project_with,
};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use regex::Regex;
use std::collections::HashSet;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
    name = "gvlayout",
    version,
    about = "Lay out a source hierarchy as a node-link graph"
)]
pub struct Args {
    /// Hierarchy JSON file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Layout dump (JSON). Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON5 file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Canvas width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Canvas height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,

    /// Expand a directory (repeatable). The root is always expanded.
    #[arg(long = "expand", value_name = "ID")]
    pub expand: Vec<String>,

    /// Expand every directory
    #[arg(long = "expand-all")]
    pub expand_all: bool,

    /// Which links to show
    #[arg(long = "mode", value_enum, default_value = "hierarchy")]
    pub mode: Mode,

    /// Only show files whose id matches REGEX
    #[arg(long = "filter", value_name = "REGEX")]
    pub filter: Option<String>,

    /// Directory for the persistent layout cache
    #[arg(long = "cache-dir", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Number of layout worker threads
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Mode {
    Hierarchy,
    Dependencies,
    Calls,
    References,
}

impl From<Mode> for ViewMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Hierarchy => ViewMode::Hierarchy,
            Mode::Dependencies => ViewMode::Dependencies,
            Mode::Calls => ViewMode::Calls,
            Mode::References => ViewMode::References,
        }
    }
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = resolve_config(&args)?;
    let hierarchy = read_hierarchy(args.input.as_deref())?;
    let dump = layout_hierarchy(&hierarchy, &args, &config)?;
    write_layout_dump(args.output.as_deref(), &dump)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(width) = args.width {
        config.layout.canvas_width = width;
    }
    if let Some(height) = args.height {
        config.layout.canvas_height = height;
    }
    if let Some(workers) = args.workers {
        config.worker.count = workers;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.durable_path = Some(dir.join(CACHE_FILE_NAME));
    }
    Ok(config)
}

fn read_hierarchy(path: Option<&Path>) -> Result<Hierarchy> {
    match path {
        Some(path) if path != Path::new("-") => load_hierarchy(path),
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Hierarchy::from_json(&buf)
        }
    }
}

fn expansion(hierarchy: &Hierarchy, args: &Args) -> HashSet<String> {
    let mut expanded = if args.expand_all {
        full_expansion(hierarchy)
    } else {
        default_expansion(hierarchy)
    };
    expanded.extend(args.expand.iter().cloned());
    expanded
}

/// Projects, lays out and settles one hierarchy.
fn layout_hierarchy(hierarchy: &Hierarchy, args: &Args, config: &Config) -> Result<LayoutDump> {
    let expanded = expansion(hierarchy, args);
    let pattern = args.filter.as_deref().map(Regex::new).transpose()?;
    let keep = |entry: &Entry| match &pattern {
        Some(pattern) => entry.is_directory() || pattern.is_match(&entry.id),
        None => true,
    };
    let options = ProjectionOptions::new(&expanded, args.mode.into()).with_filter(&keep);
    let snapshot = project_with(hierarchy, &options);

    let mut coordinator = LayoutCoordinator::new(config);
    let diagnostics = coordinator.diagnostics();
    let outcome = coordinator.set_snapshot(snapshot);
    tracing::info!(
        ?outcome,
        nodes = coordinator.snapshot().map_or(0, |s| s.nodes.len()),
        "snapshot submitted"
    );
    if !coordinator.settle(SETTLE_TIMEOUT) {
        anyhow::bail!("layout did not finish within {}s", SETTLE_TIMEOUT.as_secs());
    }
    for diagnostic in diagnostics.try_iter() {
        if let Diagnostic::CacheUnavailable { message } = &diagnostic {
            eprintln!("warning: layout cache unavailable: {message}");
        }
    }

    let Some((snapshot, fingerprint)) = coordinator.snapshot().zip(coordinator.fingerprint()) else {
        anyhow::bail!("no snapshot was laid out");
    };
    Ok(LayoutDump::from_snapshot(
        snapshot,
        coordinator.positions(),
        fingerprint,
    ))
}
