use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub canvas_width: f32,
    pub canvas_height: f32,
    pub margin: f32,
    /// Horizontal distance between tree depths when the canvas is wide enough.
    pub level_spacing: f32,
    pub min_level_spacing: f32,
    pub min_row_spacing: f32,
    /// Extra leaf slots reserved on each side of a sibling that has children.
    pub container_gap: f32,
    pub grid_cell: f32,
    /// Columns of the fallback grid. `None` picks a square-ish grid.
    pub grid_columns: Option<usize>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1200.0,
            canvas_height: 800.0,
            margin: 40.0,
            level_spacing: 180.0,
            min_level_spacing: 60.0,
            min_row_spacing: 28.0,
            container_gap: 0.5,
            grid_cell: 48.0,
            grid_columns: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Soft limit on memory-tier entries; the oldest write is evicted past it.
    pub memory_capacity: usize,
    /// SQLite file for the durable tier. `None` keeps the cache in memory only.
    pub durable_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 64,
            durable_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub count: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { count: 1 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub layout: LayoutConfig,
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
}

pub const CACHE_FILE_NAME: &str = "layout_cache.db";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    canvas_width: Option<f32>,
    canvas_height: Option<f32>,
    margin: Option<f32>,
    level_spacing: Option<f32>,
    min_level_spacing: Option<f32>,
    min_row_spacing: Option<f32>,
    container_gap: Option<f32>,
    grid_cell: Option<f32>,
    grid_columns: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CacheConfigFile {
    memory_capacity: Option<usize>,
    /// Directory holding the durable cache database.
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WorkerConfigFile {
    count: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutConfigFile>,
    cache: Option<CacheConfigFile>,
    worker: Option<WorkerConfigFile>,
}

/// Loads a JSON5 config file over the defaults. Every key is optional.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(layout) = parsed.layout {
        let target = &mut config.layout;
        if let Some(v) = layout.canvas_width {
            target.canvas_width = v;
        }
        if let Some(v) = layout.canvas_height {
            target.canvas_height = v;
        }
        if let Some(v) = layout.margin {
            target.margin = v;
        }
        if let Some(v) = layout.level_spacing {
            target.level_spacing = v;
        }
        if let Some(v) = layout.min_level_spacing {
            target.min_level_spacing = v;
        }
        if let Some(v) = layout.min_row_spacing {
            target.min_row_spacing = v;
        }
        if let Some(v) = layout.container_gap {
            target.container_gap = v;
        }
        if let Some(v) = layout.grid_cell {
            target.grid_cell = v;
        }
        if layout.grid_columns.is_some() {
            target.grid_columns = layout.grid_columns;
        }
    }

    if let Some(cache) = parsed.cache {
        if let Some(v) = cache.memory_capacity {
            config.cache.memory_capacity = v;
        }
        if let Some(dir) = cache.dir {
            config.cache.durable_path = Some(dir.join(CACHE_FILE_NAME));
        }
    }

    if let Some(worker) = parsed.worker
        && let Some(v) = worker.count
    {
        config.worker.count = v;
    }

    Ok(config)
}
