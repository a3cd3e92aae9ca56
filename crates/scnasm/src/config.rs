use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use scn_nls::Encoding;
use scn_script::ScriptTable;

/// Table for SERAPH, used when neither `--table` nor the config names one.
pub const BUILTIN_TABLE: &str = include_str!("../tables/seraph.yaml");

/// Crates whose records follow `app_level_filter` instead of `level_filter`.
const APP_MODULES: [&str; 4] = ["scnasm", "scn_script", "scn_pack", "scn_nls"];

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggerConfig {
    pub app_level_filter: LevelFilter,
    pub level_filter: LevelFilter,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { app_level_filter: LevelFilter::Info, level_filter: LevelFilter::Warn }
    }
}

impl LoggerConfig {
    /// Each `-v` raises the tool's own level by one step.
    pub fn verbose(mut self, count: u8) -> Self {
        for _ in 0..count {
            self.app_level_filter = match self.app_level_filter {
                LevelFilter::Off | LevelFilter::Error => LevelFilter::Warn,
                LevelFilter::Warn => LevelFilter::Info,
                LevelFilter::Info => LevelFilter::Debug,
                LevelFilter::Debug | LevelFilter::Trace => LevelFilter::Trace,
            };
        }
        self
    }

    /// `RUST_LOG` wins over both filters.
    pub fn init(&self) {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.level_filter);
        for module in APP_MODULES {
            builder.filter_module(module, self.app_level_filter);
        }
        builder.parse_default_env();
        // A second init in the same process keeps the first logger.
        let _ = builder.try_init();
    }
}

/// Optional TOML file passed with `--config`.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct ToolConfig {
    pub table: Option<PathBuf>,
    pub encoding: Option<String>,
    pub jobs: Option<usize>,
    pub logger: LoggerConfig,
}

impl ToolConfig {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// `--table` over the config file over the built-in table.
    pub fn load_table(&self, table: Option<&Path>) -> Result<ScriptTable> {
        match table.or(self.table.as_deref()) {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading table {}", path.display()))?;
                ScriptTable::from_yaml(&text).with_context(|| format!("loading table {}", path.display()))
            }
            None => ScriptTable::from_yaml(BUILTIN_TABLE).context("loading built-in table"),
        }
    }

    /// `--lang` over the config file over the table's own encoding.
    pub fn encoding(&self, lang: Option<Encoding>, table: &ScriptTable) -> Result<Encoding> {
        if let Some(lang) = lang {
            return Ok(lang);
        }
        match &self.encoding {
            Some(name) => name.parse().with_context(|| format!("config encoding {name:?}")),
            None => Ok(table.encoding),
        }
    }

    pub fn jobs(&self, jobs: Option<usize>) -> usize {
        jobs.or(self.jobs)
            .filter(|&n| n > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
    }
}
