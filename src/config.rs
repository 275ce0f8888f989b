// src/config.rs

//! Configuration for the simulation.
//!
//! Settings come from three layers, later ones winning:
//! 1. the defaults below,
//! 2. an optional JSON file named by the `CELLGRID_CONFIG` environment
//!    variable,
//! 3. the command-line arguments (see [`LaunchArgs`]).
//!
//! Every section uses `#[serde(default)]`, so a config file only needs the
//! keys it wants to change.

use crate::grid::MIN_DIMENSION;
use crate::rules::{BorderPolicy, Rule};
use anyhow::{anyhow, bail, Context, Result};
use log::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "CELLGRID_CONFIG";

/// Well-known location of the command pipe.
pub const DEFAULT_PIPE_PATH: &str = "/tmp/namedPipe";

// --- Top-Level Configuration Structure ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Grid shape, worker count and edge handling.
    pub grid: GridConfig,
    /// Initial values of the shared control surface.
    pub simulation: SimulationConfig,
    /// Named-pipe command channel.
    pub channel: ChannelConfig,
    /// Terminal rendering of the grid and stats.
    pub render: RenderConfig,
}

// --- Grid Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    /// Requested worker threads. Clamped to `rows` at startup.
    pub workers: usize,
    /// How neighbors of edge cells are counted.
    pub border: BorderPolicy,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            rows: 40,
            cols: 60,
            workers: 8,
            border: BorderPolicy::Dead,
        }
    }
}

// --- Simulation Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Rule identifier, 1-4. Any other value is rejected while loading.
    pub rule: Rule,
    /// Color cells by age instead of plain alive/dead.
    pub color_mode: bool,
    /// Pause each worker takes after an update, in microseconds.
    pub step_delay_us: u64,
    /// Start with workers updating (true) or paused (false).
    pub start_running: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            rule: Rule::GameOfLife,
            color_mode: false,
            step_delay_us: 100,
            start_running: true,
        }
    }
}

// --- Channel Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    /// Listen for commands at all.
    pub enabled: bool,
    /// Path of the named pipe. Created if missing.
    pub pipe_path: PathBuf,
    /// Decoded commands that may wait to be applied before the listener
    /// blocks.
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            enabled: true,
            pipe_path: PathBuf::from(DEFAULT_PIPE_PATH),
            queue_capacity: 32,
        }
    }
}

// --- Render Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Draw the grid and stats to stdout.
    pub enabled: bool,
    /// Time between redraws in milliseconds.
    pub interval_ms: u64,
    /// Use ANSI escape sequences (cursor homing, background colors).
    pub ansi: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            enabled: true,
            interval_ms: 200,
            ansi: true,
        }
    }
}

impl Config {
    /// Loads the file named by [`CONFIG_PATH_ENV`], or the defaults if the
    /// variable is unset.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                debug!("{} not set, using default configuration", CONFIG_PATH_ENV);
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Number of workers actually started: the requested count, clamped to
    /// the row count.
    pub fn worker_count(&self) -> usize {
        self.grid.workers.min(self.grid.rows)
    }

    /// Rejects settings the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.grid.rows < MIN_DIMENSION || self.grid.cols < MIN_DIMENSION {
            bail!(
                "rows and columns must be at least {}, got {}x{}",
                MIN_DIMENSION,
                self.grid.rows,
                self.grid.cols
            );
        }
        if self.grid.workers == 0 {
            bail!("worker count must be positive");
        }
        if self.channel.queue_capacity == 0 {
            bail!("channel.queue_capacity must be positive");
        }
        if self.render.interval_ms == 0 {
            bail!("render.interval_ms must be positive");
        }
        Ok(())
    }
}

// --- Command-Line Arguments ---

/// Usage line printed with argument errors.
pub const USAGE: &str = "usage: cellgrid <rows> <cols> <workers> [--border dead|fixed[:0|1]|random|clipped|wrap] [--pipe <path>] [--no-pipe] [--no-render]";

/// Startup arguments. They override the matching config entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    pub rows: usize,
    pub cols: usize,
    pub workers: usize,
    pub border: Option<BorderPolicy>,
    pub pipe_path: Option<PathBuf>,
    pub pipe_enabled: bool,
    pub render_enabled: bool,
}

impl LaunchArgs {
    /// Parses the arguments following the program name.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut positional = Vec::new();
        let mut border = None;
        let mut pipe_path = None;
        let mut pipe_enabled = true;
        let mut render_enabled = true;

        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--border" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--border needs a value\n{}", USAGE))?;
                    border = Some(value.parse::<BorderPolicy>()?);
                }
                "--pipe" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--pipe needs a path\n{}", USAGE))?;
                    pipe_path = Some(PathBuf::from(value));
                }
                "--no-pipe" => pipe_enabled = false,
                "--no-render" => render_enabled = false,
                flag if flag.starts_with("--") => bail!("unknown option '{}'\n{}", flag, USAGE),
                _ => positional.push(arg),
            }
        }

        let [rows, cols, workers] = positional.as_slice() else {
            bail!(
                "wrong number of arguments: expected 3, got {}\n{}",
                positional.len(),
                USAGE
            );
        };

        Ok(LaunchArgs {
            rows: parse_positive("rows", rows)?,
            cols: parse_positive("cols", cols)?,
            workers: parse_positive("workers", workers)?,
            border,
            pipe_path,
            pipe_enabled,
            render_enabled,
        })
    }

    /// Layers the arguments over `config`.
    pub fn apply_to(&self, mut config: Config) -> Config {
        config.grid.rows = self.rows;
        config.grid.cols = self.cols;
        config.grid.workers = self.workers;
        if let Some(border) = self.border {
            config.grid.border = border;
        }
        if let Some(path) = &self.pipe_path {
            config.channel.pipe_path = path.clone();
        }
        config.channel.enabled &= self.pipe_enabled;
        config.render.enabled &= self.render_enabled;
        config
    }
}

fn parse_positive(name: &str, value: &str) -> Result<usize> {
    let parsed: usize = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a positive integer, got '{}'", name, value))?;
    if parsed == 0 {
        bail!("{} must be a positive integer, got 0", name);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.simulation.rule, Rule::GameOfLife);
        assert_eq!(config.channel.pipe_path, PathBuf::from("/tmp/namedPipe"));
    }

    #[test_log::test]
    fn partial_json_keeps_defaults_for_missing_keys() {
        let config: Config = serde_json::from_str(
            r#"{ "grid": { "rows": 12, "border": "wrap" }, "simulation": { "rule": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.grid.rows, 12);
        assert_eq!(config.grid.cols, GridConfig::default().cols);
        assert_eq!(config.grid.border, BorderPolicy::Wrap);
        assert_eq!(config.simulation.rule, Rule::Amoeba);
        assert_eq!(config.render, RenderConfig::default());
    }

    #[test_log::test]
    fn unknown_rule_in_config_is_rejected() {
        let result: Result<Config, _> = serde_json::from_str(r#"{ "simulation": { "rule": 7 } }"#);
        assert!(result.is_err());
    }

    #[test_log::test]
    fn config_file_round_trips_through_json() {
        let path = std::env::temp_dir().join(format!("cellgrid-config-{}.json", std::process::id()));
        let mut config = Config::default();
        config.grid.border = BorderPolicy::Fixed(0);
        config.simulation.step_delay_us = 5;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        let loaded = Config::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap(), config);
    }

    #[test_log::test]
    fn missing_config_file_is_an_error() {
        assert!(Config::from_file(Path::new("/nonexistent/cellgrid.json")).is_err());
    }

    #[test_log::test]
    fn it_should_parse_positional_arguments_and_options() {
        let args = LaunchArgs::parse(["20", "30", "4", "--border", "wrap", "--pipe", "/tmp/p"]).unwrap();
        assert_eq!(args.rows, 20);
        assert_eq!(args.cols, 30);
        assert_eq!(args.workers, 4);
        assert_eq!(args.border, Some(BorderPolicy::Wrap));
        assert_eq!(args.pipe_path, Some(PathBuf::from("/tmp/p")));
        assert!(args.pipe_enabled);
        assert!(args.render_enabled);
    }

    #[test_log::test]
    fn it_should_reject_bad_arguments() {
        assert!(LaunchArgs::parse(["20", "30"]).is_err());
        assert!(LaunchArgs::parse(["20", "30", "4", "5"]).is_err());
        assert!(LaunchArgs::parse(["20", "x", "4"]).is_err());
        assert!(LaunchArgs::parse(["20", "30", "0"]).is_err());
        assert!(LaunchArgs::parse(["20", "30", "-1"]).is_err());
        assert!(LaunchArgs::parse(["20", "30", "4", "--border"]).is_err());
        assert!(LaunchArgs::parse(["20", "30", "4", "--border", "mirror"]).is_err());
        assert!(LaunchArgs::parse(["20", "30", "4", "--verbose"]).is_err());
    }

    #[test_log::test]
    fn small_dimensions_fail_validation() {
        let args = LaunchArgs::parse(["4", "30", "2"]).unwrap();
        let config = args.apply_to(Config::default());
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("at least 5"), "{}", message);
    }

    #[test_log::test]
    fn worker_count_is_clamped_to_rows() {
        let args = LaunchArgs::parse(["6", "30", "50", "--no-pipe", "--no-render"]).unwrap();
        let config = args.apply_to(Config::default());
        config.validate().unwrap();
        assert_eq!(config.worker_count(), 6);
        assert!(!config.channel.enabled);
        assert!(!config.render.enabled);
    }
}
