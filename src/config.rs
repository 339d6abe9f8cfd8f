//! Config resolution: built-in defaults, then the config file, then CLI
//! overrides, merged deep for objects and overwrite for arrays and scalars.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_DIR: &str = ".claude-flow-csp";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Workspace directory holding `runs/`. CLI `--workspace` wins.
    pub workspace: Option<PathBuf>,
    pub solver: Solver,
    /// Binary that receives non-CSP argv.
    pub host_cli: String,
    /// Solver tuning knobs copied verbatim into the constraint build.
    pub overrides: serde_json::Map<String, Value>,
    pub policy: PolicyConfig,
    pub tools: ToolsConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Solver {
    Gurobi,
    Cbc,
    Highs,
}

impl Solver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Gurobi => "gurobi",
            Solver::Cbc => "cbc",
            Solver::Highs => "highs",
        }
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub max_iters: u32,
    pub truth_accept_threshold: f64,
    pub relax_order: Vec<String>,
    pub tighten_order: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Command and args for the transport-backed tool bridge. Empty means
    /// every non-dry-run tool call fails as a transport error.
    pub bridge: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workspace: None,
            solver: Solver::Cbc,
            host_cli: "claude-flow".to_string(),
            overrides: serde_json::Map::new(),
            policy: PolicyConfig {
                max_iters: 5,
                truth_accept_threshold: 0.8,
                relax_order: vec![
                    "widen_lattice".to_string(),
                    "increase_max_atoms".to_string(),
                    "expand_prototypes".to_string(),
                ],
                tighten_order: vec![
                    "increase_min_distance_scale".to_string(),
                    "narrow_density".to_string(),
                    "restrict_prototypes".to_string(),
                ],
            },
            tools: ToolsConfig { bridge: Vec::new() },
            persistence: PersistenceConfig {
                enabled: false,
                url: None,
            },
        }
    }
}

/// CLI flags that override file and default values.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub workspace: Option<PathBuf>,
    pub solver: Option<String>,
    pub max_iters: Option<u32>,
}

pub fn resolve(config_path: Option<&Path>, overrides: &CliOverrides) -> Result<Config> {
    let mut merged =
        serde_json::to_value(Config::default()).context("serialize default config")?;

    if let Some(file_value) = load_config_file(config_path)? {
        deep_merge(&mut merged, file_value);
    }
    deep_merge(&mut merged, overrides_value(overrides));

    let config: Config = serde_json::from_value(merged).context("resolve config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Reads `--config` when given (missing file is an error then), otherwise the
/// default `~/.claude-flow-csp/config.json` where absence is fine.
fn load_config_file(config_path: Option<&Path>) -> Result<Option<Value>> {
    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(None),
        },
    };
    if !path.is_file() {
        if required {
            return Err(anyhow!("config file not found: {}", path.display()));
        }
        return Ok(None);
    }
    let bytes =
        fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let value: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(Some(value))
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE))
}

fn overrides_value(overrides: &CliOverrides) -> Value {
    let mut value = json!({});
    if let Some(workspace) = &overrides.workspace {
        value["workspace"] = json!(workspace);
    }
    if let Some(solver) = &overrides.solver {
        value["solver"] = json!(solver);
    }
    if let Some(max_iters) = overrides.max_iters {
        value["policy"] = json!({ "max_iters": max_iters });
    }
    value
}

/// Objects merge key-by-key; arrays and scalars overwrite wholesale.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) if slot.is_object() && value.is_object() => {
                        deep_merge(slot, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

fn validate_config(config: &Config) -> Result<()> {
    let threshold = config.policy.truth_accept_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(anyhow!(
            "policy.truth_accept_threshold must be in [0, 1] (got {threshold})"
        ));
    }
    if config.host_cli.trim().is_empty() {
        return Err(anyhow!("host_cli must be non-empty"));
    }
    Ok(())
}
