use crate::enums::{Activation, AgentKind, Arena, Normalization, OutputAction, Perception};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Configuration for the arena geometry
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ArenaConfig {
    #[serde(default = "default_dimension")]
    pub dimension: u32,
    pub kind: Arena,
    /// Full extent per axis (diameter for circular arenas).
    pub shape: Vec<f32>,
    /// Per-axis periodicity. Ignored (forced reflective) for circular arenas.
    #[serde(default)]
    pub periodic: Option<Vec<bool>>,
}

// Configuration for the run itself
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    pub steps: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_record_interval")]
    pub record_interval_steps: u32,
}

// Zone grid for one group of RIPO agents
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GridConfig {
    /// Radial zone boundaries, strictly ascending. Empty means a single
    /// radial band.
    #[serde(default)]
    pub radii: Vec<f32>,
    #[serde(default = "default_slices")]
    pub slices: u32,
}

// One configured perception input
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InputConfig {
    pub perception: Perception,
    #[serde(default = "default_normalization")]
    pub normalization: Normalization,
    /// Raw coefficients, length = outputs x zones x perceived groups.
    /// Defaults to all-zero (the input is configured but inert).
    #[serde(default)]
    pub coefficients: Option<Vec<f32>>,
}

// One configured output
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputSpecConfig {
    pub action: OutputAction,
    pub activation: Activation,
}

// One agent group
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GroupConfig {
    pub name: String,
    pub kind: AgentKind,
    pub count: u32,
    #[serde(default)]
    pub vmin: f32,
    #[serde(default = "default_vmax")]
    pub vmax: f32,
    /// Initial speed; defaults to vmax.
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default = "default_damax")]
    pub damax: f32,
    #[serde(default)]
    pub vnoise: f32,
    #[serde(default)]
    pub anoise: f32,
    /// Hard perception cutoff radius; absent means unlimited range.
    #[serde(default)]
    pub rmax: Option<f32>,
    #[serde(default)]
    pub grid: Option<GridConfig>,
    /// Explicit initial positions; absent means sampled uniformly in the arena.
    #[serde(default)]
    pub position: Option<Vec<[f32; 2]>>,
    /// Explicit initial headings; absent means sampled uniformly in [0, 2pi).
    #[serde(default)]
    pub orientation: Option<Vec<f32>>,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub outputs: Vec<OutputSpecConfig>,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default)]
    pub save_positions: bool,
    #[serde(default = "default_save_stats")]
    pub save_stats: bool,
    #[serde(default)]
    pub save_state_in_snapshot: bool,
    /// Output format: "json", "bincode", "messagepack"
    #[serde(default)]
    pub format: Option<String>,
}

/// Main simulation configuration, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub arena: ArenaConfig,
    pub run: RunConfig,
    pub groups: Vec<GroupConfig>,
    pub output: OutputConfig,
}

fn default_dimension() -> u32 { 2 }
fn default_record_interval() -> u32 { 1 }
fn default_slices() -> u32 { 4 }
fn default_normalization() -> Normalization { Normalization::None }
fn default_vmax() -> f32 { 0.01 }
fn default_damax() -> f32 { std::f32::consts::FRAC_PI_2 }
fn default_save_stats() -> bool { true }

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e)
        })?;
        Self::from_toml(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration from a TOML string.
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.arena.shape.len() != self.arena.dimension as usize {
            anyhow::bail!(
                "arena.shape must have {} entries, got {}.",
                self.arena.dimension,
                self.arena.shape.len()
            );
        }
        if self.arena.shape.iter().any(|&s| s <= 0.0) {
            anyhow::bail!("arena.shape entries must be positive.");
        }
        if self.groups.is_empty() {
            anyhow::bail!("at least one [[groups]] section is required.");
        }
        for g in &self.groups {
            if g.count == 0 {
                anyhow::bail!("group '{}': count must be greater than 0.", g.name);
            }
            if g.vmax < g.vmin {
                anyhow::bail!("group '{}': vmax must be >= vmin.", g.name);
            }
            if g.vnoise < 0.0 || g.anoise < 0.0 {
                anyhow::bail!("group '{}': noise standard deviations must be >= 0.", g.name);
            }
        }
        Ok(())
    }
}
