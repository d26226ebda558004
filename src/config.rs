//! Tunable options for layout, scheduling and rendering.
//!
//! Every option has a default, so a config file only needs the keys it
//! changes. Files are JSON:
//!
//! ```json
//! { "canvas": { "width": 1024 }, "physics": { "repulsion_strength": 650 } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::topology::Tier;
use crate::util::parse_hex_color;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON in {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VizConfig {
    pub canvas: CanvasConfig,
    pub schedule: ScheduleConfig,
    pub physics: PhysicsConfig,
    pub render: RenderConfig,
}

/// Canvas the layout is clamped to. Coordinates grow right and down.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: f32,
    pub height: f32,
    /// Distance nodes keep from every canvas edge.
    pub margin: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 500.0,
            margin: 20.0,
        }
    }
}

impl CanvasConfig {
    pub fn center(&self) -> (f32, f32) {
        (self.width * 0.5, self.height * 0.5)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Fixed simulation rate; host frames are converted into this many steps.
    pub tick_rate_hz: f32,
    /// Upper bound on steps run for one host frame after a stall.
    pub max_catch_up_ticks: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            max_catch_up_ticks: 4,
        }
    }
}

/// Vertical band centres as fractions of the canvas height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBands {
    pub core: f32,
    pub aggregation: f32,
    pub server: f32,
}

impl Default for TierBands {
    fn default() -> Self {
        Self {
            core: 0.15,
            aggregation: 0.45,
            server: 0.80,
        }
    }
}

impl TierBands {
    pub fn fraction(&self, tier: Tier) -> f32 {
        match tier {
            Tier::Core => self.core,
            Tier::Aggregation => self.aggregation,
            Tier::Server => self.server,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Ideal length of every link spring.
    pub link_distance: f32,
    /// Spring constant applied to `distance - link_distance`.
    pub link_strength: f32,
    /// Many-body repulsion; higher spreads unrelated nodes further apart.
    pub repulsion_strength: f32,
    /// Added to the squared distance so coincident nodes stay finite.
    pub repulsion_softening: f32,
    /// Push applied to overlapping node discs.
    pub collision_strength: f32,
    /// Weak pull of every node toward the canvas centre.
    pub center_strength: f32,
    /// Pull of each node's `y` toward its tier band. Keep above the other
    /// strengths or tiers may swap places.
    pub band_strength: f32,
    pub bands: TierBands,
    /// Fraction of velocity kept after each tick.
    pub velocity_damping: f32,
    /// Cooling rate of the simulation temperature per tick.
    pub alpha_decay: f32,
    /// Temperature below which the layout counts as settled.
    pub alpha_min: f32,
    /// Mean kinetic energy per node below which the layout counts as settled.
    pub settle_energy: f32,
    /// Tick budget per snapshot before the layout reports settled.
    pub max_ticks: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            link_distance: 100.0,
            link_strength: 0.08,
            repulsion_strength: 500.0,
            repulsion_softening: 100.0,
            collision_strength: 0.6,
            center_strength: 0.01,
            band_strength: 0.35,
            bands: TierBands::default(),
            velocity_damping: 0.6,
            alpha_decay: 0.0228,
            alpha_min: 0.001,
            settle_energy: 0.02,
            max_ticks: 300,
        }
    }
}

/// Inclusive numeric id window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub min: u64,
    pub max: u64,
}

impl IdRange {
    pub fn contains(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Travel time of a migration particle between hosts.
    pub particle_duration_ms: u64,
    /// Maximum offset of a container marker from its host centre.
    pub container_jitter: f32,
    /// "Other" containers are drawn only when their numeric id falls in here.
    pub other_visible_ids: IdRange,
    /// Chain name -> `#rrggbb`.
    pub chain_colors: BTreeMap<String, String>,
    pub other_color: String,
    /// Chain used for a container the snapshot carries no chain for.
    pub fallback_chains: BTreeMap<String, String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let chain_colors = [("Login Flow", "#3b82f6"), ("Data Pipeline", "#10b981")]
            .into_iter()
            .map(|(name, color)| (name.to_owned(), color.to_owned()))
            .collect();
        let fallback_chains = [
            ("Container_0", "Login Flow"),
            ("Container_1", "Login Flow"),
            ("Container_2", "Login Flow"),
            ("Container_3", "Data Pipeline"),
        ]
        .into_iter()
        .map(|(container, chain)| (container.to_owned(), chain.to_owned()))
        .collect();

        Self {
            particle_duration_ms: 1000,
            container_jitter: 12.0,
            other_visible_ids: IdRange { min: 0, max: 4 },
            chain_colors,
            other_color: "#eab308".to_owned(),
            fallback_chains,
        }
    }
}

impl VizConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let canvas = &self.canvas;
        if !(canvas.width > 0.0 && canvas.height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "canvas must have a positive size, got {}x{}",
                canvas.width, canvas.height
            )));
        }
        if !(canvas.margin >= 0.0)
            || canvas.margin * 2.0 >= canvas.width
            || canvas.margin * 2.0 >= canvas.height
        {
            return Err(ConfigError::Invalid(format!(
                "margin {} leaves no drawable area on a {}x{} canvas",
                canvas.margin, canvas.width, canvas.height
            )));
        }

        if !(self.schedule.tick_rate_hz > 0.0) {
            return Err(ConfigError::Invalid("tick_rate_hz must be positive".to_owned()));
        }

        let physics = &self.physics;
        let bands = physics.bands;
        if !(0.0 < bands.core && bands.core < bands.aggregation && bands.aggregation < bands.server)
            || bands.server >= 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "tier bands must satisfy 0 < core < aggregation < server < 1, got {} / {} / {}",
                bands.core, bands.aggregation, bands.server
            )));
        }
        if !(0.0..1.0).contains(&physics.velocity_damping) {
            return Err(ConfigError::Invalid(format!(
                "velocity_damping must lie in [0, 1), got {}",
                physics.velocity_damping
            )));
        }
        if !(0.0..1.0).contains(&physics.alpha_decay) {
            return Err(ConfigError::Invalid(format!(
                "alpha_decay must lie in [0, 1), got {}",
                physics.alpha_decay
            )));
        }
        if physics.link_distance <= 0.0 || physics.repulsion_softening <= 0.0 {
            return Err(ConfigError::Invalid(
                "link_distance and repulsion_softening must be positive".to_owned(),
            ));
        }

        let render = &self.render;
        if render.other_visible_ids.min > render.other_visible_ids.max {
            return Err(ConfigError::Invalid(format!(
                "other_visible_ids is empty: {} > {}",
                render.other_visible_ids.min, render.other_visible_ids.max
            )));
        }
        for (chain, color) in render
            .chain_colors
            .iter()
            .map(|(chain, color)| (chain.as_str(), color))
            .chain(std::iter::once(("other", &render.other_color)))
        {
            if parse_hex_color(color).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "colour `{color}` for chain `{chain}` is not #rrggbb"
                )));
            }
        }

        Ok(())
    }
}
