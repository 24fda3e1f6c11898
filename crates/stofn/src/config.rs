//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! valid configuration:
//!
//! ```
//! use stofn::config::Config;
//!
//! let config = Config::from_json_str(r#"{ "physics": { "fixed_timestep": 0.01 } }"#).unwrap();
//! assert_eq!(config.physics.fixed_timestep, 0.01);
//! assert_eq!(config.physics.max_frame_time, 0.25);
//! assert!(config.scene.default_sublevel.is_none());
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading a [`Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config text is not valid JSON for [`Config`].
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value parsed but is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Alias for `std::result::Result<T, ConfigError>`.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for [`Scene`](crate::scene::Scene).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Sublevel created by `Scene::with_config`, if any.
    pub default_sublevel: Option<String>,
    /// Object capacity reserved up front.
    pub reserve_objects: usize,
    /// Whether releasing a sublevel tears down its whole hierarchy. When
    /// `false`, releasing a sublevel fails.
    pub allow_sublevel_release: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            default_sublevel: None,
            reserve_objects: 1024,
            allow_sublevel_release: false,
        }
    }
}

/// Settings for [`PhysicsRuntime`](crate::physics::PhysicsRuntime).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Length of one simulation step, in seconds.
    pub fixed_timestep: f32,
    /// Frame time is clamped to this before being accumulated, so a long
    /// stall can't queue an unbounded number of steps.
    pub max_frame_time: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 60.0,
            max_frame_time: 0.25,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fixed_timestep.is_finite() || self.fixed_timestep <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "physics.fixed_timestep must be positive, got {}",
                self.fixed_timestep
            )));
        }
        if !self.max_frame_time.is_finite() || self.max_frame_time <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "physics.max_frame_time must be positive, got {}",
                self.max_frame_time
            )));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scene: SceneConfig,
    pub physics: PhysicsConfig,
}

impl Config {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.physics.validate()
    }
}
