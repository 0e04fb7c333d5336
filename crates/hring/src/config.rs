//! Simulation configuration.
//!
//! Loaded from JSON; every field has a default, so `{}` is a valid config.
//!
//! ```json
//! { "width": 80, "height": 48, "aspect": 0.5, "bias": 0.5,
//!   "diagnostics_addr": "127.0.0.1:9300" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::grid::Torus;
use crate::visibility::Optics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// World size in cells.
    pub width: u32,
    pub height: u32,
    /// Cell width over cell height, in (0, 1].
    pub aspect: f32,
    /// Extra reach added to every light radius.
    pub bias: f32,
    /// Where diagnostics datagrams go. `None` keeps them local.
    pub diagnostics_addr: Option<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            aspect: 1.0,
            bias: 0.5,
            diagnostics_addr: None,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::info!("loading config from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.width == 0 || self.height == 0 {
            return Err(SimError::Config(format!(
                "world must be at least 1x1, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.aspect > 0.0 && self.aspect <= 1.0) {
            return Err(SimError::Config(format!(
                "aspect must be in (0, 1], got {}",
                self.aspect
            )));
        }
        if !(self.bias.is_finite() && self.bias >= 0.0) {
            return Err(SimError::Config(format!(
                "bias must be a non-negative number, got {}",
                self.bias
            )));
        }
        Ok(())
    }

    pub fn torus(&self) -> Torus {
        Torus::new(self.width, self.height)
    }

    pub fn optics(&self) -> Optics {
        Optics {
            aspect: self.aspect,
            bias: self.bias,
        }
    }
}
