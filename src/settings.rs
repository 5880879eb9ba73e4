use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::animation::AnimationOptions;

/// Playback defaults read from a TOML file; command line flags override them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub strict: bool,
    pub frames_per_second: Option<f32>,
    pub csv: Option<bool>,
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Query time used when none is given on the command line.
    pub time: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strict: true,
            frames_per_second: None,
            csv: None,
            looping: false,
            time: 0.0,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Self = toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `path` if it exists, falling back to the defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(fps) = self.frames_per_second {
            if fps.is_nan() || fps <= 0.0 {
                bail!("frames_per_second must be positive, got {}", fps);
            }
        }

        Ok(())
    }

    pub fn animation_options(&self) -> AnimationOptions {
        AnimationOptions {
            strict: self.strict,
            frames_per_second: self.frames_per_second,
            csv: self.csv,
            looping: self.looping,
        }
    }
}
