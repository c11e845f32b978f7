use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_SHADOW_MAP_SIZE: u32 = 8192;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    /// Global switch; a camera still has to opt in through its own flag.
    #[serde(default = "RenderSettings::default_depth_of_field")]
    pub depth_of_field: bool,
    /// Tap radius in texels of the blur used by the depth-of-field composite.
    #[serde(default = "RenderSettings::default_blur_radius")]
    pub composite_blur_radius: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shadow_map_size: Self::default_shadow_map_size(),
            depth_of_field: Self::default_depth_of_field(),
            composite_blur_radius: Self::default_blur_radius(),
        }
    }
}

/// Why a settings file could not be used.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl RenderSettings {
    /// `settings.json` in the working directory, or defaults.
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    /// Never fails: an absent file means defaults, an unreadable or
    /// malformed one is logged and replaced by defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_path(path) {
            Ok(settings) => settings,
            Err(SettingsError::Read { path, source })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                info!("No render settings at {:?}; using defaults", path);
                Self::default()
            }
            Err(err) => {
                warn!("{}; using default render settings", err);
                Self::default()
            }
        }
    }

    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self =
            serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Loaded render settings from {:?}", path);
        Ok(settings.validate())
    }

    pub fn validate(mut self) -> Self {
        match self.shadow_map_size {
            0 => {
                warn!("Shadow map size 0 replaced by {}", Self::default_shadow_map_size());
                self.shadow_map_size = Self::default_shadow_map_size();
            }
            size if size > MAX_SHADOW_MAP_SIZE => {
                warn!("Shadow map size {} clamped to {}", size, MAX_SHADOW_MAP_SIZE);
                self.shadow_map_size = MAX_SHADOW_MAP_SIZE;
            }
            _ => {}
        }

        if !self.composite_blur_radius.is_finite() || self.composite_blur_radius < 0.0 {
            warn!(
                "Composite blur radius {} replaced by {}",
                self.composite_blur_radius,
                Self::default_blur_radius()
            );
            self.composite_blur_radius = Self::default_blur_radius();
        }

        self
    }

    const fn default_shadow_map_size() -> u32 {
        1024
    }

    const fn default_depth_of_field() -> bool {
        true
    }

    const fn default_blur_radius() -> f32 {
        2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let invalid = RenderSettings {
            shadow_map_size: 0,
            depth_of_field: false,
            composite_blur_radius: f32::NAN,
        };

        let validated = invalid.validate();

        assert_eq!(
            validated.shadow_map_size,
            RenderSettings::default().shadow_map_size
        );
        assert_eq!(
            validated.composite_blur_radius,
            RenderSettings::default().composite_blur_radius
        );
        assert!(!validated.depth_of_field);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            shadow_map_size: 2048,
            depth_of_field: false,
            composite_blur_radius: 4.0,
        };

        let validated = valid.clone().validate();

        assert_eq!(validated.shadow_map_size, valid.shadow_map_size);
        assert_eq!(validated.composite_blur_radius, valid.composite_blur_radius);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let parsed: RenderSettings =
            serde_json::from_str(r#"{ "depth_of_field": false }"#).unwrap();

        assert!(!parsed.depth_of_field);
        assert_eq!(parsed.shadow_map_size, 1024);
        assert_eq!(parsed.composite_blur_radius, 2.0);
    }

    #[test]
    fn oversized_shadow_map_is_clamped() {
        let settings = RenderSettings {
            shadow_map_size: 1 << 16,
            ..RenderSettings::default()
        }
        .validate();
        assert_eq!(settings.shadow_map_size, MAX_SHADOW_MAP_SIZE);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = RenderSettings::try_load_from_path("does/not/exist/settings.json").unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RenderSettings::load_from_path("does/not/exist/settings.json");
        assert_eq!(
            settings.shadow_map_size,
            RenderSettings::default().shadow_map_size
        );
    }
}
