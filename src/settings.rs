use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::uniforms::MAX_LODS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainSettings {
    #[serde(default = "TerrainSettings::default_use_land_cover")]
    pub use_land_cover: bool,
    #[serde(default)]
    pub gpu_tessellation: bool,
    #[serde(default)]
    pub submission: SubmissionMode,
    #[serde(default = "TerrainSettings::default_initial_tile_capacity")]
    pub initial_tile_capacity: u32,
    #[serde(default = "TerrainSettings::default_initial_command_capacity")]
    pub initial_command_capacity: u32,
    #[serde(default = "TerrainSettings::default_max_contexts")]
    pub max_contexts: u32,
    #[serde(default)]
    pub lod_morph: Vec<LodMorphRange>,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            use_land_cover: Self::default_use_land_cover(),
            gpu_tessellation: false,
            submission: SubmissionMode::default(),
            initial_tile_capacity: Self::default_initial_tile_capacity(),
            initial_command_capacity: Self::default_initial_command_capacity(),
            max_contexts: Self::default_max_contexts(),
            lod_morph: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Parse(e)
    }
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}

impl TerrainSettings {
    pub fn try_load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str::<TerrainSettings>(&contents)?;
        Ok(settings.validate())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load_from_path(path) {
            Ok(settings) => {
                info!("Loaded terrain settings from {:?}", path);
                settings
            }
            Err(SettingsError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Terrain settings file {:?} not found. Using default settings.",
                    path
                );
                TerrainSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to load {:?} ({}). Falling back to default terrain settings.",
                    path, err
                );
                TerrainSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.initial_tile_capacity == 0 {
            warn!("Initial tile capacity must be greater than zero. Using default value.");
            self.initial_tile_capacity = Self::default_initial_tile_capacity();
        }

        if self.initial_command_capacity == 0 {
            warn!("Initial command capacity must be greater than zero. Using default value.");
            self.initial_command_capacity = Self::default_initial_command_capacity();
        }

        if self.max_contexts == 0 {
            warn!("Context count must be greater than zero. Using default value.");
            self.max_contexts = Self::default_max_contexts();
        }

        if self.lod_morph.len() > MAX_LODS {
            warn!(
                "{} LOD morph ranges configured, only the first {} are used.",
                self.lod_morph.len(),
                MAX_LODS
            );
            self.lod_morph.truncate(MAX_LODS);
        }

        for (lod, range) in self.lod_morph.iter_mut().enumerate() {
            if !range.is_valid() {
                warn!(
                    "LOD {} morph range [{}, {}] is degenerate. Morphing disabled for it.",
                    lod, range.start, range.end
                );
                *range = LodMorphRange::DISABLED;
            }
        }

        self
    }

    /// Primitive topology implied by the tessellation flag.
    pub fn topology(&self) -> crate::renderer::Topology {
        if self.gpu_tessellation {
            crate::renderer::Topology::Patches
        } else {
            crate::renderer::Topology::Triangles
        }
    }

    const fn default_use_land_cover() -> bool {
        true
    }

    const fn default_initial_tile_capacity() -> u32 {
        512
    }

    const fn default_initial_command_capacity() -> u32 {
        512
    }

    const fn default_max_contexts() -> u32 {
        64
    }
}

/// Camera distances over which a LOD morphs into its parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodMorphRange {
    pub start: f32,
    pub end: f32,
}

impl LodMorphRange {
    pub const DISABLED: Self = Self {
        start: 0.0,
        end: 0.0,
    };

    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.end > self.start
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    #[default]
    Indirect,
    Direct,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> TerrainSettings {
        TerrainSettings {
            initial_tile_capacity: 0,
            initial_command_capacity: 0,
            max_contexts: 0,
            lod_morph: vec![LodMorphRange::new(10.0, 5.0); MAX_LODS + 3],
            ..TerrainSettings::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = TerrainSettings::default();

        assert_eq!(validated.initial_tile_capacity, defaults.initial_tile_capacity);
        assert_eq!(
            validated.initial_command_capacity,
            defaults.initial_command_capacity
        );
        assert_eq!(validated.max_contexts, defaults.max_contexts);
        assert_eq!(validated.lod_morph.len(), MAX_LODS);
        assert!(validated
            .lod_morph
            .iter()
            .all(|range| *range == LodMorphRange::DISABLED));
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = TerrainSettings {
            use_land_cover: false,
            gpu_tessellation: true,
            submission: SubmissionMode::Direct,
            initial_tile_capacity: 64,
            initial_command_capacity: 32,
            max_contexts: 4,
            lod_morph: vec![LodMorphRange::new(100.0, 200.0)],
        };

        assert_eq!(valid.clone().validate(), valid);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let parsed: TerrainSettings =
            serde_json::from_str(r#"{ "submission": "direct", "gpu_tessellation": true }"#)
                .unwrap();

        assert_eq!(parsed.submission, SubmissionMode::Direct);
        assert!(parsed.gpu_tessellation);
        assert!(parsed.use_land_cover);
        assert_eq!(parsed.initial_tile_capacity, 512);
        assert_eq!(parsed.max_contexts, 64);
        assert!(parsed.lod_morph.is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = TerrainSettings::load_from_path("does/not/exist/terrain.json");
        assert_eq!(settings, TerrainSettings::default());
    }

    #[test]
    fn try_load_reports_missing_file() {
        let err = TerrainSettings::try_load_from_path("does/not/exist/terrain.json").unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }

    #[test]
    fn topology_follows_tessellation_flag() {
        let mut settings = TerrainSettings::default();
        assert_eq!(settings.topology(), crate::renderer::Topology::Triangles);
        settings.gpu_tessellation = true;
        assert_eq!(settings.topology(), crate::renderer::Topology::Patches);
    }
}
