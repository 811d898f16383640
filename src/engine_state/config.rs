//! Terrain configuration, loaded from JSON.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Tunables of the terrain core. Every field has a default, so a config file only needs
/// to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Chebyshev radius, in sections, of the visibility search and seeding
    pub render_distance: i32,
    /// Worker threads for chunk builds; 0 picks a count from the available cores
    pub builder_threads: usize,
    /// Drop sections beyond the fog end from the render lists
    pub use_fog_occlusion: bool,
    /// Only traverse through section faces that can see each other
    pub use_occlusion_culling: bool,
    /// Skip drawing model faces that point away from the camera
    pub use_block_face_culling: bool,
    /// Maximum sections queued per rebuild type in one frame
    pub rebuild_queue_cap: usize,
    /// Arena fragmentation ratio above which a region is compacted after uploads
    pub defrag_threshold: f32,
    pub min_section_y: i32,
    /// One past the highest section Y
    pub max_section_y: i32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            render_distance: 8,
            builder_threads: 0,
            use_fog_occlusion: true,
            use_occlusion_culling: true,
            use_block_face_culling: true,
            rebuild_queue_cap: 32,
            defrag_threshold: 0.000008,
            min_section_y: -4,
            max_section_y: 20,
        }
    }
}

impl TerrainConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid terrain config")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read terrain config {}", path.display()))?;

        Self::from_json_str(&json).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = TerrainConfig::from_json_str(r#"{ "render_distance": 4 }"#).unwrap();

        assert_eq!(config.render_distance, 4);
        assert_eq!(config.rebuild_queue_cap, 32);
        assert!(config.use_occlusion_culling);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let error = TerrainConfig::from_json_str("{ render_distance: }").unwrap_err();
        assert!(error.to_string().contains("invalid terrain config"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let error = TerrainConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(format!("{:#}", error).contains("/definitely/not/here.json"));
    }
}
