//! Song metadata input

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Catalog entry for one backing track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongMetadata {
    pub id: String,
    /// Backing track (MR) location, `file://` URL or path
    pub mr_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "estimatedBPM", default, skip_serializing_if = "Option::is_none")]
    pub estimated_bpm: Option<f64>,
}

impl SongMetadata {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Resolve a relative `mr_url` against the directory of `metadata_path`
    pub fn resolve_relative_to(&mut self, metadata_path: &Path) {
        if self.mr_url.contains("://") || Path::new(&self.mr_url).is_absolute() {
            return;
        }
        if let Some(dir) = metadata_path.parent() {
            self.mr_url = dir.join(&self.mr_url).to_string_lossy().into_owned();
        }
    }
}
