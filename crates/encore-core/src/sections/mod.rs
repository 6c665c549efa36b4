//! Saved practice sections
//!
//! Sections are stored as one JSON array under a single key of an injected
//! [`KeyValueStore`]. Records are immutable once saved.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key the section list lives under
pub const SAVED_SECTIONS_KEY: &str = "saved_sections";

/// Disambiguates sections created within the same microsecond
static SECTION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access store file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt store data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Section ordering is invalid
    #[error("Invalid section: point A {point_a:.3}s must precede point B {point_b:.3}s")]
    InvalidSection { point_a: f64, point_b: f64 },
}

/// A user-named A-B region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSection {
    pub id: String,
    pub name: String,
    pub point_a: f64,
    pub point_b: f64,
    pub created_at: DateTime<Utc>,
}

impl SavedSection {
    /// New section stamped with the current time
    ///
    /// The id combines the creation time in microseconds with a process-wide
    /// sequence number.
    pub fn new(name: impl Into<String>, point_a: f64, point_b: f64) -> Result<Self, StoreError> {
        if !(point_a.is_finite() && point_b.is_finite() && 0.0 <= point_a && point_a < point_b) {
            return Err(StoreError::InvalidSection { point_a, point_b });
        }
        let created_at = Utc::now();
        Ok(Self {
            id: format!(
                "section-{}-{}",
                created_at.timestamp_micros(),
                SECTION_SEQUENCE.fetch_add(1, Ordering::Relaxed)
            ),
            name: name.into(),
            point_a,
            point_b,
            created_at,
        })
    }
}

/// String key-value persistence
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object file, rewritten on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        log::info!("Opened store {:?} ({} keys)", path, entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to disk, then adopt them; memory is untouched on failure
    fn commit(&mut self, entries: HashMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, json).map_err(io_err)?;
        self.entries = entries;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.clone();
        entries.insert(key.to_string(), value);
        self.commit(entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if !self.entries.contains_key(key) {
            return Ok(());
        }
        let mut entries = self.entries.clone();
        entries.remove(key);
        self.commit(entries)
    }
}

/// Reads and writes the saved-section list
pub struct SavedSectionRepository {
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl SavedSectionRepository {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self::with_key(store, SAVED_SECTIONS_KEY)
    }

    pub fn with_key(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// All sections in save order
    pub fn list(&self) -> Result<Vec<SavedSection>, StoreError> {
        match self.store.get(&self.key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the whole list
    pub fn write_all(&mut self, sections: &[SavedSection]) -> Result<(), StoreError> {
        let json = serde_json::to_string(sections)?;
        self.store.set(&self.key, json)
    }

    /// Append `section`; returns the updated list
    pub fn save(&mut self, section: SavedSection) -> Result<Vec<SavedSection>, StoreError> {
        let mut sections = self.list()?;
        log::info!(
            "Saving section '{}' ({:.2}s - {:.2}s)",
            section.name,
            section.point_a,
            section.point_b
        );
        sections.push(section);
        self.write_all(&sections)?;
        Ok(sections)
    }

    /// Delete the section with `id`; returns the updated list
    pub fn remove(&mut self, id: &str) -> Result<Vec<SavedSection>, StoreError> {
        let mut sections = self.list()?;
        let before = sections.len();
        sections.retain(|s| s.id != id);
        if sections.len() == before {
            log::debug!("No saved section with id {}", id);
            return Ok(sections);
        }
        if sections.is_empty() {
            self.store.remove(&self.key)?;
        } else {
            self.write_all(&sections)?;
        }
        Ok(sections)
    }

    pub fn find(&self, id: &str) -> Result<Option<SavedSection>, StoreError> {
        Ok(self.list()?.into_iter().find(|s| s.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn section(id: &str, a: f64, b: f64) -> SavedSection {
        SavedSection {
            id: id.to_string(),
            name: format!("Chorus {id}"),
            point_a: a,
            point_b: b,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_write_then_read_identical() {
        let mut repo = SavedSectionRepository::new(Box::new(MemoryStore::new()));
        let sections = vec![section("1", 10.0, 20.0), section("2", 42.5, 61.25)];
        repo.write_all(&sections).unwrap();
        assert_eq!(repo.list().unwrap(), sections);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_string(&section("1", 10.0, 20.0)).unwrap();
        assert!(json.contains("\"pointA\":10.0"));
        assert!(json.contains("\"pointB\":20.0"));
        assert!(json.contains("\"createdAt\":\"2024-05-01T12:00:00Z\""));
    }

    #[test]
    fn test_save_and_remove() {
        let mut repo = SavedSectionRepository::new(Box::new(MemoryStore::new()));
        assert!(repo.list().unwrap().is_empty());

        repo.save(section("1", 1.0, 2.0)).unwrap();
        let listed = repo.save(section("2", 3.0, 4.0)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(repo.find("2").unwrap().map(|s| s.point_a), Some(3.0));

        let listed = repo.remove("1").unwrap();
        assert_eq!(listed, vec![section("2", 3.0, 4.0)]);
        assert_eq!(repo.remove("missing").unwrap().len(), 1);
        assert!(repo.remove("2").unwrap().is_empty());
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn test_new_section_validates_points() {
        assert!(SavedSection::new("ok", 1.0, 2.0).is_ok());
        assert!(matches!(
            SavedSection::new("bad", 5.0, 3.0),
            Err(StoreError::InvalidSection { .. })
        ));
        assert!(SavedSection::new("nan", f64::NAN, 3.0).is_err());
    }

    #[test]
    fn test_sections_created_together_get_distinct_ids() {
        let first = SavedSection::new("a", 1.0, 2.0).unwrap();
        let second = SavedSection::new("b", 1.0, 2.0).unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.id.starts_with("section-"));
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sections.json");
        let mut store = JsonFileStore::open(&path).unwrap();
        store.set("kept", "1".to_string()).unwrap();

        // A directory where the file should be makes every write fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(
            store.set("lost", "2".to_string()),
            Err(StoreError::Io { .. })
        ));
        assert_eq!(store.get("lost").unwrap(), None);
        assert!(store.remove("kept").is_err());
        assert_eq!(store.get("kept").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("sections.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            let mut repo = SavedSectionRepository::new(Box::new(store));
            repo.save(section("1", 10.0, 20.0)).unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        let repo = SavedSectionRepository::new(Box::new(store));
        assert_eq!(repo.list().unwrap(), vec![section("1", 10.0, 20.0)]);
    }

    #[test]
    fn test_corrupt_store_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sections.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
