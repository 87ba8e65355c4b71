// Settings store - Persisted metronome settings, one record per practice item
// The UI reads a record and hands it to apply_settings; the engine never polls.

use super::settings::MetronomeSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Version written into every stored record
const FORMAT_VERSION: u32 = 1;

/// Settings store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Settings format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("No data directory available on this system")]
    NoDataDir,
}

/// Unique identifier of a practice item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PracticeItemId(Uuid);

impl PracticeItemId {
    /// Generate a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PracticeItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PracticeItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PracticeItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Persisted-configuration collaborator
pub trait SettingsStore {
    fn load(&self, item: PracticeItemId) -> Result<Option<MetronomeSettings>, StoreError>;

    fn save(&mut self, item: PracticeItemId, settings: &MetronomeSettings)
    -> Result<(), StoreError>;

    /// Returns whether a record existed
    fn remove(&mut self, item: PracticeItemId) -> Result<bool, StoreError>;

    /// Stored settings, or defaults for an item that has none yet
    fn load_or_default(&self, item: PracticeItemId) -> Result<MetronomeSettings, StoreError> {
        Ok(self.load(item)?.unwrap_or_default())
    }
}

/// Volatile store, for tests and previews
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    records: HashMap<PracticeItemId, MetronomeSettings>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no record is stored
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, item: PracticeItemId) -> Result<Option<MetronomeSettings>, StoreError> {
        Ok(self.records.get(&item).cloned())
    }

    fn save(
        &mut self,
        item: PracticeItemId,
        settings: &MetronomeSettings,
    ) -> Result<(), StoreError> {
        self.records.insert(item, settings.clone());
        Ok(())
    }

    fn remove(&mut self, item: PracticeItemId) -> Result<bool, StoreError> {
        Ok(self.records.remove(&item).is_some())
    }
}

/// On-disk encoding of the file store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFormat {
    #[default]
    Ron,
    Json,
}

impl StoreFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            StoreFormat::Ron => "ron",
            StoreFormat::Json => "json",
        }
    }

    fn encode(&self, record: &StoredSettings) -> Result<String, StoreError> {
        match self {
            StoreFormat::Ron => {
                ron::ser::to_string_pretty(record, ron::ser::PrettyConfig::default()).map_err(
                    |e| StoreError::Serialization(format!("Failed to serialize to RON: {}", e)),
                )
            }
            StoreFormat::Json => serde_json::to_string_pretty(record).map_err(|e| {
                StoreError::Serialization(format!("Failed to serialize to JSON: {}", e))
            }),
        }
    }

    fn decode(&self, data: &str) -> Result<StoredSettings, StoreError> {
        match self {
            StoreFormat::Ron => ron::from_str(data).map_err(|e| {
                StoreError::Serialization(format!("Failed to deserialize from RON: {}", e))
            }),
            StoreFormat::Json => serde_json::from_str(data).map_err(|e| {
                StoreError::Serialization(format!("Failed to deserialize from JSON: {}", e))
            }),
        }
    }
}

/// Record written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSettings {
    format_version: u32,
    item: PracticeItemId,
    saved_at: DateTime<Utc>,
    settings: MetronomeSettings,
}

/// One file per practice item under a directory
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    dir: PathBuf,
    format: StoreFormat,
}

impl FileSettingsStore {
    pub fn new(dir: impl Into<PathBuf>, format: StoreFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// Store under the platform data directory
    pub fn default_location() -> Result<Self, StoreError> {
        let dir = dirs::data_dir()
            .ok_or(StoreError::NoDataDir)?
            .join("practice_metronome")
            .join("settings");
        Ok(Self::new(dir, StoreFormat::default()))
    }

    /// Set the format used for new records
    pub fn with_format(mut self, format: StoreFormat) -> Self {
        self.format = format;
        self
    }

    /// Get the storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the record format
    pub fn format(&self) -> StoreFormat {
        self.format
    }

    /// File holding the record of `item`
    pub fn path_for(&self, item: PracticeItemId) -> PathBuf {
        self.dir.join(format!("{}.{}", item, self.format.extension()))
    }

    /// Items that have a record in this store
    pub fn items(&self) -> Result<Vec<PracticeItemId>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(self.format.extension()) {
                continue;
            }
            if let Some(item) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse().ok())
            {
                items.push(item);
            }
        }
        items.sort();
        Ok(items)
    }

    /// When the record of `item` was last written
    pub fn saved_at(&self, item: PracticeItemId) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.read_record(item)?.map(|record| record.saved_at))
    }

    fn read_record(&self, item: PracticeItemId) -> Result<Option<StoredSettings>, StoreError> {
        let path = self.path_for(item);
        if !path.exists() {
            return Ok(None);
        }

        let data = std::fs::read_to_string(&path)?;
        let record = self.format.decode(&data)?;
        if record.format_version > FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: record.format_version,
                supported: FORMAT_VERSION,
            });
        }
        Ok(Some(record))
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self, item: PracticeItemId) -> Result<Option<MetronomeSettings>, StoreError> {
        Ok(self.read_record(item)?.map(|record| record.settings))
    }

    fn save(
        &mut self,
        item: PracticeItemId,
        settings: &MetronomeSettings,
    ) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;

        let record = StoredSettings {
            format_version: FORMAT_VERSION,
            item,
            saved_at: Utc::now(),
            settings: settings.clone(),
        };
        let data = self.format.encode(&record)?;

        // Write beside the target and rename, so a crash never leaves half a file
        let path = self.path_for(item);
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, data)?;
        std::fs::rename(&temp_path, &path)?;

        log::debug!("Saved metronome settings of {} to {}", item, path.display());
        Ok(())
    }

    fn remove(&mut self, item: PracticeItemId) -> Result<bool, StoreError> {
        let path = self.path_for(item);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metronome::settings::{AccentPattern, ProgressionIntervalKind};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn sample_settings() -> MetronomeSettings {
        MetronomeSettings {
            bpm: 96,
            accent_pattern: AccentPattern::Custom,
            custom_accent_positions: Some(BTreeSet::from([0, 3])),
            ..Default::default()
        }
        .with_progression(120, 4, ProgressionIntervalKind::Seconds, 20)
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemorySettingsStore::new();
        let item = PracticeItemId::new();

        assert_eq!(store.load(item).unwrap(), None);
        assert_eq!(store.load_or_default(item).unwrap(), MetronomeSettings::default());

        store.save(item, &sample_settings()).unwrap();
        assert_eq!(store.load(item).unwrap(), Some(sample_settings()));
        assert_eq!(store.len(), 1);

        assert!(store.remove(item).unwrap());
        assert!(!store.remove(item).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_ron() {
        let dir = TempDir::new().unwrap();
        let mut store = FileSettingsStore::new(dir.path().join("settings"), StoreFormat::Ron);
        let item = PracticeItemId::new();

        assert_eq!(store.load(item).unwrap(), None);
        store.save(item, &sample_settings()).unwrap();

        assert!(store.path_for(item).exists());
        assert_eq!(store.load(item).unwrap(), Some(sample_settings()));
        assert!(store.saved_at(item).unwrap().is_some());
        assert_eq!(store.items().unwrap(), vec![item]);
    }

    #[test]
    fn test_file_store_json() {
        let dir = TempDir::new().unwrap();
        let mut store = FileSettingsStore::new(dir.path(), StoreFormat::Json);
        let item = PracticeItemId::new();

        store.save(item, &sample_settings()).unwrap();
        let raw = std::fs::read_to_string(store.path_for(item)).unwrap();
        assert!(raw.contains("\"format_version\": 1"));
        assert_eq!(store.load(item).unwrap(), Some(sample_settings()));

        assert!(store.remove(item).unwrap());
        assert_eq!(store.load(item).unwrap(), None);
    }

    #[test]
    fn test_newer_format_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path(), StoreFormat::Json);
        let item = PracticeItemId::new();

        let json = format!(
            r#"{{ "format_version": 99, "item": "{}", "saved_at": "2024-01-01T00:00:00Z", "settings": {{}} }}"#,
            item
        );
        std::fs::write(store.path_for(item), json).unwrap();

        assert!(matches!(
            store.load(item),
            Err(StoreError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path(), StoreFormat::Ron);
        let item = PracticeItemId::new();
        std::fs::write(store.path_for(item), "not ron at all {").unwrap();

        assert!(matches!(
            store.load(item),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_practice_item_id_parse() {
        let item = PracticeItemId::new();
        let parsed: PracticeItemId = item.to_string().parse().unwrap();
        assert_eq!(parsed, item);
        assert!("not-a-uuid".parse::<PracticeItemId>().is_err());
    }
}
