//! Settings file persistence.
//!
//! The settings file is a single JSON document shared by every part of the
//! application. The watcher only reads the repository roots, the pinned
//! worktrees and the pull request tracking flag from it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SettingsError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppearanceMode {
    #[default]
    System,
    Light,
    Dark,
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalSettings {
    pub appearance_mode: AppearanceMode,
    pub in_app_notifications_enabled: bool,
    pub pull_request_tracking_enabled: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            appearance_mode: AppearanceMode::System,
            in_app_notifications_enabled: true,
            pull_request_tracking_enabled: true,
        }
    }
}

/// Per-repository settings, keyed by normalized root path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositorySettings {
    pub run_script: String,
}

/// On-disk settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsFile {
    pub global: GlobalSettings,
    pub repository_roots: Vec<String>,
    #[serde(rename = "pinnedWorktreeIDs")]
    pub pinned_worktree_ids: Vec<String>,
    pub repositories: BTreeMap<String, RepositorySettings>,
}

/// Byte-level storage behind the settings store.
pub trait SettingsStorage: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<u8>>;
    fn save(&self, data: &[u8], path: &Path) -> Result<()>;
}

/// Stores settings on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSettingsStorage;

impl SettingsStorage for FileSettingsStorage {
    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SettingsError::Missing(path.to_path_buf())
            } else {
                SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }

    fn save(&self, data: &[u8], path: &Path) -> Result<()> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        // Write to a sibling temp file, then rename over the target.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)
    }
}

/// Keeps settings in memory. Used by tests and previews.
#[derive(Debug, Default)]
pub struct InMemorySettingsStorage {
    data: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl InMemorySettingsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes stored at `path`, if any.
    pub fn data(&self, path: &Path) -> Option<Vec<u8>> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

impl SettingsStorage for InMemorySettingsStorage {
    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        self.data(path)
            .ok_or_else(|| SettingsError::Missing(path.to_path_buf()))
    }

    fn save(&self, data: &[u8], path: &Path) -> Result<()> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }
}

impl<S: SettingsStorage + ?Sized> SettingsStorage for std::sync::Arc<S> {
    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        (**self).load(path)
    }

    fn save(&self, data: &[u8], path: &Path) -> Result<()> {
        (**self).save(data, path)
    }
}

/// Default settings location: `~/.canopy/settings.json`.
pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".canopy")
        .join("settings.json")
}

/// Normalized key for a repository root.
///
/// Drops `.` components and trailing separators without touching the
/// filesystem, so the key is stable whether or not the root exists.
pub fn repository_key(root: &Path) -> String {
    let normalized: PathBuf = root
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    normalized.to_string_lossy().into_owned()
}

/// Reads and writes the settings document through a storage backend.
pub struct SettingsStore<S: SettingsStorage> {
    storage: S,
    path: PathBuf,
}

impl SettingsStore<FileSettingsStorage> {
    /// File-backed store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSettingsStorage, path)
    }
}

impl<S: SettingsStorage> SettingsStore<S> {
    pub fn new(storage: S, path: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            path: path.into(),
        }
    }

    /// Load the settings document.
    ///
    /// A missing or unparseable file is replaced with defaults, which are
    /// written back before returning.
    pub fn load(&self) -> Result<SettingsFile> {
        match self.storage.load(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<SettingsFile>(&bytes) {
                Ok(settings) => return Ok(settings),
                Err(_) => {
                    // Broken file: fall through and reset to defaults
                }
            },
            Err(SettingsError::Missing(_)) => {}
            Err(e) => return Err(e),
        }

        let defaults = SettingsFile::default();
        self.save(&defaults)?;
        Ok(defaults)
    }

    /// Persist the whole document, pretty-printed with sorted keys.
    pub fn save(&self, settings: &SettingsFile) -> Result<()> {
        // Round-trip through Value: its map type keeps keys sorted.
        let value = serde_json::to_value(settings)?;
        let data = serde_json::to_vec_pretty(&value)?;
        self.storage.save(&data, &self.path)
    }

    /// Load, mutate and save in one step. Returns the saved document.
    pub fn update<F>(&self, f: F) -> Result<SettingsFile>
    where
        F: FnOnce(&mut SettingsFile),
    {
        let mut settings = self.load()?;
        f(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }

    pub fn repository_roots(&self) -> Result<Vec<String>> {
        Ok(self.load()?.repository_roots)
    }

    pub fn set_repository_roots(&self, roots: Vec<String>) -> Result<()> {
        self.update(|s| s.repository_roots = roots).map(|_| ())
    }

    pub fn pinned_worktree_ids(&self) -> Result<Vec<String>> {
        Ok(self.load()?.pinned_worktree_ids)
    }

    pub fn set_pinned_worktree_ids(&self, ids: Vec<String>) -> Result<()> {
        self.update(|s| s.pinned_worktree_ids = ids).map(|_| ())
    }

    /// Settings for the repository at `root`, creating and persisting the
    /// default entry on first access.
    pub fn repository_settings(&self, root: &Path) -> Result<RepositorySettings> {
        let key = repository_key(root);
        let mut settings = self.load()?;
        if let Some(existing) = settings.repositories.get(&key) {
            return Ok(existing.clone());
        }
        let defaults = RepositorySettings::default();
        settings.repositories.insert(key, defaults.clone());
        self.save(&settings)?;
        Ok(defaults)
    }

    pub fn save_repository_settings(&self, root: &Path, repo: RepositorySettings) -> Result<()> {
        let key = repository_key(root);
        self.update(|s| {
            s.repositories.insert(key, repo);
        })
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_key_strips_cur_dir_and_trailing_slash() {
        assert_eq!(repository_key(Path::new("/tmp/repo/")), "/tmp/repo");
        assert_eq!(repository_key(Path::new("/tmp/./repo")), "/tmp/repo");
        assert_eq!(repository_key(Path::new("/tmp/repo")), "/tmp/repo");
    }

    #[test]
    fn test_settings_file_defaults() {
        let settings = SettingsFile::default();
        assert_eq!(settings.global.appearance_mode, AppearanceMode::System);
        assert!(settings.global.in_app_notifications_enabled);
        assert!(settings.global.pull_request_tracking_enabled);
        assert!(settings.repository_roots.is_empty());
    }

    #[test]
    fn test_decodes_file_missing_newer_fields() {
        let json = r#"{
            "global": { "appearanceMode": "dark" },
            "repositoryRoots": ["/tmp/repo-a"]
        }"#;
        let settings: SettingsFile = serde_json::from_str(json).unwrap();
        assert_eq!(settings.global.appearance_mode, AppearanceMode::Dark);
        assert!(settings.global.in_app_notifications_enabled);
        assert!(settings.global.pull_request_tracking_enabled);
        assert_eq!(settings.repository_roots, vec!["/tmp/repo-a".to_string()]);
        assert!(settings.pinned_worktree_ids.is_empty());
    }

    #[test]
    fn test_save_writes_sorted_camel_case_keys() {
        let storage = InMemorySettingsStorage::new();
        let store = SettingsStore::new(storage, "/virtual/settings.json");
        store.save(&SettingsFile::default()).unwrap();

        let bytes = store.storage.data(Path::new("/virtual/settings.json")).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let global = text.find("\"global\"").unwrap();
        let pinned = text.find("\"pinnedWorktreeIDs\"").unwrap();
        let roots = text.find("\"repositoryRoots\"").unwrap();
        assert!(global < pinned && pinned < roots);
        assert!(text.contains("\"inAppNotificationsEnabled\": true"));
    }

    #[test]
    fn test_file_storage_missing_maps_to_missing_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = FileSettingsStorage
            .load(&dir.path().join("nope.json"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Missing(_)));
    }

    #[test]
    fn test_file_storage_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        FileSettingsStorage.save(b"{}", &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(!path.with_extension("json.tmp").exists());
    }
}
