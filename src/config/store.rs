//! Named preset store backed by a single JSON document.
//!
//! The store caches the merged collection (built-ins overlaid by saved presets)
//! after the first read. Every operation takes the same lock, so the
//! read-upsert-rewrite cycle of `save` and `delete` never interleaves.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::preset::{builtin_presets, is_builtin, merge_presets, Preset, PresetsDocument};
use super::settings::config_dir;
use crate::constants::config;
use crate::error::{Error, IoResultExt, Result};

#[derive(Debug, Default)]
struct StoreState {
    /// Merged collection; `None` until first read or after a write
    merged: Option<Vec<Preset>>,
}

#[derive(Debug)]
pub struct PresetStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl PresetStore {
    pub fn default_path() -> PathBuf {
        config_dir().join(config::PRESETS_FILENAME)
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn open_default() -> Self {
        Self::open(Self::default_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(config::BACKUP_EXTENSION);
        PathBuf::from(name)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A panic while holding the lock leaves at worst a stale cache
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop the cached collection so the next `list` re-reads the file
    pub fn invalidate(&self) {
        self.lock().merged = None;
    }

    /// Merged collection: built-in defaults overlaid by saved presets
    pub fn list(&self) -> Result<Vec<Preset>> {
        let mut state = self.lock();
        if let Some(merged) = &state.merged {
            return Ok(merged.clone());
        }

        info!(path = %self.path.display(), "Loading presets");
        let saved = self.read_saved()?;
        let merged = merge_presets(builtin_presets(), &saved);
        info!(count = merged.len(), "Loaded presets");

        state.merged = Some(merged.clone());
        Ok(merged)
    }

    pub fn get(&self, name: &str) -> Result<Preset> {
        self.list()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::preset_not_found(name))
    }

    /// Insert or replace a preset by name in the saved set
    pub fn save(&self, preset: &Preset) -> Result<()> {
        validate(preset)?;

        let mut state = self.lock();
        let mut saved = self.read_saved()?;
        match saved.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset.clone(),
            None => saved.push(preset.clone()),
        }

        self.write_saved(&saved)?;
        state.merged = None;

        info!(name = %preset.name, "Saved preset");
        Ok(())
    }

    /// Remove a saved preset, keeping the previous file as `<file>.bak`
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        let mut saved = self.read_saved()?;

        let Some(index) = saved.iter().position(|p| p.name == name) else {
            if is_builtin(name) {
                warn!(name = %name, "Built-in preset has no saved copy to delete");
                return Err(Error::NotFound {
                    kind: "saved preset (built-ins cannot be deleted)",
                    name: name.to_string(),
                });
            }
            warn!(name = %name, "Preset to delete not found");
            return Err(Error::preset_not_found(name));
        };
        saved.remove(index);

        // From here on the file may be gone, so the cache can no longer be trusted
        state.merged = None;
        let backup = self.backup_path();
        fs::rename(&self.path, &backup).with_path("back up presets file to", &backup)?;
        debug!(backup = %backup.display(), "Backed up presets file");

        self.write_saved(&saved)?;

        info!(name = %name, "Deleted preset");
        Ok(())
    }

    /// Names of the presets the user saved, in file order
    pub fn saved_names(&self) -> Result<Vec<String>> {
        let _state = self.lock();
        Ok(self.read_saved()?.into_iter().map(|p| p.name).collect())
    }

    /// Presets as stored on disk, without the built-in overlay
    fn read_saved(&self) -> Result<Vec<Preset>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("Presets file not found, using built-in presets");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err).with_path("read presets from", &self.path),
        };

        if contents.trim().is_empty() {
            info!("Presets file is empty, using built-in presets");
            return Ok(Vec::new());
        }

        let document: PresetsDocument =
            serde_json::from_str(&contents).map_err(|source| Error::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(document.presets)
    }

    /// Write through a sibling temp file and rename over the target
    fn write_saved(&self, presets: &[Preset]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_path("create presets directory", parent)?;
        }

        let document = PresetsDocument {
            presets: presets.to_vec(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|source| Error::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        fs::write(&tmp, json).with_path("write presets to", &tmp)?;
        fs::rename(&tmp, &self.path).with_path("replace presets file", &self.path)?;
        Ok(())
    }
}

fn validate(preset: &Preset) -> Result<()> {
    if preset.name.trim().is_empty() {
        return Err(Error::Validation("preset name cannot be empty".to_string()));
    }
    Ok(())
}
