//! Content-addressed store of finished documents.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to finish a document without rendering it again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBundle {
    /// Contents of the `pretex-style` element.
    pub style: String,
    /// Contents of the `pretex-fonts` element.
    pub fonts: String,
    /// One placed graphic per rendered site, in site order.
    pub graphics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
    enabled: bool,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Reads the bundle stored under `key`. Missing, unreadable and undecodable entries are
    /// all misses.
    pub fn load(&self, key: &str) -> Option<CacheBundle> {
        if !self.enabled {
            return None;
        }
        let path = self.entry_path(key);
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(bundle) => Some(bundle),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring invalid cache entry");
                None
            }
        }
    }

    /// Writes `bundle` under `key`. Always written, so a `--no-cache` run still refreshes the
    /// store.
    pub fn store(&self, key: &str, bundle: &CacheBundle) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.entry_path(key);
        let text = serde_json::to_string(bundle)?;
        std::fs::write(&path, text).map_err(|e| Error::io(&path, e))
    }
}
