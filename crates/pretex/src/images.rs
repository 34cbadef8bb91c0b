//! Raster images emitted by the vector converter.

use crate::error::{Error, Result};
use crate::hash::b64_hash;
use crate::simplify::ImageStore;
use std::path::{Path, PathBuf};

/// Directory the published pages load figures from.
pub const FIGURE_IMG_DIR: &str = "figure-images";

/// Copies images out of the converter's output directory into the cache directory, renamed
/// by content hash.
#[derive(Debug, Clone)]
pub struct DirImageStore {
    source_dir: PathBuf,
    dest_dir: PathBuf,
    stored: Vec<String>,
}

impl DirImageStore {
    pub fn new(source_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            stored: Vec::new(),
        }
    }

    /// File names written so far.
    pub fn stored(&self) -> &[String] {
        &self.stored
    }
}

impl ImageStore for DirImageStore {
    fn store(&mut self, href: &str) -> Result<String> {
        // The converter's reference is relative to wherever it ran; only the file name is
        // meaningful.
        let file_name = Path::new(href)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| href.to_string());
        let source = self.source_dir.join(&file_name);
        let data = std::fs::read(&source).map_err(|e| Error::io(&source, e))?;
        let name = format!("{}.png", b64_hash(&data));
        std::fs::create_dir_all(&self.dest_dir).map_err(|e| Error::io(&self.dest_dir, e))?;
        let dest = self.dest_dir.join(&name);
        std::fs::write(&dest, &data).map_err(|e| Error::io(&dest, e))?;
        self.stored.push(name.clone());
        Ok(format!("{FIGURE_IMG_DIR}/{name}"))
    }
}
