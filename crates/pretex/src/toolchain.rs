//! The external typesetting toolchain and the file layout it works in.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const MEASUREMENT_LOG: &str = "boxsize.txt";

/// Per-document files under the batch work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub dir: PathBuf,
    pub pdf_dir: PathBuf,
    pub svg_dir: PathBuf,
    pub tex: PathBuf,
    pub pdf: PathBuf,
    pub log: PathBuf,
}

impl JobPaths {
    pub fn new(work_dir: &Path, key: &str) -> Self {
        let dir = work_dir.join(key);
        let pdf_dir = dir.join("pdf");
        let svg_dir = dir.join("svg");
        Self {
            tex: pdf_dir.join(format!("{key}.tex")),
            pdf: pdf_dir.join(format!("{key}.pdf")),
            log: pdf_dir.join(MEASUREMENT_LOG),
            dir,
            pdf_dir,
            svg_dir,
        }
    }

    /// Converted page `page` (1-based).
    pub fn svg(&self, page: usize) -> PathBuf {
        self.svg_dir.join(format!("out{page:03}.svg"))
    }

    /// Creates the directories and links `figure-images` to `img_dir`, so `\includegraphics`
    /// resolves from the typesetting directory.
    pub fn create(&self, img_dir: &Path) -> Result<()> {
        for dir in [&self.pdf_dir, &self.svg_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        let link = self.pdf_dir.join(crate::images::FIGURE_IMG_DIR);
        if link.symlink_metadata().is_err() && img_dir.is_dir() {
            let target = std::fs::canonicalize(img_dir).map_err(|e| Error::io(img_dir, e))?;
            link_dir(&target, &link).map_err(|e| Error::io(&link, e))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn link_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn link_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(not(any(unix, windows)))]
fn link_dir(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Ok(())
}

/// One document's typesetting run.
#[derive(Debug, Clone)]
pub struct TypesetJob {
    pub key: String,
    /// Source document, for error messages.
    pub document: PathBuf,
    pub paths: JobPaths,
    pub input: String,
}

/// One page to convert to a plain SVG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
    pub pdf: PathBuf,
    /// 1-based.
    pub page: usize,
    pub svg: PathBuf,
}

/// The external programs. Each method handles a whole batch and is called at most once per
/// batch, in declaration order.
pub trait Toolchain: Sync {
    /// Typesets every job's `.tex` into its `.pdf`, writing the measurement log next to it.
    fn typeset(&self, jobs: &[TypesetJob]) -> Result<()>;

    /// Extracts the fonts used by every job's PDF into `font_dir` as
    /// `[<key>]<font name>.woff`. Display extents left open by `typeset` are completed in the
    /// measurement logs.
    fn extract_fonts(&self, jobs: &[TypesetJob], font_dir: &Path) -> Result<()>;

    /// Converts each page to a plain SVG. Raster images embedded in the pages are written to
    /// `img_dir`.
    fn vectorize(&self, pages: &[PageJob], img_dir: &Path) -> Result<()>;
}

fn re_font_file() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(.*)\](.*)\.woff$").expect("valid regex"))
}

/// A converted font and the document it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFile {
    pub key: String,
    /// Family name as the vector converter spells it.
    pub name: String,
    pub path: PathBuf,
}

/// Splits `[<key>]<name>.woff`; `+` in the name stands for a space.
pub fn parse_font_file_name(file_name: &str) -> Option<(String, String)> {
    let caps = re_font_file().captures(file_name)?;
    Some((caps[1].to_string(), caps[2].replace('+', " ")))
}

/// Lists the converted fonts in `font_dir`, sorted by file name.
pub fn font_files(font_dir: &Path) -> Result<Vec<FontFile>> {
    let entries = std::fs::read_dir(font_dir).map_err(|e| Error::io(font_dir, e))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(font_dir, e))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some((key, name)) = parse_font_file_name(&file_name) {
            out.push(FontFile {
                key,
                name,
                path: entry.path(),
            });
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}
