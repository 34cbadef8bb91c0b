//! Two-phase batch driver.
//!
//! Phase 1 loads every document, settles the ones that need no rendering (no sites, or a cache
//! hit) and writes a typesetting input for each distinct cache key left. The toolchain then
//! runs once over the whole batch. Phase 2 reads the results back per document, finishes the
//! documents and stores their bundles.

use crate::cache::Cache;
use crate::document::{Document, Rendered};
use crate::error::{Error, Result};
use crate::extents::{Extents, read_extents};
use crate::images::DirImageStore;
use crate::toolchain::{JobPaths, PageJob, Toolchain, TypesetJob, font_files};
use crate::units::DEFAULT_FONT_SIZE;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Options {
    /// Caller preamble, inserted after the fixed one.
    pub preamble: String,
    pub cache_dir: PathBuf,
    /// Figures referenced by `\includegraphics`.
    pub img_dir: PathBuf,
    /// Read existing cache entries. Entries are written either way.
    pub use_cache: bool,
    /// Extra directory searched for LaTeX packages.
    pub style_path: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            preamble: String::new(),
            cache_dir: PathBuf::from("pretex-cache"),
            img_dir: PathBuf::from("figure-images"),
            use_cache: true,
            style_path: None,
        }
    }
}

impl Options {
    /// `TEXINPUTS` value that adds the style path to the default search path.
    pub fn texinputs(&self) -> Option<String> {
        self.style_path
            .as_ref()
            .map(|p| format!(".:{}:", p.display()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    /// Documents without sites, left untouched.
    pub skipped: usize,
    /// Documents finished from the cache.
    pub cached: usize,
    /// Documents finished from fresh toolchain output.
    pub rendered: usize,
}

enum Outcome {
    Skipped,
    Cached,
    Pending(Document),
}

/// Documents sharing one typesetting input.
struct Group {
    job: TypesetJob,
    documents: Vec<Document>,
}

pub struct Batch<'a, T: Toolchain> {
    options: &'a Options,
    toolchain: &'a T,
    work_dir: PathBuf,
    cache: Cache,
}

impl<'a, T: Toolchain> Batch<'a, T> {
    /// `work_dir` holds the intermediate files; it should be empty and is not cleaned up.
    pub fn new(options: &'a Options, toolchain: &'a T, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            options,
            toolchain,
            work_dir: work_dir.into(),
            cache: Cache::new(&options.cache_dir, options.use_cache),
        }
    }

    /// Processes `paths` in place. Cache hits are written back while the batch is still
    /// settling, so an error from the toolchain can leave those files already finished and the
    /// rest untouched.
    pub fn run(&self, paths: &[PathBuf]) -> Result<BatchReport> {
        tracing::info!("Processing {} files", paths.len());
        let mut report = BatchReport {
            total: paths.len(),
            ..Default::default()
        };

        let outcomes: Vec<Outcome> = paths
            .par_iter()
            .map(|path| self.settle(path))
            .collect::<Result<_>>()?;
        let mut groups: IndexMap<String, Group> = IndexMap::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Skipped => report.skipped += 1,
                Outcome::Cached => report.cached += 1,
                Outcome::Pending(doc) => {
                    report.rendered += 1;
                    let Some(extraction) = doc.extraction() else {
                        continue;
                    };
                    let key = extraction.key.clone();
                    if let Some(group) = groups.get_mut(&key) {
                        group.documents.push(doc);
                        continue;
                    }
                    let job = TypesetJob {
                        paths: JobPaths::new(&self.work_dir, &key),
                        key: key.clone(),
                        document: doc.path().to_path_buf(),
                        input: extraction.input.clone(),
                    };
                    groups.insert(
                        key,
                        Group {
                            job,
                            documents: vec![doc],
                        },
                    );
                }
            }
        }
        if groups.is_empty() {
            tracing::info!(cached = report.cached, skipped = report.skipped, "Done!");
            return Ok(report);
        }

        let jobs: Vec<TypesetJob> = groups.values().map(|g| g.job.clone()).collect();
        for job in &jobs {
            job.paths.create(&self.options.img_dir)?;
            std::fs::write(&job.paths.tex, &job.input).map_err(|e| Error::io(&job.paths.tex, e))?;
        }

        tracing::info!("Running LaTeX on {} inputs...", jobs.len());
        self.toolchain.typeset(&jobs)?;

        tracing::info!("Extracting fonts...");
        let font_dir = self.work_dir.join("woff");
        create_dir(&font_dir)?;
        self.toolchain.extract_fonts(&jobs, &font_dir)?;
        let mut fonts: HashMap<String, Vec<(String, Vec<u8>)>> = HashMap::new();
        for font in font_files(&font_dir)? {
            let data = std::fs::read(&font.path).map_err(|e| Error::io(&font.path, e))?;
            fonts.entry(font.key).or_default().push((font.name, data));
        }

        let extents: Vec<Extents> = jobs
            .iter()
            .map(|job| read_job_extents(job, &groups[&job.key].documents))
            .collect::<Result<_>>()?;

        tracing::info!("Generating svg files...");
        let img_dir = self.work_dir.join("img");
        create_dir(&img_dir)?;
        let pages: Vec<PageJob> = jobs
            .iter()
            .zip(&extents)
            .flat_map(|(job, ext)| {
                (1..=ext.records.len()).map(move |page| PageJob {
                    pdf: job.paths.pdf.clone(),
                    page,
                    svg: job.paths.svg(page),
                })
            })
            .collect();
        self.toolchain.vectorize(&pages, &img_dir)?;

        tracing::info!("Writing html files...");
        groups
            .into_values()
            .zip(extents)
            .collect::<Vec<_>>()
            .into_par_iter()
            .try_for_each(|(group, ext)| {
                let fonts = fonts.get(&group.job.key).map(Vec::as_slice).unwrap_or_default();
                self.finish(group, &ext, fonts, &img_dir)
            })?;

        tracing::info!(
            rendered = report.rendered,
            cached = report.cached,
            skipped = report.skipped,
            "Done!"
        );
        Ok(report)
    }

    /// Loads one document and finishes it if it needs no rendering.
    fn settle(&self, path: &Path) -> Result<Outcome> {
        let mut doc = Document::load(path)?;
        let Some(key) = doc.prepare(&self.options.preamble).map(|e| e.key.clone()) else {
            tracing::debug!(path = %path.display(), "no math");
            return Ok(Outcome::Skipped);
        };
        if let Some(bundle) = self.cache.load(&key) {
            if doc.accepts(&bundle) {
                doc.apply_cached(&bundle)?;
                doc.write()?;
                return Ok(Outcome::Cached);
            }
            tracing::warn!(path = %path.display(), %key, "cache entry does not fit; re-rendering");
        }
        tracing::info!("(Re)processing {}", file_name(path));
        Ok(Outcome::Pending(doc))
    }

    fn finish(
        &self,
        group: Group,
        extents: &Extents,
        fonts: &[(String, Vec<u8>)],
        img_dir: &Path,
    ) -> Result<()> {
        let Group { job, documents } = group;
        let pages = (1..=extents.records.len())
            .map(|page| {
                let path = job.paths.svg(page);
                std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))
            })
            .collect::<Result<Vec<_>>>()?;
        let rendered = Rendered {
            extents,
            pages: &pages,
            fonts,
        };
        let mut images = DirImageStore::new(img_dir, self.cache.dir());

        let mut documents = documents.into_iter();
        let Some(mut first) = documents.next() else {
            return Ok(());
        };
        let bundle = first.render(&rendered, &mut images)?;
        first.write()?;
        if !images.stored().is_empty() {
            tracing::debug!(
                document = %first.path().display(),
                images = images.stored().len(),
                "images copied to the cache"
            );
        }
        // Identical inputs elsewhere in the batch share the first one's output.
        for mut doc in documents {
            doc.apply_cached(&bundle)?;
            doc.write()?;
        }
        self.cache.store(&job.key, &bundle)
    }
}

fn read_job_extents(job: &TypesetJob, documents: &[Document]) -> Result<Extents> {
    let log = std::fs::read_to_string(&job.paths.log).map_err(|e| Error::io(&job.paths.log, e))?;
    let extents = read_extents(&log, DEFAULT_FONT_SIZE);
    let expected = documents
        .first()
        .and_then(Document::extraction)
        .map_or(0, |e| e.page_count());
    if extents.records.len() != expected {
        return Err(Error::SiteCountMismatch {
            document: job.document.display().to_string(),
            expected,
            found: extents.records.len(),
        });
    }
    Ok(extents)
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
