//! One HTML file moving through the pipeline.

use crate::cache::CacheBundle;
use crate::dom::Tree;
use crate::error::{Error, Result};
use crate::extents::Extents;
use crate::extract::{self, Extraction, SiteKind};
use crate::place::place;
use crate::simplify::{ImageStore, StyleContext, default_path_style, default_text_style};
use crate::splice::{remove_site, splice};
use crate::units::fmt_num;
use std::path::{Path, PathBuf};

pub const STYLE_ELEMENT_ID: &str = "pretex-style";
pub const FONTS_ELEMENT_ID: &str = "pretex-fonts";

/// Layout rules for the wrappers built by the placement code.
pub const PRETEX_STYLE: &str = "
.pretex-bind {
  display: inline-block;
}
.pretex-inline {
  display: inline-block;
}
.pretex-inline span {
  display: inline-block;
}
.pretex-inline span:last-child {
  position: relative;
}
.pretex-inline span:last-child svg.pretex {
  position: absolute;
  bottom:   0;
  height:   1em;
}
svg.pretex {
  display:      inline-block;
  overflow:     visible;
  font-variant: normal;
  font-weight:  normal;
  font-style:   normal;
}
.pretex-display {
  text-align:  center;
  margin:      1em 0;
  padding:     0;
  text-indent: 0;
  text-transform: none;
  position: relative;
}
.pretex-display svg.pretex {
  vertical-align: middle;
}
.pretex-display .tag {
  position:    absolute;
  right:       0;
  top:         0;
}
.pretex-display .tag > span {
  display: inline-block;
}
";

/// The shared stylesheet: wrapper layout plus the properties stripped from every `text` and
/// `path` by simplification.
pub fn page_style(font_size: f64) -> String {
    let mut text = default_text_style();
    text.insert("font-size", &format!("{}px", fmt_num(font_size)));
    format!(
        "{PRETEX_STYLE}svg.pretex text {{\n  {}\n}}\nsvg.pretex path {{\n  {}\n}}\n",
        text.to_css(),
        default_path_style().to_css()
    )
}

/// Embedded fonts and the classes hoisted out of the graphics.
pub fn font_style(ctx: &StyleContext) -> String {
    let mut out = ctx.fonts.font_faces();
    out.push_str(&ctx.text_classes.css("svg.pretex tspan"));
    out.push_str(&ctx.path_classes.css("svg.pretex path"));
    out.push_str(&ctx.fonts.family_rules("svg.pretex tspan"));
    out
}

/// Inputs to [`Document::render`] produced by the external toolchain.
pub struct Rendered<'a> {
    pub extents: &'a Extents,
    /// Converted page markup, one per geometry record.
    pub pages: &'a [String],
    /// `(family name, woff payload)` for every embedded font.
    pub fonts: &'a [(String, Vec<u8>)],
}

#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    tree: Tree,
    extraction: Option<Extraction>,
}

impl Document {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Self::from_markup(path, &text))
    }

    /// Parses `text` as HTML. Malformed markup is recovered from, never rejected.
    pub fn from_markup(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            tree: Tree::parse_html(text),
            extraction: None,
        }
    }

    /// Extracts the sites and builds the typesetting input. Returns `None` when the document
    /// has nothing to render and should be left alone.
    pub fn prepare(&mut self, preamble: &str) -> Option<&Extraction> {
        self.extraction = extract::extract(&self.tree, preamble);
        self.extraction.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path.display().to_string()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn extraction(&self) -> Option<&Extraction> {
        self.extraction.as_ref()
    }

    pub fn key(&self) -> Option<&str> {
        self.extraction.as_ref().map(|e| e.key.as_str())
    }

    fn page_count(&self) -> usize {
        self.extraction.as_ref().map_or(0, Extraction::page_count)
    }

    /// Whether `bundle` has exactly one graphic per rendered site.
    pub fn accepts(&self, bundle: &CacheBundle) -> bool {
        self.extraction.is_some() && bundle.graphics.len() == self.page_count()
    }

    /// Splices a stored bundle into the tree.
    pub fn apply_cached(&mut self, bundle: &CacheBundle) -> Result<()> {
        let Some(extraction) = self.extraction.take() else {
            return Ok(());
        };
        let result = self.apply_bundle(&extraction, bundle);
        self.extraction = Some(extraction);
        result
    }

    fn apply_bundle(&mut self, extraction: &Extraction, bundle: &CacheBundle) -> Result<()> {
        let expected = extraction.page_count();
        if bundle.graphics.len() != expected {
            return Err(Error::SiteCountMismatch {
                document: self.name(),
                expected,
                found: bundle.graphics.len(),
            });
        }
        let mut graphics = bundle.graphics.iter();
        for site in &extraction.sites {
            if site.kind == SiteKind::RawCode {
                remove_site(&mut self.tree, site.node);
                continue;
            }
            let Some(markup) = graphics.next() else {
                break;
            };
            let (source, top) = Tree::parse_fragment(markup)?;
            let Some(&root) = top.first() else {
                return Err(Error::InvalidGraphic {
                    context: self.name(),
                    message: "empty cached graphic".to_string(),
                });
            };
            splice(&mut self.tree, site.node, &source, root);
        }
        self.set_stylesheets(&bundle.style, &bundle.fonts);
        Ok(())
    }

    /// Simplifies, places and splices freshly rendered pages, returning the bundle to cache.
    pub fn render(
        &mut self,
        rendered: &Rendered<'_>,
        images: &mut dyn ImageStore,
    ) -> Result<CacheBundle> {
        let Some(extraction) = self.extraction.take() else {
            return Ok(CacheBundle::default());
        };
        let result = self.render_pages(&extraction, rendered, images);
        self.extraction = Some(extraction);
        result
    }

    fn render_pages(
        &mut self,
        extraction: &Extraction,
        rendered: &Rendered<'_>,
        images: &mut dyn ImageStore,
    ) -> Result<CacheBundle> {
        let expected = extraction.page_count();
        let records = &rendered.extents.records;
        for found in [records.len(), rendered.pages.len()] {
            if found != expected {
                return Err(Error::SiteCountMismatch {
                    document: self.name(),
                    expected,
                    found,
                });
            }
        }

        let mut ctx = StyleContext::new();
        for (name, data) in rendered.fonts {
            ctx.fonts.add(name, data.clone());
        }

        let mut graphics = Vec::with_capacity(expected);
        let mut pages = records.iter().zip(rendered.pages);
        for site in &extraction.sites {
            if site.kind == SiteKind::RawCode {
                remove_site(&mut self.tree, site.node);
                continue;
            }
            let Some((geometry, page)) = pages.next() else {
                break;
            };
            let graphic = ctx.simplify(page, geometry.font_size, images)?;
            let placed = place(graphic, geometry);
            graphics.push(placed.markup());
            splice(&mut self.tree, site.node, &placed.tree, placed.root);
        }

        let bundle = CacheBundle {
            style: page_style(rendered.extents.font_size),
            fonts: font_style(&ctx),
            graphics,
        };
        self.set_stylesheets(&bundle.style, &bundle.fonts);
        Ok(bundle)
    }

    fn set_stylesheets(&mut self, style: &str, fonts: &str) {
        if let Some(el) = self.tree.element_by_id(STYLE_ELEMENT_ID) {
            self.tree.set_text_content(el, style);
        }
        if let Some(el) = self.tree.element_by_id(FONTS_ELEMENT_ID) {
            self.tree.set_text_content(el, fonts);
        }
    }

    pub fn to_markup(&self) -> String {
        self.tree.to_markup()
    }

    /// Writes the document back over its source file.
    pub fn write(&self) -> Result<()> {
        std::fs::write(&self.path, self.to_markup()).map_err(|e| Error::io(&self.path, e))
    }
}
