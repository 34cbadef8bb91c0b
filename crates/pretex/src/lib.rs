#![forbid(unsafe_code)]

//! Pre-rendered LaTeX math for HTML pages.
//!
//! Math embedded in a page as `<script type="text/x-latex-*">` is typeset once by an external
//! toolchain, converted to SVG with web fonts, and spliced back in place with the exact
//! baseline, width, height and depth TeX measured. Finished pages are cached by a hash of
//! their typesetting input.
//!
//! Pipeline per document: [`extract`] → toolchain → [`extents`] → [`transform`] →
//! [`simplify`] → [`place`] → [`splice`], wrapped by the [`cache`]. [`Batch`] drives many
//! documents through one toolchain run.

pub mod batch;
pub mod cache;
pub mod css;
pub mod document;
pub mod dom;
pub mod error;
pub mod extents;
pub mod extract;
pub mod hash;
pub mod images;
pub mod place;
pub mod simplify;
pub mod splice;
pub mod toolchain;
pub mod transform;
pub mod units;

pub use batch::{Batch, BatchReport, Options};
pub use cache::{Cache, CacheBundle};
pub use document::Document;
pub use error::{Error, Result};
pub use extents::{Extents, Geometry, Tag, read_extents};
pub use extract::{MathSite, SiteKind};
pub use simplify::{Graphic, ImageStore, StyleContext};
pub use toolchain::{JobPaths, PageJob, Toolchain, TypesetJob};
