//! Measurement log reader.
//!
//! The typesetting run writes one line per event to `boxsize.txt`:
//!
//! ```text
//! fontsize:12.0pt
//! inline:{10.0pt}{8.0pt}{2.0pt}
//! prepage:49152000
//! tag:{1.2},47000000
//! display:72.0,10.5,300.0,24.0
//! ```
//!
//! `inline:` and `display:` close one site each; `prepage:` and `tag:` lines accumulate state
//! for the next `display:` record.

use crate::units::{PX_PER_BP, SP_PER_PT, TEX_PT_TO_BP};
use regex::Regex;
use std::sync::OnceLock;

fn re_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^tag:\{(.*)\},(.*)$").expect("valid regex"))
}

fn re_inline() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^inline:\{(.*)pt\}\{(.*)pt\}\{(.*)pt\}").expect("valid regex"))
}

fn re_display() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^display:(.*),(.*),(.*),(.*)$").expect("valid regex"))
}

/// An equation number and its distance (big points) below the top of its display.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub label: String,
    pub offset: f64,
}

/// Placement data for one rendered site.
///
/// `width`..`depth` and the offsets are CSS pixels (they feed the `viewBox`); the `*_em` fields
/// are relative to `font_size` (big points) and feed CSS lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub left: f64,
    pub top: f64,
    pub font_size: f64,
    pub width_em: f64,
    pub height_em: f64,
    pub depth_em: f64,
    pub display: bool,
    pub tags: Vec<Tag>,
}

impl Geometry {
    fn from_big_points(
        (left, top, width, height, depth): (f64, f64, f64, f64, f64),
        font_size: f64,
        display: bool,
        tags: Vec<Tag>,
    ) -> Self {
        Self {
            width: width * PX_PER_BP,
            height: height * PX_PER_BP,
            depth: depth * PX_PER_BP,
            left: left * PX_PER_BP,
            top: top * PX_PER_BP,
            font_size,
            width_em: width / font_size,
            height_em: height / font_size,
            depth_em: depth / font_size,
            display,
            tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extents {
    /// Ambient font size in big points.
    pub font_size: f64,
    /// One record per rendered site, in extraction order.
    pub records: Vec<Geometry>,
}

fn parse_all<const N: usize>(caps: &regex::Captures<'_>) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = caps.get(i + 1)?.as_str().trim().parse().ok()?;
    }
    Some(out)
}

/// Parses a measurement log. Unrecognized or malformed lines are skipped; without a
/// `fontsize:` line the ambient size is `default_font_size`.
pub fn read_extents(log: &str, default_font_size: f64) -> Extents {
    let mut font_size = default_font_size;
    let mut prepage = 0.0;
    let mut tags: Vec<Tag> = Vec::new();
    let mut records = Vec::new();

    for line in log.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("fontsize:") {
            let rest = rest.trim();
            let rest = rest.strip_suffix("pt").unwrap_or(rest);
            if let Ok(v) = rest.trim().parse::<f64>() {
                font_size = v * TEX_PT_TO_BP;
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("prepage:") {
            if let Ok(v) = rest.trim().parse::<f64>() {
                prepage = v;
            }
            continue;
        }
        if line.starts_with("tag:") {
            if let Some(caps) = re_tag().captures(line) {
                if let Ok(pos) = caps[2].trim().parse::<f64>() {
                    tags.push(Tag {
                        label: caps[1].to_string(),
                        offset: (prepage - pos) / SP_PER_PT * TEX_PT_TO_BP,
                    });
                }
            }
            continue;
        }

        let record = if let Some(caps) = re_inline().captures(line) {
            let Some([w, h, d]) = parse_all::<3>(&caps) else {
                continue;
            };
            let (w, h, d) = (w * TEX_PT_TO_BP, h * TEX_PT_TO_BP, d * TEX_PT_TO_BP);
            Geometry::from_big_points((0.0, -h, w, h, d), font_size, false, std::mem::take(&mut tags))
        } else if let Some(caps) = re_display().captures(line) {
            // Display extents are measured on the PDF page, already in big points.
            let Some([left, top, w, h]) = parse_all::<4>(&caps) else {
                continue;
            };
            let tags = std::mem::take(&mut tags)
                .into_iter()
                .map(|t| Tag {
                    offset: t.offset - top,
                    ..t
                })
                .collect();
            Geometry::from_big_points((left, top, w, h, 0.0), font_size, true, tags)
        } else {
            continue;
        };
        records.push(record);
        tags.clear();
        prepage = 0.0;
    }

    Extents { font_size, records }
}
