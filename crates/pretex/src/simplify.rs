//! Graphic simplification: shrink a converted page SVG down to what the page needs.

use crate::css::{FontRegistry, StyleClasses, StyleMap};
use crate::dom::{NodeId, Tree};
use crate::error::{Error, Result};
use crate::transform::{self, CoordinateSpace};
use crate::units::parse_leading_number;
use std::collections::BTreeSet;

/// Root attributes that survive simplification.
pub const SVG_ATTRS: &[&str] = &["viewBox", "height", "width", "version"];

/// Text properties that are baked into the embedded fonts.
const FONT_HINTS: &[&str] = &[
    "font-variant",
    "font-weight",
    "font-style",
    "-inkscape-font-specification",
];

const FONT_SIZE_EPSILON: f64 = 0.001;

/// Style every `<text>` inherits from the page stylesheet (font size excluded).
pub fn default_text_style() -> StyleMap {
    StyleMap::parse(
        "writing-mode:lr-tb;fill:#000000;fill-rule:nonzero;fill-opacity:1;stroke:none",
    )
}

/// Style every `<path>` inherits from the page stylesheet.
pub fn default_path_style() -> StyleMap {
    StyleMap::parse(
        "fill:none;fill-rule:nonzero;fill-opacity:1;stroke:#000000;stroke-linecap:butt;\
         stroke-linejoin:miter;stroke-miterlimit:10;stroke-dasharray:none;stroke-opacity:1",
    )
}

/// Destination for raster images referenced by a converted page.
pub trait ImageStore {
    /// Takes ownership of the image the converter wrote at `href` and returns the reference the
    /// published page should use instead.
    fn store(&mut self, href: &str) -> Result<String>;
}

/// Per-document registries shared by all graphics of that document.
#[derive(Debug, Clone, Default)]
pub struct StyleContext {
    pub text_classes: StyleClasses,
    pub path_classes: StyleClasses,
    pub fonts: FontRegistry,
}

/// A simplified graphic, not yet placed.
#[derive(Debug, Clone)]
pub struct Graphic {
    pub tree: Tree,
    pub svg: NodeId,
    pub space: CoordinateSpace,
    pub font_ids: BTreeSet<String>,
    pub class_ids: BTreeSet<String>,
}

impl StyleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and simplifies one converted page. `font_size` is the ambient size (big points)
    /// the page was typeset at.
    pub fn simplify(
        &mut self,
        markup: &str,
        font_size: f64,
        images: &mut dyn ImageStore,
    ) -> Result<Graphic> {
        let mut tree = Tree::parse(markup)?;
        let svg = tree.root();
        if !tree.is_element_named(svg, "svg") {
            return Err(Error::InvalidGraphic {
                context: "page conversion".to_string(),
                message: format!("root element is <{}>", tree.name(svg).unwrap_or_default()),
            });
        }

        if let Some(el) = tree.element_mut(svg) {
            el.attrs.retain(|k, _| SVG_ATTRS.contains(&k.as_str()));
        }
        // Implied by the height and the viewBox aspect ratio.
        tree.remove_attr(svg, "width");
        tree.set_attr(svg, "class", "pretex");

        if let Some(metadata) = tree.child_element(svg, "metadata") {
            tree.detach(metadata);
        }
        if let Some(defs) = tree.child_element(svg, "defs") {
            if tree.child_elements(defs).is_empty() {
                tree.detach(defs);
            }
        }

        let space = transform::normalize(&mut tree, svg);

        let mut graphic = Graphic {
            tree,
            svg,
            space,
            font_ids: BTreeSet::new(),
            class_ids: BTreeSet::new(),
        };
        strip_ids(&mut graphic);
        for n in graphic.tree.descendants(svg) {
            let Some(name) = graphic.tree.name(n).map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "tspan" if graphic.tree.attr(n, "style").is_some() => {
                    self.simplify_tspan(&mut graphic, n, font_size)
                }
                "path" if graphic.tree.attr(n, "style").is_some() => {
                    self.simplify_path(&mut graphic, n)
                }
                "image" => simplify_image(&mut graphic.tree, n, images)?,
                _ => {}
            }
        }
        remove_empty_groups(&mut graphic.tree, svg);
        Ok(graphic)
    }

    fn simplify_tspan(&mut self, graphic: &mut Graphic, n: NodeId, font_size: f64) {
        let tree = &mut graphic.tree;
        let mut css = StyleMap::parse(tree.attr(n, "style").unwrap_or_default());
        for key in FONT_HINTS {
            css.remove(key);
        }
        css.remove_defaults(&default_text_style());

        let mut classes = existing_classes(tree, n);
        if let Some(size) = css.remove("font-size") {
            let is_default = parse_leading_number(&size)
                .is_some_and(|v| (v - font_size).abs() <= FONT_SIZE_EPSILON);
            if !is_default {
                let class = self.text_classes.intern(&format!("font-size:{size}"));
                graphic.class_ids.insert(class.clone());
                classes.push(class);
            }
        }
        if let Some(family) = css.get("font-family").map(str::to_string) {
            let first = family.split(',').next().unwrap_or_default();
            if !first.is_empty() {
                if let Some(id) = self.fonts.id_for(first) {
                    graphic.font_ids.insert(id.to_string());
                    classes.push(id.to_string());
                } else {
                    let class = self.text_classes.intern(&format!("font-family:{first}"));
                    graphic.class_ids.insert(class.clone());
                    classes.push(class);
                }
                css.remove("font-family");
            }
        }
        write_back(tree, n, &css, &classes);
    }

    fn simplify_path(&mut self, graphic: &mut Graphic, n: NodeId) {
        let tree = &mut graphic.tree;
        let mut css = StyleMap::parse(tree.attr(n, "style").unwrap_or_default());
        css.remove_defaults(&default_path_style());
        if css.get("fill") == Some("#000000") {
            css.insert("fill", "#000");
        }
        let mut classes = existing_classes(tree, n);
        if let Some(width) = css.remove("stroke-width") {
            let class = self.path_classes.intern(&format!("stroke-width:{width}"));
            graphic.class_ids.insert(class.clone());
            classes.push(class);
        }
        write_back(tree, n, &css, &classes);
    }
}

fn strip_ids(graphic: &mut Graphic) {
    let tree = &mut graphic.tree;
    for n in tree.descendants(graphic.svg) {
        // Ids under <defs> may be the target of <use>.
        if tree.attr(n, "id").is_some() && !tree.has_ancestor_named(n, "defs") {
            tree.remove_attr(n, "id");
        }
    }
}

fn existing_classes(tree: &Tree, n: NodeId) -> Vec<String> {
    tree.attr(n, "class")
        .map(|c| c.split(' ').map(str::to_string).collect())
        .unwrap_or_default()
}

fn write_back(tree: &mut Tree, n: NodeId, css: &StyleMap, classes: &[String]) {
    if css.is_empty() {
        tree.remove_attr(n, "style");
    } else {
        tree.set_attr(n, "style", &css.to_css());
    }
    if !classes.is_empty() {
        tree.set_attr(n, "class", &classes.join(" "));
    }
}

fn simplify_image(tree: &mut Tree, n: NodeId, images: &mut dyn ImageStore) -> Result<()> {
    let href = tree
        .remove_attr(n, "xlink:href")
        .or_else(|| tree.remove_attr(n, "href"));
    if let Some(href) = href {
        let stored = images.store(&href)?;
        tree.set_attr(n, "href", &stored);
    }
    let mut css = StyleMap::parse(tree.attr(n, "style").unwrap_or_default());
    css.remove("image-rendering");
    write_back(tree, n, &css, &[]);
    Ok(())
}

/// Deletes groups without element children, then any group that becomes empty as a result.
pub fn remove_empty_groups(tree: &mut Tree, root: NodeId) {
    let mut pending: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&n| tree.is_element_named(n, "g") && tree.child_elements(n).is_empty())
        .collect();
    while !pending.is_empty() {
        let mut next = Vec::new();
        for n in pending {
            let Some(parent) = tree.parent(n) else {
                continue;
            };
            tree.detach(n);
            if tree.is_element_named(parent, "g") && tree.child_elements(parent).is_empty() {
                next.push(parent);
            }
        }
        pending = next;
    }
}
