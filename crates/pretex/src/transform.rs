//! Coordinate normalization for converted PDF pages.
//!
//! A plain SVG exported from a PDF page usually wraps everything in one group carrying the PDF
//! coordinate flip, `matrix(4/3,0,0,-4/3,0,h)`. Unwrapping it moves the content into point
//! units with a downward y axis, which is what the placement code wants.

use crate::dom::{NodeId, Tree};
use crate::units::{almost_zero, fmt_coefficient};

pub type Matrix = euclid::Transform2D<f64, euclid::UnknownUnit, euclid::UnknownUnit>;

/// Units of a graphic's user space after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// The page transform was removed; one user unit is one big point.
    Point,
    /// Left as exported; one user unit is one CSS pixel.
    Pixel,
}

/// Parses an SVG `transform` attribute into a single matrix. Empty input is the identity.
pub fn parse_transform(s: &str) -> Option<Matrix> {
    if s.trim().is_empty() {
        return Some(Matrix::identity());
    }
    let ts: svgtypes::Transform = s.parse().ok()?;
    Some(Matrix::new(ts.a, ts.b, ts.c, ts.d, ts.e, ts.f))
}

pub fn format_matrix(m: &Matrix) -> String {
    format!(
        "matrix({},{},{},{},{},{})",
        fmt_coefficient(m.m11),
        fmt_coefficient(m.m12),
        fmt_coefficient(m.m21),
        fmt_coefficient(m.m22),
        fmt_coefficient(m.m31),
        fmt_coefficient(m.m32)
    )
}

/// Shortest attribute value for `m`, or `None` when `m` is the identity.
pub fn canonical_transform(m: &Matrix) -> Option<String> {
    let no_shear = almost_zero(m.m12) && almost_zero(m.m21);
    if no_shear && almost_zero(m.m11 - 1.0) && almost_zero(m.m22 - 1.0) {
        if almost_zero(m.m32) {
            if almost_zero(m.m31) {
                return None;
            }
            return Some(format!("translate({})", fmt_coefficient(m.m31)));
        }
        return Some(format!(
            "translate({} {})",
            fmt_coefficient(m.m31),
            fmt_coefficient(m.m32)
        ));
    }
    if no_shear && almost_zero(m.m31) && almost_zero(m.m32) {
        if almost_zero(m.m11 - m.m22) {
            return Some(format!("scale({})", fmt_coefficient(m.m11)));
        }
        return Some(format!(
            "scale({} {})",
            fmt_coefficient(m.m11),
            fmt_coefficient(m.m22)
        ));
    }
    Some(format_matrix(m))
}

/// Rewrites every `transform` at or below `root` to its canonical form. Unparsable values are
/// left alone.
pub fn canonicalize_transforms(tree: &mut Tree, root: NodeId) {
    let nodes: Vec<NodeId> = std::iter::once(root).chain(tree.descendants(root)).collect();
    for n in nodes {
        let Some(value) = tree.attr(n, "transform") else {
            continue;
        };
        let Some(m) = parse_transform(value) else {
            continue;
        };
        match canonical_transform(&m) {
            Some(t) => tree.set_attr(n, "transform", &t),
            None => {
                tree.remove_attr(n, "transform");
            }
        }
    }
}

fn is_pdf_page_transform(m: &Matrix) -> bool {
    almost_zero(m.m11 - 4.0 / 3.0)
        && almost_zero(m.m22 + 4.0 / 3.0)
        && almost_zero(m.m12)
        && almost_zero(m.m21)
        && almost_zero(m.m31)
}

/// Removes the page-level wrapper group from `svg` if present, pushing its transform (rescaled
/// to points) into each child.
pub fn unwrap_page_transform(tree: &mut Tree, svg: NodeId) -> CoordinateSpace {
    let groups: Vec<NodeId> = tree
        .child_elements(svg)
        .into_iter()
        .filter(|&c| tree.is_element_named(c, "g"))
        .collect();
    let [group] = groups[..] else {
        return CoordinateSpace::Pixel;
    };
    let Some(el) = tree.element(group) else {
        return CoordinateSpace::Pixel;
    };
    if !el.attrs.keys().all(|k| k == "id" || k == "transform") {
        return CoordinateSpace::Pixel;
    }
    let Some(m) = tree
        .attr(group, "transform")
        .filter(|t| !t.trim().is_empty())
        .and_then(parse_transform)
    else {
        return CoordinateSpace::Pixel;
    };
    if !is_pdf_page_transform(&m) {
        return CoordinateSpace::Pixel;
    }

    let base = Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, m.m32 * 3.0 / 4.0);
    let Some(mut index) = tree.index_in_parent(group) else {
        return CoordinateSpace::Pixel;
    };
    for child in tree.children(group).to_vec() {
        if tree.element(child).is_some() {
            let own = tree
                .attr(child, "transform")
                .and_then(parse_transform)
                .unwrap_or_else(Matrix::identity);
            tree.set_attr(child, "transform", &format_matrix(&own.then(&base)));
        }
        index += 1;
        tree.insert_at(svg, index, child);
    }
    tree.detach(group);
    CoordinateSpace::Point
}

/// Unwraps the page transform and canonicalizes every transform in the graphic.
pub fn normalize(tree: &mut Tree, svg: NodeId) -> CoordinateSpace {
    let space = unwrap_page_transform(tree, svg);
    canonicalize_transforms(tree, svg);
    space
}
