//! Placement: wrap a simplified graphic so it sits on the text baseline (inline) or in its own
//! block with equation numbers (display).

use crate::dom::{NodeId, Tree};
use crate::extents::Geometry;
use crate::simplify::Graphic;
use crate::transform::CoordinateSpace;
use crate::units::{PX_PER_BP, fmt_num};

pub const INLINE_CLASS: &str = "pretex-inline";
pub const DISPLAY_CLASS: &str = "pretex-display";

/// A composed graphic ready to be spliced. `root` is the outermost wrapper inside `tree`.
#[derive(Debug, Clone)]
pub struct Placed {
    pub tree: Tree,
    pub root: NodeId,
    pub display: bool,
}

impl Placed {
    pub fn markup(&self) -> String {
        self.tree.serialize(self.root)
    }
}

pub fn place(graphic: Graphic, geometry: &Geometry) -> Placed {
    if geometry.display {
        place_display(graphic, geometry)
    } else {
        place_inline(graphic, geometry)
    }
}

fn place_display(graphic: Graphic, g: &Geometry) -> Placed {
    let Graphic {
        mut tree, svg, space, ..
    } = graphic;
    let scale = match space {
        CoordinateSpace::Point => 1.0 / PX_PER_BP,
        CoordinateSpace::Pixel => 1.0,
    };
    let view_box = format!(
        "{} {} {} {}",
        fmt_num(scale * g.left),
        fmt_num(scale * g.top),
        fmt_num(scale * g.width),
        fmt_num(scale * g.height)
    );
    tree.set_attr(svg, "viewBox", &view_box);
    // The typeset fonts are relative to the ambient size, so 1em here is one TeX em.
    tree.set_attr(svg, "height", &format!("{}em", fmt_num(g.height_em)));

    let div = tree.create_element_with("div", &[("class", DISPLAY_CLASS)]);
    tree.append(div, svg);
    for tag in &g.tags {
        let label = tree.create_element_with("span", &[("class", "tag")]);
        let text = tree.create_text(&format!("({})", tag.label));
        tree.append(label, text);
        // Pushes the label down to the tagged line.
        let spacer_style = format!("height:{}em", fmt_num(tag.offset / g.font_size));
        let spacer = tree.create_element_with("span", &[("style", spacer_style.as_str())]);
        tree.append(label, spacer);
        tree.append(div, label);
    }
    Placed {
        tree,
        root: div,
        display: true,
    }
}

fn place_inline(graphic: Graphic, g: &Geometry) -> Placed {
    let Graphic {
        mut tree, svg, space, ..
    } = graphic;
    // The wrapper and the strut handle sizing; the viewBox is a 1em square whose bottom edge is
    // the baseline.
    let fs = fmt_num(match space {
        CoordinateSpace::Point => g.font_size,
        CoordinateSpace::Pixel => g.font_size * PX_PER_BP,
    });
    tree.set_attr(svg, "viewBox", &format!("0 -{fs} {fs} {fs}"));
    tree.remove_attr(svg, "height");

    let width_style = format!("width:{}em", fmt_num(g.width_em));
    let wrapper = tree.create_element_with(
        "span",
        &[("class", INLINE_CLASS), ("style", width_style.as_str())],
    );
    let mut strut_style = format!("height:{}em", fmt_num(g.height_em + g.depth_em));
    if g.depth_em > 0.0 {
        strut_style.push_str(&format!(";vertical-align:-{}em", fmt_num(g.depth_em)));
    }
    let strut = tree.create_element_with("span", &[("style", strut_style.as_str())]);
    tree.append(wrapper, strut);
    // Relatively positioned and 0x0, so it sits on the baseline; the svg is pinned to its bottom.
    let anchor = tree.create_element("span");
    tree.append(wrapper, anchor);
    tree.append(anchor, svg);
    Placed {
        tree,
        root: wrapper,
        display: false,
    }
}
