//! Splicing composed graphics back into the document tree.

use crate::dom::{NodeId, Tree};
use crate::place::INLINE_CLASS;

pub const BIND_CLASS: &str = "pretex-bind";

/// Replaces `site` in `doc` with a copy of `root` from `source` and returns the node that now
/// occupies the site's position.
///
/// Inline graphics glued to neighbouring text (`x(` site `)y`) are wrapped together with the
/// glued runs in a `span.pretex-bind`, so a line break cannot separate them.
pub fn splice(doc: &mut Tree, site: NodeId, source: &Tree, root: NodeId) -> NodeId {
    let graphic = doc.import(source, root);
    if source.attr(root, "class") != Some(INLINE_CLASS) {
        doc.replace(site, graphic);
        return graphic;
    }

    let prev = doc.prev_sibling(site).filter(|&n| doc.text(n).is_some());
    let next = doc.next_sibling(site).filter(|&n| doc.text(n).is_some());
    let head = prev.and_then(|n| split_trailing_word(doc, n));
    let tail = next.and_then(|n| split_leading_word(doc, n));
    if head.is_none() && tail.is_none() {
        doc.replace(site, graphic);
        return graphic;
    }

    let wrapper = doc.create_element_with("span", &[("class", BIND_CLASS)]);
    if let Some(head) = head {
        let text = doc.create_text(&head);
        doc.append(wrapper, text);
    }
    doc.append(wrapper, graphic);
    if let Some(tail) = tail {
        let text = doc.create_text(&tail);
        doc.append(wrapper, text);
    }
    doc.replace(site, wrapper);
    wrapper
}

/// Removes a site that produces no graphic.
pub fn remove_site(doc: &mut Tree, site: NodeId) {
    doc.detach(site);
}

/// Detaches the non-whitespace run at the end of text node `n`, if the text ends in one.
fn split_trailing_word(doc: &mut Tree, n: NodeId) -> Option<String> {
    let text = doc.text(n)?;
    if text.chars().next_back().is_none_or(char::is_whitespace) {
        return None;
    }
    let cut = text
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map_or(0, |(i, c)| i + c.len_utf8());
    let (rest, word) = text.split_at(cut);
    let (rest, word) = (rest.to_string(), word.to_string());
    set_or_drop(doc, n, &rest);
    Some(word)
}

/// Detaches the non-whitespace run at the start of text node `n`, if the text starts with one.
fn split_leading_word(doc: &mut Tree, n: NodeId) -> Option<String> {
    let text = doc.text(n)?;
    if text.chars().next().is_none_or(char::is_whitespace) {
        return None;
    }
    let cut = text
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map_or(text.len(), |(i, _)| i);
    let (word, rest) = text.split_at(cut);
    let (word, rest) = (word.to_string(), rest.to_string());
    set_or_drop(doc, n, &rest);
    Some(word)
}

fn set_or_drop(doc: &mut Tree, n: NodeId, text: &str) {
    if text.is_empty() {
        doc.detach(n);
    } else {
        doc.set_text(n, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INLINE: &str = r#"<span class="pretex-inline"><svg class="pretex"/></span>"#;
    const DISPLAY: &str = r#"<div class="pretex-display"><svg class="pretex"/></div>"#;

    fn run(doc: &str, graphic: &str) -> String {
        let mut tree = Tree::parse(doc).unwrap();
        let site = tree.descendants_named(tree.root(), "script")[0];
        let (source, top) = Tree::parse_fragment(graphic).unwrap();
        splice(&mut tree, site, &source, top[0]);
        tree.to_markup()
    }

    #[test]
    fn glued_text_is_bound_to_the_graphic() {
        assert_eq!(
            run(r#"<p>see x(<script type="text/x-latex-inline">a</script>)y now</p>"#, INLINE),
            format!(r#"<p>see <span class="pretex-bind">x({INLINE})y</span> now</p>"#)
        );
    }

    #[test]
    fn only_adjacent_whitespace_prevents_binding() {
        // The brackets touch the site, so they are bound even though words are spaced.
        assert_eq!(
            run(r#"<p>x (<script type="text/x-latex-inline">a</script>) y</p>"#, INLINE).replace(INLINE, "G"),
            r#"<p>x <span class="pretex-bind">(G)</span> y</p>"#
        );
        assert_eq!(
            run(r#"<p>x <script type="text/x-latex-inline">a</script> y</p>"#, INLINE),
            format!("<p>x {INLINE} y</p>")
        );
    }

    #[test]
    fn one_sided_binding() {
        assert_eq!(
            run(r#"<p><b>b</b><script type="text/x-latex-inline">a</script>th term</p>"#, INLINE),
            format!(r#"<p><b>b</b><span class="pretex-bind">{INLINE}th</span> term</p>"#)
        );
        assert_eq!(
            run(r#"<p>word<script type="text/x-latex-inline">a</script></p>"#, INLINE),
            format!(r#"<p><span class="pretex-bind">word{INLINE}</span></p>"#)
        );
    }

    #[test]
    fn display_graphics_are_never_bound() {
        assert_eq!(
            run(r#"<p>x(<script type="text/x-latex-display">a</script>)y</p>"#, DISPLAY),
            format!("<p>x({DISPLAY})y</p>")
        );
    }

    #[test]
    fn raw_sites_are_removed() {
        let mut tree = Tree::parse(r#"<p>a<script type="text/x-latex-code-bare">\def\x{}</script>b</p>"#).unwrap();
        let site = tree.descendants_named(tree.root(), "script")[0];
        remove_site(&mut tree, site);
        assert_eq!(tree.to_markup(), "<p>ab</p>");
    }
}
