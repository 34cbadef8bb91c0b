//! Mutable markup tree.
//!
//! HTML documents are read with `html5ever`; rendered SVG files and cached fragments are XML and
//! are read with `roxmltree`. Both are copied into an arena of nodes with stable [`NodeId`]s and
//! explicit parent links. Splicing is expressed as index-based child operations on that arena.

use crate::error::{Error, Result};
use html5ever::tendril::TendrilSink;
use indexmap::IndexMap;
use markup5ever_rcdom::{Handle, NodeData as HtmlNode, RcDom};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Prefixes declared around cached fragments so they can be parsed standalone.
const FRAGMENT_NAMESPACES: &[(&str, &str)] = &[
    ("xlink", "http://www.w3.org/1999/xlink"),
    ("svg", "http://www.w3.org/2000/svg"),
    ("sodipodi", "http://sodipodi.sourceforge.net/DTD/sodipodi-0.dtd"),
    ("inkscape", "http://www.inkscape.org/namespaces/inkscape"),
];

const FRAGMENT_ROOT: &str = "pretex-fragment";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// HTML elements whose content the HTML parser does not decode.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript",
];

/// Which parser a tree's text must survive when it is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Raw-text HTML elements are written unescaped.
    Html,
    /// All text is escaped.
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed element/text tree. Detached nodes stay in the arena but are unreachable from
/// the root.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    prolog: String,
    syntax: Syntax,
}

impl Tree {
    /// Creates a tree holding a single empty root element.
    pub fn new(root_name: &str) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            prolog: String::new(),
            syntax: Syntax::Xml,
        };
        tree.root = tree.create_element(root_name);
        tree
    }

    /// Parses an HTML document the way a browser would. Comments are dropped and the doctype,
    /// if any, becomes the prolog.
    pub fn parse_html(text: &str) -> Self {
        let dom = html5ever::parse_document(RcDom::default(), Default::default()).one(text);
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            prolog: String::new(),
            syntax: Syntax::Html,
        };
        let mut root = None;
        for child in dom.document.children.borrow().iter() {
            match &child.data {
                HtmlNode::Doctype {
                    name,
                    public_id,
                    system_id,
                } => tree.prolog = doctype(name, public_id, system_id),
                HtmlNode::Element { .. } if root.is_none() => root = tree.build_html(child),
                _ => {}
            }
        }
        tree.root = match root {
            Some(root) => root,
            None => tree.create_element("html"),
        };
        tree
    }

    /// Parses a complete XML document. Everything before the root element is kept verbatim.
    pub fn parse(text: &str) -> Result<Self> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = roxmltree::Document::parse_with_options(text, options)
            .map_err(|e| Error::markup("document", e))?;
        let root_el = doc.root_element();
        let prolog = text[..root_el.range().start].to_string();
        Ok(Self::from_xml(root_el, prolog))
    }

    /// Parses a sequence of sibling elements, returning the tree and the top-level elements in
    /// order.
    pub fn parse_fragment(markup: &str) -> Result<(Self, Vec<NodeId>)> {
        let mut wrapped = format!("<{FRAGMENT_ROOT}");
        for (prefix, uri) in FRAGMENT_NAMESPACES {
            wrapped.push_str(&format!(r#" xmlns:{prefix}="{uri}""#));
        }
        wrapped.push('>');
        wrapped.push_str(markup);
        wrapped.push_str(&format!("</{FRAGMENT_ROOT}>"));

        let doc = roxmltree::Document::parse(&wrapped).map_err(|e| Error::markup("fragment", e))?;
        let tree = Self::from_xml(doc.root_element(), String::new());
        let top = tree.child_elements(tree.root);
        Ok((tree, top))
    }

    fn from_xml(root_el: roxmltree::Node<'_, '_>, prolog: String) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            prolog,
            syntax: Syntax::Xml,
        };
        tree.root = tree.build_xml(root_el);
        tree
    }

    fn build_html(&mut self, handle: &Handle) -> Option<NodeId> {
        let HtmlNode::Element {
            name,
            attrs,
            template_contents,
            ..
        } = &handle.data
        else {
            return None;
        };
        let attrs = attrs
            .borrow()
            .iter()
            .map(|a| {
                let key = match &a.name.prefix {
                    Some(prefix) => format!("{prefix}:{}", a.name.local),
                    None => a.name.local.to_string(),
                };
                (key, a.value.to_string())
            })
            .collect();
        let id = self.push(NodeData::Element(Element {
            name: name.local.to_string(),
            attrs,
        }));

        let content = template_contents
            .borrow()
            .clone()
            .unwrap_or_else(|| handle.clone());
        for child in content.children.borrow().iter() {
            match &child.data {
                HtmlNode::Text { contents } => self.append_text(id, &contents.borrow()),
                HtmlNode::Element { .. } => {
                    if let Some(c) = self.build_html(child) {
                        self.append(id, c);
                    }
                }
                _ => {}
            }
        }
        Some(id)
    }

    fn build_xml(&mut self, node: roxmltree::Node<'_, '_>) -> NodeId {
        let mut attrs = IndexMap::new();
        let parent_el = node.parent_element();
        for ns in node.namespaces() {
            if ns.name() == Some("xml") {
                continue;
            }
            let inherited = parent_el.is_some_and(|p| {
                p.namespaces()
                    .any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
            });
            if inherited {
                continue;
            }
            let key = match ns.name() {
                Some(prefix) => format!("xmlns:{prefix}"),
                None => "xmlns".to_string(),
            };
            attrs.insert(key, ns.uri().to_string());
        }
        for a in node.attributes() {
            let key = match a.namespace().and_then(|uri| attribute_prefix(node, uri)) {
                Some(prefix) => format!("{prefix}:{}", a.name()),
                None => a.name().to_string(),
            };
            attrs.insert(key, a.value().to_string());
        }

        let id = self.push(NodeData::Element(Element {
            name: element_name(node),
            attrs,
        }));

        for child in node.children() {
            if child.is_element() {
                let c = self.build_xml(child);
                self.append(id, c);
            } else if child.is_text() {
                self.append_text(id, child.text().unwrap_or_default());
            }
        }
        id
    }

    /// Appends a text run, merging it into a preceding text child. Dropped comments would
    /// otherwise leave adjacent runs.
    fn append_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeData::Text(prev) = &mut self.nodes[last.0].data {
                prev.push_str(text);
                return;
            }
        }
        let t = self.create_text(text);
        self.append(parent, t);
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn prolog(&self) -> &str {
        &self.prolog
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Element(Element {
            name: name.to_string(),
            attrs: IndexMap::new(),
        }))
    }

    pub fn create_element_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(name);
        for (k, v) in attrs {
            self.set_attr(id, k, v);
        }
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.name.as_str())
    }

    pub fn is_element_named(&self, id: NodeId, name: &str) -> bool {
        self.name(id) == Some(name)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(t) => Some(t.as_str()),
            NodeData::Element(_) => None,
        }
    }

    /// Overwrites the contents of a text node; no-op on elements.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let NodeData::Text(t) = &mut self.nodes[id.0].data {
            *t = text.to_string();
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        self.element(id)?.attrs.get(key).map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attrs.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, key: &str) -> Option<String> {
        self.element_mut(id)?.attrs.shift_remove(key)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.element(c).is_some())
            .collect()
    }

    /// First direct child element with the given name.
    pub fn child_element(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.is_element_named(c, name))
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.index_in_parent(id)?;
        idx.checked_sub(1).map(|i| self.children(parent)[i])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.index_in_parent(id)?;
        self.children(parent).get(idx + 1).copied()
    }

    /// All nodes below `id` in document order (excluding `id`).
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    pub fn descendants_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_element_named(n, name))
            .collect()
    }

    pub fn has_ancestor_named(&self, id: NodeId, name: &str) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if self.is_element_named(p, name) {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// Element reachable from the root carrying `id="<value>"`.
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .find(|&n| self.attr(n, "id") == Some(value))
    }

    /// Concatenated text of the direct text children.
    pub fn text_content(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|&c| self.text(c))
            .collect()
    }

    /// Replaces all children of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        for c in self.children(id).to_vec() {
            self.detach(c);
        }
        let t = self.create_text(text);
        self.append(id, t);
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn insert_at(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
    }

    /// Puts `new` into the slot held by `old`; `old` ends up detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let (Some(parent), Some(index)) = (self.parent(old), self.index_in_parent(old)) else {
            return;
        };
        self.detach(new);
        self.nodes[old.0].parent = None;
        self.nodes[parent.0].children[index] = new;
        self.nodes[new.0].parent = Some(parent);
    }

    /// Deep-copies the subtree `id` of `other` into this arena as a detached node.
    pub fn import(&mut self, other: &Tree, id: NodeId) -> NodeId {
        let copy = self.push(other.data(id).clone());
        for &c in other.children(id) {
            let cc = self.import(other, c);
            self.append(copy, cc);
        }
        copy
    }

    /// Serializes the prolog and the root element.
    pub fn to_markup(&self) -> String {
        let mut out = self.prolog.clone();
        self.write_node(&mut out, self.root, false, false);
        out
    }

    /// Serializes one subtree.
    pub fn serialize(&self, id: NodeId) -> String {
        let mut out = String::new();
        let in_svg = self.has_ancestor_named(id, "svg");
        self.write_node(&mut out, id, in_svg, false);
        out
    }

    fn write_node(&self, out: &mut String, id: NodeId, in_svg: bool, raw: bool) {
        match &self.nodes[id.0].data {
            NodeData::Text(t) => {
                if raw {
                    out.push_str(t);
                } else {
                    out.push_str(&htmlize::escape_text(t.as_str()));
                }
            }
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (k, v) in &el.attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(&htmlize::escape_attribute(v.as_str()));
                    out.push('"');
                }
                let in_svg = in_svg || el.name == "svg";
                let children = self.children(id);
                if children.is_empty() && (in_svg || VOID_ELEMENTS.contains(&el.name.as_str())) {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                let raw = self.syntax == Syntax::Html
                    && !in_svg
                    && RAW_TEXT_ELEMENTS.contains(&el.name.as_str());
                for &c in children {
                    self.write_node(out, c, in_svg, raw);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

fn doctype(name: &str, public_id: &str, system_id: &str) -> String {
    let mut out = format!("<!DOCTYPE {name}");
    if !public_id.is_empty() {
        out.push_str(&format!(" PUBLIC \"{public_id}\""));
        if !system_id.is_empty() {
            out.push_str(&format!(" \"{system_id}\""));
        }
    } else if !system_id.is_empty() {
        out.push_str(&format!(" SYSTEM \"{system_id}\""));
    }
    out.push_str(">\n");
    out
}

fn element_name(node: roxmltree::Node<'_, '_>) -> String {
    let tag = node.tag_name();
    let Some(uri) = tag.namespace() else {
        return tag.name().to_string();
    };
    let is_default = node
        .namespaces()
        .any(|ns| ns.name().is_none() && ns.uri() == uri);
    if is_default {
        return tag.name().to_string();
    }
    match attribute_prefix(node, uri) {
        Some(prefix) => format!("{prefix}:{}", tag.name()),
        None => tag.name().to_string(),
    }
}

fn attribute_prefix(node: roxmltree::Node<'_, '_>, uri: &str) -> Option<String> {
    if uri == XML_NS {
        return Some("xml".to_string());
    }
    node.namespaces()
        .find(|ns| ns.uri() == uri && ns.name().is_some())
        .and_then(|ns| ns.name().map(str::to_string))
}
