//! Inline style handling and the per-document style/font registries.

use crate::hash::short_id;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;

/// Ordered `property -> value` map for a `style` attribute.
///
/// Quoted values lose their quotes; unquoted values lose all spaces. This is enough for the
/// styles the vector converter emits, which never contain semicolons inside strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleMap(IndexMap<String, String>);

impl StyleMap {
    pub fn parse(css: &str) -> Self {
        let mut map = IndexMap::new();
        for decl in css.split(';') {
            let Some((key, val)) = decl.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let val = val.trim();
            if key.is_empty() {
                continue;
            }
            let quoted = val.len() >= 2
                && ((val.starts_with('\'') && val.ends_with('\''))
                    || (val.starts_with('"') && val.ends_with('"')));
            let val = if quoted {
                val[1..val.len() - 1].to_string()
            } else {
                val.replace(' ', "")
            };
            map.insert(key.to_string(), val);
        }
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops every property whose value equals the one in `defaults`.
    pub fn remove_defaults(&mut self, defaults: &StyleMap) {
        self.0.retain(|k, v| defaults.get(k) != Some(v.as_str()));
    }

    pub fn to_css(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| {
                if v.contains(' ') {
                    format!("{k}:'{v}'")
                } else {
                    format!("{k}:{v}")
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Interns single CSS declarations (`stroke-width:0.398`) as short class names.
#[derive(Debug, Clone, Default)]
pub struct StyleClasses {
    by_name: IndexMap<String, String>,
    by_decl: IndexMap<String, String>,
}

impl StyleClasses {
    /// Returns the class for `decl`, registering it on first use.
    pub fn intern(&mut self, decl: &str) -> String {
        if let Some(name) = self.by_decl.get(decl) {
            return name.clone();
        }
        let name = short_id('c', decl);
        self.by_name.insert(name.clone(), decl.to_string());
        self.by_decl.insert(decl.to_string(), name.clone());
        name
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// One rule per class, each scoped under `selector`.
    pub fn css(&self, selector: &str) -> String {
        let mut out: String = self
            .by_name
            .iter()
            .map(|(name, decl)| format!("{selector}.{name}{{{decl}}}"))
            .collect();
        out.push('\n');
        out
    }
}

/// An embedded web font, keyed by the family name the vector converter refers to it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontResource {
    pub name: String,
    pub id: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct FontRegistry {
    fonts: IndexMap<String, FontResource>,
}

impl FontRegistry {
    pub fn add(&mut self, name: &str, data: Vec<u8>) -> &FontResource {
        let id = short_id('f', &data);
        self.fonts.insert(
            name.to_string(),
            FontResource {
                name: name.to_string(),
                id,
                data,
            },
        );
        &self.fonts[name]
    }

    pub fn id_for(&self, family: &str) -> Option<&str> {
        self.fonts.get(family).map(|f| f.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FontResource> {
        self.fonts.values()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// `@font-face` rules embedding every font as a WOFF data URI.
    pub fn font_faces(&self) -> String {
        self.fonts
            .values()
            .map(|f| {
                format!(
                    "\n@font-face {{\n  font-family: \"{}\";\n  src: url(data:application/font-woff;base64,{}) format('woff');\n}}",
                    f.id,
                    STANDARD.encode(&f.data)
                )
            })
            .collect()
    }

    /// Class rules mapping each font id back to its `font-family`.
    pub fn family_rules(&self, selector: &str) -> String {
        self.fonts
            .values()
            .map(|f| format!("{selector}.{id}{{font-family:{id}}}", id = f.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_parse_strips_quotes_and_spaces() {
        let s = StyleMap::parse("font-family: 'CharterBT Roman'; fill: #000000 ; stroke-width:0.4 pt;bad");
        assert_eq!(s.get("font-family"), Some("CharterBT Roman"));
        assert_eq!(s.get("fill"), Some("#000000"));
        assert_eq!(s.get("stroke-width"), Some("0.4pt"));
        assert_eq!(s.to_css(), "font-family:'CharterBT Roman';fill:#000000;stroke-width:0.4pt");
    }

    #[test]
    fn defaults_are_removed() {
        let defaults = StyleMap::parse("fill:none;stroke:#000000");
        let mut s = StyleMap::parse("fill:none;stroke:#ff0000;stroke-width:2");
        s.remove_defaults(&defaults);
        assert_eq!(s.to_css(), "stroke:#ff0000;stroke-width:2");
    }

    #[test]
    fn classes_deduplicate() {
        let mut classes = StyleClasses::default();
        let a = classes.intern("stroke-width:0.398");
        let b = classes.intern("stroke-width:0.398");
        let c = classes.intern("stroke-width:0.797");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(classes.len(), 2);
        let css = classes.css("svg.pretex path");
        assert!(css.starts_with(&format!("svg.pretex path.{a}{{stroke-width:0.398}}")));
        assert!(css.ends_with('\n'));
    }

    #[test]
    fn fonts_get_content_ids() {
        let mut fonts = FontRegistry::default();
        let id = fonts.add("CharterBT Roman", vec![1, 2, 3]).id.clone();
        assert!(id.starts_with('f'));
        assert_eq!(fonts.id_for("CharterBT Roman"), Some(id.as_str()));
        assert_eq!(fonts.id_for("Other"), None);
        assert!(fonts.font_faces().contains("base64,AQID"));
        assert_eq!(
            fonts.family_rules("svg.pretex tspan"),
            format!("svg.pretex tspan.{id}{{font-family:{id}}}")
        );
    }
}
