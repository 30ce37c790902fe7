//! Entry-list tree and its JSON rendering.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::ser::Formatter;

/// A single-key object.
pub(super) type Entry = (String, Node);

pub(super) fn entry(key: &str, value: Node) -> Entry {
    (key.to_string(), value)
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Node {
    Str(String),
    /// Rendered as a list of single-key objects; sorted by key.
    Entries(Vec<Entry>),
    /// Rendered as a list; order is significant and never changed.
    List(Vec<Node>),
    Null,
}

impl Node {
    pub(super) fn str(value: &str) -> Self {
        Self::Str(value.to_string())
    }

    /// Sort entry lists by key, recursively. The sort is stable.
    pub(super) fn deep_sort(&mut self) {
        match self {
            Self::Entries(entries) => {
                for (_, value) in entries.iter_mut() {
                    value.deep_sort();
                }
                entries.sort_by(|a, b| a.0.cmp(&b.0));
            }
            Self::List(items) => {
                for item in items.iter_mut() {
                    item.deep_sort();
                }
            }
            Self::Str(_) | Self::Null => {}
        }
    }

    pub(super) fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, CompactFormatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }
}

struct SingleEntry<'a>(&'a str, &'a Node);

impl Serialize for SingleEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0, self.1)?;
        map.end()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Entries(entries) => {
                serializer.collect_seq(entries.iter().map(|(k, v)| SingleEntry(k, v)))
            }
            Self::List(items) => serializer.collect_seq(items),
            Self::Null => serializer.serialize_unit(),
        }
    }
}

/// Compact formatter that additionally escapes U+2028 and U+2029, matching
/// the encoder existing signatures were computed with.
struct CompactFormatter;

impl Formatter for CompactFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            let escaped = match c {
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..i].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_sort_orders_entries_but_not_lists() {
        let mut node = Node::Entries(vec![
            entry("b", Node::List(vec![Node::str("z"), Node::str("a")])),
            entry("a", Node::Entries(vec![entry("y", Node::Null), entry("x", Node::Null)])),
        ]);
        node.deep_sort();
        let json = String::from_utf8(node.to_json_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"[{"a":[{"x":null},{"y":null}]},{"b":["z","a"]}]"#);
    }

    #[test]
    fn html_characters_are_not_escaped() {
        let node = Node::str("<a&b>");
        let json = String::from_utf8(node.to_json_bytes().unwrap()).unwrap();
        assert_eq!(json, r#""<a&b>""#);
    }

    #[test]
    fn line_separators_are_escaped() {
        let node = Node::str("a\u{2028}b\u{2029}");
        let json = String::from_utf8(node.to_json_bytes().unwrap()).unwrap();
        assert_eq!(json, r#""a\u2028b\u2029""#);
    }
}
