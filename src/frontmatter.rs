//! Restricted YAML-like frontmatter parsing.
//!
//! Only the subset used by doc and skill headers is understood: scalars,
//! inline `[a, b]` lists and indented `  - item` lists. Anything else inside
//! the block is ignored rather than rejected.

use std::collections::BTreeMap;

const DELIMITER: &str = "---";

/// A single frontmatter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

/// Parsed frontmatter fields, keyed by name. Unknown keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    fields: BTreeMap<String, FieldValue>,
}

impl Frontmatter {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Scalar value for `key`, if present and non-empty.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            FieldValue::Scalar(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// List value for `key`. A scalar is normalized to a one-element list.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(FieldValue::List(items)) => items.clone(),
            Some(FieldValue::Scalar(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Parse the frontmatter block at the top of `text`.
///
/// Returns an empty [`Frontmatter`] when the text does not open with `---`
/// or when the block is never closed.
pub fn parse(text: &str) -> Frontmatter {
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim_end() == DELIMITER => {}
        _ => return Frontmatter::default(),
    }

    let mut block = Vec::new();
    let mut closed = false;
    for line in lines {
        if line.trim_end() == DELIMITER {
            closed = true;
            break;
        }
        block.push(line);
    }
    if !closed {
        return Frontmatter::default();
    }

    let mut fields = BTreeMap::new();
    // Key of the multi-line list currently being collected
    let mut open_list: Option<String> = None;

    for line in block {
        if let Some(key) = &open_list {
            if let Some(item) = line.strip_prefix("  - ") {
                if let Some(FieldValue::List(items)) = fields.get_mut(key) {
                    items.push(unquote(item).to_string());
                }
                continue;
            }
        }

        let starts_in_column_zero = line.chars().next().is_some_and(|c| !c.is_whitespace());
        if !starts_in_column_zero {
            continue;
        }
        open_list = None;

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim();

        if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            let items = inner
                .split(',')
                .map(unquote)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            fields.insert(key, FieldValue::List(items));
        } else if value.is_empty() {
            fields.insert(key.clone(), FieldValue::List(Vec::new()));
            open_list = Some(key);
        } else {
            fields.insert(key, FieldValue::Scalar(unquote(value).to_string()));
        }
    }

    Frontmatter { fields }
}

/// Trim whitespace and one surrounding quote character from each end.
fn unquote(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_prefix(['"', '\'']).unwrap_or(s);
    s.strip_suffix(['"', '\'']).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"---
summary: "API reference for the HTTP layer"
read_when:
  - editing endpoints
  - 'adding auth'
owner: platform
---

# API
"#;

    #[test]
    fn test_parse_scalar_and_multiline_list() {
        let fm = parse(DOC);
        assert_eq!(fm.scalar("summary"), Some("API reference for the HTTP layer"));
        assert_eq!(fm.list("read_when"), vec!["editing endpoints", "adding auth"]);
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let fm = parse(DOC);
        assert_eq!(
            fm.get("owner"),
            Some(&FieldValue::Scalar("platform".to_string()))
        );
    }

    #[test]
    fn test_inline_list() {
        let fm = parse("---\nuse_when: [deploying, \"rolling back\", 'hotfix', ]\n---\n");
        assert_eq!(fm.list("use_when"), vec!["deploying", "rolling back", "hotfix"]);
    }

    #[test]
    fn test_scalar_normalized_to_list() {
        let fm = parse("---\nread_when: touching the schema\n---\n");
        assert_eq!(fm.list("read_when"), vec!["touching the schema"]);
    }

    #[test]
    fn test_no_frontmatter() {
        assert!(parse("# Just a heading\n\nsummary: nope\n").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_delimiter_must_open_the_text() {
        assert!(parse("\n---\nsummary: late\n---\n").is_empty());
    }

    #[test]
    fn test_unclosed_block_is_empty() {
        let fm = parse("---\nsummary: never closed\nread_when: [x]\n");
        assert!(fm.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let fm = parse("---\r\nname: deploy\r\ndescription: Ship it\r\n---\r\nbody");
        assert_eq!(fm.scalar("name"), Some("deploy"));
        assert_eq!(fm.scalar("description"), Some("Ship it"));
    }

    #[test]
    fn test_list_closes_at_next_key() {
        let fm = parse("---\nread_when:\n  - one\n  - two\nsummary: s\n  - stray\n---\n");
        assert_eq!(fm.list("read_when"), vec!["one", "two"]);
        assert_eq!(fm.scalar("summary"), Some("s"));
    }

    #[test]
    fn test_indented_non_item_lines_ignored() {
        let fm = parse("---\nread_when:\n  note: nested\n  - kept\nsource:\n  channel: dm\n---\n");
        assert_eq!(fm.list("read_when"), vec!["kept"]);
        assert!(fm.list("source").is_empty());
        assert!(fm.get("channel").is_none());
    }

    #[test]
    fn test_empty_list_key() {
        let fm = parse("---\nread_when:\nsummary: s\n---\n");
        assert_eq!(fm.get("read_when"), Some(&FieldValue::List(vec![])));
        assert!(fm.list("read_when").is_empty());
    }

    #[test]
    fn test_value_with_colon_kept_whole() {
        let fm = parse("---\nsummary: Ports: 8080 and 9090\n---\n");
        assert_eq!(fm.scalar("summary"), Some("Ports: 8080 and 9090"));
    }

    #[test]
    fn test_empty_scalar_is_none() {
        let fm = parse("---\nsummary: \"\"\n---\n");
        assert_eq!(fm.scalar("summary"), None);
    }
}
