//! Snippet extraction from markdown documents.
//!
//! Authoring surface:
//! - a fence labeled `jsx:component:<Name>` defines a component,
//! - a fence labeled `jsx:` runs its body inline,
//! - a fence labeled `jsx::<Name>` invokes `<Name>` with the raw body as `src`,
//! - an inline code span `` `jsx:<expr>` `` runs `<expr>` inline, and
//!   `` `jsx::<Name> <text>` `` invokes `<Name>` with `<text>` as `src`.
//!
//! Frontmatter is read with a line-oriented `key: value` parser; only flat
//! scalar properties are supported.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

pub const DEFINES_COMPONENTS: &str = "defines-components";
pub const COMPONENTS_NAMESPACE: &str = "components-namespace";

const DEFINITION_MARKER: &str = "jsx:component:";
const INVOCATION_MARKER: &str = "jsx::";
const INLINE_MARKER: &str = "jsx:";

lazy_static! {
    static ref FENCE_OPEN: Regex = Regex::new(r"^(\s{0,3})(`{3,}|~{3,})\s*(\S*)\s*$").unwrap();
    static ref INLINE_SPAN: Regex = Regex::new(r"`(jsx:[^`\n]+)`").unwrap();
    static ref INVOCATION: Regex =
        Regex::new(r"^([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)(?:\s+([\s\S]*))?$").unwrap();
}

pub type Properties = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnippetKind {
    /// Defines the named component in the document's namespace.
    Definition(String),
    /// Rendered in place.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub kind: SnippetKind,
    pub source: String,
    /// 1-based line of the opening fence or span.
    pub line: usize,
}

impl Snippet {
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            SnippetKind::Definition(name) => Some(name),
            SnippetKind::Inline => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRONTMATTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Splits leading `---` frontmatter from the body. Returns the properties and
/// the byte offset where the body starts.
pub fn parse_frontmatter(text: &str) -> (Properties, usize) {
    let mut props = Properties::new();
    let mut lines = text.split_inclusive('\n');

    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return (props, 0),
    }

    let mut offset = text.split_inclusive('\n').next().map_or(0, str::len);
    for line in lines {
        offset += line.len();
        let trimmed = line.trim();
        if trimmed == "---" {
            return (props, offset);
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            props.insert(key.trim().to_string(), value.to_string());
        }
    }

    // Unterminated: not frontmatter
    (Properties::new(), 0)
}

pub fn strip_frontmatter(text: &str) -> &str {
    let (_, offset) = parse_frontmatter(text);
    &text[offset..]
}

pub fn defines_components(props: &Properties) -> bool {
    props
        .get(DEFINES_COMPONENTS)
        .map_or(false, |v| v.eq_ignore_ascii_case("true"))
}

pub fn components_namespace(props: &Properties) -> Option<&str> {
    props
        .get(COMPONENTS_NAMESPACE)
        .map(String::as_str)
        .filter(|ns| !ns.trim().is_empty())
}

// ═══════════════════════════════════════════════════════════════════════════════
// SNIPPETS
// ═══════════════════════════════════════════════════════════════════════════════

/// `<Name src={"raw"} />`
pub fn invocation_source(name: &str, raw_body: &str) -> String {
    let literal = serde_json::to_string(raw_body).unwrap_or_else(|_| "\"\"".to_string());
    format!("<{} src={{{}}} />", name, literal)
}

fn snippet_for_label(label: &str, body: String, line: usize) -> Option<Snippet> {
    if let Some(name) = label.strip_prefix(DEFINITION_MARKER) {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        return Some(Snippet {
            kind: SnippetKind::Definition(name.to_string()),
            source: body,
            line,
        });
    }
    if let Some(name) = label.strip_prefix(INVOCATION_MARKER) {
        if !INVOCATION.is_match(name) {
            return None;
        }
        return Some(Snippet {
            kind: SnippetKind::Inline,
            source: invocation_source(name, &body),
            line,
        });
    }
    if label == INLINE_MARKER {
        return Some(Snippet {
            kind: SnippetKind::Inline,
            source: body,
            line,
        });
    }
    None
}

fn inline_span(content: &str, line: usize) -> Option<Snippet> {
    if let Some(rest) = content.strip_prefix(INVOCATION_MARKER) {
        let caps = INVOCATION.captures(rest.trim())?;
        let body = caps.get(2).map_or("", |m| m.as_str());
        return Some(Snippet {
            kind: SnippetKind::Inline,
            source: invocation_source(&caps[1], body),
            line,
        });
    }
    let expr = content.strip_prefix(INLINE_MARKER)?.trim();
    if expr.is_empty() || content.starts_with(DEFINITION_MARKER) {
        return None;
    }
    Some(Snippet {
        kind: SnippetKind::Inline,
        source: expr.to_string(),
        line,
    })
}

/// Every snippet in document order. Frontmatter is skipped.
pub fn extract_snippets(markdown: &str) -> Vec<Snippet> {
    let (_, offset) = parse_frontmatter(markdown);
    let skipped_lines = markdown[..offset].matches('\n').count();

    let mut snippets = Vec::new();
    let mut lines = markdown[offset..].lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let line_no = skipped_lines + index + 1;

        let caps = match FENCE_OPEN.captures(line) {
            Some(caps) => caps,
            None => {
                for span in INLINE_SPAN.captures_iter(line) {
                    snippets.extend(inline_span(&span[1], line_no));
                }
                continue;
            }
        };

        let fence = &caps[2];
        let label = caps[3].to_string();
        let mut body = Vec::new();
        for (_, inner) in lines.by_ref() {
            let trimmed = inner.trim();
            if trimmed.len() >= fence.len()
                && trimmed.starts_with(fence)
                && trimmed.chars().all(|c| Some(c) == fence.chars().next())
            {
                break;
            }
            body.push(inner);
        }

        snippets.extend(snippet_for_label(&label, body.join("\n"), line_no));
    }

    snippets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_properties() {
        let text = "---\ndefines-components: true\ncomponents-namespace: \"Cards.Small\"\n---\n# Title\n";
        let (props, offset) = parse_frontmatter(text);
        assert!(defines_components(&props));
        assert_eq!(components_namespace(&props), Some("Cards.Small"));
        assert_eq!(&text[offset..], "# Title\n");
        assert_eq!(strip_frontmatter(text), "# Title\n");
    }

    #[test]
    fn test_no_frontmatter() {
        let (props, offset) = parse_frontmatter("# Just a title\n---\n");
        assert!(props.is_empty());
        assert_eq!(offset, 0);
        assert!(!defines_components(&props));
    }

    #[test]
    fn test_definition_fence() {
        let text = "intro\n```jsx:component:Badge\n<b>{props.label}</b>\n```\n";
        let snippets = extract_snippets(text);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].name(), Some("Badge"));
        assert_eq!(snippets[0].source, "<b>{props.label}</b>");
        assert_eq!(snippets[0].line, 2);
    }

    #[test]
    fn test_inline_fence_and_span() {
        let text = "```jsx:\n<Badge label=\"x\" />\n```\nSee `jsx:<Badge />` and `plain code`.\n";
        let snippets = extract_snippets(text);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].kind, SnippetKind::Inline);
        assert_eq!(snippets[0].source, "<Badge label=\"x\" />");
        assert_eq!(snippets[1].source, "<Badge />");
        assert_eq!(snippets[1].line, 4);
    }

    #[test]
    fn test_invocation_fence_passes_raw_body() {
        let text = "```jsx::Quote\nsaid \"hi\"\nthen left\n```\n";
        let snippets = extract_snippets(text);
        assert_eq!(
            snippets[0].source,
            r#"<Quote src={"said \"hi\"\nthen left"} />"#
        );
    }

    #[test]
    fn test_invocation_span() {
        let snippets = extract_snippets("a `jsx::Cards.Badge new` b\n");
        assert_eq!(snippets[0].source, r#"<Cards.Badge src={"new"} />"#);
    }

    #[test]
    fn test_other_fences_are_ignored() {
        let text = "```rust\nlet `jsx:x` = 1;\n```\n~~~~\nnothing\n~~~~\n";
        assert!(extract_snippets(text).is_empty());
    }

    #[test]
    fn test_line_numbers_account_for_frontmatter() {
        let text = "---\na: b\n---\n```jsx:component:A\n1\n```\n";
        let snippets = extract_snippets(text);
        assert_eq!(snippets[0].line, 4);
    }
}
