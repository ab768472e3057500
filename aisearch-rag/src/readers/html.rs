//! HTML to text conversion.
//!
//! Documentation pages are split into their block-level elements so callers can
//! drop leading navigation elements before indexing the page body.

use crate::error::{RagError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

struct HtmlPatterns {
    hidden: Vec<Regex>,
    comment: Regex,
    block: Regex,
    tag: Regex,
    spaces: Regex,
}

fn patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        hidden: ["head", "script", "style", "noscript", "svg"]
            .iter()
            .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b.*?</{tag}\s*>")).expect("valid regex"))
            .collect(),
        comment: Regex::new(r"(?s)<!--.*?-->").expect("valid regex"),
        block: Regex::new(
            r"(?i)</?(p|div|section|article|aside|header|footer|nav|main|h[1-6]|li|ul|ol|dl|dt|dd|tr|table|thead|tbody|pre|blockquote|br|hr|figure|figcaption|title)\b[^>]*>",
        )
        .expect("valid regex"),
        tag: Regex::new(r"(?s)<[^>]*>").expect("valid regex"),
        spaces: Regex::new(r"[ \t\r\n\u{a0}]+").expect("valid regex"),
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Text of every non-empty block element, in document order.
pub fn html_elements(html: &str) -> Vec<String> {
    let p = patterns();
    let mut visible = html.to_string();
    for hidden in &p.hidden {
        visible = hidden.replace_all(&visible, " ").into_owned();
    }
    let without_comments = p.comment.replace_all(&visible, " ");
    let marked = p.block.replace_all(&without_comments, "\u{1e}");
    let stripped = p.tag.replace_all(&marked, "");

    stripped
        .split('\u{1e}')
        .map(|segment| {
            let decoded = decode_entities(segment);
            p.spaces.replace_all(&decoded, " ").trim().to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Plain text of a page: elements separated by blank lines.
pub fn html_to_text(html: &str) -> String {
    html_elements(html).join("\n\n")
}

/// Load an HTML file as a list of element texts.
pub async fn load_elements(path: &Path) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RagError::reader(format!("{}: {}", path.display(), e)))?;
    Ok(html_elements(&String::from_utf8_lossy(&bytes)))
}

/// Page body with the first `skip` elements (site navigation) removed.
pub fn page_body(elements: &[String], skip: usize) -> String {
    elements
        .iter()
        .skip(skip)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Docs</title><style>p { color: red; }</style></head>
<body><nav><ul><li><a href="/">Home</a></li><li>API</li></ul></nav>
<main><h1>Query   Engines</h1><!-- hidden -->
<p>A query engine takes a <b>natural language</b> query &amp; returns a response.</p>
<script>var x = "<p>not text</p>";</script>
<p></p><div>Second&nbsp;block</div></main></body></html>"#;

    #[test]
    fn test_elements_in_order_without_hidden_content() {
        let elements = html_elements(PAGE);
        assert_eq!(
            elements,
            vec![
                "Home",
                "API",
                "Query Engines",
                "A query engine takes a natural language query & returns a response.",
                "Second block",
            ]
        );
    }

    #[test]
    fn test_page_body_skips_navigation() {
        let elements = html_elements(PAGE);
        let body = page_body(&elements, 2);
        assert!(body.starts_with("Query Engines\n\n"));
        assert!(!body.contains("Home"));
        assert_eq!(page_body(&elements, 100), "");
    }

    #[test]
    fn test_html_to_text_plain_input() {
        assert_eq!(html_to_text("no markup here"), "no markup here");
    }
}
