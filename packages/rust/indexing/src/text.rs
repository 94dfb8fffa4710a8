//! Plain-text extraction and word counting for CMS body content.

use scraper::{ElementRef, Html, Node};

use pagegen_shared::RichContent;

/// Elements whose text never reaches a reader.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that break the text flow; inline elements (`strong`, `a`, `em`)
/// join their text to the neighbouring words.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Extract the reader-visible text of `content`, with blocks separated by spaces.
pub fn plain_text(content: &RichContent) -> String {
    match content {
        RichContent::Plain(text) => text.clone(),
        RichContent::Html(html) => html_text(html),
        RichContent::Document(doc) => {
            let mut parts = Vec::new();
            collect_document_text(doc, &mut parts);
            parts.join(" ")
        }
    }
}

/// Whitespace-delimited token count of the extracted text. Missing content counts as 0.
pub fn word_count(content: Option<&RichContent>) -> usize {
    content
        .map(|c| plain_text(c).split_whitespace().count())
        .unwrap_or(0)
}

/// Whether `content` carries any visible text at all.
pub fn has_text(content: Option<&RichContent>) -> bool {
    content.is_some_and(|c| !plain_text(c).trim().is_empty())
}

fn html_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::new();
    collect_element_text(fragment.root_element(), &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_element_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }

    let block = BLOCK_ELEMENTS.contains(&name);
    if block {
        out.push(' ');
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_element_text(child, out);
                }
            }
            _ => {}
        }
    }
    if block {
        out.push(' ');
    }
}

/// Walk a rich-text node tree collecting the `value` of every text leaf.
fn collect_document_text(node: &serde_json::Value, parts: &mut Vec<String>) {
    match node {
        serde_json::Value::Object(map) => {
            let is_text = map
                .get("nodeType")
                .and_then(|t| t.as_str())
                .is_none_or(|t| t == "text");
            if is_text {
                if let Some(value) = map.get("value").and_then(|v| v.as_str()) {
                    parts.push(value.to_string());
                }
            }
            if let Some(children) = map.get("content") {
                collect_document_text(children, parts);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_document_text(item, parts);
            }
        }
        serde_json::Value::String(s) => parts.push(s.clone()),
        _ => {}
    }
}
