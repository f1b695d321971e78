//! Markdown subset to HTML
//!
//! Supports bold, italic, links, bullet and numbered lists, and line breaks.
//! Everything else passes through as escaped text. Rendering is a pure
//! function of its input. Output for single-line text without markers
//! renders to itself again; markup the renderer emits, such as `<br />`, is
//! escaped like any other text on a second pass.

pub mod markdown;

use crate::conversation::{CitationSet, ConversationMessage};

pub use markdown::{Block, Inline};

/// Shown for a reply that has not produced any text yet
pub const PENDING_PLACEHOLDER: &str = "...";

const LINK_ATTRS: &str = r#"target="_blank" rel="noopener noreferrer""#;

/// Render message text to HTML
pub fn render(text: &str) -> String {
    let mut html = String::with_capacity(text.len() + text.len() / 4);
    for block in markdown::parse(text) {
        write_block(&mut html, &block);
    }
    html
}

/// Render a message for display, with a placeholder for an empty streaming reply
pub fn render_message(message: &ConversationMessage) -> String {
    if message.streaming && message.text.is_empty() {
        PENDING_PLACEHOLDER.to_string()
    } else {
        render(&message.text)
    }
}

/// Render citations as a list of links; empty sets render as nothing
pub fn render_citations(citations: &CitationSet) -> String {
    if citations.is_empty() {
        return String::new();
    }

    let mut html = String::from("<ul>");
    for citation in citations.iter() {
        let href = escape(&citation.url);
        if is_safe_href(&citation.url) {
            html.push_str(&format!(
                r#"<li><a href="{}" {} title="{}">{}</a></li>"#,
                href,
                LINK_ATTRS,
                href,
                escape(&citation.title)
            ));
        } else {
            html.push_str(&format!("<li>{}</li>", escape(&citation.title)));
        }
    }
    html.push_str("</ul>");
    html
}

fn write_block(html: &mut String, block: &Block) {
    match block {
        Block::Line(inlines) => write_inlines(html, inlines),
        Block::Break => html.push_str("<br />"),
        Block::UnorderedList(items) => write_list(html, "ul", items),
        Block::OrderedList(items) => write_list(html, "ol", items),
    }
}

fn write_list(html: &mut String, tag: &str, items: &[Vec<Inline>]) {
    html.push('<');
    html.push_str(tag);
    html.push('>');
    for item in items {
        html.push_str("<li>");
        write_inlines(html, item);
        html.push_str("</li>");
    }
    html.push_str("</");
    html.push_str(tag);
    html.push('>');
}

fn write_inlines(html: &mut String, inlines: &[Inline]) {
    for inline in inlines {
        match inline {
            Inline::Text(text) => html.push_str(&escape(text)),
            Inline::Strong(children) => {
                html.push_str("<strong>");
                write_inlines(html, children);
                html.push_str("</strong>");
            }
            Inline::Emphasis(children) => {
                html.push_str("<em>");
                write_inlines(html, children);
                html.push_str("</em>");
            }
            Inline::Link { label, href } if is_safe_href(href) => {
                html.push_str(&format!(r#"<a href="{}" {}>"#, escape(href), LINK_ATTRS));
                write_inlines(html, label);
                html.push_str("</a>");
            }
            // Unsupported schemes keep only their label
            Inline::Link { label, .. } => write_inlines(html, label),
        }
    }
}

fn is_safe_href(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    ["http://", "https://", "mailto:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Escape text and attribute values. An `&` that already starts a character
/// reference is left alone so escaped input stays unchanged.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '&' if char_reference_len(&text[i..]).is_some() => out.push('&'),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// Length of a character reference (`&amp;`, `&#39;`, `&#x1F3A7;`) at the start of `s`
fn char_reference_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix('&')?;
    let end = body.find(';')?;
    let name = &body[..end];

    let valid = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        (1..=6).contains(&hex.len()) && hex.bytes().all(|b| b.is_ascii_hexdigit())
    } else if let Some(dec) = name.strip_prefix('#') {
        (1..=7).contains(&dec.len()) && dec.bytes().all(|b| b.is_ascii_digit())
    } else {
        (2..=32).contains(&name.len())
            && name.bytes().next().is_some_and(|b| b.is_ascii_alphabetic())
            && name.bytes().all(|b| b.is_ascii_alphanumeric())
    };

    valid.then_some(end + 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_markdown() {
        let html = render("**bold** and *italic* and [link](https://a.test)\n- one\n- two");
        assert_eq!(
            html,
            r#"<strong>bold</strong> and <em>italic</em> and <a href="https://a.test" target="_blank" rel="noopener noreferrer">link</a><ul><li>one</li><li>two</li></ul>"#
        );
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(render("Just words here"), "Just words here");
        assert_eq!(render(""), "");
    }

    #[test]
    fn test_escapes_markup() {
        assert_eq!(
            render("<script>alert('x')</script> & more"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"
        );
    }

    #[test]
    fn test_escaped_output_is_stable() {
        let inputs = [
            "Tom & Jerry <3 \"quotes\"",
            "already &amp; escaped &#39;",
            "Price: 1 299 € & up",
        ];
        for input in inputs {
            let once = render(input);
            assert_eq!(render(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_emitted_markup_is_escaped_again() {
        let once = render("a\nb\n\nc");
        assert_eq!(once, "a<br />b<br />c");
        assert_eq!(render(&once), "a&lt;br /&gt;b&lt;br /&gt;c");
    }

    #[test]
    fn test_is_deterministic() {
        let text = "**Top pick**: [Rega Planar 3](https://hifisti.test/rega)\n1. Plug in\n2. Play";
        assert_eq!(render(text), render(text));
    }

    #[test]
    fn test_triple_markers_nest() {
        assert_eq!(render("***x***"), "<strong><em>x</em></strong>");
    }

    #[test]
    fn test_ordered_list() {
        assert_eq!(
            render("Steps:\n1. Level the deck\n2. Set tracking force"),
            "Steps:<ol><li>Level the deck</li><li>Set tracking force</li></ol>"
        );
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(render("one\ntwo"), "one<br />two");
        assert_eq!(render("one\n\n\ntwo"), "one<br />two");
        assert_eq!(render("- item\nafter"), "<ul><li>item</li></ul>after");
    }

    #[test]
    fn test_unsafe_link_keeps_label() {
        assert_eq!(render("[click](javascript:alert(1))"), "click");
        assert_eq!(render("[home](/index.html)"), "home");
    }

    #[test]
    fn test_link_attribute_escaped() {
        assert_eq!(
            render(r#"[x](https://a.test/?q="y")"#),
            r#"<a href="https://a.test/?q=&quot;y&quot;" target="_blank" rel="noopener noreferrer">x</a>"#
        );
    }

    #[test]
    fn test_pending_message_placeholder() {
        let mut message = ConversationMessage::pending_reply();
        assert_eq!(render_message(&message), PENDING_PLACEHOLDER);

        message.text.push_str("**Hi**");
        assert_eq!(render_message(&message), "<strong>Hi</strong>");
    }

    #[test]
    fn test_citations() {
        let mut citations = CitationSet::new();
        citations.push("https://x.test".to_string(), Some("X & Y"));
        assert_eq!(
            render_citations(&citations),
            r#"<ul><li><a href="https://x.test" target="_blank" rel="noopener noreferrer" title="https://x.test">X &amp; Y</a></li></ul>"#
        );
        assert_eq!(render_citations(&CitationSet::new()), "");
    }

    #[test]
    fn test_char_reference_detection() {
        assert_eq!(char_reference_len("&amp; x"), Some(5));
        assert_eq!(char_reference_len("&#39;"), Some(5));
        assert_eq!(char_reference_len("&#x1F3A7;"), Some(9));
        assert_eq!(char_reference_len("& x;"), None);
        assert_eq!(char_reference_len("&;"), None);
    }
}
