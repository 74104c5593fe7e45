//! Conversion of the backend's rendered HTML into terminal text.
//!
//! Replies arrive as markdown already rendered to HTML. The chat pane only
//! understands plain lines plus `**bold**`, so block tags become line breaks,
//! list items become bullets and everything else is stripped.

use regex::Regex;
use std::sync::OnceLock;

fn block_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</?(p|pre|blockquote|ul|ol|h[1-6]|div)(\s[^>]*)?>|</li>")
            .expect("valid block regex")
    })
}

fn list_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<li(\s[^>]*)?>").expect("valid list regex"))
}

fn strong() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?(strong|b)(\s[^>]*)?>").expect("valid strong regex"))
}

fn any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

fn numeric_entity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid entity regex"))
}

fn blank_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*(\n[ \t]*){2,}").expect("valid blank line regex"))
}

/// Convert a fragment of backend HTML to display text.
pub fn html_to_text(html: &str) -> String {
    let text = block_break().replace_all(html, "\n");
    let text = list_item().replace_all(&text, "\n- ");
    let text = strong().replace_all(&text, "**");
    let text = any_tag().replace_all(&text, "");
    let text = decode_entities(&text);
    let text = blank_runs().replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    let text = numeric_entity().replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // &amp; last so "&amp;lt;" decodes to "&lt;", not "<"
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_become_lines() {
        let html = "<p>Once upon a time...</p>\n<p>The end.</p>";
        assert_eq!(html_to_text(html), "Once upon a time...\n\nThe end.");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(html_to_text("Planning the plot..."), "Planning the plot...");
    }

    #[test]
    fn test_strong_becomes_markdown_bold() {
        assert_eq!(
            html_to_text("<p>A <strong>brave</strong> knight</p>"),
            "A **brave** knight"
        );
    }

    #[test]
    fn test_list_items_become_bullets() {
        let html = "<ul>\n<li>one</li>\n<li>two</li>\n</ul>";
        assert_eq!(html_to_text(html), "- one\n\n- two");
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(
            html_to_text("<p>Tom &amp; Jerry &quot;said&quot; &#39;hi&#39; &lt;3 &#8212; &#x41;</p>"),
            "Tom & Jerry \"said\" 'hi' <3 \u{2014} A"
        );
    }

    #[test]
    fn test_double_escaped_entity_decodes_once() {
        assert_eq!(html_to_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_line_breaks_and_unknown_tags() {
        assert_eq!(
            html_to_text("<p>line one<br />line <em>two</em></p>"),
            "line one\nline two"
        );
    }

    #[test]
    fn test_blank_runs_collapse() {
        assert_eq!(html_to_text("a\n\n\n\n\nb"), "a\n\nb");
    }
}
