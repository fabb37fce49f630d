//! Form input sanitizing and HTML escaping

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*?>.*?</\s*(script|style)\s*>").unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static OCTET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%[a-fA-F0-9]{2}").unwrap());
static BLANKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn strip_markup(input: &str) -> String {
    let without_blocks = SCRIPT_OR_STYLE.replace_all(input, "");
    let without_tags = TAG.replace_all(&without_blocks, "");
    let without_octets = OCTET.replace_all(&without_tags, "");
    without_octets
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == ' ')
        .collect()
}

/// Sanitize a single-line field: markup removed, whitespace collapsed, trimmed.
pub fn sanitize_text_field(input: &str) -> String {
    let stripped = strip_markup(input);
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Sanitize a multi-line field: like `sanitize_text_field` but line breaks survive.
pub fn sanitize_textarea_field(input: &str) -> String {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let stripped = strip_markup(&normalized);
    stripped
        .lines()
        .map(|line| BLANKS.replace_all(line.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Escape text for interpolation into HTML content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_field_strips_markup() {
        assert_eq!(
            sanitize_text_field("  <b>Rex</b> <script>alert(1)</script>the dog "),
            "Rex the dog"
        );
    }

    #[test]
    fn test_text_field_collapses_line_breaks() {
        assert_eq!(sanitize_text_field("Jane\n\tDoe"), "Jane Doe");
    }

    #[test]
    fn test_text_field_drops_octets() {
        assert_eq!(sanitize_text_field("SN%20100"), "SN100");
    }

    #[test]
    fn test_textarea_keeps_lines() {
        assert_eq!(
            sanitize_textarea_field("Allergic to  penicillin\r\n<i>Needs</i> insulin  \n"),
            "Allergic to penicillin\nNeeds insulin"
        );
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
