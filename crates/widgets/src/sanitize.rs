//! Defense-in-depth sanitizer for admin-authored Custom widget output.
//!
//! The server sanitizes templates at save time; this pass mirrors that
//! policy on the rendered string so a stale or bypassed server rule
//! still cannot execute script in the host page. Denylist-based: a
//! fixed set of elements is removed, every `on*` attribute is dropped,
//! and `javascript:` / non-image `data:` URLs are stripped.

use once_cell::sync::Lazy;
use regex::Regex;

/// Elements removed together with their content. One pattern per tag;
/// the regex engine has no backreferences to pair open and close.
static CONTAINER_TAGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        "script", "iframe", "object", "embed", "style", "form", "textarea", "select", "button",
    ]
    .iter()
    .map(|tag| {
        Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("static pattern")
    })
    .collect()
});

/// Leftover open/close tags of the same set (unbalanced markup), plus
/// void elements that carry no content.
static STRAY_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(script|iframe|object|embed|style|form|textarea|select|button|link|meta|base|input)\b[^>]*>",
    )
    .expect("static pattern")
});

/// Inline event handlers: `onclick="…"`, `onload='…'`, `onerror=x`.
static EVENT_ATTRS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("static pattern")
});

/// `href`/`src`/`action`-style attributes with an executable URL.
static URL_ATTRS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+(href|src|xlink:href|action|formaction)\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#)
        .expect("static pattern")
});

pub fn sanitize_html(input: &str) -> String {
    let mut stage = input.to_string();
    for re in CONTAINER_TAGS.iter() {
        stage = re.replace_all(&stage, "").into_owned();
    }
    let stage = STRAY_TAGS.replace_all(&stage, "");
    let stage = EVENT_ATTRS.replace_all(&stage, "");
    URL_ATTRS
        .replace_all(&stage, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let raw = caps[2].trim_matches(|c| c == '"' || c == '\'');
            if url_allowed(raw) {
                format!(" {name}={}", &caps[2])
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// `javascript:` (and the other script schemes) never; `data:` only for
/// images; everything else passes.
pub(crate) fn url_allowed(url: &str) -> bool {
    let trimmed: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if trimmed.starts_with("javascript:") || trimmed.starts_with("vbscript:") {
        return false;
    }
    if trimmed.starts_with("data:") {
        return trimmed.starts_with("data:image/");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_elements_are_removed_with_their_content() {
        let out = sanitize_html("<p>hi</p><script>alert(1)</script><p>bye</p>");
        assert_eq!(out, "<p>hi</p><p>bye</p>");
    }

    #[test]
    fn unclosed_script_tags_do_not_survive() {
        let out = sanitize_html("<p>x</p><script src=\"evil.js\">");
        assert_eq!(out, "<p>x</p>");
    }

    #[test]
    fn full_denylist_is_stripped() {
        for tag in ["iframe", "object", "embed", "form", "textarea", "select", "button"] {
            let input = format!("<{tag}>inner</{tag}>ok");
            assert_eq!(sanitize_html(&input), "ok", "tag {tag}");
        }
        for tag in ["link", "meta", "base", "input"] {
            let input = format!("<{tag} a=\"b\">ok");
            assert_eq!(sanitize_html(&input), "ok", "tag {tag}");
        }
    }

    #[test]
    fn style_elements_are_removed_but_classes_stay() {
        let out = sanitize_html("<style>.x{color:red}</style><div class=\"x\">y</div>");
        assert_eq!(out, "<div class=\"x\">y</div>");
    }

    #[test]
    fn inline_event_handlers_are_dropped() {
        let out = sanitize_html(r#"<div onclick="x()" onmouseover='y()' class="keep">z</div>"#);
        assert_eq!(out, r#"<div class="keep">z</div>"#);
        let out = sanitize_html("<img src=\"a.png\" onerror=steal()>");
        assert_eq!(out, "<img src=\"a.png\">");
    }

    #[test]
    fn javascript_urls_are_stripped() {
        let out = sanitize_html(r#"<a href="javascript:alert(1)">x</a>"#);
        assert_eq!(out, "<a>x</a>");
        // Case and whitespace games don't help.
        let out = sanitize_html("<a href=\"JaVa\tScRiPt:alert(1)\">x</a>");
        assert_eq!(out, "<a>x</a>");
    }

    #[test]
    fn data_urls_only_for_images() {
        let keep = r#"<img src="data:image/png;base64,AAAA">"#;
        assert_eq!(sanitize_html(keep), keep);
        let out = sanitize_html(r#"<a href="data:text/html,<script>x</script>">x</a>"#);
        assert!(!out.contains("data:text"));
    }

    #[test]
    fn ordinary_links_pass_through() {
        let input = r#"<a href="https://shop.example/p1" class="pwx-link">buy</a>"#;
        assert_eq!(sanitize_html(input), input);
    }
}
