//! Raw message text cleanup.
//!
//! Pager fragments arrive as table-cell HTML with entity-encoded text and
//! occasionally broken or nested markup, so tag removal runs to a fixed
//! point rather than as a single pass.

use std::sync::OnceLock;

use regex::Regex;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^<>]*>").expect("tag regex"))
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&#?[0-9a-zA-Z]+;").expect("entity regex"))
}

/// Strip markup and decode entities from a raw HTML fragment.
///
/// Removes tag spans repeatedly until none remain, decodes the small entity
/// set the pager feed actually emits, maps every other `&...;` sequence to a
/// single space, decodes `&amp;` last so entities it produces are not
/// re-interpreted, drops any leftover bare angle brackets and trims.
/// Always returns a string, possibly empty.
pub fn strip(raw: &str) -> String {
    let mut text = raw.to_string();
    loop {
        let next = tag_re().replace_all(&text, "").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    // Unknown entities become a space; &amp; is deferred until after this
    // pass so "&amp;lt;" ends up as the literal text "&lt;".
    let text = entity_re().replace_all(&text, |caps: &regex::Captures| {
        if &caps[0] == "&amp;" {
            "&amp;".to_string()
        } else {
            " ".to_string()
        }
    });

    let text = text.replace("&amp;", "&");

    let text: String = text.chars().filter(|c| *c != '<' && *c != '>').collect();
    text.trim().to_string()
}

/// Collapse runs of whitespace to single spaces.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
