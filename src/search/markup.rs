//! Strip HTML markup from rendered post bodies before tokenizing.

use regex::Regex;
use std::sync::OnceLock;

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Replace every tag with a space so words on either side of `<br>` and friends
/// stay separate, and decode the handful of entities the renderer emits.
pub fn strip_tags(html: &str) -> String {
    let text = tag_pattern().replace_all(html, " ");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
