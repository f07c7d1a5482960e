//! Log helpers for user-supplied text (post bodies, authors, search terms).
//! Keeps every log record on a single line and bounded in size.

const MAX_PREVIEW: usize = 120;

/// Escape a string for single-line logging and cap it at [`MAX_PREVIEW`] chars.
/// Control characters become `\n`, `\r`, `\t` or `\xNN`; the cut is marked with `…`.
pub fn preview(s: &str) -> String {
    preview_with_limit(s, MAX_PREVIEW)
}

pub fn preview_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_bodies_on_one_line() {
        assert_eq!(preview("hello\nworld\t!"), "hello\\nworld\\t!");
    }

    #[test]
    fn truncates_long_bodies() {
        let long = "a".repeat(500);
        let out = preview_with_limit(&long, 10);
        assert_eq!(out, format!("{}…", "a".repeat(10)));
    }
}
