//! Word stemming shared by indexing and querying.

use rust_stemmers::{Algorithm, Stemmer};
use std::sync::OnceLock;

fn english() -> &'static Stemmer {
    static STEMMER: OnceLock<Stemmer> = OnceLock::new();
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

/// Map a whitespace-delimited token to its search key: lowercased, stripped of
/// surrounding punctuation, then reduced to its English stem.
/// Returns an empty string for tokens with nothing left to index.
pub fn word_stem(token: &str) -> String {
    let lowered = token.to_lowercase();
    let trimmed = lowered.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        return String::new();
    }
    english().stem(trimmed).into_owned()
}

/// Distinct, non-empty stems of whitespace-separated `text`, in first-seen order.
pub fn distinct_stems(text: &str) -> Vec<String> {
    let mut stems: Vec<String> = Vec::new();
    for stem in text.split_whitespace().map(word_stem) {
        if !stem.is_empty() && !stems.contains(&stem) {
            stems.push(stem);
        }
    }
    stems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflections_share_a_stem() {
        assert_eq!(word_stem("posting"), word_stem("post"));
        assert_eq!(word_stem("Posts"), word_stem("post"));
    }

    #[test]
    fn punctuation_and_case_do_not_matter() {
        assert_eq!(word_stem("Hello,"), word_stem("hello"));
        assert_eq!(word_stem("(world)"), "world");
        assert_eq!(word_stem("..."), "");
    }

    #[test]
    fn distinct_stems_deduplicates() {
        let stems = distinct_stems("post  posts\tposting   news");
        assert_eq!(stems, vec![word_stem("post"), word_stem("news")]);
    }
}
