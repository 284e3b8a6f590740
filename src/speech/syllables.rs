//! Syllable estimation for jaw animation
//!
//! A vowel-group heuristic for English words. It only needs to be close
//! enough to give the jaw a plausible rhythm.

use once_cell::sync::Lazy;
use regex::Regex;

/// Silent endings dropped before counting ("make", "jumped", "takes")
static SILENT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[^laeiouy]es|ed|[^laeiouy]e)$").expect("valid suffix regex"));

/// Vowel groups, each roughly one syllable
static VOWEL_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[aeiouy]{1,2}").expect("valid vowel regex"));

/// Estimate the number of syllables in `word`
///
/// Hyphenated words are counted per part. Anything without letters
/// counts as zero; callers decide how to treat that.
pub fn count(word: &str) -> usize {
    word.split('-').map(count_part).sum()
}

fn count_part(part: &str) -> usize {
    let letters: String = part
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(|c| c.to_lowercase())
        .collect();

    if letters.is_empty() {
        return 0;
    }
    if letters.chars().count() <= 3 {
        return 1;
    }

    let stripped = SILENT_SUFFIX.replace(&letters, "");
    let stripped: &str = &stripped;
    let stripped = stripped.strip_prefix('y').unwrap_or(stripped);

    VOWEL_GROUP.find_iter(stripped).count().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_words() {
        assert_eq!(count("hello"), 2);
        assert_eq!(count("world"), 1);
        assert_eq!(count("table"), 2);
        assert_eq!(count("make"), 1);
        assert_eq!(count("banana"), 3);
        assert_eq!(count("a"), 1);
    }

    #[test]
    fn test_punctuation_and_case() {
        assert_eq!(count("World!"), 1);
        assert_eq!(count("\"Hello,\""), 2);
    }

    #[test]
    fn test_hyphenated() {
        assert_eq!(count("well-known"), 2);
    }

    #[test]
    fn test_no_letters() {
        assert_eq!(count(""), 0);
        assert_eq!(count("2024"), 0);
        assert_eq!(count("..."), 0);
    }
}
