//! Brand keyword matching over story titles
//!
//! Matching is whole-token equality after normalization: a title is split into
//! word tokens, each token is reduced to a canonical key and looked up in the
//! [`BrandSet`]. Substrings never match (`pineapple` does not mention `apple`).

use std::collections::HashSet;
use tracing::{trace, warn};

use crate::models::BrandMention;

/// Characters stripped from both ends of a token
const TRIM_CHARS: &[char] = &[
    '.', ',', '!', '?', '"', '\'', '(', ')', '[', ']', '{', '}', ':', ';',
];

const POSSESSIVE_SUFFIX: &str = "'s";

/// Immutable set of lowercase brand keywords.
///
/// Built once at startup and shared read-only across workers behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct BrandSet {
    brands: HashSet<String>,
}

impl BrandSet {
    /// Build the set from configured keywords.
    ///
    /// Keywords are normalized the same way title tokens are, so `"Apple"` and
    /// `"apple"` collapse to one entry. Keywords that normalize to nothing are
    /// skipped; keywords that can never form a single token (e.g. `"pope francis"`)
    /// are kept but reported.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut brands = HashSet::new();

        for keyword in keywords {
            let key = normalize_word(keyword.as_ref().trim());
            if key.is_empty() {
                continue;
            }
            if key.chars().any(|c| !is_word_char(c)) {
                warn!(
                    brand = %key,
                    "Brand keyword spans several tokens and will never match a title token"
                );
            }
            brands.insert(key);
        }

        Self { brands }
    }

    pub fn contains(&self, key: &str) -> bool {
        !key.is_empty() && self.brands.contains(key)
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.brands.iter().map(String::as_str)
    }
}

/// Reduce a raw token to its matching key.
///
/// Lower-cases, trims surrounding punctuation, drops a trailing possessive `'s`
/// and trims again so that `"(Apple's)"` becomes `"apple"`. May return an empty
/// string, which never matches.
pub fn normalize_word(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let trimmed = lowered.trim_matches(TRIM_CHARS);
    let without_possessive = trimmed.strip_suffix(POSSESSIVE_SUFFIX).unwrap_or(trimmed);
    without_possessive.trim_matches(TRIM_CHARS).to_string()
}

/// Word characters for tokenization; the apostrophe is kept so that possessives
/// reach [`normalize_word`] intact.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\''
}

/// Split a title into lowercase word tokens, dropping empty pieces.
pub fn tokenize(title: &str) -> impl Iterator<Item = String> + '_ {
    title
        .split(|c: char| !is_word_char(c))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Find every brand mentioned in `title`.
///
/// Output follows token order and keeps duplicates; deduplication is left to
/// the store's unique (brand, story_id) constraint.
pub fn match_brands(title: &str, story_id: i64, brands: &BrandSet) -> Vec<BrandMention> {
    let mut mentions = Vec::new();

    for token in tokenize(title) {
        let key = normalize_word(&token);
        trace!(story_id, token = %key, "Checking for brand mention");

        if brands.contains(&key) {
            mentions.push(BrandMention::new(key, story_id));
        }
    }

    mentions
}
