//! Text normalization shared by the strategies, the consolidator and the ranker

use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Words that never make a query keyword-searchable on their own
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "have",
    "how", "i", "in", "is", "it", "me", "my", "of", "on", "or", "please", "show", "that", "the",
    "this", "to", "what", "when", "where", "which", "with", "you", "your",
];

const TRADEMARK_SIGNS: &[char] = &['™', '®', '©', '℠'];

/// Lower-case and collapse whitespace. Used for cache keys.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Full normalization for matching: NFKC, case-fold, strip trademark and
/// punctuation symbols, collapse whitespace.
pub fn normalize(text: &str) -> String {
    // Trademark signs decompose to letters under NFKC, drop them first
    let stripped: String = text
        .chars()
        .filter(|c| !TRADEMARK_SIGNS.contains(c))
        .nfkc()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokens of the normalized text, stop words removed, deduplicated in order
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    normalize(text)
        .split(' ')
        .filter(|token| !token.is_empty())
        .filter(|token| !STOP_WORDS.contains(token))
        .filter(|token| seen.insert(token.to_string()))
        .map(str::to_string)
        .collect()
}

/// Split a URL path into lower-case tokens (`/products/hydraulic-pump_xyz` →
/// `products`, `hydraulic`, `pump`, `xyz`)
pub fn url_path_tokens(url: &str) -> Vec<String> {
    let path = url_path(url);
    path.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Canonical form of a URL for identity comparison: no scheme, no `www.`,
/// no query or fragment, no trailing slash, lower-case.
pub fn canonical_url(url: &str) -> String {
    let lower = url.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    let end = without_www.find(['?', '#']).unwrap_or(without_www.len());
    without_www[..end].trim_end_matches('/').to_string()
}

/// Path component of a URL without the host
pub fn url_path(url: &str) -> String {
    let canonical = canonical_url(url);
    match canonical.find('/') {
        Some(idx) => canonical[idx..].to_string(),
        None => String::new(),
    }
}

/// Last non-empty path segment of a URL, the slug for permalinks
pub fn url_slug(url: &str) -> Option<String> {
    url_path(url)
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Slug form of a product name (`Hydraulic Pump XYZ` → `hydraulic-pump-xyz`)
pub fn slugify(text: &str) -> String {
    normalize(text).replace(' ', "-")
}

/// Truncate on a char boundary, appending an ellipsis when shortened
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
