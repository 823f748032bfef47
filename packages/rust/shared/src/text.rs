//! Text normalization helpers shared by the normalizer, merger and crawler.
//!
//! Display values keep their casing; the `normalize_*` functions produce the
//! case-folded forms that make up a [`crate::DedupKey`].

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use sha2::{Digest, Sha256};

/// Separator between fingerprint components (ASCII unit separator).
const FIELD_SEPARATOR: char = '\u{1f}';

/// Hex characters kept from a hash when building a derived job id.
const STABLE_ID_LEN: usize = 20;

static LEGAL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(inc|llc|ltd|corp|corporation|co|gmbh)\b").expect("valid legal suffix regex")
});

static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6]|/tr)\s*/?>").expect("valid block tag regex")
});

/// Trim and collapse every whitespace run to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip HTML markup, keeping visible text with whitespace collapsed.
///
/// Plain text passes through unchanged apart from whitespace collapsing.
pub fn strip_markup(s: &str) -> String {
    if !s.contains('<') && !s.contains('&') {
        return collapse_whitespace(s);
    }
    // Block-level closers would otherwise glue adjacent words together.
    let spaced = BLOCK_TAG.replace_all(s, " $0");
    let fragment = Html::parse_fragment(&spaced);
    let text: String = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&text)
}

/// Case-fold, replace everything but letters, digits and the given extras
/// with spaces, then collapse whitespace.
fn fold(s: &str, keep: &[char]) -> String {
    let mapped: String = s
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || keep.contains(&c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&mapped)
}

/// Normalized company: case-folded, punctuation stripped, legal suffixes removed.
pub fn normalize_company(company: &str) -> String {
    let folded = fold(company, &[]);
    let stripped = LEGAL_SUFFIX.replace_all(&folded, " ");
    let result = collapse_whitespace(&stripped);
    // A name made only of suffixes ("Co") keeps its folded form.
    if result.is_empty() { folded } else { result }
}

/// Normalized title: case-folded, punctuation other than `+` and `#` stripped.
pub fn normalize_title(title: &str) -> String {
    fold(title, &['+', '#'])
}

/// Normalized location: first comma component, case-folded, aliases applied.
pub fn normalize_location(location: &str) -> String {
    let first = location.split(',').next().unwrap_or_default();
    let folded = fold(first, &[]);
    match folded.as_str() {
        "nyc" | "new york city" | "manhattan" => "new york".into(),
        "sf" | "san francisco bay area" | "bay area" => "san francisco".into(),
        "la" => "los angeles".into(),
        "remote" | "anywhere" | "work from home" | "wfh" | "remote first" | "fully remote" => {
            "remote".into()
        }
        other if other.starts_with("remote ") => "remote".into(),
        other => other.to_string(),
    }
}

/// SHA-256 over title, company and description, hex-encoded.
pub fn content_fingerprint(title: &str, company: &str, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
    hasher.update(company.as_bytes());
    hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
    hasher.update(description.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic short id: 20 hex chars of SHA-256 over the parts.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
        }
        hasher.update(part.as_bytes());
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(STABLE_ID_LEN);
    hex
}

/// Lowercase ASCII slug (`"Acme Robotics, Inc."` -> `"acmerobotics"`), as used
/// by ATS board names.
pub fn company_slug(company: &str) -> String {
    normalize_company(company)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_whitespace_trims_and_joins() {
        assert_eq!(collapse_whitespace("  Senior\n\tRust   Engineer "), "Senior Rust Engineer");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn strip_markup_removes_tags_and_entities() {
        let html = "<p>Build <b>fast</b> services.</p><ul><li>Rust</li><li>SQL</li></ul>";
        assert_eq!(strip_markup(html), "Build fast services. Rust SQL");
        assert_eq!(strip_markup("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(strip_markup("plain   text"), "plain text");
    }

    #[test]
    fn company_suffixes_removed() {
        assert_eq!(normalize_company("Acme, Inc."), "acme");
        assert_eq!(normalize_company("ACME LLC"), "acme");
        assert_eq!(normalize_company("Globex Corporation"), "globex");
        assert_eq!(normalize_company("Initech GmbH"), "initech");
        // "co" only as a whole word
        assert_eq!(normalize_company("Cobalt Co"), "cobalt");
        assert_eq!(normalize_company("Co"), "co");
    }

    #[test]
    fn title_keeps_plus_and_hash() {
        assert_eq!(normalize_title("C++ Developer (Remote)"), "c++ developer remote");
        assert_eq!(normalize_title("Sr. C# / .NET Engineer"), "sr c# net engineer");
    }

    #[test]
    fn location_aliases() {
        assert_eq!(normalize_location("NYC"), "new york");
        assert_eq!(normalize_location("New York, NY"), "new york");
        assert_eq!(normalize_location("New York City, NY, US"), "new york");
        assert_eq!(normalize_location("SF"), "san francisco");
        assert_eq!(normalize_location("Remote - US"), "remote");
        assert_eq!(normalize_location("Berlin, Germany"), "berlin");
        assert_eq!(normalize_location(""), "");
    }

    #[test]
    fn fingerprint_is_deterministic_and_field_sensitive() {
        let a = content_fingerprint("Engineer", "Acme", "Build things");
        let b = content_fingerprint("Engineer", "Acme", "Build things");
        let c = content_fingerprint("Engineer", "Acme", "Build other things");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        // Separator prevents boundary shifts from colliding
        assert_ne!(
            content_fingerprint("ab", "c", ""),
            content_fingerprint("a", "bc", "")
        );
    }

    #[test]
    fn stable_id_length_and_determinism() {
        let id = stable_id(&["acme", "backend engineer", "new york"]);
        assert_eq!(id.len(), 20);
        assert_eq!(id, stable_id(&["acme", "backend engineer", "new york"]));
        assert_ne!(id, stable_id(&["acme", "backend engineer", "remote"]));
    }

    #[test]
    fn slug_for_ats_boards() {
        assert_eq!(company_slug("Acme Robotics, Inc."), "acmerobotics");
        assert_eq!(company_slug("Stripe"), "stripe");
    }
}
