use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// Two or more "<letter>." groups at the start, e.g. "u.s." or "e.u.".
static ABBREVIATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[a-z]\.){2,}").unwrap());

/// Canonical lookup key for a raw annotation token.
///
/// Lower-cases (after NFC), then strips trailing periods unless the token
/// starts with an abbreviation pattern. Other punctuation is left alone.
pub fn canonical_word(raw: &str) -> String {
    let lowered = raw.nfc().collect::<String>().to_lowercase();
    if ABBREVIATION.is_match(&lowered) {
        lowered
    } else {
        lowered.trim_end_matches('.').to_string()
    }
}
