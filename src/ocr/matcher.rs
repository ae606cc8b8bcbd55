//! Death-message keyword matching on normalized OCR text.

/// Returns true when `text` contains a death keyword and no exclusion.
///
/// Exclusions veto the match regardless of where they appear, so a frame
/// reading `ENEMYFELLED` never counts even if a keyword is also present.
/// Empty keywords and exclusions are ignored.
pub fn is_death(text: &str, keywords: &[String], exclusions: &[String]) -> bool {
    if text.is_empty() {
        return false;
    }

    if exclusions
        .iter()
        .any(|ex| !ex.is_empty() && text.contains(ex.as_str()))
    {
        return false;
    }

    keywords
        .iter()
        .any(|kw| !kw.is_empty() && text.contains(kw.as_str()))
}
