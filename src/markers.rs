// =============================================================================
// markers.rs - THE POLITE-REFUSAL DETECTOR
// =============================================================================
//
// The portal never fails with a status code. It fails with a string buried in
// a perfectly healthy HTTP 200 body. So we scan bodies for those strings, and
// we do it in named functions so every caller (and every test) asks the same
// question the same way.
//
// 1. Party-name search: one marker, `errormsg`. memchr's SIMD finder is
//    built once and reused for every body.
// 2. Judgment search: three different rejection banners. One Aho-Corasick
//    automaton finds whichever shows up first in a single pass.
// =============================================================================

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use memchr::memmem::Finder;
use tracing::debug;

/// The substring the party-name search puts in its body when it rejects the
/// token, the CAPTCHA, or both.
pub const PARTY_SEARCH_REJECTION_MARKER: &str = "errormsg";

static PARTY_SEARCH_FINDER: LazyLock<Finder<'static>> =
    LazyLock::new(|| Finder::new(PARTY_SEARCH_REJECTION_MARKER.as_bytes()));

/// True when a party-search response body carries the rejection marker.
/// Status codes are useless here; the portal says 200 either way.
pub fn is_rejection(body: &str) -> bool {
    let rejected = PARTY_SEARCH_FINDER.find(body.as_bytes()).is_some();
    if rejected {
        debug!(body_len = body.len(), "Rejection marker found in portal response");
    }
    rejected
}

/// Why the judgment search turned us away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgmentRejection {
    InvalidCaptcha,
    NonNumericCaptcha,
    SessionTimeout,
}

const JUDGMENT_MARKERS: [(&str, JudgmentRejection); 3] = [
    ("Invalid Captcha..!!!", JudgmentRejection::InvalidCaptcha),
    ("Captcha should be numeric..!", JudgmentRejection::NonNumericCaptcha),
    ("Session timeout..!!!", JudgmentRejection::SessionTimeout),
];

static JUDGMENT_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new(JUDGMENT_MARKERS.iter().map(|(marker, _)| *marker))
        .expect("judgment rejection markers are valid literals")
});

/// Scan a judgment-search page for any rejection banner. Every variant means
/// the same thing to the caller: get a fresh arithmetic challenge and retry.
pub fn judgment_search_rejected(page: &str) -> Option<JudgmentRejection> {
    JUDGMENT_AUTOMATON
        .find(page)
        .map(|m| JUDGMENT_MARKERS[m.pattern().as_usize()].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_rejection_marker_in_json() {
        assert!(is_rejection(r#"{"errormsg":"Invalid Captcha"}"#));
    }

    #[test]
    fn test_clean_body_is_not_a_rejection() {
        assert!(!is_rejection(r#"{"party_data":"<div id='party_data'></div>"}"#));
        assert!(!is_rejection(""));
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        assert!(!is_rejection("ERRORMSG"));
    }

    #[test]
    fn test_judgment_markers() {
        assert_eq!(
            judgment_search_rejected("<div>Invalid Captcha..!!!</div>"),
            Some(JudgmentRejection::InvalidCaptcha)
        );
        assert_eq!(
            judgment_search_rejected("oops: Captcha should be numeric..!"),
            Some(JudgmentRejection::NonNumericCaptcha)
        );
        assert_eq!(
            judgment_search_rejected("Session timeout..!!! please retry"),
            Some(JudgmentRejection::SessionTimeout)
        );
        assert_eq!(judgment_search_rejected("<table id='report_body'></table>"), None);
    }
}
