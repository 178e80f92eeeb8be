// =============================================================================
// history.rs - HOW OFTEN DOES THIS PERSON SUE?
// =============================================================================
//
// The last step of a lookup run. Given the rows the normalizer dug out, count
// case types for the rows where the queried party is on the PETITIONER side.
//
// Respondent-side hits never count. "Files claims" and "gets claimed against"
// are very different signals when you are reviewing an insurance claim, and
// the portal's party search happily returns both.
//
// Duplicates count every time. The frequency mirrors the portal's listing,
// not a deduplicated docket.
// =============================================================================

use regex::{Regex, RegexBuilder};
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics::RunMetrics;
use crate::models::{CaseRow, CaseTypeFrequency, HistoryReport, QueryRequest};
use crate::portal::normalizer::normalize;
use crate::portal::submitter::QuerySubmitter;

/// Whole-word, case-insensitive matcher for a party name. Internal whitespace
/// in the name matches any whitespace run. `None` for a blank name.
pub fn name_matcher(name: &str) -> Option<Regex> {
    let tokens: Vec<String> = name.split_whitespace().map(regex::escape).collect();
    if tokens.is_empty() {
        return None;
    }

    let body = tokens.join(r"\s+");
    // \b only means something next to a word character. A name like "A.B."
    // ends in punctuation, where \b would demand a letter follow it.
    let starts_word = name.trim_start().starts_with(is_word_char);
    let ends_word = name.trim_end().ends_with(is_word_char);
    let pattern = format!(
        "{}{body}{}",
        if starts_word { r"\b" } else { "" },
        if ends_word { r"\b" } else { "" },
    );

    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-type counts over the rows where `queried_name` appears in the
/// petitioner text.
pub fn aggregate(rows: &[CaseRow], queried_name: &str) -> CaseTypeFrequency {
    let mut frequency = CaseTypeFrequency::new();
    let Some(matcher) = name_matcher(queried_name) else {
        return frequency;
    };

    for row in rows.iter().filter(|row| matcher.is_match(&row.petitioner_text)) {
        *frequency.entry(row.case_type.clone()).or_insert(0) += 1;
    }

    frequency
}

/// One complete lookup: submit, normalize, aggregate.
pub async fn lookup_history(
    submitter: &QuerySubmitter<'_>,
    query: &QueryRequest,
    metrics: &RunMetrics,
) -> Result<HistoryReport> {
    let raw = submitter.run(query).await?;
    let normalized = normalize(&raw)?;
    metrics.add_rows(normalized.rows.len(), normalized.skipped_rows);

    let case_type = aggregate(&normalized.rows, &query.party_name);
    let matched: u32 = case_type.values().sum();
    debug!(
        party = %query.party_name,
        rows = normalized.rows.len(),
        skipped = normalized.skipped_rows,
        matched,
        "Rows aggregated"
    );
    info!(
        party = %query.party_name,
        total_number_of_cases = normalized.total_count,
        case_types = case_type.len(),
        "Litigation history assembled"
    );

    Ok(HistoryReport {
        party: query.party_name.clone(),
        total_number_of_cases: normalized.total_count,
        case_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SleuthError;
    use crate::models::CaseStatus;
    use crate::portal::captcha::CaptchaSolver;
    use crate::portal::fakes::{ScriptedOcr, ScriptedPortal};

    fn row(case_type: &str, petitioner: &str, respondent: &str) -> CaseRow {
        CaseRow {
            case_type: case_type.into(),
            case_number: None,
            filing_year: None,
            petitioner_text: petitioner.into(),
            respondent_text: respondent.into(),
        }
    }

    fn query(name: &str) -> QueryRequest {
        QueryRequest {
            party_name: name.into(),
            registration_year: 2020,
            case_status: CaseStatus::Both,
            state_code: "3".into(),
            district_code: "12".into(),
            court_complex_code: "1030034".into(),
        }
    }

    #[test]
    fn test_respondent_side_never_counts() {
        let rows = vec![
            row("S.C.C.", "John Doe", "ABC Corp"),
            row("M.A.C.P.", "XYZ Ltd", "John Doe"),
        ];
        let result = aggregate(&rows, "John Doe");
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("S.C.C."), Some(&1));
    }

    #[test]
    fn test_duplicates_each_count() {
        let rows = vec![
            row("M.A.C.P.", "John Doe", "A"),
            row("M.A.C.P.", "John Doe", "A"),
            row("O.S.", "Smt. John Doe and others", "B"),
        ];
        let result = aggregate(&rows, "john doe");
        assert_eq!(result.get("M.A.C.P."), Some(&2));
        assert_eq!(result.get("O.S."), Some(&1));
    }

    #[test]
    fn test_match_is_whole_word() {
        let rows = vec![row("S.C.C.", "Johnny Doerr", "A"), row("S.C.C.", "Ram  Kumar", "B")];
        assert!(aggregate(&rows, "John Doe").is_empty());
        assert_eq!(aggregate(&rows, "ram kumar").get("S.C.C."), Some(&1));
    }

    #[test]
    fn test_punctuated_and_blank_names() {
        let rows = vec![row("W.P.", "M/s. A.B.C. Traders", "State")];
        assert_eq!(aggregate(&rows, "A.B.C.").get("W.P."), Some(&1));
        assert!(aggregate(&rows, "   ").is_empty());
    }

    #[tokio::test]
    async fn test_lookup_history_end_to_end() {
        let body = serde_json::json!({
            "party_data": "<div>Total number of cases : 2<table>\
                <tr><td>1</td><td>S.C.C./1/2020</td><td>John Doe Vs ABC Corp</td></tr>\
                <tr><td>2</td><td>M.A.C.P./9/2020</td><td>XYZ Ltd Vs John Doe</td></tr>\
                </table></div>"
        })
        .to_string();
        let portal = ScriptedPortal::with_bodies(&[body.as_str()]);
        let ocr = ScriptedOcr::new(&[&["abc"]]);
        let metrics = RunMetrics::new();
        let submitter = QuerySubmitter::new(&portal, CaptchaSolver::new(&ocr, 5, &metrics), &metrics);

        let report = lookup_history(&submitter, &query("John Doe"), &metrics).await.unwrap();

        assert_eq!(report.total_number_of_cases, 2);
        assert_eq!(report.case_type.get("S.C.C."), Some(&1));
        assert_eq!(report.case_type.len(), 1);
        assert_eq!(metrics.snapshot().rows_parsed, 2);
    }

    #[tokio::test]
    async fn test_zero_cases_is_an_empty_report_not_an_error() {
        let body = r#"{"party_data":"<div>Total number of cases : 0</div>"}"#;
        let portal = ScriptedPortal::with_bodies(&[body]);
        let ocr = ScriptedOcr::new(&[&["abc"]]);
        let metrics = RunMetrics::new();
        let submitter = QuerySubmitter::new(&portal, CaptchaSolver::new(&ocr, 5, &metrics), &metrics);

        let report = lookup_history(&submitter, &query("Nobody"), &metrics).await.unwrap();
        assert_eq!(report.total_number_of_cases, 0);
        assert!(report.case_type.is_empty());
    }

    #[tokio::test]
    async fn test_missing_party_data_surfaces_as_error() {
        let portal = ScriptedPortal::with_bodies(&[r#"{"status":"ok"}"#]);
        let ocr = ScriptedOcr::new(&[&["abc"]]);
        let metrics = RunMetrics::new();
        let submitter = QuerySubmitter::new(&portal, CaptchaSolver::new(&ocr, 5, &metrics), &metrics);

        let err = lookup_history(&submitter, &query("John Doe"), &metrics).await.unwrap_err();
        assert!(matches!(err, SleuthError::NoPartyData(_)));
    }
}
