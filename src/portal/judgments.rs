// =============================================================================
// portal/judgments.rs - READING THE JUDGMENT LISTING
// =============================================================================
//
// The judgment search is a different application with a different layout.
// Each result row has a `.caseDetailsTD` cell that reads like
//
//   CNR : HCBM010012342019 | Date of registration : 12-03-2019 | Decision Date : 01-02-2021
//
// plus a `Court : <name>` span. We turn each row into an ordered key/value
// record and then tally identical records, because the listing repeats the
// same judgment once per linked PDF.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Serialize;
use tracing::debug;

use super::normalizer::element_text;
use crate::markers::{judgment_search_rejected, JudgmentRejection};

static REPORT_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#report_body tr").expect("report row selector is valid CSS"));
static CASE_DETAILS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".caseDetailsTD").expect("case details selector is valid CSS"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").expect("span selector is valid CSS"));

const PAIR_SEPARATOR: &str = " : ";

/// One judgment as the listing describes it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JudgmentRecord {
    pub fields: BTreeMap<String, String>,
    pub court: Option<String>,
}

/// Identical records grouped, with how many times each appeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgmentTally {
    #[serde(flatten)]
    pub record: JudgmentRecord,
    pub count: u32,
}

/// Parse every `#report_body` row that has a case-details cell.
pub fn parse_judgment_rows(html: &str) -> Vec<JudgmentRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for (index, row) in document.select(&REPORT_ROW).enumerate() {
        let Some(details) = row.select(&CASE_DETAILS).next() else {
            debug!(row = index, "Judgment row has no case details cell");
            continue;
        };

        let mut fields: BTreeMap<String, String> = element_text(details)
            .split('|')
            .filter_map(|pair| pair.trim().split_once(PAIR_SEPARATOR))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        let court = row
            .select(&SPAN)
            .map(element_text)
            .find(|text| text.contains("Court"))
            .and_then(|text| text.split_once(PAIR_SEPARATOR).map(|(_, name)| name.trim().to_string()))
            .filter(|name| !name.is_empty());

        // Some rows also repeat the court as a details pair.
        if court.is_some() {
            fields.remove("Court");
        }

        records.push(JudgmentRecord { fields, court });
    }

    records
}

/// Group identical records and count them. Output is sorted by record.
pub fn tally_judgments(records: &[JudgmentRecord]) -> Vec<JudgmentTally> {
    let mut counts: BTreeMap<&JudgmentRecord, u32> = BTreeMap::new();
    for record in records {
        *counts.entry(record).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(record, count)| JudgmentTally {
            record: record.clone(),
            count,
        })
        .collect()
}

/// A listing page, or the reason the search refused to show one.
pub fn read_listing(page: &str) -> Result<Vec<JudgmentTally>, JudgmentRejection> {
    if let Some(rejection) = judgment_search_rejected(page) {
        return Err(rejection);
    }
    Ok(tally_judgments(&parse_judgment_rows(page)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <table><tbody id="report_body">
          <tr><td class="caseDetailsTD">CNR : HCBM01 | Decision Date : 01-02-2021 | junk without separator</td>
              <td><span>Court : High Court of Bombay</span></td></tr>
          <tr><td class="caseDetailsTD">CNR : HCBM01 | Decision Date : 01-02-2021</td>
              <td><span>Court : High Court of Bombay</span></td></tr>
          <tr><td class="caseDetailsTD">CNR : HCKA07 | Decision Date : 15-06-2022</td></tr>
          <tr><td>pagination</td></tr>
        </tbody></table>
    "#;

    #[test]
    fn test_parses_pairs_and_court() {
        let records = parse_judgment_rows(LISTING);
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.fields.get("CNR").map(String::as_str), Some("HCBM01"));
        assert_eq!(first.fields.get("Decision Date").map(String::as_str), Some("01-02-2021"));
        assert_eq!(first.court.as_deref(), Some("High Court of Bombay"));
        assert_eq!(first.fields.len(), 2);

        assert!(records[2].court.is_none());
    }

    #[test]
    fn test_identical_records_are_counted_together() {
        let tallies = tally_judgments(&parse_judgment_rows(LISTING));
        assert_eq!(tallies.len(), 2);

        let bombay = tallies
            .iter()
            .find(|t| t.record.court.as_deref() == Some("High Court of Bombay"))
            .unwrap();
        assert_eq!(bombay.count, 2);
    }

    #[test]
    fn test_rejection_page_is_not_a_listing() {
        assert_eq!(
            read_listing("<p>Invalid Captcha..!!!</p>"),
            Err(JudgmentRejection::InvalidCaptcha)
        );
        assert_eq!(read_listing(LISTING).unwrap().len(), 2);
    }
}
