// =============================================================================
// portal/normalizer.rs - MAKING SENSE OF WHATEVER CAME BACK
// =============================================================================
//
// The party search answers in one of three moods:
//
//   {"party_data": "<div>...</div>"}   JSON with the results fragment inside
//   <html>...<div id="party_data">     a whole page, fragment somewhere in it
//   {"errormsg": "..."}                a rejection with a 200 status
//
// `classify_response` decides which one we got, once, at the boundary. After
// that nobody downstream has to guess. `normalize` then digs the table rows
// out of the fragment. A row we cannot read (fewer than three cells, no "Vs"
// in the parties cell) is skipped and logged; one bad row never sinks the
// whole result.
// =============================================================================

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SleuthError};
use crate::markers;
use crate::models::{CaseRow, NormalizedResult, QueryResult};

/// Element id the portal gives the results container.
pub const PARTY_DATA_ID: &str = "party_data";

static PARTY_DATA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#party_data").expect("party data selector is valid CSS"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("row selector is valid CSS"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("cell selector is valid CSS"));
static TOTAL_CASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Total number of cases\s*:\s*(\d+)").expect("total cases pattern compiles")
});

/// Sort a raw party-search body into one of the three `QueryResult` shapes.
pub fn classify_response(body: &str) -> QueryResult {
    if markers::is_rejection(body) {
        return QueryResult::ErrorPayload {
            body: body.to_string(),
        };
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => QueryResult::StructuredPayload {
            party_data: match map.get(PARTY_DATA_ID) {
                Some(Value::String(fragment)) => Some(fragment.clone()),
                // `false`, `0`, `{}`: no fragment, not an empty result.
                _ => None,
            },
        },
        // A JSON-encoded string is a page that went through one json_encode too many.
        Ok(Value::String(html)) => QueryResult::RawHtmlPage { html },
        Ok(_) => QueryResult::StructuredPayload { party_data: None },
        Err(_) => QueryResult::RawHtmlPage {
            html: body.to_string(),
        },
    }
}

/// Turn a classified result into case rows plus the advisory total.
///
/// Fails with `NoPartyData` for a rejection, a page without the results
/// container, or a payload without a fragment. Zero rows from a fragment that
/// is present is a valid empty result, not an error.
pub fn normalize(raw: &QueryResult) -> Result<NormalizedResult> {
    match raw {
        QueryResult::ErrorPayload { .. } => Err(SleuthError::NoPartyData(
            "portal returned an error payload".into(),
        )),
        QueryResult::RawHtmlPage { html } => {
            let document = Html::parse_document(html);
            let container = document.select(&PARTY_DATA).next().ok_or_else(|| {
                SleuthError::NoPartyData("page loaded but #party_data never rendered".into())
            })?;
            Ok(parse_container(container))
        }
        QueryResult::StructuredPayload { party_data } => {
            let fragment = party_data
                .as_deref()
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| SleuthError::NoPartyData("payload has no party_data".into()))?;
            let html = Html::parse_fragment(fragment);
            Ok(parse_container(html.root_element()))
        }
    }
}

fn parse_container(container: ElementRef<'_>) -> NormalizedResult {
    let total_count = TOTAL_CASES
        .captures(&element_text(container))
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0);

    let mut rows = Vec::new();
    let mut skipped_rows = 0;

    for (index, tr) in container.select(&ROW).enumerate() {
        let cells: Vec<String> = tr.select(&CELL).map(element_text).collect();
        match parse_row(&cells) {
            Some(row) => rows.push(row),
            None => {
                // Header rows (th only) are not worth a log line.
                if !cells.is_empty() {
                    debug!(row = index, cells = cells.len(), "Skipping unparseable result row");
                    skipped_rows += 1;
                }
            }
        }
    }

    NormalizedResult {
        rows,
        total_count,
        skipped_rows,
    }
}

/// One result row. Needs three cells and a "Vs" in the third.
pub fn parse_row(cells: &[String]) -> Option<CaseRow> {
    if cells.len() < 3 {
        return None;
    }

    let (petitioner, respondent) = cells[2].split_once("Vs")?;

    let mut parts = cells[1].split('/').map(str::trim);
    let case_type = parts.next().unwrap_or_default().to_string();
    let case_number = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
    let filing_year = parts.next().filter(|p| !p.is_empty()).map(str::to_string);

    Some(CaseRow {
        case_type,
        case_number,
        filing_year,
        petitioner_text: petitioner.trim().to_string(),
        respondent_text: respondent.trim().to_string(),
    })
}

/// All text under an element, whitespace runs collapsed to single spaces.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
