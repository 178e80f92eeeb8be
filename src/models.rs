// =============================================================================
// models.rs - THE PAPERWORK
// =============================================================================
//
// Everything the pipeline passes from one step to the next. The session is an
// explicit value that gets threaded through every call: no process-wide
// cookies, no global token, no "who touched PHPSESSID last" mysteries. Two
// parallel runs hold two sessions and never meet.
//
// Flow, for the record:
//   Session -> CaptchaChallenge -> QueryRequest -> QueryResult -> CaseRow
//           -> CaseTypeFrequency -> HistoryReport
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three pieces of state the portal insists on seeing with every call.
///
/// A session is good for exactly one query context. Once the portal rejects a
/// query, the session is spent: call [`Session::invalidate`] and acquire a new
/// one before fetching another CAPTCHA. A stale token is the classic way to get
/// an empty result with a cheerful HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// `PHPSESSID`
    pub session_id_cookie: String,
    /// `JSESSION`. The portal sometimes forgets to send it.
    pub secondary_session_cookie: Option<String>,
    /// `app_token`, rotated by every CAPTCHA fetch.
    pub csrf_token: String,
    pub acquired_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        session_id_cookie: impl Into<String>,
        secondary_session_cookie: Option<String>,
        csrf_token: impl Into<String>,
    ) -> Self {
        Self {
            session_id_cookie: session_id_cookie.into(),
            secondary_session_cookie,
            csrf_token: csrf_token.into(),
            acquired_at: Utc::now(),
        }
    }

    /// Value for the `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        match &self.secondary_session_cookie {
            Some(jsession) => format!("PHPSESSID={}; JSESSION={}", self.session_id_cookie, jsession),
            None => format!("PHPSESSID={}", self.session_id_cookie),
        }
    }

    /// Replace the token with the one handed back by a CAPTCHA fetch.
    pub fn rotate_token(&mut self, token: impl Into<String>) {
        self.csrf_token = token.into();
    }

    /// Consume the session. Nothing can be sent with it afterwards.
    pub fn invalidate(self) {}
}

/// One CAPTCHA image and, once OCR has had a go at it, the answer we submitted.
/// A new challenge always starts unsolved.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub image_bytes: Vec<u8>,
    pub solved_text: Option<String>,
}

impl CaptchaChallenge {
    pub fn new(image_bytes: Vec<u8>) -> Self {
        Self {
            image_bytes,
            solved_text: None,
        }
    }

    pub fn record_solution(&mut self, text: impl Into<String>) {
        self.solved_text = Some(text.into());
    }
}

/// Case-status filter of the party-name search form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pending,
    Disposed,
    #[default]
    Both,
}

impl CaseStatus {
    /// The exact value the portal's form expects.
    pub fn as_form_value(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "Pending",
            CaseStatus::Disposed => "Disposed",
            CaseStatus::Both => "Both",
        }
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(CaseStatus::Pending),
            "disposed" => Ok(CaseStatus::Disposed),
            "both" => Ok(CaseStatus::Both),
            other => Err(format!("unknown case status {other:?} (expected pending, disposed or both)")),
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_form_value())
    }
}

/// One party-name search. Built once per attempt and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub party_name: String,
    pub registration_year: u16,
    pub case_status: CaseStatus,
    pub state_code: String,
    pub district_code: String,
    pub court_complex_code: String,
}

/// What came back from the party search, sorted into the only three shapes the
/// portal has ever been seen to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// JSON with a `party_data` field holding the results fragment (maybe).
    StructuredPayload { party_data: Option<String> },
    /// A full HTML page; the fragment lives in the `#party_data` element.
    RawHtmlPage { html: String },
    /// The body carried the rejection marker.
    ErrorPayload { body: String },
}

impl QueryResult {
    pub fn is_rejection(&self) -> bool {
        matches!(self, QueryResult::ErrorPayload { .. })
    }

    pub fn shape(&self) -> &'static str {
        match self {
            QueryResult::StructuredPayload { .. } => "structured",
            QueryResult::RawHtmlPage { .. } => "raw_html",
            QueryResult::ErrorPayload { .. } => "error",
        }
    }
}

/// One row of the results table. `petitioner_text` and `respondent_text` are
/// the two halves of a single "X Vs Y" cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRow {
    pub case_type: String,
    pub case_number: Option<String>,
    pub filing_year: Option<String>,
    pub petitioner_text: String,
    pub respondent_text: String,
}

/// Output of the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedResult {
    pub rows: Vec<CaseRow>,
    /// Advisory "Total number of cases: N" label; 0 when absent.
    pub total_count: u32,
    pub skipped_rows: usize,
}

/// Case type -> number of rows where the party was the petitioner.
pub type CaseTypeFrequency = BTreeMap<String, u32>;

/// What a finished litigation-history lookup reports for one party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryReport {
    pub party: String,
    pub total_number_of_cases: u32,
    pub case_type: CaseTypeFrequency,
}

/// A previously scraped litigation record. Written once at scrape time, read
/// many times during cross-referencing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CaseDetails {
    pub case_number: Option<String>,
    pub case_year: Option<String>,
    pub petitioner: Option<String>,
    pub respondent: Option<String>,
    pub unique_case_number: Option<String>,
    pub cnr: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub court_complex: Option<String>,
    pub case_type: Option<String>,
    pub filing_date: Option<String>,
    pub regi_number: Option<String>,
    pub first_hearing_date: Option<String>,
    pub decision_date: Option<String>,
    pub hearing_count: Option<String>,
    pub nature_of_disposal: Option<String>,
    pub court_number_and_judge: Option<String>,
    pub petitioner_advocate: Option<String>,
    pub respondent_advocate: Option<String>,
    pub under_act: Option<String>,
    pub under_section: Option<String>,
    pub incident_details: Option<String>,
    pub claim_amount: Option<String>,
    pub settlement_amount: Option<String>,
    pub interest_rate: Option<String>,
    pub payment_mode: Option<String>,
    pub judge_name: Option<String>,
    pub summary_of_pdf: Option<String>,
}

/// The three match sets of a cross-reference. Each list is always present,
/// possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct CrossReference {
    pub petitioner_matches: Vec<CaseDetails>,
    pub advocate_matches: Vec<CaseDetails>,
    pub common_matches: Vec<CaseDetails>,
}
