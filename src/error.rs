// =============================================================================
// error.rs - EVERY WAY THE PORTAL CAN SAY NO
// =============================================================================
//
// The e-courts portal answers HTTP 200 to almost everything, including
// "your token is stale", "your CAPTCHA is wrong" and "who are you again?".
// This enum is where those polite refusals become typed outcomes the caller
// can actually match on.
//
// The first five variants are the pipeline's own taxonomy. The rest are the
// plumbing underneath it (network, JSON, OCR, LLM, the case store).
// =============================================================================

use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, SleuthError>;

#[derive(Debug, thiserror::Error)]
pub enum SleuthError {
    /// Token or cookie extraction failed. Fatal to the run.
    #[error("session acquisition failed: {0}")]
    SessionAcquisition(String),

    /// OCR or expression parsing kept failing past the retry budget.
    #[error("captcha still unsolved after {attempts} attempts")]
    CaptchaExhausted { attempts: u32 },

    /// OCR text had no `<int> <op> <int>` in it. Means "fetch another challenge".
    #[error("no arithmetic expression found in captcha text {text:?}")]
    UnrecognizedExpression { text: String },

    /// OCR came back empty. Also means "fetch another challenge".
    #[error("captcha OCR produced no text")]
    EmptyCaptchaText,

    /// The challenge envelope had no image we could download.
    #[error("captcha challenge unavailable: {0}")]
    CaptchaUnavailable(String),

    /// The rejection marker survived one full session refresh.
    #[error("portal rejected the party search twice; gave up after one session refresh")]
    QuerySubmissionFailed,

    /// The result shape was unrecognized or the results fragment was missing.
    #[error("no party data: {0}")]
    NoPartyData(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ocr error: {0}")]
    Ocr(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("case store error: {0}")]
    Store(String),
}

impl SleuthError {
    /// True for the soft CAPTCHA failures that should trigger a fresh challenge
    /// instead of ending the run.
    pub fn is_retryable_captcha(&self) -> bool {
        matches!(
            self,
            SleuthError::EmptyCaptchaText | SleuthError::UnrecognizedExpression { .. }
        )
    }

    /// Short machine-friendly label, used in run reports and metrics logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SleuthError::SessionAcquisition(_) => "session_acquisition",
            SleuthError::CaptchaExhausted { .. } => "captcha_exhausted",
            SleuthError::UnrecognizedExpression { .. } => "unrecognized_expression",
            SleuthError::EmptyCaptchaText => "empty_captcha_text",
            SleuthError::CaptchaUnavailable(_) => "captcha_unavailable",
            SleuthError::QuerySubmissionFailed => "query_submission_failed",
            SleuthError::NoPartyData(_) => "no_party_data",
            SleuthError::Http(_) | SleuthError::HttpStatus { .. } => "http",
            SleuthError::Url(_) => "url",
            SleuthError::Json(_) => "json",
            SleuthError::Io(_) => "io",
            SleuthError::Ocr(_) => "ocr",
            SleuthError::Llm(_) => "llm",
            SleuthError::Store(_) => "store",
        }
    }
}
