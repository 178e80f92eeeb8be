// =============================================================================
// config.rs - THE KNOBS
// =============================================================================
//
// Every tunable lives here and every one of them can be overridden with an
// `ECOURTS_SLEUTH_*` environment variable (or a `.env` file, for people who
// like their secrets in plain text next to the source code).
//
// Two budgets are deliberately NOT knobs: the query is resubmitted exactly once
// after a session refresh, never more. A misconfigured query against a portal
// that answers 200 to everything would otherwise loop until the heat death of
// the universe.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // PORTAL ENDPOINTS
    // =========================================================================
    /// Party-name search application root. Session GET lands here; the
    /// CAPTCHA and search endpoints hang off it as `?p=casestatus/...`.
    pub portal_base_url: String,

    /// Scheme + host used to resolve the CAPTCHA image path and as the
    /// `Origin`/`Referer` the portal expects on XHR posts.
    pub portal_origin: String,

    pub user_agent: String,

    // =========================================================================
    // TIMEOUTS AND BUDGETS
    // =========================================================================
    /// Per-request timeout on every HTTP call.
    pub http_timeout: Duration,

    /// External timeout wrapped around one whole lookup run.
    pub run_timeout: Duration,

    /// CAPTCHA challenges fetched before giving up on a session. Default: 5.
    pub captcha_max_attempts: u32,

    /// Independent party lookups allowed in flight at once.
    pub max_parallel_runs: usize,

    // =========================================================================
    // CIRCUIT BREAKER (session acquisition)
    // =========================================================================
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_reset_timeout: Duration,
    pub circuit_breaker_success_threshold: u32,

    // =========================================================================
    // COLLABORATORS
    // =========================================================================
    pub tesseract_bin: String,

    /// OpenAI-compatible chat-completions endpoint for fraud classification.
    pub llm_endpoint: String,
    pub llm_api_key: String,
    pub llm_model: String,

    /// JSON array of previously scraped `CaseDetails` records.
    pub case_store_path: PathBuf,

    // =========================================================================
    // LOGGING
    // =========================================================================
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Config {
            portal_base_url: env_or_default(
                "ECOURTS_SLEUTH_PORTAL_BASE_URL",
                "https://services.ecourts.gov.in/ecourtindia_v6/",
            ),
            portal_origin: env_or_default(
                "ECOURTS_SLEUTH_PORTAL_ORIGIN",
                "https://services.ecourts.gov.in",
            ),
            // The portal serves a different (and worse) page to anything that
            // doesn't look like a desktop Chrome.
            user_agent: env_or_default(
                "ECOURTS_SLEUTH_USER_AGENT",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/95.0.4638.54 Safari/537.36",
            ),

            http_timeout: Duration::from_secs(parse_or("ECOURTS_SLEUTH_HTTP_TIMEOUT_SECS", 20)),
            run_timeout: Duration::from_secs(parse_or("ECOURTS_SLEUTH_RUN_TIMEOUT_SECS", 120)),
            captcha_max_attempts: parse_or("ECOURTS_SLEUTH_CAPTCHA_MAX_ATTEMPTS", 5),
            max_parallel_runs: parse_or("ECOURTS_SLEUTH_MAX_PARALLEL_RUNS", 4),

            circuit_breaker_failure_threshold: parse_or("ECOURTS_SLEUTH_CB_FAILURE_THRESHOLD", 3),
            circuit_breaker_reset_timeout: Duration::from_secs(parse_or(
                "ECOURTS_SLEUTH_CB_RESET_TIMEOUT_SECS",
                60,
            )),
            circuit_breaker_success_threshold: parse_or("ECOURTS_SLEUTH_CB_SUCCESS_THRESHOLD", 1),

            tesseract_bin: env_or_default("ECOURTS_SLEUTH_TESSERACT_BIN", "tesseract"),

            llm_endpoint: env_or_default(
                "ECOURTS_SLEUTH_LLM_ENDPOINT",
                "https://cloud.olakrutrim.com/v1/chat/completions",
            ),
            llm_api_key: env_or_default("ECOURTS_SLEUTH_LLM_API_KEY", ""),
            llm_model: env_or_default("ECOURTS_SLEUTH_LLM_MODEL", "Gemma-2-27B-IT"),

            case_store_path: PathBuf::from(env_or_default(
                "ECOURTS_SLEUTH_CASE_STORE_PATH",
                "case_details.json",
            )),

            log_json: parse_bool(&env_or_default("ECOURTS_SLEUTH_LOG_JSON", "false")),
        }
    }
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an env var, falling back to `default` when it is missing or
/// garbage.
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
