// =============================================================================
// portal/submitter.rs - ASKING THE QUESTION (AT MOST TWICE)
// =============================================================================
//
// One party-name search, start to finish:
//
//   acquire session -> solve CAPTCHA -> POST -> classify body
//
// If the body carries the rejection marker, the session is spent. We throw it
// away, run the whole acquire/solve sequence again, and resubmit exactly once.
// A second rejection is `QuerySubmissionFailed`. There is no third attempt: a
// query the portal hates twice is a query the portal will hate forever.
// =============================================================================

use chrono::Utc;
use tracing::{debug, info, warn};

use super::captcha::{CaptchaSolver, PortalChallenges};
use super::client::{ensure_success, EcourtsPortal};
use super::normalizer::classify_response;
use super::PortalTransport;
use crate::error::{Result, SleuthError};
use crate::metrics::RunMetrics;
use crate::models::{QueryRequest, QueryResult, Session};

/// Form body of the party-name search, field names as the portal spells them.
pub fn party_search_form(
    query: &QueryRequest,
    session: &Session,
    captcha_answer: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("petres_name", query.party_name.clone()),
        ("rgyearP", query.registration_year.to_string()),
        ("case_status", query.case_status.as_form_value().to_string()),
        ("fcaptcha_code", captcha_answer.to_string()),
        ("state_code", query.state_code.clone()),
        ("dist_code", query.district_code.clone()),
        ("court_complex_code", query.court_complex_code.clone()),
        ("app_token", session.csrf_token.clone()),
        ("ajax_req", "true".to_string()),
        ("est_code", "null".to_string()),
    ]
}

impl EcourtsPortal {
    pub(crate) async fn post_party_search(
        &self,
        session: &Session,
        query: &QueryRequest,
        captcha_answer: &str,
    ) -> Result<String> {
        let response = self
            .xhr_post(self.page_url("casestatus/submitPartyName"), session)
            .form(&party_search_form(query, session, captcha_answer))
            .send()
            .await?;

        Ok(ensure_success(response)?.text().await?)
    }
}

pub struct QuerySubmitter<'a> {
    portal: &'a dyn PortalTransport,
    solver: CaptchaSolver<'a>,
    metrics: &'a RunMetrics,
}

impl<'a> QuerySubmitter<'a> {
    pub fn new(portal: &'a dyn PortalTransport, solver: CaptchaSolver<'a>, metrics: &'a RunMetrics) -> Self {
        Self {
            portal,
            solver,
            metrics,
        }
    }

    /// Fresh session, solved CAPTCHA, one query with at most one replay.
    pub async fn run(&self, query: &QueryRequest) -> Result<QueryResult> {
        let (session, answer) = self.prepare().await?;
        self.submit(query, session, &answer).await
    }

    /// Acquire a session and solve its text CAPTCHA. The returned session
    /// already carries the token rotated by the CAPTCHA fetch.
    pub async fn prepare(&self) -> Result<(Session, String)> {
        let mut session = self
            .portal
            .acquire_session()
            .await
            .inspect_err(|_| self.metrics.increment_session_failures())?;
        self.metrics.increment_sessions_acquired();

        let answer = {
            let mut challenges = PortalChallenges::new(self.portal, &mut session);
            self.solver.solve_text(&mut challenges).await?
        };

        Ok((session, answer))
    }

    /// Submit with the given session. On a rejection the session is
    /// invalidated and the acquire/solve/submit sequence runs exactly once more.
    pub async fn submit(&self, query: &QueryRequest, session: Session, captcha_answer: &str) -> Result<QueryResult> {
        let first = self.send(query, &session, captcha_answer).await?;
        if !first.is_rejection() {
            return Ok(first);
        }

        warn!(party = %query.party_name, "Portal rejected the query, refreshing the session and retrying once");
        session.invalidate();
        self.metrics.increment_query_retries();

        let (fresh, answer) = self.prepare().await?;
        let second = self.send(query, &fresh, &answer).await?;
        if second.is_rejection() {
            fresh.invalidate();
            return Err(SleuthError::QuerySubmissionFailed);
        }

        info!(party = %query.party_name, "Query accepted after session refresh");
        Ok(second)
    }

    async fn send(&self, query: &QueryRequest, session: &Session, captcha_answer: &str) -> Result<QueryResult> {
        self.metrics.increment_query_submissions();
        let body = self
            .portal
            .submit_party_name(session, query, captcha_answer)
            .await?;

        let result = classify_response(&body);
        debug!(
            party = %query.party_name,
            shape = result.shape(),
            body_len = body.len(),
            session_age_ms = (Utc::now() - session.acquired_at).num_milliseconds(),
            "Portal answered"
        );
        Ok(result)
    }
}
