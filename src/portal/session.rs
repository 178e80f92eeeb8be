// =============================================================================
// portal/session.rs - GETTING IN THE DOOR
// =============================================================================
//
// The portal hands out three things on the landing page and wants all three
// back on every later call:
//
//   PHPSESSID  -> Set-Cookie, required
//   JSESSION   -> Set-Cookie, optional (the portal forgets it now and then)
//   app_token  -> query parameter on the first navigation link that has one
//
// No token link means no usable session. We say so loudly instead of sending
// `app_token=` and collecting an empty result with a smile.
// =============================================================================

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::client::EcourtsPortal;
use crate::error::{Result, SleuthError};
use crate::models::Session;

static TOKEN_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.nav-link[href*='app_token=']").expect("token link selector is valid CSS")
});

const TOKEN_PARAM: &str = "app_token=";

/// The `app_token` of the first navigation link that carries one.
pub fn extract_app_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let href = document
        .select(&TOKEN_LINK)
        .next()
        .and_then(|link| link.value().attr("href"))?;

    let start = href.find(TOKEN_PARAM)? + TOKEN_PARAM.len();
    let token = href[start..].split('&').next().unwrap_or_default();
    (!token.is_empty()).then(|| token.to_string())
}

/// First PHPSESSID and first JSESSION among the response cookies.
pub fn pick_session_cookies<I>(cookies: I) -> (Option<String>, Option<String>)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut php = None;
    let mut jsession = None;
    for (name, value) in cookies {
        match name.as_str() {
            "PHPSESSID" if php.is_none() => php = Some(value),
            "JSESSION" if jsession.is_none() => jsession = Some(value),
            _ => {}
        }
    }
    (php, jsession)
}

/// Assemble a `Session` from the landing page and its cookies.
pub fn build_session<I>(html: &str, cookies: I) -> Result<Session>
where
    I: IntoIterator<Item = (String, String)>,
{
    let token = extract_app_token(html).ok_or_else(|| {
        SleuthError::SessionAcquisition("no navigation link carries an app_token".into())
    })?;

    let (php, jsession) = pick_session_cookies(cookies);
    let php = php.ok_or_else(|| {
        SleuthError::SessionAcquisition("portal did not set a PHPSESSID cookie".into())
    })?;

    if jsession.is_none() {
        debug!("Portal set no JSESSION cookie; continuing with PHPSESSID only");
    }

    Ok(Session::new(php, jsession, token))
}

impl EcourtsPortal {
    /// Session GET behind the shared circuit breaker.
    pub(crate) async fn open_session(&self) -> Result<Session> {
        if !self.breaker.allow_request() {
            return Err(SleuthError::SessionAcquisition(
                "portal circuit open, skipping session acquisition".into(),
            ));
        }

        match self.fetch_session().await {
            Ok(session) => {
                self.breaker.record_success();
                info!(jsession = session.secondary_session_cookie.is_some(), "Session acquired");
                Ok(session)
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!(error = %e, breaker = %self.breaker.state(), "Session acquisition failed");
                Err(e)
            }
        }
    }

    async fn fetch_session(&self) -> Result<Session> {
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|e| SleuthError::SessionAcquisition(format!("portal unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SleuthError::SessionAcquisition(format!(
                "portal answered {status} on the landing page"
            )));
        }

        let cookies: Vec<(String, String)> = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();

        let html = response
            .text()
            .await
            .map_err(|e| SleuthError::SessionAcquisition(format!("landing page unreadable: {e}")))?;

        build_session(&html, cookies)
    }
}
