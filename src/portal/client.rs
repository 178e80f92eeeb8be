// =============================================================================
// portal/client.rs - THE ACTUAL WIRE
// =============================================================================
//
// `EcourtsPortal` is the reqwest-backed `PortalTransport`. It owns one HTTP
// client (connection pool, timeouts, user agent) and one circuit breaker, and
// both are shared by every parallel run. Sessions are NOT shared: cookies go
// out through a hand-built `Cookie` header from the `Session` value each call
// is given, so the client itself carries no cookie jar and no state that two
// runs could trip over.
//
// The three round-trips are implemented next to the logic they serve:
// `session.rs` (GET), `captcha.rs` (POST + image GET), `submitter.rs` (POST).
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response};
use tracing::info;
use url::Url;

use super::PortalTransport;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::error::{Result, SleuthError};
use crate::models::{QueryRequest, Session};

pub struct EcourtsPortal {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    pub(crate) origin: Url,
    pub(crate) breaker: Arc<CircuitBreaker>,
}

impl EcourtsPortal {
    pub fn new(config: &Config, breaker: Arc<CircuitBreaker>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-GB,en-US;q=0.9,en;q=0.8"),
        );

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        let base_url = Url::parse(&config.portal_base_url)?;
        let origin = Url::parse(&config.portal_origin)?;

        info!(base_url = %base_url, origin = %origin, "Portal client ready");

        Ok(Self {
            http,
            base_url,
            origin,
            breaker,
        })
    }

    /// `base?p=<page>`, the portal's idea of routing.
    pub(crate) fn page_url(&self, page: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(Some(&format!("p={page}")));
        url
    }

    /// POST with the headers the portal's own JavaScript sends. Without the
    /// XHR marker and a same-origin Referer the endpoints answer with the
    /// landing page instead of JSON.
    pub(crate) fn xhr_post(&self, url: Url, session: &Session) -> RequestBuilder {
        self.http
            .post(url)
            .header(header::ACCEPT, "application/json, text/javascript, */*; q=0.01")
            .header("X-Requested-With", "XMLHttpRequest")
            .header(header::ORIGIN, self.origin.as_str().trim_end_matches('/'))
            .header(header::REFERER, self.origin.as_str())
            .header(header::COOKIE, session.cookie_header())
    }
}

#[async_trait]
impl PortalTransport for EcourtsPortal {
    async fn acquire_session(&self) -> Result<Session> {
        self.open_session().await
    }

    async fn fetch_captcha_image(&self, session: &mut Session) -> Result<Vec<u8>> {
        self.fetch_text_captcha(session).await
    }

    async fn submit_party_name(
        &self,
        session: &Session,
        query: &QueryRequest,
        captcha_answer: &str,
    ) -> Result<String> {
        self.post_party_search(session, query, captcha_answer).await
    }
}

/// Turn a non-2xx response into `HttpStatus`; pass everything else through.
pub(crate) fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SleuthError::HttpStatus {
            status,
            url: response.url().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn portal() -> EcourtsPortal {
        let config = Config::from_env();
        let breaker = Arc::new(CircuitBreaker::new("test", 3, Duration::from_secs(60), 1));
        EcourtsPortal::new(&config, breaker).unwrap()
    }

    #[test]
    fn test_page_url_keeps_base_path() {
        let mut config = Config::from_env();
        config.portal_base_url = "https://services.ecourts.gov.in/ecourtindia_v6/".into();
        let breaker = Arc::new(CircuitBreaker::new("test", 3, Duration::from_secs(60), 1));
        let portal = EcourtsPortal::new(&config, breaker).unwrap();

        assert_eq!(
            portal.page_url("casestatus/getCaptcha").as_str(),
            "https://services.ecourts.gov.in/ecourtindia_v6/?p=casestatus/getCaptcha"
        );
    }

    #[test]
    fn test_xhr_post_carries_session_cookies() {
        let portal = portal();
        let session = Session::new("abc", Some("xyz".into()), "tok");
        let request = portal
            .xhr_post(portal.page_url("casestatus/submitPartyName"), &session)
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get(header::COOKIE).unwrap(),
            "PHPSESSID=abc; JSESSION=xyz"
        );
        assert_eq!(request.headers().get("X-Requested-With").unwrap(), "XMLHttpRequest");
    }
}
