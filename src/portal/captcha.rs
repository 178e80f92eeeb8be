// =============================================================================
// portal/captcha.rs - PROVING WE ARE NOT A ROBOT (WE ARE A ROBOT)
// =============================================================================
//
// Two CAPTCHA flavours, one retry loop:
//
//   text        party-name search. Whatever OCR reads, joined with spaces, is
//               the answer. Nobody can check it until the portal does.
//   arithmetic  judgment search. OCR reads "12 + 7", we answer 19. `x` means
//               multiply and `/` means floor division.
//
// OCR returning nothing, or text with no `<int> <op> <int>` in it, is not a
// failure. It means "fetch another challenge". Five of those in a row is a
// failure (`CaptchaExhausted`). Anything else (network, OCR engine crash)
// ends the run immediately.
// =============================================================================

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};

use super::client::{ensure_success, EcourtsPortal};
use super::PortalTransport;
use crate::error::{Result, SleuthError};
use crate::metrics::RunMetrics;
use crate::models::{CaptchaChallenge, Session};
use crate::ocr::OcrEngine;

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*([+*/xX-])\s*(\d+)").expect("arithmetic captcha pattern compiles")
});

static CAPTCHA_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img#captcha_image").expect("captcha image selector is valid CSS"));

// =============================================================================
// Interpreting OCR output
// =============================================================================

/// Text CAPTCHA answer: every fragment, in detection order, joined by a space.
pub fn solve_text_captcha(fragments: &[String]) -> Result<String> {
    let text = fragments.join(" ").trim().to_string();
    if text.is_empty() {
        return Err(SleuthError::EmptyCaptchaText);
    }
    Ok(text)
}

/// Evaluate the first `<int> <op> <int>` found in `text`.
pub fn evaluate_expression(text: &str) -> Result<i64> {
    if text.trim().is_empty() {
        return Err(SleuthError::EmptyCaptchaText);
    }

    let unrecognized = || SleuthError::UnrecognizedExpression {
        text: text.to_string(),
    };

    let caps = EXPRESSION.captures(text).ok_or_else(unrecognized)?;
    let lhs: i64 = caps[1].parse().map_err(|_| unrecognized())?;
    let rhs: i64 = caps[3].parse().map_err(|_| unrecognized())?;

    let value = match &caps[2] {
        "+" => lhs.checked_add(rhs),
        "-" => lhs.checked_sub(rhs),
        "*" | "x" | "X" => lhs.checked_mul(rhs),
        "/" => lhs.checked_div_euclid(rhs),
        _ => None,
    };

    value.ok_or_else(unrecognized)
}

// =============================================================================
// Where challenges come from
// =============================================================================

/// A supply of fresh CAPTCHA images. Each call must hand out a new challenge;
/// reusing an old image would make the retry loop pointless.
#[async_trait]
pub trait ChallengeSource: Send {
    async fn next_challenge(&mut self) -> Result<CaptchaChallenge>;
}

/// Challenges fetched from the portal for one session. Every fetch rotates the
/// session's token.
pub struct PortalChallenges<'a> {
    portal: &'a dyn PortalTransport,
    session: &'a mut Session,
}

impl<'a> PortalChallenges<'a> {
    pub fn new(portal: &'a dyn PortalTransport, session: &'a mut Session) -> Self {
        Self { portal, session }
    }
}

#[async_trait]
impl<'a> ChallengeSource for PortalChallenges<'a> {
    async fn next_challenge(&mut self) -> Result<CaptchaChallenge> {
        let bytes = self.portal.fetch_captcha_image(&mut *self.session).await?;
        Ok(CaptchaChallenge::new(bytes))
    }
}

/// One image, handed out again on every call. For solving a saved CAPTCHA
/// from the command line; retries only make sense with a nondeterministic OCR.
pub struct FixedChallenge(pub Vec<u8>);

#[async_trait]
impl ChallengeSource for FixedChallenge {
    async fn next_challenge(&mut self) -> Result<CaptchaChallenge> {
        Ok(CaptchaChallenge::new(self.0.clone()))
    }
}

// =============================================================================
// The retry loop
// =============================================================================

pub struct CaptchaSolver<'a> {
    ocr: &'a dyn OcrEngine,
    max_attempts: u32,
    metrics: &'a RunMetrics,
}

impl<'a> CaptchaSolver<'a> {
    pub fn new(ocr: &'a dyn OcrEngine, max_attempts: u32, metrics: &'a RunMetrics) -> Self {
        Self {
            ocr,
            max_attempts: max_attempts.max(1),
            metrics,
        }
    }

    /// Solve a text CAPTCHA and return the answer to submit.
    pub async fn solve_text(&self, source: &mut dyn ChallengeSource) -> Result<String> {
        let challenge = self.solve_with(source, solve_text_captcha).await?;
        Ok(challenge.solved_text.unwrap_or_default())
    }

    /// Solve an arithmetic CAPTCHA and return the evaluated result.
    pub async fn solve_arithmetic(&self, source: &mut dyn ChallengeSource) -> Result<i64> {
        let challenge = self
            .solve_with(source, |fragments| {
                evaluate_expression(&fragments.join(" ")).map(|n| n.to_string())
            })
            .await?;

        let answer = challenge.solved_text.unwrap_or_default();
        answer.parse().map_err(|_| SleuthError::UnrecognizedExpression { text: answer })
    }

    async fn solve_with<F>(&self, source: &mut dyn ChallengeSource, interpret: F) -> Result<CaptchaChallenge>
    where
        F: Fn(&[String]) -> Result<String> + Send + Sync,
    {
        for attempt in 1..=self.max_attempts {
            let mut challenge = source.next_challenge().await?;
            self.metrics.increment_captcha_attempts();

            let fragments = self.ocr.recognize(&challenge.image_bytes).await?;

            match interpret(&fragments) {
                Ok(answer) => {
                    debug!(attempt, answer = %answer, "CAPTCHA solved");
                    challenge.record_solution(answer);
                    return Ok(challenge);
                }
                Err(e) if e.is_retryable_captcha() => {
                    self.metrics.increment_captcha_rejections();
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        reason = %e,
                        "CAPTCHA unreadable, fetching a fresh one"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(SleuthError::CaptchaExhausted {
            attempts: self.max_attempts,
        })
    }
}

// =============================================================================
// Portal round-trip
// =============================================================================

#[derive(Debug, Deserialize)]
struct CaptchaEnvelope {
    #[serde(default)]
    app_token: Option<String>,
    #[serde(default)]
    div_captcha: Option<String>,
}

/// `src` of the CAPTCHA `<img>` inside the envelope's HTML fragment.
pub fn captcha_image_src(fragment: &str) -> Option<String> {
    let html = Html::parse_fragment(fragment);
    html.select(&CAPTCHA_IMAGE)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
}

impl EcourtsPortal {
    /// POST `getCaptcha`, rotate the token, then GET the image it points at.
    pub(crate) async fn fetch_text_captcha(&self, session: &mut Session) -> Result<Vec<u8>> {
        let response = self
            .xhr_post(self.page_url("casestatus/getCaptcha"), session)
            .form(&[("ajax_req", "true"), ("app_token", session.csrf_token.as_str())])
            .send()
            .await?;

        let envelope: CaptchaEnvelope = serde_json::from_str(&ensure_success(response)?.text().await?)?;

        match envelope.app_token.filter(|t| !t.is_empty()) {
            Some(token) => session.rotate_token(token),
            None => warn!("CAPTCHA envelope carried no app_token, keeping the previous one"),
        }

        let src = envelope
            .div_captcha
            .as_deref()
            .and_then(captcha_image_src)
            .ok_or_else(|| SleuthError::CaptchaUnavailable("no captcha_image in div_captcha".into()))?;

        let image_url = self.origin.join(&src)?;
        debug!(url = %image_url, "Downloading CAPTCHA image");

        let image = self
            .http
            .get(image_url)
            .header(reqwest::header::COOKIE, session.cookie_header())
            .send()
            .await?;

        Ok(ensure_success(image)?.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::canned::{CannedResponse, CannedServer};
    use crate::portal::fakes::{ScriptedOcr, ScriptedPortal};

    #[test]
    fn test_arithmetic_examples() {
        assert_eq!(evaluate_expression("12 + 7").unwrap(), 19);
        assert_eq!(evaluate_expression("9 x 3").unwrap(), 27);
        assert_eq!(evaluate_expression("20 / 3").unwrap(), 6);
        assert_eq!(evaluate_expression("4-9").unwrap(), -5);
        assert_eq!(evaluate_expression("noise 6*7 = ?").unwrap(), 42);
    }

    #[test]
    fn test_unparseable_expression_is_a_retry_signal() {
        let err = evaluate_expression("hello").unwrap_err();
        assert!(matches!(err, SleuthError::UnrecognizedExpression { .. }));
        assert!(err.is_retryable_captcha());

        assert!(evaluate_expression("8 / 0").unwrap_err().is_retryable_captcha());
        assert!(matches!(evaluate_expression("  ").unwrap_err(), SleuthError::EmptyCaptchaText));
    }

    #[test]
    fn test_text_captcha_joins_fragments_in_order() {
        let fragments = vec!["ab".to_string(), "c9 ".to_string()];
        assert_eq!(solve_text_captcha(&fragments).unwrap(), "ab c9");
        assert!(matches!(solve_text_captcha(&[]).unwrap_err(), SleuthError::EmptyCaptchaText));
    }

    #[test]
    fn test_captcha_image_src_from_envelope_fragment() {
        let fragment = r#"<div><img id="captcha_image" src="/ecourtindia_v6/vendor/securimage/securimage_show.php?1"></div>"#;
        assert_eq!(
            captcha_image_src(fragment).as_deref(),
            Some("/ecourtindia_v6/vendor/securimage/securimage_show.php?1")
        );
        assert!(captcha_image_src("<div>no image</div>").is_none());
    }

    #[tokio::test]
    async fn test_solver_retries_until_readable() {
        let portal = ScriptedPortal::default();
        let ocr = ScriptedOcr::new(&[&[], &["???"], &["12 + 7"]]);
        let metrics = RunMetrics::new();
        let solver = CaptchaSolver::new(&ocr, 5, &metrics);

        let mut session = Session::new("p", None, "t");
        let mut source = PortalChallenges::new(&portal, &mut session);
        let answer = solver.solve_arithmetic(&mut source).await.unwrap();

        assert_eq!(answer, 19);
        let snap = metrics.snapshot();
        assert_eq!(snap.captcha_attempts, 3);
        assert_eq!(snap.captcha_rejections, 2);
        assert_eq!(session.csrf_token, "t-c1-c2-c3");
    }

    #[tokio::test]
    async fn test_solver_gives_up_after_budget() {
        let ocr = ScriptedOcr::new(&[]);
        let metrics = RunMetrics::new();
        let solver = CaptchaSolver::new(&ocr, 5, &metrics);

        let err = solver.solve_text(&mut FixedChallenge(vec![0])).await.unwrap_err();

        assert!(matches!(err, SleuthError::CaptchaExhausted { attempts: 5 }));
        assert_eq!(ocr.calls.load(portable_atomic::Ordering::SeqCst), 5);
    }

    const ENVELOPE: &str = r#"{"app_token":"tok2","div_captcha":"<img id=\"captcha_image\" src=\"/ecourtindia_v6/vendor/securimage/securimage_show.php?6a1f\">"}"#;

    #[tokio::test]
    async fn test_captcha_round_trip_rotates_token_and_sends_cookies() {
        let server = CannedServer::start(vec![
            CannedResponse::new(200, ENVELOPE).header("Content-Type", "application/json"),
            CannedResponse::new(200, &b"PNGDATA"[..]).header("Content-Type", "image/png"),
        ])
        .await;
        let mut session = Session::new("php1", Some("js1".into()), "tok1");

        let image = server.portal().fetch_text_captcha(&mut session).await.unwrap();

        assert_eq!(image, b"PNGDATA");
        assert_eq!(session.csrf_token, "tok2");

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("post /ecourtindia_v6/?p=casestatus/getcaptcha "));
        assert!(requests[0].contains("x-requested-with: xmlhttprequest"));
        assert!(requests[0].contains("cookie: phpsessid=php1; jsession=js1"));
        assert!(requests[0].ends_with("ajax_req=true&app_token=tok1"));
        assert!(requests[1].starts_with("get /ecourtindia_v6/vendor/securimage/securimage_show.php?6a1f "));
        assert!(requests[1].contains("cookie: phpsessid=php1; jsession=js1"));
    }

    #[tokio::test]
    async fn test_envelope_without_image_is_unavailable() {
        let server = CannedServer::start(vec![CannedResponse::new(
            200,
            r#"{"app_token":"tok2","div_captcha":"<p>maintenance</p>"}"#,
        )])
        .await;
        let mut session = Session::new("php1", None, "tok1");

        let err = server.portal().fetch_text_captcha(&mut session).await.unwrap_err();

        assert!(matches!(err, SleuthError::CaptchaUnavailable(_)), "got {err:?}");
        assert_eq!(session.csrf_token, "tok2");
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_envelope_without_token_keeps_the_old_one() {
        let server = CannedServer::start(vec![
            CannedResponse::new(200, r#"{"div_captcha":"<img id='captcha_image' src='/img.png'>"}"#),
            CannedResponse::new(200, &b"X"[..]),
        ])
        .await;
        let mut session = Session::new("php1", None, "tok1");

        server.portal().fetch_text_captcha(&mut session).await.unwrap();

        assert_eq!(session.csrf_token, "tok1");
        assert!(server.requests()[1].starts_with("get /img.png "));
    }
}

