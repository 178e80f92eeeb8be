// =============================================================================
// portal/mod.rs - THE FRONT COUNTER
// =============================================================================
//
// Everything that talks to (or interprets) the e-courts portal lives under
// here. One lookup run walks these modules strictly in order:
//
//   session     -> PHPSESSID, JSESSION, app_token
//   captcha     -> image -> OCR -> answer (five tries, then we give up)
//   submitter   -> party-name POST, one session refresh if the portal says no
//   normalizer  -> JSON-or-HTML-or-error -> CaseRow
//
// `judgments` is the odd one out: a parser for the separate judgment-search
// listing, which has its own CAPTCHA flavour (arithmetic) and its own layout.
//
// The HTTP calls sit behind `PortalTransport` so the whole orchestration can be
// exercised against a scripted fake. The real thing is `client::EcourtsPortal`.
// =============================================================================

pub mod captcha;
pub mod client;
pub mod judgments;
pub mod normalizer;
pub mod session;
pub mod submitter;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{QueryRequest, Session};

/// The three portal round-trips a lookup run needs.
#[async_trait]
pub trait PortalTransport: Send + Sync {
    /// Fresh cookies and a fresh token. Fails with `SessionAcquisition` when the
    /// portal is unreachable, says anything but 2xx, or renders no token link.
    async fn acquire_session(&self) -> Result<Session>;

    /// Fetch a CAPTCHA image bound to `session`. The portal rotates the token
    /// on every fetch, so the session is updated in place.
    async fn fetch_captcha_image(&self, session: &mut Session) -> Result<Vec<u8>>;

    /// Post the party-name search and hand back the raw body, untouched.
    async fn submit_party_name(
        &self,
        session: &Session,
        query: &QueryRequest,
        captcha_answer: &str,
    ) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Scripted stand-ins for the portal and the OCR engine.

    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use portable_atomic::{AtomicU32, Ordering};

    use super::PortalTransport;
    use crate::error::{Result, SleuthError};
    use crate::models::{QueryRequest, Session};
    use crate::ocr::OcrEngine;

    /// Hands out numbered sessions and replays queued submission bodies.
    #[derive(Default)]
    pub struct ScriptedPortal {
        pub sessions_acquired: AtomicU32,
        pub captchas_fetched: AtomicU32,
        pub submissions: AtomicU32,
        pub fail_sessions: bool,
        bodies: Mutex<VecDeque<String>>,
        /// Token each submission was sent with, in order.
        pub submitted_tokens: Mutex<Vec<String>>,
    }

    impl ScriptedPortal {
        pub fn with_bodies(bodies: &[&str]) -> Self {
            Self {
                bodies: Mutex::new(bodies.iter().map(|b| b.to_string()).collect()),
                ..Default::default()
            }
        }

        pub fn unreachable() -> Self {
            Self {
                fail_sessions: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PortalTransport for ScriptedPortal {
        async fn acquire_session(&self) -> Result<Session> {
            if self.fail_sessions {
                return Err(SleuthError::SessionAcquisition("portal unreachable".into()));
            }
            let n = self.sessions_acquired.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Session::new(format!("php-{n}"), Some(format!("js-{n}")), format!("token-{n}")))
        }

        async fn fetch_captcha_image(&self, session: &mut Session) -> Result<Vec<u8>> {
            let n = self.captchas_fetched.fetch_add(1, Ordering::SeqCst) + 1;
            session.rotate_token(format!("{}-c{n}", session.csrf_token));
            Ok(vec![n as u8])
        }

        async fn submit_party_name(
            &self,
            session: &Session,
            _query: &QueryRequest,
            _captcha_answer: &str,
        ) -> Result<String> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            self.submitted_tokens.lock().push(session.csrf_token.clone());
            Ok(self
                .bodies
                .lock()
                .pop_front()
                .unwrap_or_else(|| r#"{"errormsg":"out of script"}"#.to_string()))
        }
    }

    /// Returns queued OCR outputs in order, then empty text forever.
    pub struct ScriptedOcr {
        outputs: Mutex<VecDeque<Vec<String>>>,
        pub calls: AtomicU32,
    }

    impl ScriptedOcr {
        pub fn new(outputs: &[&[&str]]) -> Self {
            Self {
                outputs: Mutex::new(
                    outputs
                        .iter()
                        .map(|frags| frags.iter().map(|f| f.to_string()).collect())
                        .collect(),
                ),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(&self, _image: &[u8]) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outputs.lock().pop_front().unwrap_or_default())
        }
    }
}

#[cfg(test)]
pub(crate) mod canned {
    //! A loopback HTTP server that answers each connection with the next
    //! queued response, so the real `EcourtsPortal` round-trips run in tests.

    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use url::Url;

    use super::client::EcourtsPortal;
    use crate::circuit_breaker::CircuitBreaker;

    pub struct CannedResponse {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    impl CannedResponse {
        pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body: body.into(),
            }
        }

        pub fn header(mut self, name: &str, value: &str) -> Self {
            self.headers.push((name.to_string(), value.to_string()));
            self
        }

        fn to_bytes(&self) -> Vec<u8> {
            let mut head = format!(
                "HTTP/1.1 {} Canned\r\nContent-Length: {}\r\nConnection: close\r\n",
                self.status,
                self.body.len()
            );
            for (name, value) in &self.headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");

            let mut bytes = head.into_bytes();
            bytes.extend_from_slice(&self.body);
            bytes
        }
    }

    pub struct CannedServer {
        addr: SocketAddr,
        requests: Arc<Mutex<Vec<String>>>,
        _task: JoinHandle<()>,
    }

    impl CannedServer {
        pub async fn start(responses: Vec<CannedResponse>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));

            let seen = requests.clone();
            let task = tokio::spawn(async move {
                for response in responses {
                    let Ok((mut stream, _)) = listener.accept().await else {
                        return;
                    };
                    let request = read_request(&mut stream).await;
                    seen.lock().push(request);
                    let _ = stream.write_all(&response.to_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });

            Self {
                addr,
                requests,
                _task: task,
            }
        }

        /// Every request received so far, head and body, lowercased.
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }

        pub fn portal(&self) -> EcourtsPortal {
            portal_at(self.addr)
        }
    }

    /// A portal client pointed at `addr`, with no proxy in the way.
    pub fn portal_at(addr: SocketAddr) -> EcourtsPortal {
        EcourtsPortal {
            http: reqwest::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            base_url: Url::parse(&format!("http://{addr}/ecourtindia_v6/")).unwrap(),
            origin: Url::parse(&format!("http://{addr}/")).unwrap(),
            breaker: Arc::new(CircuitBreaker::new("canned", 3, Duration::from_secs(60), 1)),
        }
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            if let Some(end) = find_head_end(&buf) {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }

        String::from_utf8_lossy(&buf).to_lowercase()
    }

    fn find_head_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }
}
