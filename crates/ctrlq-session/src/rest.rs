//! REST transport against the Repository service.
//!
//! Every call carries a paired `xrfkey` query parameter and `X-Qlik-Xrfkey`
//! header, the configured auth material, and the retry policy of
//! [`RetryPolicy`]. Responses are surfaced as raw status/headers/bytes;
//! JSON decoding is the caller's concern.

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Certificate, Identity, Method, StatusCode};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{AuthMethod, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::retry::{Idempotency, RetryPolicy};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

/// Request payload. Variants can be replayed on retry: JSON is cloned,
/// files are re-opened per attempt.
#[derive(Debug, Clone)]
pub enum RequestBody {
    None,
    Json(serde_json::Value),
    File { path: PathBuf, content_type: String },
}

/// Raw Repository response.
#[derive(Debug)]
pub struct RestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> SessionResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as lossy UTF-8, for error reporting.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Rate-limited, retrying HTTP client for the Repository.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: SessionConfig,
    base_url: String,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RestClient {
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        let mut builder = reqwest::Client::builder()
            .use_native_tls()
            .timeout(DEFAULT_TIMEOUT);

        match &config.auth {
            AuthMethod::Certificate {
                cert_pem,
                key_pem,
                root_pem,
            } => {
                let identity = Identity::from_pkcs8_pem(cert_pem, key_pem)?;
                let root = Certificate::from_pem(root_pem)?;
                builder = builder.identity(identity).add_root_certificate(root);
            }
            AuthMethod::Bearer(_) => {}
        }

        if !config.secure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let base_url = config.qrs_base_url();
        Ok(Self {
            http: builder.build()?,
            config,
            base_url,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach a cooperative cancellation signal. In-flight backoff sleeps
    /// and pending attempts abort when the token fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> SessionResult<RestResponse> {
        self.request(Method::GET, path, query, RequestBody::None, Idempotency::Idempotent)
            .await
    }

    pub async fn post_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: serde_json::Value,
        idempotency: Idempotency,
    ) -> SessionResult<RestResponse> {
        self.request(Method::POST, path, query, RequestBody::Json(body), idempotency)
            .await
    }

    pub async fn put_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> SessionResult<RestResponse> {
        self.request(
            Method::PUT,
            path,
            &[],
            RequestBody::Json(body),
            Idempotency::NonIdempotent,
        )
        .await
    }

    /// Upload a file, streaming its bytes. The file is re-opened on every
    /// retry attempt so the throttling backoff can replay the upload.
    pub async fn post_file(
        &self,
        path: &str,
        query: &[(&str, String)],
        file: PathBuf,
        content_type: &str,
    ) -> SessionResult<RestResponse> {
        self.request(
            Method::POST,
            path,
            query,
            RequestBody::File {
                path: file,
                content_type: content_type.to_string(),
            },
            Idempotency::Idempotent,
        )
        .await
    }

    /// Issue one REST request with retry per the configured policy.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: RequestBody,
        idempotency: Idempotency,
    ) -> SessionResult<RestResponse> {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            match self.execute_once(&method, path, query, &body).await {
                Ok(response) => {
                    let status = response.status.as_u16();
                    let retriable = self.policy.is_retriable_status(status)
                        && idempotency == Idempotency::Idempotent;
                    if !retriable {
                        return Ok(response);
                    }
                    if attempt >= self.policy.max_retries {
                        return Err(SessionError::RetriesExhausted {
                            attempts: attempt + 1,
                            status,
                        });
                    }
                    let delay = self
                        .policy
                        .backoff(attempt, parse_retry_after(&response.headers));
                    warn!(
                        %method,
                        path,
                        status,
                        delay_ms = delay.as_millis() as u64,
                        "retriable status from repository, backing off"
                    );
                    self.sleep(delay).await?;
                    attempt += 1;
                }
                Err(SessionError::Http(err))
                    if (err.is_connect() || err.is_timeout())
                        && attempt < self.policy.max_retries =>
                {
                    // Connection-level failures never reached the server,
                    // so even non-idempotent calls may be replayed.
                    let delay = self.policy.backoff(attempt, None);
                    warn!(
                        %method,
                        path,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "connection failure, backing off"
                    );
                    self.sleep(delay).await?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: &RequestBody,
    ) -> SessionResult<RestResponse> {
        let xrfkey = generate_xrfkey();
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .query(query)
            .query(&[("xrfkey", xrfkey.as_str())])
            .header("X-Qlik-Xrfkey", &xrfkey);

        request = match &self.config.auth {
            AuthMethod::Certificate { .. } => {
                request.header("X-Qlik-User", self.config.qlik_user_header())
            }
            AuthMethod::Bearer(token) => request.bearer_auth(token),
        };

        request = match body {
            RequestBody::None => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::File { path, content_type } => {
                let file = tokio::fs::File::open(path).await?;
                request
                    .header(CONTENT_TYPE, content_type)
                    .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        debug!(%method, path, status = status.as_u16(), bytes = body.len(), "repository call");

        Ok(RestResponse {
            status,
            headers,
            body,
        })
    }

    async fn sleep(&self, delay: Duration) -> SessionResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
        }
    }
}

/// A 16-character alphanumeric cross-request forgery key. Query parameter
/// and header must be of equal length and value.
fn generate_xrfkey() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrfkey_shape() {
        let key = generate_xrfkey();
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_xrfkey_is_fresh_per_call() {
        assert_ne!(generate_xrfkey(), generate_xrfkey());
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_parse_retry_after_absent_or_date() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }
}
