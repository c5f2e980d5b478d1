use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use reqwest::redirect;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;

use crate::catalog::{choose_template, HeaderTemplate};
use crate::payload::Payload;

pub const BODY_SNIPPET_MAX: usize = 1000;
pub const DEFAULT_RETRY_COUNT: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendErrorKind {
    Timeout,
    Connect,
    Other,
}

#[derive(Debug, Error)]
#[error("transport failure ({kind:?})")]
pub struct SendError {
    pub kind: SendErrorKind,
    #[source]
    pub source: Option<reqwest::Error>,
}

impl SendError {
    pub fn from_kind(kind: SendErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<reqwest::Error> for SendError {
    fn from(source: reqwest::Error) -> Self {
        let kind = if source.is_timeout() {
            SendErrorKind::Timeout
        } else if source.is_connect() {
            SendErrorKind::Connect
        } else {
            SendErrorKind::Other
        };
        Self {
            kind,
            source: Some(source),
        }
    }
}

/// One transport-level response. Ephemeral: lives for a single
/// classification pass.
#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body_snippet: String,
    pub json: Option<Value>,
}

pub fn truncate_body(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_MAX {
        return body.to_string();
    }
    let mut end = BODY_SNIPPET_MAX;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("failed to setup proxy '{proxy}': {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    Build {
        #[source]
        source: reqwest::Error,
    },
}

/// Probing client: invalid certificates accepted by design, no redirects,
/// optional proxy, fixed timeout. A missing proxy degrades to a direct
/// connection.
pub fn build_client(
    proxy: Option<&str>,
    timeout_seconds: u64,
) -> Result<reqwest::Client, ClientBuildError> {
    let mut builder = reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .timeout(Duration::from_secs(timeout_seconds))
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);

    if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
        let proxy_url = reqwest::Proxy::all(proxy).map_err(|e| ClientBuildError::ProxySetup {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy_url);
    }

    builder.build().map_err(|e| ClientBuildError::Build { source: e })
}

/// Sends one POST with a randomly chosen header template, restamped per
/// request, and the given payload as the JSON body.
pub async fn send(
    client: &reqwest::Client,
    url: &str,
    payload: &Payload,
    templates: &[HeaderTemplate],
) -> Result<ProbeResult, SendError> {
    let headers = choose_template(templates).stamped();

    debug!("POST {url}");

    let mut request = client.post(url).json(payload);
    for (name, value) in &headers {
        request = request.header(name, value);
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let response_headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response.text().await.unwrap_or_default();
    let json = serde_json::from_str::<Value>(&body).ok();

    Ok(ProbeResult {
        status,
        headers: response_headers,
        body_snippet: truncate_body(&body),
        json,
    })
}

pub fn backoff_for(kind: SendErrorKind, attempt: u32) -> Duration {
    match kind {
        // exponential for timeouts, fixed short delay for everything else
        SendErrorKind::Timeout => Duration::from_secs(1u64 << attempt.min(6)),
        SendErrorKind::Connect | SendErrorKind::Other => Duration::from_secs(1),
    }
}

/// Bounded retry around one transport operation. Any transport-level
/// response ends the loop; retries never fire on unfavorable status codes.
/// Exhaustion returns the last failure for the caller to log and skip.
pub async fn retry_transport<F, Fut>(attempts: u32, mut op: F) -> Result<ProbeResult, SendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ProbeResult, SendError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt + 1 >= attempts.max(1) {
                    return Err(e);
                }
                let backoff = backoff_for(e.kind, attempt);
                warn!(
                    "transport failure on attempt {} ({:?}), backing off {:?}",
                    attempt + 1,
                    e.kind,
                    backoff
                );
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// `send` wrapped in the bounded retry loop.
pub async fn send_with_retry(
    client: &reqwest::Client,
    url: &str,
    payload: &Payload,
    templates: &[HeaderTemplate],
    attempts: u32,
) -> Result<ProbeResult, SendError> {
    retry_transport(attempts, || send(client, url, payload, templates)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_for_timeouts() {
        assert_eq!(backoff_for(SendErrorKind::Timeout, 0).as_secs(), 1);
        assert_eq!(backoff_for(SendErrorKind::Timeout, 1).as_secs(), 2);
        assert_eq!(backoff_for(SendErrorKind::Timeout, 2).as_secs(), 4);
    }

    #[test]
    fn backoff_is_fixed_for_other_failures() {
        assert_eq!(backoff_for(SendErrorKind::Connect, 0).as_secs(), 1);
        assert_eq!(backoff_for(SendErrorKind::Connect, 3).as_secs(), 1);
        assert_eq!(backoff_for(SendErrorKind::Other, 5).as_secs(), 1);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(BODY_SNIPPET_MAX);
        let out = truncate_body(&body);
        assert!(out.len() <= BODY_SNIPPET_MAX);
        assert!(body.starts_with(&out));
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn build_client_without_proxy_succeeds() {
        assert!(build_client(None, 10).is_ok());
        assert!(build_client(Some("  "), 10).is_ok());
    }
}
