pub mod structure;

use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;

use crate::dispatcher::ProbeResult;
use crate::findings::{FindingRecord, FindingsStore, RunStats};
use crate::payload::{extract_code, Payload};

pub const INTERESTING_HEADERS: [&str; 6] = [
    "server",
    "x-powered-by",
    "set-cookie",
    "www-authenticate",
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
];

// matched against the lowercased body, so every entry stays lowercase
pub const SENSITIVE_PATTERNS: [&str; 12] = [
    "error:",
    "exception",
    "stack trace",
    "syntax error",
    "undefined",
    "null",
    "nan",
    "forbidden",
    "unauthorized",
    "internal server error",
    "debug",
    "warning",
];

const ACTIVATION_TOKEN_KEYS: [&str; 5] =
    ["token", "access_token", "license", "subscription", "activated"];

fn code_is_zero(data: &Value) -> bool {
    data.get("code").and_then(Value::as_i64) == Some(0)
}

fn status_is_success(data: &Value) -> bool {
    data.get("status").and_then(Value::as_str) == Some("success")
}

fn success_is_true(data: &Value) -> bool {
    data.get("success").and_then(Value::as_bool) == Some(true)
}

/// Fixed disjunction of activation success indicators.
pub fn activation_indicators_hold(data: &Value) -> bool {
    code_is_zero(data)
        || status_is_success(data)
        || success_is_true(data)
        || ACTIVATION_TOKEN_KEYS
            .iter()
            .any(|key| data.get(key).is_some())
}

/// Fixed disjunction of generic JSON success indicators. An absent `error`
/// field counts the same as an explicit null.
pub fn generic_indicators_hold(data: &Value) -> bool {
    if !data.is_object() {
        return false;
    }
    code_is_zero(data)
        || status_is_success(data)
        || success_is_true(data)
        || data.get("token").is_some()
        || data.get("access_token").is_some()
        || data.get("error").map(Value::is_null).unwrap_or(true)
}

pub fn scan_sensitive(body: &str) -> Vec<&'static str> {
    let lowered = body.to_lowercase();
    SENSITIVE_PATTERNS
        .iter()
        .copied()
        .filter(|pattern| lowered.contains(pattern))
        .collect()
}

pub fn interesting_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| INTERESTING_HEADERS.contains(&name.to_lowercase().as_str()))
        .cloned()
        .collect()
}

pub struct Analyzer {
    store: Arc<FindingsStore>,
    stats: Arc<RunStats>,
}

impl Analyzer {
    pub fn new(store: Arc<FindingsStore>, stats: Arc<RunStats>) -> Self {
        Self { store, stats }
    }

    /// Classifies one response. Never fails: decode and persistence problems
    /// are logged and the run continues.
    pub async fn classify(
        &self,
        url: &str,
        payload: &Payload,
        result: &ProbeResult,
        is_activation: bool,
    ) {
        self.stats.record_attempt();
        let mut success = false;

        if result.status != 404 {
            self.store
                .record(&FindingRecord::interesting(url, payload, result))
                .await;
        }

        if is_activation && (200..300).contains(&result.status) {
            if let Some(data) = result.json.as_ref() {
                if activation_indicators_hold(data) {
                    success = true;
                    match extract_code(payload) {
                        Some(code) => {
                            warn!("found working activation code: {code}");
                            self.stats.accept_code(&code);
                            self.store
                                .record(&FindingRecord::activation(url, &code, payload, result))
                                .await;
                        }
                        None => {
                            info!("activation indicators held but payload carries no code: {url}")
                        }
                    }
                }
            }
        }

        let headers = interesting_headers(&result.headers);
        if !headers.is_empty() {
            info!("interesting headers on {url}: {headers:?}");
        }

        match result.json.as_ref() {
            Some(data) => {
                if generic_indicators_hold(data) {
                    success = true;
                    self.stats.note_endpoint(url);
                    self.store
                        .record(&FindingRecord::structure(url, structure::shape_of(data), data))
                        .await;
                } else {
                    // decoded fine but looks like a failure; fall back to
                    // scanning the rendered body for leaked detail
                    self.scan_body(url, &result.body_snippet);
                }
            }
            None => {
                self.scan_body(url, &result.body_snippet);
            }
        }

        if success {
            self.stats.record_success();
        }
    }

    /// Substring scan over the rendered body. Runs when a response yields
    /// no JSON, and also when decoded JSON fails every success indicator.
    /// Returns the matched patterns.
    pub fn scan_body(&self, url: &str, body: &str) -> Vec<&'static str> {
        let hits = scan_sensitive(body);
        if !hits.is_empty() {
            warn!("possible sensitive information in response from {url}: {hits:?}");
        }
        hits
    }
}
