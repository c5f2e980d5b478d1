use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::error;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::dispatcher::ProbeResult;
use crate::payload::Payload;

const SEPARATOR: &str = "==================================================";

fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn render_payload(payload: &Payload) -> String {
    serde_json::to_string_pretty(&Value::Object(payload.clone()))
        .unwrap_or_else(|_| "{}".to_string())
}

fn render_headers(headers: &[(String, String)]) -> String {
    let map: Map<String, Value> = headers
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    serde_json::to_string(&Value::Object(map)).unwrap_or_else(|_| "{}".to_string())
}

/// Run-wide counters and sets shared by every worker. All access is atomic
/// or serialized; nothing here can lose updates under concurrency.
#[derive(Debug, Default)]
pub struct RunStats {
    total: AtomicU64,
    successes: AtomicU64,
    accepted_codes: Mutex<HashSet<String>>,
    successful_endpoints: Mutex<HashSet<String>>,
}

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accept_code(&self, code: &str) -> bool {
        locked(&self.accepted_codes).insert(code.to_string())
    }

    pub fn note_endpoint(&self, url: &str) {
        locked(&self.successful_endpoints).insert(url.to_string());
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RunSummary {
        let mut accepted_codes: Vec<String> =
            locked(&self.accepted_codes).iter().cloned().collect();
        accepted_codes.sort();
        let mut successful_endpoints: Vec<String> =
            locked(&self.successful_endpoints).iter().cloned().collect();
        successful_endpoints.sort();
        RunSummary {
            total: self.total(),
            successes: self.successes(),
            accepted_codes,
            successful_endpoints,
        }
    }
}

/// Read once at the end of the run for the final report.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub total: u64,
    pub successes: u64,
    pub accepted_codes: Vec<String>,
    pub successful_endpoints: Vec<String>,
}

impl RunSummary {
    pub fn hit_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.successes as f64 / self.total as f64 * 100.0
    }
}

/// Write-once, append-only finding entries, timestamped at write time.
#[derive(Clone, Debug)]
pub enum FindingRecord {
    InterestingResponse {
        url: String,
        status: u16,
        headers: Vec<(String, String)>,
        payload: Payload,
        body_snippet: String,
    },
    SuccessfulActivation {
        url: String,
        code: String,
        payload: Payload,
        body_snippet: String,
    },
    ApiStructureSample {
        url: String,
        structure: Value,
        sample: Value,
    },
}

impl FindingRecord {
    pub fn interesting(url: &str, payload: &Payload, result: &ProbeResult) -> Self {
        Self::InterestingResponse {
            url: url.to_string(),
            status: result.status,
            headers: result.headers.clone(),
            payload: payload.clone(),
            body_snippet: result.body_snippet.clone(),
        }
    }

    pub fn activation(url: &str, code: &str, payload: &Payload, result: &ProbeResult) -> Self {
        Self::SuccessfulActivation {
            url: url.to_string(),
            code: code.to_string(),
            payload: payload.clone(),
            body_snippet: result.body_snippet.clone(),
        }
    }

    pub fn structure(url: &str, structure: Value, sample: &Value) -> Self {
        Self::ApiStructureSample {
            url: url.to_string(),
            structure,
            sample: sample.clone(),
        }
    }
}

#[derive(Serialize)]
struct StructureLine<'a> {
    url: &'a str,
    timestamp: String,
    method: &'static str,
    structure: &'a Value,
    sample_response: &'a Value,
}

fn render_record(record: &FindingRecord) -> String {
    match record {
        FindingRecord::InterestingResponse {
            url,
            status,
            headers,
            payload,
            body_snippet,
        } => format!(
            "\n{SEPARATOR}\nTimestamp: {}\nURL: {url}\nMethod: POST\nStatus Code: {status}\n\
             Headers: {}\nPayload: {}\nResponse: {body_snippet}\n",
            now_stamp(),
            render_headers(headers),
            render_payload(payload),
        ),
        FindingRecord::SuccessfulActivation {
            url,
            code,
            payload,
            body_snippet,
        } => format!(
            "\n{SEPARATOR}\nTimestamp: {}\nURL: {url}\nActivation Code: {code}\n\
             Payload: {}\nResponse: {body_snippet}\n",
            now_stamp(),
            render_payload(payload),
        ),
        FindingRecord::ApiStructureSample {
            url,
            structure,
            sample,
        } => {
            let line = StructureLine {
                url,
                timestamp: now_stamp(),
                method: "POST",
                structure,
                sample_response: sample,
            };
            let mut out = serde_json::to_string(&line).unwrap_or_else(|_| "{}".to_string());
            out.push('\n');
            out
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open findings artifact '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct ArtifactPaths {
    pub interesting: PathBuf,
    pub activations: PathBuf,
    pub structures: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            interesting: PathBuf::from("interesting_endpoints.txt"),
            activations: PathBuf::from("successful_activations.txt"),
            structures: PathBuf::from("api_structures.json"),
        }
    }
}

/// Append-only stores for the three finding artifacts. Writes to one
/// destination are serialized behind its own lock so concurrent workers can
/// never interleave records.
pub struct FindingsStore {
    interesting: tokio::sync::Mutex<File>,
    activations: tokio::sync::Mutex<File>,
    structures: tokio::sync::Mutex<File>,
}

async fn open_append(path: &Path) -> Result<File, StoreError> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            source: e,
        })
}

impl FindingsStore {
    pub async fn open(paths: &ArtifactPaths) -> Result<Self, StoreError> {
        Ok(Self {
            interesting: tokio::sync::Mutex::new(open_append(&paths.interesting).await?),
            activations: tokio::sync::Mutex::new(open_append(&paths.activations).await?),
            structures: tokio::sync::Mutex::new(open_append(&paths.structures).await?),
        })
    }

    /// Appends one record to its artifact. I/O errors are logged and the
    /// finding is dropped; probing continues.
    pub async fn record(&self, record: &FindingRecord) {
        let rendered = render_record(record);
        let file = match record {
            FindingRecord::InterestingResponse { .. } => &self.interesting,
            FindingRecord::SuccessfulActivation { .. } => &self.activations,
            FindingRecord::ApiStructureSample { .. } => &self.structures,
        };
        let mut file = file.lock().await;
        if let Err(e) = file.write_all(rendered.as_bytes()).await {
            error!("failed to persist finding: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_snapshot_sorts_and_dedupes() {
        let stats = RunStats::new();
        stats.record_attempt();
        stats.record_attempt();
        stats.record_success();
        assert!(stats.accept_code("B-2"));
        assert!(stats.accept_code("A-1"));
        assert!(!stats.accept_code("A-1"));
        stats.note_endpoint("http://t/api/b");
        stats.note_endpoint("http://t/api/a");
        stats.note_endpoint("http://t/api/a");

        let summary = stats.snapshot();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.accepted_codes, vec!["A-1", "B-2"]);
        assert_eq!(
            summary.successful_endpoints,
            vec!["http://t/api/a", "http://t/api/b"]
        );
        assert!((summary.hit_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hit_rate_of_empty_run_is_zero() {
        let summary = RunStats::new().snapshot();
        assert_eq!(summary.hit_rate(), 0.0);
    }

    #[test]
    fn structure_record_renders_one_json_line() {
        let record = FindingRecord::structure(
            "http://t/api/status",
            json!({"code": {"type": "number"}}),
            &json!({"code": 0}),
        );
        let rendered = render_record(&record);
        assert!(rendered.ends_with('\n'));
        let parsed: Value = serde_json::from_str(rendered.trim()).unwrap();
        assert_eq!(parsed["url"], "http://t/api/status");
        assert_eq!(parsed["method"], "POST");
        assert_eq!(parsed["structure"]["code"]["type"], "number");
    }

    #[test]
    fn interesting_record_carries_request_and_response() {
        let mut payload = Payload::new();
        payload.insert("code".into(), json!("ABCD"));
        let result = ProbeResult {
            status: 403,
            headers: vec![("server".to_string(), "nginx".to_string())],
            body_snippet: "denied".to_string(),
            json: None,
        };
        let rendered = render_record(&FindingRecord::interesting("http://t/x", &payload, &result));
        assert!(rendered.contains("Status Code: 403"));
        assert!(rendered.contains("\"code\": \"ABCD\""));
        assert!(rendered.contains("Response: denied"));
    }

    #[tokio::test]
    async fn store_appends_records() {
        let dir = std::env::temp_dir().join(format!("apiprobe-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let paths = ArtifactPaths {
            interesting: dir.join("interesting.txt"),
            activations: dir.join("activations.txt"),
            structures: dir.join("structures.json"),
        };
        let store = FindingsStore::open(&paths).await.unwrap();

        let mut payload = Payload::new();
        payload.insert("activation_code".into(), json!("AAAA-1111"));
        let result = ProbeResult {
            status: 200,
            headers: Vec::new(),
            body_snippet: "{\"code\":0}".to_string(),
            json: Some(json!({"code": 0})),
        };
        store
            .record(&FindingRecord::activation(
                "http://t/api/verify",
                "AAAA-1111",
                &payload,
                &result,
            ))
            .await;
        store
            .record(&FindingRecord::activation(
                "http://t/api/verify",
                "BBBB-2222",
                &payload,
                &result,
            ))
            .await;

        let contents = tokio::fs::read_to_string(&paths.activations).await.unwrap();
        assert_eq!(contents.matches("Activation Code:").count(), 2);
        assert!(contents.contains("AAAA-1111"));
        assert!(contents.contains("BBBB-2222"));
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
