use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde_json::json;

use crate::analyzer::Analyzer;
use crate::catalog::{self, Endpoint, ACTIVATION_PATTERNS};
use crate::codegen::CodeGenerator;
use crate::dispatcher::{self, ProbeResult, SendError, SendErrorKind};
use crate::findings::{ArtifactPaths, FindingsStore, RunStats};
use crate::identity::Identity;
use crate::mutation;
use crate::payload::{extract_code, PayloadBuilder};

fn ok_result(status: u16, body: serde_json::Value) -> ProbeResult {
    ProbeResult {
        status,
        headers: Vec::new(),
        body_snippet: body.to_string(),
        json: Some(body),
    }
}

async fn temp_store() -> (FindingsStore, ArtifactPaths, std::path::PathBuf) {
    let dir = std::env::temp_dir().join(format!("apiprobe-it-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let paths = ArtifactPaths {
        interesting: dir.join("interesting.txt"),
        activations: dir.join("activations.txt"),
        structures: dir.join("structures.json"),
    };
    let store = FindingsStore::open(&paths).await.unwrap();
    (store, paths, dir)
}

#[tokio::test(start_paused = true)]
async fn retry_backs_off_exponentially_on_timeouts() {
    let start = tokio::time::Instant::now();
    let calls = AtomicU32::new(0);
    let result = dispatcher::retry_transport(3, || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(SendError::from_kind(SendErrorKind::Timeout))
            } else {
                Ok(ok_result(200, json!({"code": 0})))
            }
        }
    })
    .await;
    assert_eq!(result.unwrap().status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 1s after the first timeout, 2s after the second
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn retry_uses_fixed_backoff_for_connect_failures() {
    let start = tokio::time::Instant::now();
    let result = dispatcher::retry_transport(2, || async {
        Err::<ProbeResult, _>(SendError::from_kind(SendErrorKind::Connect))
    })
    .await;
    let err = result.unwrap_err();
    assert_eq!(err.kind, SendErrorKind::Connect);
    // one backoff between the two attempts, none after exhaustion
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test]
async fn successful_activation_flows_from_payload_to_artifact() {
    let (store, paths, dir) = temp_store().await;
    let stats = Arc::new(RunStats::new());
    let analyzer = Analyzer::new(Arc::new(store), stats.clone());

    let builder = PayloadBuilder::new(Identity::detect(), Arc::new(CodeGenerator::new()));
    let endpoint = Endpoint::activation("/api/activate_member");
    let payload = builder.build_with_pattern(&endpoint, "XXXX-NNNNNN");
    let code = extract_code(&payload).unwrap();

    let url = "http://t.tld:3000/api/activate_member";
    analyzer
        .classify(
            url,
            &payload,
            &ok_result(200, json!({"code": 0, "access_token": "abc"})),
            true,
        )
        .await;

    // one attempt, one success even though both the activation and the
    // generic indicator sets hold
    let summary = stats.snapshot();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.accepted_codes, vec![code.clone()]);
    assert_eq!(summary.successful_endpoints, vec![url.to_string()]);

    let activations = tokio::fs::read_to_string(&paths.activations).await.unwrap();
    assert!(activations.contains(&format!("Activation Code: {code}")));
    let structures = tokio::fs::read_to_string(&paths.structures).await.unwrap();
    assert!(structures.contains("access_token"));
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn generic_success_records_the_response_structure() {
    let (store, paths, dir) = temp_store().await;
    let stats = Arc::new(RunStats::new());
    let analyzer = Analyzer::new(Arc::new(store), stats.clone());

    let builder = PayloadBuilder::new(Identity::detect(), Arc::new(CodeGenerator::new()));
    let payload = builder.build_base(&Endpoint::generic("/api/user/info"));

    let url = "http://t.tld:3000/api/user/info";
    analyzer
        .classify(
            url,
            &payload,
            &ok_result(200, json!({"status": "success", "user": {"id": 7, "name": "x"}})),
            false,
        )
        .await;

    let summary = stats.snapshot();
    assert_eq!(summary.successes, 1);
    assert!(summary.accepted_codes.is_empty());
    assert_eq!(summary.successful_endpoints, vec![url.to_string()]);

    let structures = tokio::fs::read_to_string(&paths.structures).await.unwrap();
    let line: serde_json::Value = serde_json::from_str(structures.trim()).unwrap();
    assert_eq!(line["url"], url);
    assert_eq!(line["structure"]["user"]["id"]["type"], "number");
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn failed_responses_are_interesting_but_never_successes() {
    let (store, paths, dir) = temp_store().await;
    let stats = Arc::new(RunStats::new());
    let analyzer = Analyzer::new(Arc::new(store), stats.clone());

    let builder = PayloadBuilder::new(Identity::detect(), Arc::new(CodeGenerator::new()));
    let payload = builder.build_base(&Endpoint::generic("/api/login"));

    let failing = ok_result(500, json!({"error": "internal server error"}));
    analyzer
        .classify("http://t.tld:3000/api/login", &payload, &failing, false)
        .await;
    analyzer
        .classify(
            "http://t.tld:3000/api/login",
            &payload,
            &ProbeResult {
                status: 404,
                headers: Vec::new(),
                body_snippet: "not found".to_string(),
                json: None,
            },
            false,
        )
        .await;

    let summary = stats.snapshot();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.successes, 0);
    assert!(summary.successful_endpoints.is_empty());

    // the 500 lands in the interesting artifact, the 404 does not
    let interesting = tokio::fs::read_to_string(&paths.interesting).await.unwrap();
    assert_eq!(interesting.matches("Status Code:").count(), 1);
    assert!(interesting.contains("Status Code: 500"));

    // the 500 body decoded fine but failed every indicator, so the
    // sensitive scan covers it too; a narrower reading would scan only
    // bodies that fail to decode as JSON
    let hits = analyzer.scan_body("http://t.tld:3000/api/login", &failing.body_snippet);
    assert!(hits.contains(&"internal server error"));
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[test]
fn mutation_sweep_covers_every_field_of_a_built_payload() {
    let builder = PayloadBuilder::new(Identity::detect(), Arc::new(CodeGenerator::new()));
    let base = builder.build_base(&Endpoint::activation("/api/activate_member"));

    let variants: Vec<_> = mutation::variants(&base).collect();
    assert!(!variants.is_empty());
    for variant in &variants {
        assert_eq!(variant.len(), base.len());
    }
    // the injection probes reach the activation code field
    assert!(variants
        .iter()
        .any(|v| v["activation_code"] == json!("' OR '1'='1")));
    assert!(variants.iter().any(|v| v["product"] == json!("admin")));
    // the numeric timestamp receives numeric boundary values
    assert!(variants.iter().any(|v| v["timestamp"] == json!(-1)));
}

#[test]
fn activation_patterns_expand_to_their_declared_shapes() {
    let shapes = [
        r"^[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}$",
        r"^[A-Z0-9]{16}$",
        r"^[A-Z]{4}-[0-9]{6}$",
        r"^[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}$",
        r"^PRO-[A-Z]{4}-[0-9]{4}$",
    ];
    let gen = CodeGenerator::new();
    for (pattern, shape) in ACTIVATION_PATTERNS.iter().zip(shapes) {
        let re = Regex::new(shape).unwrap();
        for _ in 0..20 {
            let code = gen.generate_from_pattern(pattern);
            assert!(re.is_match(&code), "pattern {pattern} produced {code}");
        }
    }
}

#[test]
fn identity_flows_into_payloads_and_header_templates() {
    let identity = Identity::detect();
    let templates = catalog::header_templates(&identity);
    assert!(templates.iter().any(|t| t
        .headers
        .iter()
        .any(|(k, v)| k == "X-Device-ID" && *v == identity.device_id)));

    let builder = PayloadBuilder::new(identity.clone(), Arc::new(CodeGenerator::new()));
    let payload = builder.build_base(&Endpoint::generic("/api/status"));
    assert_eq!(payload["device_id"], json!(identity.device_id));
    assert_eq!(payload["machine_code"], json!(identity.machine_code));
    assert_eq!(payload["mac_address"], json!(identity.mac_address));
}
