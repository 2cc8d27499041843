//! Gateway integration tests.
//!
//! Each test starts the real router on an ephemeral port with a stub
//! provider injected, then talks to it over HTTP. No network access or API
//! key is needed.

use async_trait::async_trait;
use billai::{
    run, AppState, BillError, ExtractionProvider, ExtractionRequest, GatewayClient,
    GatewayConfig, HealthReport, ProviderResponse,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replays queued answers in order and counts upstream calls.
struct StubProvider {
    answers: Mutex<Vec<Option<String>>>,
    calls: AtomicUsize,
    last_mime: Mutex<Option<String>>,
}

impl StubProvider {
    fn new(answers: Vec<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().rev().collect()),
            calls: AtomicUsize::new(0),
            last_mime: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, request: &ExtractionRequest) -> Result<ProviderResponse, BillError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_mime.lock().unwrap() = Some(request.image.mime_type.clone());
        let text = self.answers.lock().unwrap().pop().flatten();
        Ok(ProviderResponse {
            text,
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

fn electricity_bill() -> Value {
    json!({
        "fornitore": "Enel Energia",
        "periodo_fatturazione": "Gen-Feb 2024",
        "is_gas": false,
        "prezzo_materia_prima_unitario": 0.1234,
        "quota_fissa_mensile": 7.5,
        "consumo_annuo_totale": 2700,
        "consumo_annuo_fasce": { "f1": 1000, "f2": 900, "f3": 800 },
        "storico_consumi": [
            { "mese": "Gen 24", "valore": 240, "f1": 100, "f2": 80, "f3": 60 },
            { "mese": "Feb 24", "valore": 210 },
            { "mese": "Mar 24", "valore": 200 }
        ],
        "spesa_totale_annua_stima": 950.5
    })
}

/// Start a gateway in the background and return its base URL.
async fn spawn_gateway(provider: Arc<StubProvider>) -> String {
    let config = GatewayConfig::builder()
        .provider(provider)
        .body_limit_bytes(64 * 1024)
        .build()
        .unwrap();
    let state = AppState::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run(listener, state, std::future::pending()));
    format!("http://{addr}")
}

async fn post_analyze(base: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/api/analyze"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

// ── /api/analyze ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_returns_provider_json_verbatim() {
    let provider = StubProvider::new(vec![Some(electricity_bill().to_string())]);
    let base = spawn_gateway(Arc::clone(&provider)).await;

    let resp = post_analyze(&base, json!({ "image": "data:image/png;base64,iVBORw0KGgo=" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, electricity_bill());
    assert_eq!(provider.calls(), 1);
    assert_eq!(provider.last_mime.lock().unwrap().as_deref(), Some("image/png"));
}

#[tokio::test]
async fn bare_base64_defaults_to_jpeg() {
    let provider = StubProvider::new(vec![Some(electricity_bill().to_string())]);
    let base = spawn_gateway(Arc::clone(&provider)).await;

    let resp = post_analyze(&base, json!({ "image": "/9j/4AAQSkZJRg==" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(provider.last_mime.lock().unwrap().as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn fenced_model_output_is_accepted() {
    let fenced = format!("```json\n{}\n```", electricity_bill());
    let provider = StubProvider::new(vec![Some(fenced)]);
    let base = spawn_gateway(provider).await;

    let resp = post_analyze(&base, json!({ "image": "AAAA" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["fornitore"], "Enel Energia");
}

#[tokio::test]
async fn missing_image_is_400_without_upstream_call() {
    let provider = StubProvider::new(vec![]);
    let base = spawn_gateway(Arc::clone(&provider)).await;

    for body in [json!({}), json!({ "image": "" }), json!({ "image": null })] {
        let resp = post_analyze(&base, body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.text().await.unwrap(), "Missing image in request body");
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn unparseable_body_is_400() {
    let provider = StubProvider::new(vec![]);
    let base = spawn_gateway(Arc::clone(&provider)).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/analyze"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn non_post_is_405() {
    let provider = StubProvider::new(vec![]);
    let base = spawn_gateway(Arc::clone(&provider)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/analyze"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        resp.headers().get("allow").and_then(|v| v.to_str().ok()),
        Some("POST")
    );

    let resp = client
        .put(format!("{base}/api/analyze"))
        .json(&json!({ "image": "AAAA" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn oversized_body_is_413() {
    let provider = StubProvider::new(vec![]);
    let base = spawn_gateway(Arc::clone(&provider)).await;

    let image = "A".repeat(128 * 1024);
    let resp = post_analyze(&base, json!({ "image": image })).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn empty_model_text_is_502() {
    let provider = StubProvider::new(vec![None, Some("  ".into())]);
    let base = spawn_gateway(Arc::clone(&provider)).await;

    for _ in 0..2 {
        let resp = post_analyze(&base, json!({ "image": "AAAA" })).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(resp.text().await.unwrap(), "AI response empty");
    }
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn malformed_json_is_500_and_server_keeps_serving() {
    let provider = StubProvider::new(vec![
        Some("{\"fornitore\": \"Enel".into()),
        Some(electricity_bill().to_string()),
    ]);
    let base = spawn_gateway(Arc::clone(&provider)).await;

    let resp = post_analyze(&base, json!({ "image": "AAAA" })).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!resp.text().await.unwrap().is_empty());

    let resp = post_analyze(&base, json!({ "image": "AAAA" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn schema_violation_is_500() {
    let mut bill = electricity_bill();
    bill["storico_consumi"] = json!([]);
    let provider = StubProvider::new(vec![
        Some(bill.to_string()),
        Some(json!({ "fornitore": "X" }).to_string()),
    ]);
    let base = spawn_gateway(provider).await;

    for _ in 0..2 {
        let resp = post_analyze(&base, json!({ "image": "AAAA" })).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

// ── /api/health ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_credential_presence() {
    let base = spawn_gateway(StubProvider::new(vec![])).await;

    let resp = reqwest::get(format!("{base}/api/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["api_key_present"], true);
    assert!(body["timestamp"].is_string());
}

// ── GatewayClient ────────────────────────────────────────────────────────────

#[tokio::test]
async fn client_round_trip_preserves_history_and_commodity() {
    let mut gas = electricity_bill();
    gas["is_gas"] = json!(true);
    let provider = StubProvider::new(vec![Some(gas.to_string())]);
    let base = spawn_gateway(provider).await;

    let client = GatewayClient::new(format!("{base}/"));
    assert_eq!(client.base_url(), base);

    let bill = client.analyze("data:image/jpeg;base64,AAAA").await.unwrap();
    assert!(bill.is_gas);
    assert_eq!(bill.storico_consumi.len(), 3);
    assert_eq!(bill.storico_consumi[0].f1, Some(100.0));
    assert_eq!(bill.storico_consumi[1].f1, None);
    assert_eq!(bill.spesa_totale_annua_stima, 950.5);
}

#[tokio::test]
async fn client_surfaces_status_and_message() {
    let base = spawn_gateway(StubProvider::new(vec![None])).await;
    let client = GatewayClient::new(base);

    let err = client.analyze("AAAA").await.unwrap_err();
    match err {
        BillError::Gateway { status, ref message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "AI response empty");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.to_string(), "Server error: 502 AI response empty");
}

#[tokio::test]
async fn client_health() {
    let base = spawn_gateway(StubProvider::new(vec![])).await;
    let report: HealthReport = GatewayClient::new(base).health().await.unwrap();
    assert_eq!(report.status, "ok");
    assert!(report.api_key_present);
}
