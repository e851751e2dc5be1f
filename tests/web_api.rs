use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::Router;
use base64::{Engine as _, engine::general_purpose};
use gto_explainer::config::PipelineConfig;
use gto_explainer::explain::ExplanationModel;
use gto_explainer::pipeline::Pipeline;
use gto_explainer::solver::{SolverInput, SolvingCapability};
use gto_explainer::vision::{ImagePayload, VisionExtractor};
use gto_explainer::web;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value, json};
use tokio::time::{Duration, sleep};

struct FixedSolver;

#[async_trait]
impl SolvingCapability for FixedSolver {
    async fn solve(&self, _input: &SolverInput) -> Result<Map<String, Value>> {
        json!({
            "Hero": {"AhKd": {"EV": 4.2, "Equity": 0.81, "EQR": 1.05}},
            "Villain": {"KcQc": {"EV": 2.0, "Equity": 0.66, "EQR": 0.95}},
            "Hero Equity Buckets": [10.0, 20.0, 15.0, 15.0, 10.0, 10.0, 20.0],
            "Villain Equity Buckets": [15.0, 25.0, 20.0, 10.0, 10.0, 10.0, 10.0],
            "Legal Actions": {"0": "CHECK", "1": "BET 4"}
        })
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow!("not an object"))
    }
}

struct FixedModel;

#[async_trait]
impl VisionExtractor for FixedModel {
    async fn extract(&self, image: &ImagePayload, _prompt: &str) -> Result<String> {
        if image.bytes != b"png-bytes" {
            return Err(anyhow!("unexpected image bytes"));
        }
        Ok("```json\n{\"effective_stack\": \"100\", \"pot_before_flop\": \"6\", \
            \"preflop_action\": \"BTN,BB\", \"flop_cards\": \"Td9d6h\"}\n```"
            .to_string())
    }
}

#[async_trait]
impl ExplanationModel for FixedModel {
    async fn explain(&self, _prompt: &str) -> Result<String> {
        Ok("```json\n{\"Summary\": \"Range bet small.\"}\n```".to_string())
    }
}

async fn spawn_server() -> Result<(String, tokio::task::JoinHandle<()>)> {
    let model = Arc::new(FixedModel);
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Arc::new(FixedSolver),
        model.clone(),
        model,
    );
    let app: Router = web::router(Arc::new(pipeline));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    sleep(Duration::from_millis(25)).await;
    Ok((format!("http://{}", addr), server))
}

#[tokio::test]
async fn web_api_explains_a_screenshot() -> Result<()> {
    let (base_url, server) = spawn_server().await?;
    let client = Client::builder().build()?;

    let health = client.get(format!("{}/healthz", base_url)).send().await?;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await?, "ok");

    let response = client
        .post(format!("{}/api/analyze", base_url))
        .json(&json!({
            "mode": "game",
            "image_base64": format!(
                "data:image/png;base64,{}",
                general_purpose::STANDARD.encode(b"png-bytes")
            ),
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["kind"], "explained");
    assert_eq!(body["state"]["flop_cards"], json!(["Td", "9d", "6h"]));
    assert_eq!(body["report"]["Legal Actions"], json!(["CHECK", "BET 4"]));
    assert_eq!(body["explanation"]["Summary"], "Range bet small.");

    server.abort();
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn web_api_reports_fixable_fields() -> Result<()> {
    let (base_url, server) = spawn_server().await?;
    let client = Client::builder().build()?;

    let response = client
        .post(format!("{}/api/analyze", base_url))
        .json(&json!({
            "mode": "game",
            "fields": {
                "effective_stack": "100",
                "pot_before_flop": "6",
                "preflop_action": "BTN,BB",
                "flop_cards": "Kh,7s,2d"
            },
            "explain": false
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = response.json().await?;
    assert_eq!(body["stage"], "normalizing");
    assert_eq!(
        body["fields"],
        json!(["flop_bet", "hole_cards", "river_bet", "river_card", "turn_bet", "turn_card"])
    );

    let response = client
        .post(format!("{}/api/analyze", base_url))
        .json(&json!({"mode": "gto", "image_base64": "%%%"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    server.abort();
    let _ = server.await;
    Ok(())
}
