//! Webhook alert delivery
//!
//! Covers:
//! - Alert payload shape
//! - Non-2xx responses
//! - Stage failures routed through the webhook

use adcorr_ingest::error::NotifyError;
use adcorr_ingest::notify::{Notifier, WebhookNotifier};
use adcorr_ingest::pipeline::{Pipeline, ALERT_SUBJECT};
use adcorr_ingest::sink::MemorySink;
use adcorr_ingest::PipelineConfig;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn notifier_for(server: &MockServer) -> WebhookNotifier {
    let url = Url::parse(&format!("{}/alerts", server.uri())).unwrap();
    WebhookNotifier::new(url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_webhook_posts_json_alert() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "subject": "Error in data processing",
            "body": "Error correlating data: boom"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = notifier_for(&mock_server)
        .notify(ALERT_SUBJECT, "Error correlating data: boom")
        .await;

    assert!(result.is_ok());

    let requests = mock_server.received_requests().await.unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let sent_at = payload["sent_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(sent_at).is_ok());
}

#[tokio::test]
async fn test_webhook_server_error_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/alerts"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let result = notifier_for(&mock_server).notify("subject", "body").await;

    match result {
        Err(NotifyError::Status(status)) => assert_eq!(status.as_u16(), 500),
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pipeline_failures_reach_the_webhook() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(serde_json::json!({ "subject": ALERT_SUBJECT })))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        json_path: dir.path().join("missing.json"),
        csv_path: dir.path().join("missing.csv"),
        avro_path: dir.path().join("missing.avro"),
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, Arc::new(notifier_for(&mock_server)));

    let report = pipeline.run(MemorySink::default()).await;

    assert!(report.aborted);
    assert_eq!(report.failures.len(), 3);

    let requests = mock_server.received_requests().await.unwrap();
    let bodies: Vec<String> = requests
        .iter()
        .map(|r| {
            let payload: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            payload["body"].as_str().unwrap().to_string()
        })
        .collect();
    assert!(bodies.iter().any(|b| b.starts_with("Error ingesting impressions")));
    assert!(bodies.iter().any(|b| b.starts_with("Error ingesting bid requests")));
    assert!(bodies.iter().all(|b| b.contains(&report.run_id.to_string())));
}

#[tokio::test]
async fn test_webhook_outage_does_not_fail_the_run_differently() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        json_path: dir.path().join("missing.json"),
        csv_path: dir.path().join("missing.csv"),
        avro_path: dir.path().join("missing.avro"),
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, Arc::new(notifier_for(&mock_server)));

    let report = pipeline.run(MemorySink::default()).await;

    assert_eq!(report.failures.len(), 3);
    assert!(report.aborted);
}
