//! Integration test: start the gateway on a free port, POST Forge webhooks, assert responses and
//! the messages delivered to the host queue. Does not require a Forge instance.
//! The server task is left running when the test ends.

use kernelius::channels::kernelius::{compute_signature, format_signature_header};
use kernelius::channels::InboundMessage;
use kernelius::config::{Config, KerneliusConfig};
use kernelius::gateway;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn issue_created() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "source": "forge",
        "event": "issue.created",
        "timestamp": "2025-03-01T12:00:00Z",
        "repository": { "id": "r1", "name": "widgets", "fullName": "acme/widgets", "visibility": "public" },
        "sender": { "id": "u1", "username": "alice" },
        "issue": { "id": "5", "number": 3, "title": "Bug", "body": "It breaks" }
    }))
    .expect("serialize payload")
}

/// Start the gateway and wait until GET / answers.
async fn start_gateway(config: Config) -> (String, mpsc::Receiver<InboundMessage>) {
    let port = config.gateway.port;
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config, tx).await;
    });
    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&base).send().await {
            if resp.status().is_success() {
                return (base, rx);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway on {} did not come up within 5s", base);
}

fn config_with(channel: KerneliusConfig) -> Config {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "127.0.0.1".to_string();
    config.channels.kernelius = Some(channel);
    config
}

#[tokio::test]
async fn signed_webhook_is_enqueued() {
    let config = config_with(KerneliusConfig {
        webhook_secret: Some("s3cret".to_string()),
        webhook_path: Some("forge".to_string()),
        ..Default::default()
    });
    let (base, mut rx) = start_gateway(config).await;
    let client = reqwest::Client::new();
    let body = issue_created();
    let signature = format_signature_header(&compute_signature(&body, b"s3cret"));

    let resp = client
        .post(format!("{}/forge", base))
        .header("X-Forge-Signature", signature)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .expect("post webhook");
    assert_eq!(resp.status().as_u16(), 200);
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json, json!({ "success": true, "event": "issue.created" }));

    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("message enqueued in time")
        .expect("queue open");
    assert_eq!(msg.conversation_id, "repo:acme/widgets:issue:3");
    assert_eq!(msg.message_id.as_deref(), Some("issue:5"));
    assert_eq!(msg.sender_name, "alice");
    assert_eq!(msg.timestamp, 1_740_830_400_000);
    assert!(msg.text.starts_with("**New Issue #3**: Bug"));

    let health: serde_json::Value = client
        .get(&base)
        .send()
        .await
        .expect("get health")
        .json()
        .await
        .expect("parse health");
    assert_eq!(health["runtime"], "running");
    assert!(health["lastInboundAt"].as_i64().is_some());
    assert_eq!(health["webhooks"][0]["path"], "/forge");
    assert_eq!(health["configPrefixes"], serde_json::json!(["channels.kernelius"]));
    assert_eq!(health["defaultAccountId"], "default");
}

#[tokio::test]
async fn rejected_webhooks_are_not_enqueued() {
    let config = config_with(KerneliusConfig {
        webhook_secret: Some("s3cret".to_string()),
        ..Default::default()
    });
    let (base, mut rx) = start_gateway(config).await;
    let client = reqwest::Client::new();
    let url = format!("{}/kernelius", base);
    let body = issue_created();

    let resp = client.post(&url).body(body.clone()).send().await.expect("post");
    assert_eq!(resp.status().as_u16(), 401);
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json["error"], "Missing X-Forge-Signature header");

    let wrong = format_signature_header(&compute_signature(&body, b"other"));
    let resp = client
        .post(&url)
        .header("X-Forge-Signature", wrong)
        .body(body)
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status().as_u16(), 401);
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json["error"], "Invalid signature");

    let github = br#"{"source":"github","event":"issue.created"}"#.to_vec();
    let sig = format_signature_header(&compute_signature(&github, b"s3cret"));
    let resp = client
        .post(&url)
        .header("X-Forge-Signature", sig)
        .body(github)
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status().as_u16(), 400);
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json["error"], "Invalid source");

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn send_action_without_api_key_is_precondition_failed() {
    let (base, _rx) = start_gateway(config_with(KerneliusConfig::default())).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/actions", base))
        .json(&json!({
            "action": "send",
            "params": { "to": "repo:acme/widgets:pr:10", "message": "LGTM" }
        }))
        .send()
        .await
        .expect("post action");
    assert_eq!(resp.status().as_u16(), 412);
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json["ok"], false);
    assert!(json["error"].as_str().unwrap_or("").contains("not configured"));
}
