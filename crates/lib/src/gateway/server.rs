//! Gateway HTTP server (single port).

use crate::channels::kernelius::{
    self, describe_account, handle_action, handle_webhook, list_account_ids, resolve_account,
    KerneliusChannel, KerneliusError, StatusSink, WebhookContext, WebhookOutcome,
    DEFAULT_ACCOUNT_ID, SIGNATURE_HEADER,
};
use crate::channels::InboundMessage;
use crate::config::{self, Config};
use crate::gateway::protocol::{ActionRequest, ActionResponse};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{MatchedPath, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::catch_panic::CatchPanicLayer;

const ACTIONS_PATH: &str = "/actions";

/// Channel activity for the health probe. Updated by the webhook pipeline without locking.
#[derive(Debug, Default)]
pub struct ChannelStatus {
    /// Unix ms of the last accepted delivery; 0 = none yet.
    last_inbound_at: AtomicI64,
}

impl ChannelStatus {
    pub fn last_inbound_at(&self) -> Option<i64> {
        match self.last_inbound_at.load(Ordering::Relaxed) {
            0 => None,
            t => Some(t),
        }
    }
}

impl StatusSink for ChannelStatus {
    fn record_inbound(&self, at_ms: i64) {
        self.last_inbound_at.store(at_ms, Ordering::Relaxed);
    }
}

/// Shared state for the gateway (config, channel, status, host queue).
#[derive(Clone)]
struct GatewayState {
    config: Arc<Config>,
    channel: KerneliusChannel,
    status: Arc<ChannelStatus>,
    /// Webhook path -> account id served on it.
    webhook_accounts: Arc<BTreeMap<String, String>>,
    /// Host queue for accepted webhook messages.
    inbound_tx: mpsc::Sender<InboundMessage>,
}

/// Webhook path per enabled account. Two accounts on one path is a config error.
fn webhook_routes(config: &Config) -> Result<BTreeMap<String, String>> {
    let mut routes = BTreeMap::new();
    for account_id in list_account_ids(config) {
        let account = resolve_account(config, Some(account_id.as_str()));
        if !account.enabled {
            log::info!("kernelius account {} disabled; no webhook route", account_id);
            continue;
        }
        let path = account.webhook_path();
        if path == ACTIONS_PATH {
            anyhow::bail!(
                "kernelius account {} webhook path {} collides with the actions endpoint",
                account_id,
                path
            );
        }
        if let Some(other) = routes.insert(path.clone(), account_id.clone()) {
            anyhow::bail!(
                "kernelius accounts {} and {} share webhook path {}",
                other,
                account_id,
                path
            );
        }
    }
    Ok(routes)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Accepted webhook messages are sent on `inbound_tx`. Blocks until shutdown (e.g. Ctrl+C).
/// When bind is not loopback, every served account must have a webhook secret or startup fails.
pub async fn run_gateway(config: Config, inbound_tx: mpsc::Sender<InboundMessage>) -> Result<()> {
    let routes = webhook_routes(&config)?;
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        for account_id in routes.values() {
            if resolve_account(&config, Some(account_id.as_str())).webhook_secret.is_none() {
                anyhow::bail!(
                    "refusing to bind gateway to {} with unsigned webhooks (set webhookSecret for kernelius account {})",
                    bind,
                    account_id
                );
            }
        }
    }
    if routes.is_empty() {
        log::warn!("channels.kernelius not configured or disabled; no webhook routes registered");
    }

    let port = config.gateway.port;
    let config = Arc::new(config);
    let state = GatewayState {
        channel: KerneliusChannel::new(config.clone()),
        config,
        status: Arc::new(ChannelStatus::default()),
        webhook_accounts: Arc::new(routes),
        inbound_tx,
    };

    let mut app = Router::new()
        .route("/", get(health_http))
        .route(ACTIONS_PATH, post(actions_http));
    for (path, account_id) in state.webhook_accounts.iter() {
        log::info!("kernelius webhook for account {} at POST {}", account_id, path);
        app = app.route(path, post(forge_webhook));
    }
    let app = with_panic_guard(app.with_state(state));

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// A handler panic becomes 500 `{"error":"Internal server error"}` instead of a dropped connection.
fn with_panic_guard(router: Router) -> Router {
    router.layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    log::error!("gateway handler panicked: {}", detail);
    let failed = WebhookOutcome::internal_error();
    (failed.status, Json(failed.body)).into_response()
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST <webhook path>: verifies, parses and maps a Forge delivery, then enqueues the message.
async fn forge_webhook(
    State(state): State<GatewayState>,
    matched: MatchedPath,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let account_id = state
        .webhook_accounts
        .get(matched.as_str())
        .map(String::as_str)
        .unwrap_or(DEFAULT_ACCOUNT_ID);
    let account = resolve_account(&state.config, Some(account_id));
    // A header that is not visible ASCII is present but cannot match.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .map(|v| v.to_str().unwrap_or_default());
    let ctx = WebhookContext {
        account: &account,
        status_sink: Some(state.status.as_ref() as &dyn StatusSink),
    };
    let WebhookOutcome {
        status,
        body,
        message,
    } = handle_webhook(&ctx, signature, &body);
    if let Some(msg) = message {
        if state.inbound_tx.send(msg).await.is_err() {
            log::warn!("kernelius webhook: host queue closed, dropping message");
            let failed = WebhookOutcome::internal_error();
            return (failed.status, Json(failed.body));
        }
    }
    (status, Json(body))
}

fn action_error_status(e: &KerneliusError) -> StatusCode {
    match e {
        _ if e.is_bad_input() => StatusCode::BAD_REQUEST,
        KerneliusError::NotConfigured { .. } | KerneliusError::InvalidApiUrl(_) => {
            StatusCode::PRECONDITION_FAILED
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// POST /actions: run a `send` or `react` action against the Forge API.
async fn actions_http(
    State(state): State<GatewayState>,
    Json(req): Json<ActionRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    match handle_action(
        &state.channel,
        req.action.trim(),
        &req.params,
        req.account_id.as_deref(),
    )
    .await
    {
        Ok(result) => (StatusCode::OK, Json(ActionResponse::ok(result))),
        Err(e) => {
            log::warn!("kernelius action {} failed: {}", req.action, e);
            (action_error_status(&e), Json(ActionResponse::err(e.to_string())))
        }
    }
}

/// GET / returns channel health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let accounts: Vec<_> = list_account_ids(&state.config)
        .iter()
        .map(|id| describe_account(&resolve_account(&state.config, Some(id.as_str()))))
        .collect();
    let webhooks: Vec<_> = state
        .webhook_accounts
        .iter()
        .map(|(path, account_id)| json!({ "accountId": account_id, "path": path }))
        .collect();
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "channel": KerneliusChannel::meta(),
        "capabilities": KerneliusChannel::capabilities(),
        "actions": KerneliusChannel::list_actions(),
        "configPrefixes": KerneliusChannel::config_prefixes(),
        "defaultAccountId": kernelius::default_account_id(),
        "accounts": accounts,
        "webhooks": webhooks,
        "lastInboundAt": state.status.last_inbound_at(),
        "source": kernelius::FORGE_SOURCE,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KerneliusAccountConfig, KerneliusConfig};

    #[test]
    fn routes_for_flattened_config() {
        let mut config = Config::default();
        config.channels.kernelius = Some(KerneliusConfig {
            webhook_url: Some("https://bot.example.com/forge/in".to_string()),
            ..Default::default()
        });
        let routes = webhook_routes(&config).unwrap();
        assert_eq!(routes.get("/forge/in").map(String::as_str), Some(DEFAULT_ACCOUNT_ID));
    }

    #[test]
    fn disabled_and_duplicate_accounts() {
        let mut config = Config::default();
        let mut accounts = BTreeMap::new();
        accounts.insert(
            "a".to_string(),
            KerneliusAccountConfig {
                webhook_path: Some("/a".to_string()),
                ..Default::default()
            },
        );
        accounts.insert(
            "off".to_string(),
            KerneliusAccountConfig {
                enabled: Some(false),
                ..Default::default()
            },
        );
        config.channels.kernelius = Some(KerneliusConfig {
            accounts: Some(accounts),
            ..Default::default()
        });
        let routes = webhook_routes(&config).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes["/a"], "a");

        if let Some(accounts) = config
            .channels
            .kernelius
            .as_mut()
            .and_then(|c| c.accounts.as_mut())
        {
            accounts.insert(
                "b".to_string(),
                KerneliusAccountConfig {
                    webhook_path: Some("a".to_string()),
                    ..Default::default()
                },
            );
        }
        assert!(webhook_routes(&config).is_err());
    }

    #[test]
    fn unconfigured_channel_has_no_routes() {
        assert!(webhook_routes(&Config::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_panic_is_internal_server_error() {
        async fn boom() -> &'static str {
            panic!("boom")
        }
        let app = with_panic_guard(Router::new().route("/boom", post(boom)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let res = reqwest::Client::new()
            .post(format!("http://{}/boom", addr))
            .send()
            .await
            .expect("response instead of a dropped connection");
        assert_eq!(res.status().as_u16(), 500);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }

    #[test]
    fn status_records_last_inbound() {
        let status = ChannelStatus::default();
        assert_eq!(status.last_inbound_at(), None);
        status.record_inbound(42);
        assert_eq!(status.last_inbound_at(), Some(42));
    }

    #[test]
    fn action_error_statuses() {
        assert_eq!(
            action_error_status(&KerneliusError::MalformedTarget("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            action_error_status(&KerneliusError::NotConfigured {
                account_id: "default".into()
            }),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            action_error_status(&KerneliusError::Upstream {
                status: 500,
                body: String::new()
            }),
            StatusCode::BAD_GATEWAY
        );
    }
}
