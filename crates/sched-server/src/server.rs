use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use sched_core::security::WebhookKey;
use sched_engine::SubscriptionManager;
use sched_settings::ServerSettings;
use sched_store::{ContactRepo, Database, MessageRepo};
use sched_telemetry::{MetricSample, MetricsRecorder};

use crate::webhook::{error_response, webhook_handler};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            ..Self::default()
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub subscriptions: SubscriptionManager,
    pub contacts: ContactRepo,
    pub messages: MessageRepo,
    pub webhook_key: WebhookKey,
    pub metrics: Arc<MetricsRecorder>,
}

impl AppState {
    pub fn new(db: Database, webhook_key: WebhookKey, metrics: Arc<MetricsRecorder>) -> Self {
        let contacts = ContactRepo::new(db.clone());
        Self {
            subscriptions: SubscriptionManager::new(contacts.clone()),
            contacts,
            messages: MessageRepo::new(db),
            webhook_key,
            metrics,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            config.request_timeout,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Answer 408 with the usual JSON error body when a handler overruns `limit`.
async fn request_timeout(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "request timed out");
            error_response(StatusCode::REQUEST_TIMEOUT, "request timed out")
        }
    }
}

/// Bind and start serving. The server stops accepting connections once
/// `shutdown` is cancelled and the returned task ends after in-flight
/// requests drain.
pub async fn start(
    config: ServerConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, &config);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;

    tracing::info!(%addr, "webhook server listening");

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "webhook server failed");
        }
        tracing::info!("webhook server stopped");
    });

    Ok(ServerHandle { addr, task })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The serving task, for the shutdown coordinator to await.
    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let counts = state
        .contacts
        .count()
        .and_then(|contacts| state.messages.count().map(|messages| (contacts, messages)));

    match counts {
        Ok((contacts, messages)) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "contacts": contacts,
                "messages": messages,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy" })),
            )
        }
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Json<Value> {
    Json(Value::Object(render_metrics(&state.metrics.snapshot())))
}

/// Flatten samples into `{"name{label=value}": n}`.
pub fn render_metrics(samples: &[MetricSample]) -> Map<String, Value> {
    samples
        .iter()
        .map(|sample| {
            let key = if sample.labels.is_empty() {
                sample.name.clone()
            } else {
                let labels: Vec<String> = sample
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                format!("{}{{{}}}", sample.name, labels.join(","))
            };
            (key, Value::from(sample.value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (AppState, Database) {
        let db = Database::in_memory().unwrap();
        let state = AppState::new(
            db.clone(),
            WebhookKey::new("s3cret"),
            Arc::new(MetricsRecorder::new()),
        );
        (state, db)
    }

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn slow_request_times_out_with_json_error() {
        let router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .route("/fast", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                Duration::from_millis(50),
                request_timeout,
            ));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        });

        let resp = reqwest::get(format!("http://{addr}/slow")).await.unwrap();
        assert_eq!(resp.status(), 408);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "request timed out"}));

        let resp = reqwest::get(format!("http://{addr}/fast")).await.unwrap();
        assert_eq!(resp.status(), 200);

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let (state, _db) = state();
        state.messages.insert("Sabia que...").unwrap();
        let cancel = CancellationToken::new();

        let handle = start(local_config(), state, cancel.clone()).await.unwrap();
        assert!(handle.port() > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["contacts"], 0);
        assert_eq!(body["messages"], 1);

        cancel.cancel();
        handle.into_task().await.unwrap();
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_counters() {
        let (state, _db) = state();
        state.metrics.increment("broadcast.delivered", &[], 4);
        state
            .metrics
            .increment("broadcast.failed", &[("kind", "timeout")], 1);
        let cancel = CancellationToken::new();
        let handle = start(local_config(), state, cancel.clone()).await.unwrap();

        let url = format!("http://127.0.0.1:{}/metrics", handle.port());
        let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["broadcast.delivered"], 4);
        assert_eq!(body["broadcast.failed{kind=timeout}"], 1);

        cancel.cancel();
        handle.into_task().await.unwrap();
    }

    #[tokio::test]
    async fn health_reports_unhealthy_on_storage_failure() {
        let (state, db) = state();
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE messages")?;
            Ok(())
        })
        .unwrap();
        let cancel = CancellationToken::new();
        let handle = start(local_config(), state, cancel.clone()).await.unwrap();

        let url = format!("http://127.0.0.1:{}/health", handle.port());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 503);

        cancel.cancel();
        handle.into_task().await.unwrap();
    }

    #[test]
    fn render_metrics_formats_labels() {
        let recorder = MetricsRecorder::new();
        recorder.increment("webhook.replies", &[("reply", "subscribed")], 2);
        recorder.set_gauge("broadcast.contacts", &[], 7);

        let rendered = render_metrics(&recorder.snapshot());
        assert_eq!(rendered["webhook.replies{reply=subscribed}"], 2);
        assert_eq!(rendered["broadcast.contacts"], 7);
    }

    #[test]
    fn config_from_settings_keeps_bind_address() {
        let settings = ServerSettings {
            host: "127.0.0.1".into(),
            port: 8080,
            ..ServerSettings::default()
        };
        let config = ServerConfig::from(&settings);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
    }
}
