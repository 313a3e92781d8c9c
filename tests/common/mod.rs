#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::{Notify, watch};

use dropin_sync::config::{Config, RemoteConfig};
use dropin_sync::coordinator::{CoordinatorConfig, SyncCoordinator};
use dropin_sync::db::{QueueStore, SqliteQueueStore};
use dropin_sync::models::QueueItem;
use dropin_sync::operations::{
    HandlerRegistry, MealServed, MealType, Operation, OperationContext, OperationError,
    OperationHandler,
};
use dropin_sync::queue::{QueueConfig, QueueManager};
use dropin_sync::state::SharedState;

/// Handler whose behaviour is fixed up front by the test.
pub struct ScriptedHandler {
    operation_type: String,
    error: Option<OperationError>,
    failures: usize,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedHandler {
    pub fn ok(operation_type: &str) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            error: None,
            failures: 0,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn failing(operation_type: &str, error: OperationError) -> Self {
        Self::flaky(operation_type, error, usize::MAX)
    }

    /// Fails `failures` times with `error`, then succeeds.
    pub fn flaky(operation_type: &str, error: OperationError, failures: usize) -> Self {
        Self {
            error: Some(error),
            failures,
            ..Self::ok(operation_type)
        }
    }

    /// Every call waits for `gate` to be notified before doing anything.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationHandler for ScriptedHandler {
    fn operation_type(&self) -> &str {
        &self.operation_type
    }

    async fn execute(
        &self,
        ctx: &OperationContext,
        _payload: &Value,
    ) -> Result<Value, OperationError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(error) if call < self.failures => Err(error.clone()),
            _ => Ok(json!({ "queue_id": ctx.queue_id, "attempt": ctx.attempt })),
        }
    }
}

pub fn registry(handlers: Vec<Arc<ScriptedHandler>>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for handler in handlers {
        registry.register(handler);
    }
    registry
}

pub async fn store() -> Arc<SqliteQueueStore> {
    Arc::new(
        SqliteQueueStore::in_memory()
            .await
            .expect("Failed to open in-memory store"),
    )
}

/// Queue settings that never actually sleep between retries.
pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        retry_delays: vec![Duration::ZERO],
        ..QueueConfig::default()
    }
}

pub fn manager(store: &Arc<SqliteQueueStore>) -> QueueManager {
    QueueManager::new(store.clone() as Arc<dyn QueueStore>, fast_queue_config())
}

/// Coordinator whose timers never fire during a test.
pub fn quiet_coordinator_config(start_online: bool) -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval: Duration::from_secs(3600),
        stats_interval: Duration::from_secs(3600),
        auto_sync: true,
        start_online,
    }
}

pub fn coordinator(
    manager: QueueManager,
    handlers: HandlerRegistry,
    start_online: bool,
) -> Arc<SyncCoordinator> {
    SyncCoordinator::new(
        Arc::new(manager),
        Arc::new(handlers),
        quiet_coordinator_config(start_online),
    )
}

pub fn meal(quantity: u32) -> Operation {
    Operation::MealServed(MealServed {
        guest_id: None,
        meal_type: MealType::Lunch,
        quantity,
        served_on: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
    })
}

pub fn meal_json() -> Value {
    json!({ "meal_type": "lunch", "quantity": 1, "served_on": "2026-03-04" })
}

pub async fn pending(store: &Arc<SqliteQueueStore>) -> Vec<QueueItem> {
    store.get_pending_operations().await.unwrap()
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn wait_for(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_pending(store: &Arc<SqliteQueueStore>, expected: i64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let count = store.count_pending().await.unwrap();
        if count == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {expected} pending items, still have {count}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        host: IpAddr::from([127, 0, 0, 1]),
        port: 0,
        remote: RemoteConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            token: None,
        },
        batch_size: 10,
        retry_delays: vec![Duration::ZERO],
        retention_hours: 24,
        poll_interval: Duration::from_secs(3600),
        stats_interval: Duration::from_secs(3600),
        probe_interval: Duration::from_secs(3600),
        auto_sync: true,
        background_sync: true,
        log_level: "warn".to_string(),
    }
}

/// A running API instance backed by its own in-memory store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub store: Arc<SqliteQueueStore>,
    pub state: SharedState,
    shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn enqueue(&self, operation_type: &str, payload: Value) -> (Value, reqwest::StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/queue"))
            .json(&json!({ "operation_type": operation_type, "payload": payload }))
            .send()
            .await
            .expect("enqueue request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn get_json(&self, path: &str) -> Value {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed");
        assert!(resp.status().is_success(), "GET {path} returned {}", resp.status());
        resp.json().await.unwrap()
    }

    pub async fn set_online(&self, online: bool) -> Value {
        let resp = self
            .client
            .put(self.url("/api/v1/sync/connectivity"))
            .json(&json!({ "online": online }))
            .send()
            .await
            .expect("connectivity request failed");
        assert!(resp.status().is_success());
        resp.json().await.unwrap()
    }

    pub async fn set_auto_sync(&self, enabled: bool) -> Value {
        let resp = self
            .client
            .put(self.url("/api/v1/sync/auto"))
            .json(&json!({ "enabled": enabled }))
            .send()
            .await
            .expect("auto-sync request failed");
        assert!(resp.status().is_success());
        resp.json().await.unwrap()
    }

    pub fn shutdown(self) {
        let _ = self.shutdown.send(true);
    }
}

pub async fn spawn_app(handlers: HandlerRegistry) -> TestApp {
    let store = store().await;
    let state = dropin_sync::build_state(store.clone(), handlers, test_config());

    let (shutdown, shutdown_rx) = watch::channel(false);
    dropin_sync::spawn_background(&state, None, shutdown_rx);

    let app = dropin_sync::build_app(state.clone());

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        client: Client::new(),
        store,
        state,
        shutdown,
    }
}
