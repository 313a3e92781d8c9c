use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::json;

use super::template;
use super::{HandlerRegistry, OperationContext, OperationError, OperationHandler};

const RESPONSE_BODY_LIMIT: usize = 1024;

/// Routes on the remote backend, one per operation type.
const DEFAULT_ROUTES: [(&str, &str, &str); 5] = [
    ("guest_check_in", "POST", "/guests/{{guest_id}}/check-ins"),
    ("meal_served", "POST", "/meals"),
    ("shower_booking", "POST", "/guests/{{guest_id}}/showers"),
    ("laundry_booking", "POST", "/guests/{{guest_id}}/laundry"),
    ("bicycle_repair", "POST", "/bicycle-repairs"),
];

/// Replays an operation by sending its payload to the remote backend.
pub struct RemoteHandler {
    operation_type: String,
    method: Method,
    path: String,
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl RemoteHandler {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        token: Option<String>,
        operation_type: &str,
        method: Method,
        path: &str,
    ) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            method,
            path: path.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        }
    }

    pub fn client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(timeout).build()
    }
}

#[async_trait]
impl OperationHandler for RemoteHandler {
    fn operation_type(&self) -> &str {
        &self.operation_type
    }

    async fn execute(
        &self,
        ctx: &OperationContext,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, OperationError> {
        let url = format!("{}{}", self.base_url, template::render(&self.path, payload));

        let mut req = self
            .client
            .request(self.method.clone(), &url)
            .header("Idempotency-Key", ctx.idempotency_key())
            .json(payload);

        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            let message = format!("Request to {url} failed: {e}");
            if e.is_timeout() || e.is_connect() || e.is_request() {
                OperationError::Network(message)
            } else {
                OperationError::Opaque(message)
            }
        })?;

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) => text.chars().take(RESPONSE_BODY_LIMIT).collect::<String>(),
            Err(e) if status.is_success() => {
                tracing::warn!("Remote accepted {url} but the response body was unreadable: {e}");
                String::new()
            }
            Err(e) => format!("failed to read response body: {e}"),
        };

        if status.is_success() {
            return Ok(serde_json::from_str(&body)
                .unwrap_or_else(|_| json!({ "status_code": status.as_u16(), "body": body })));
        }

        Err(status_error(status, &body))
    }
}

fn status_error(status: StatusCode, body: &str) -> OperationError {
    let message = format!("Remote returned {status}: {body}");
    match status.as_u16() {
        400 | 422 => OperationError::Validation(message),
        401 | 403 => OperationError::Permission(message),
        409 => OperationError::Conflict(message),
        408 | 429 | 500..=599 => OperationError::Network(message),
        _ => OperationError::Opaque(message),
    }
}

impl HandlerRegistry {
    /// Register a [`RemoteHandler`] for every known operation type.
    pub fn remote_defaults(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        let mut registry = Self::new();
        for (operation_type, method, path) in DEFAULT_ROUTES {
            let method = Method::from_bytes(method.as_bytes()).unwrap_or(Method::POST);
            registry.register(Arc::new(RemoteHandler::new(
                client.clone(),
                base_url,
                token.clone(),
                operation_type,
                method,
                path,
            )));
        }
        registry
    }
}
