//! `TodoGateway` over the todo server's HTTP API and WebSocket change feed.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{TodoId, UserId},
    error::ApiError,
    protocol::{LoginRequest, NewTodo, Session, Todo, TodoChange, TodoPatch},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::gateway::{ChangeHandler, DeliveryGate, GatewayError, Subscription, TodoGateway};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RestGateway {
    http: Client,
    base_url: Url,
}

impl RestGateway {
    pub fn new(server_url: &str) -> Result<Self, GatewayError> {
        let mut base_url = Url::parse(server_url.trim())
            .map_err(|err| GatewayError::new("connect", format!("invalid server url: {err}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(GatewayError::new(
                "connect",
                "server_url must start with http:// or https://",
            ));
        }
        // Endpoints are joined relative to the base path, which must end in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GatewayError::new("connect", err.to_string()))?;
        Ok(Self { http, base_url })
    }

    /// Resolves the identity for `email`.
    pub async fn login(&self, email: &str) -> Result<Session, GatewayError> {
        const OP: &str = "login";
        let res = self
            .http
            .post(self.endpoint(OP, "login")?)
            .json(&LoginRequest {
                email: email.to_string(),
            })
            .send()
            .await
            .map_err(|err| transport(OP, err))?;
        decode(OP, res).await
    }

    fn endpoint(&self, operation: &'static str, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|err| GatewayError::new(operation, format!("invalid endpoint {path}: {err}")))
    }

    fn change_feed_url(&self, owner: UserId) -> Result<Url, GatewayError> {
        let mut url = self.endpoint("subscribe", "ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| GatewayError::new("subscribe", "cannot derive websocket url"))?;
        url.query_pairs_mut()
            .append_pair("user_id", &owner.0.to_string());
        Ok(url)
    }
}

#[async_trait]
impl TodoGateway for RestGateway {
    async fn list(&self, owner: UserId) -> Result<Vec<Todo>, GatewayError> {
        const OP: &str = "list";
        let res = self
            .http
            .get(self.endpoint(OP, "todos")?)
            .query(&[("user_id", owner.0)])
            .send()
            .await
            .map_err(|err| transport(OP, err))?;
        decode(OP, res).await
    }

    async fn create(&self, todo: NewTodo) -> Result<Todo, GatewayError> {
        const OP: &str = "create";
        let res = self
            .http
            .post(self.endpoint(OP, "todos")?)
            .json(&todo)
            .send()
            .await
            .map_err(|err| transport(OP, err))?;
        decode(OP, res).await
    }

    async fn update(&self, id: TodoId, patch: TodoPatch) -> Result<Todo, GatewayError> {
        const OP: &str = "update";
        let res = self
            .http
            .patch(self.endpoint(OP, &format!("todos/{}", id.0))?)
            .json(&patch)
            .send()
            .await
            .map_err(|err| transport(OP, err))?;
        decode(OP, res).await
    }

    async fn delete(&self, id: TodoId) -> Result<(), GatewayError> {
        const OP: &str = "delete";
        let res = self
            .http
            .delete(self.endpoint(OP, &format!("todos/{}", id.0))?)
            .send()
            .await
            .map_err(|err| transport(OP, err))?;
        check_status(OP, res).await.map(|_| ())
    }

    async fn subscribe(
        &self,
        owner: UserId,
        on_change: ChangeHandler,
    ) -> Result<Subscription, GatewayError> {
        let ws_url = self.change_feed_url(owner)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|err| GatewayError::new("subscribe", format!("failed to connect websocket {ws_url}: {err}")))?;
        let (_, mut ws_reader) = ws_stream.split();
        info!(owner = owner.0, "change feed connected");

        let gate = DeliveryGate::new();
        let reader_gate = gate.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<TodoChange>(&text) {
                        Ok(change) => {
                            debug!(owner = owner.0, todo_id = change.todo_id().0, "change received");
                            if !reader_gate.deliver(|| on_change(change)) {
                                break;
                            }
                        }
                        Err(err) => warn!(owner = owner.0, "invalid change payload: {err}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(owner = owner.0, "change feed receive failed: {err}");
                        break;
                    }
                }
            }
            reader_gate.close();
            info!(owner = owner.0, "change feed closed");
        });

        Ok(Subscription::new(gate, Some(reader)))
    }
}

fn transport(operation: &'static str, err: reqwest::Error) -> GatewayError {
    GatewayError::new(operation, err.to_string())
}

/// Passes successful responses through; turns error statuses into a `GatewayError`
/// carrying the server's message when it sent one.
async fn check_status(operation: &'static str, res: Response) -> Result<Response, GatewayError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => format!("{status}: {}", api_error.message),
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("{status}: {body}"),
    };
    Err(GatewayError::new(operation, message))
}

async fn decode<T: DeserializeOwned>(operation: &'static str, res: Response) -> Result<T, GatewayError> {
    check_status(operation, res)
        .await?
        .json::<T>()
        .await
        .map_err(|err| GatewayError::new(operation, format!("invalid response body: {err}")))
}

#[cfg(test)]
#[path = "tests/rest_tests.rs"]
mod tests;
