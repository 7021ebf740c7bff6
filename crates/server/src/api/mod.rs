//! HTTP + WebSocket surface over `server_api`.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use server_api::{create_todo, delete_todo, list_todos, login, update_todo};
use shared::{
    domain::{TodoId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{LoginRequest, NewTodo, Session, Todo, TodoChange, TodoPatch},
};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::app_state::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: i64,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(http_login))
        .route("/todos", get(http_list_todos).post(http_create_todo))
        .route("/todos/:todo_id", patch(http_update_todo).delete(http_delete_todo))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state.api.storage.health_check().await.map_err(|e| {
        failure(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<Session>> {
    let session = login(&state.api, &req.email).await.map_err(failure)?;
    Ok(Json(session))
}

async fn http_list_todos(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> ApiResult<Json<Vec<Todo>>> {
    let todos = list_todos(&state.api, UserId(q.user_id))
        .await
        .map_err(failure)?;
    Ok(Json(todos))
}

async fn http_create_todo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewTodo>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    let change = create_todo(&state.api, req).await.map_err(failure)?;
    let TodoChange::Upserted(todo) = &change else {
        return Err(failure(ApiError::new(
            ErrorCode::Internal,
            "create produced a non-upsert change",
        )));
    };
    let todo = todo.clone();
    info!(todo_id = todo.id.0, owner = todo.owner.0, "todo created");
    state.publish(change);
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn http_update_todo(
    State(state): State<Arc<AppState>>,
    Path(todo_id): Path<i64>,
    Json(patch): Json<TodoPatch>,
) -> ApiResult<Json<Todo>> {
    let change = update_todo(&state.api, TodoId(todo_id), &patch)
        .await
        .map_err(failure)?;
    let TodoChange::Upserted(todo) = &change else {
        return Err(failure(ApiError::new(
            ErrorCode::Internal,
            "update produced a non-upsert change",
        )));
    };
    let todo = todo.clone();
    debug!(todo_id, completed = todo.completed, "todo updated");
    state.publish(change);
    Ok(Json(todo))
}

async fn http_delete_todo(
    State(state): State<Arc<AppState>>,
    Path(todo_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let change = delete_todo(&state.api, TodoId(todo_id))
        .await
        .map_err(failure)?;
    info!(todo_id, "todo deleted");
    state.publish(change);
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> impl IntoResponse {
    // Subscribe before the handshake completes so no change slips past a fresh client.
    let events_rx = state.events.subscribe();
    ws.on_upgrade(move |socket| ws_connection(socket, events_rx, UserId(q.user_id)))
}

/// Streams the owner's changes until either side hangs up.
async fn ws_connection(
    socket: WebSocket,
    mut events_rx: broadcast::Receiver<TodoChange>,
    owner: UserId,
) {
    let (mut sender, mut receiver) = socket.split();
    info!(owner = owner.0, "change feed subscriber connected");

    let send_task = tokio::spawn(async move {
        loop {
            let change = match events_rx.recv().await {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(owner = owner.0, skipped, "change feed subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if change.owner() != owner {
                continue;
            }
            let text = match serde_json::to_string(&change) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
    info!(owner = owner.0, "change feed subscriber disconnected");
}

fn failure(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
