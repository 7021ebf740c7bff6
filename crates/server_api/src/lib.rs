use shared::{
    domain::{TodoId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{NewTodo, Session, Todo, TodoChange, TodoPatch},
};
use storage::Storage;
use tracing::info;

pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_EMAIL_CHARS: usize = 254;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Resolves (or registers) the identity behind `email`.
pub async fn login(ctx: &ApiContext, email: &str) -> Result<Session, ApiError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "a valid email address is required",
        ));
    }
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Err(ApiError::new(ErrorCode::Validation, "email is too long"));
    }

    let user_id = ctx.storage.create_user(email).await.map_err(internal)?;
    info!(user_id = user_id.0, "api: session established");
    Ok(Session {
        user_id,
        email: email.to_string(),
    })
}

pub async fn list_todos(ctx: &ApiContext, user_id: UserId) -> Result<Vec<Todo>, ApiError> {
    ensure_known_user(ctx, user_id).await?;
    ctx.storage.list_todos(user_id).await.map_err(internal)
}

pub async fn create_todo(ctx: &ApiContext, new_todo: NewTodo) -> Result<TodoChange, ApiError> {
    let title = new_todo.title.trim();
    if title.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::new(ErrorCode::Validation, "title is too long"));
    }
    ensure_known_user(ctx, new_todo.owner).await?;

    let todo = ctx
        .storage
        .insert_todo(&NewTodo {
            owner: new_todo.owner,
            title: title.to_string(),
            completed: new_todo.completed,
        })
        .await
        .map_err(internal)?;
    Ok(TodoChange::Upserted(todo))
}

pub async fn update_todo(
    ctx: &ApiContext,
    todo_id: TodoId,
    patch: &TodoPatch,
) -> Result<TodoChange, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "update must set at least one field",
        ));
    }

    let todo = ctx
        .storage
        .update_todo(todo_id, patch)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "todo not found"))?;
    Ok(TodoChange::Upserted(todo))
}

pub async fn delete_todo(ctx: &ApiContext, todo_id: TodoId) -> Result<TodoChange, ApiError> {
    let removed = ctx
        .storage
        .delete_todo(todo_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "todo not found"))?;
    Ok(TodoChange::Deleted {
        id: removed.id,
        owner: removed.owner,
    })
}

async fn ensure_known_user(ctx: &ApiContext, user_id: UserId) -> Result<(), ApiError> {
    let email = ctx
        .storage
        .email_for_user(user_id)
        .await
        .map_err(internal)?;
    if email.is_none() {
        return Err(ApiError::new(ErrorCode::Unauthorized, "unknown user"));
    }
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
