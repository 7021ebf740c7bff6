use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{TodoId, UserId},
    protocol::{NewTodo, Todo, TodoPatch},
};

const TODO_COLUMNS: &str = "id, owner_user_id, title, completed, created_at_ms";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, email: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (email) VALUES (?)
             ON CONFLICT(email) DO UPDATE SET email=excluded.email
             RETURNING id",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn email_for_user(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT email FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    /// Todos owned by `owner`, newest first.
    pub async fn list_todos(&self, owner: UserId) -> Result<Vec<Todo>> {
        let rows = sqlx::query(&format!(
            "SELECT {TODO_COLUMNS}
             FROM todos
             WHERE owner_user_id = ?
             ORDER BY created_at_ms DESC, id DESC"
        ))
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(todo_from_row).collect()
    }

    pub async fn load_todo(&self, id: TodoId) -> Result<Option<Todo>> {
        let row = sqlx::query(&format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(todo_from_row).transpose()
    }

    pub async fn insert_todo(&self, todo: &NewTodo) -> Result<Todo> {
        let created_at_ms = Utc::now().timestamp_millis();
        let row = sqlx::query(&format!(
            "INSERT INTO todos (owner_user_id, title, completed, created_at_ms)
             VALUES (?, ?, ?, ?)
             RETURNING {TODO_COLUMNS}"
        ))
        .bind(todo.owner.0)
        .bind(&todo.title)
        .bind(todo.completed)
        .bind(created_at_ms)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert todo for user {}", todo.owner))?;
        let inserted = todo_from_row(&row)?;
        debug!(todo_id = inserted.id.0, owner = todo.owner.0, "storage: inserted todo");
        Ok(inserted)
    }

    /// Applies `patch` and returns the updated row, or `None` when the id is unknown.
    pub async fn update_todo(&self, id: TodoId, patch: &TodoPatch) -> Result<Option<Todo>> {
        let Some(completed) = patch.completed else {
            return self.load_todo(id).await;
        };

        let row = sqlx::query(&format!(
            "UPDATE todos SET completed = ? WHERE id = ? RETURNING {TODO_COLUMNS}"
        ))
        .bind(completed)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(todo_from_row).transpose()
    }

    /// Deletes the row and returns what was removed, or `None` when the id is unknown.
    pub async fn delete_todo(&self, id: TodoId) -> Result<Option<Todo>> {
        let row = sqlx::query(&format!(
            "DELETE FROM todos WHERE id = ? RETURNING {TODO_COLUMNS}"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(todo_from_row).transpose()
    }
}

fn todo_from_row(row: &SqliteRow) -> Result<Todo> {
    let created_at_ms: i64 = row.try_get(4)?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms)
        .ok_or_else(|| anyhow!("invalid created_at_ms {created_at_ms}"))?;
    Ok(Todo {
        id: TodoId(row.try_get(0)?),
        owner: UserId(row.try_get(1)?),
        title: row.try_get(2)?,
        completed: row.try_get(3)?,
        created_at,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
