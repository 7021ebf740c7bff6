use super::*;

async fn storage_with_user(email: &str) -> (Storage, UserId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user(email).await.expect("user");
    (storage, user)
}

fn new_todo(owner: UserId, title: &str) -> NewTodo {
    NewTodo {
        owner,
        title: title.to_string(),
        completed: false,
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn create_user_is_idempotent_per_email() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage.create_user("alice@example.com").await.expect("user");
    let second = storage.create_user("alice@example.com").await.expect("user");
    assert_eq!(first, second);
    assert_eq!(
        storage.email_for_user(first).await.expect("email").as_deref(),
        Some("alice@example.com")
    );
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("todos.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn lists_todos_newest_first_per_owner() {
    let (storage, alice) = storage_with_user("alice@example.com").await;
    let bob = storage.create_user("bob@example.com").await.expect("bob");

    let first = storage
        .insert_todo(&new_todo(alice, "first"))
        .await
        .expect("first");
    let second = storage
        .insert_todo(&new_todo(alice, "second"))
        .await
        .expect("second");
    storage
        .insert_todo(&new_todo(bob, "not alice's"))
        .await
        .expect("bob todo");

    let todos = storage.list_todos(alice).await.expect("list");
    let ids: Vec<TodoId> = todos.iter().map(|todo| todo.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert!(todos.iter().all(|todo| todo.owner == alice));
    assert!(todos.iter().all(|todo| !todo.completed));
}

#[tokio::test]
async fn insert_rejects_unknown_owner() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let err = storage
        .insert_todo(&new_todo(UserId(404), "orphan"))
        .await
        .expect_err("foreign key violation");
    assert!(err.to_string().contains("user 404"));
}

#[tokio::test]
async fn update_changes_only_completed() {
    let (storage, alice) = storage_with_user("alice@example.com").await;
    let todo = storage
        .insert_todo(&new_todo(alice, "Buy milk"))
        .await
        .expect("insert");

    let updated = storage
        .update_todo(todo.id, &TodoPatch::completed(true))
        .await
        .expect("update")
        .expect("row exists");
    assert!(updated.completed);
    assert_eq!(updated.title, "Buy milk");
    assert_eq!(updated.created_at, todo.created_at);

    let untouched = storage
        .update_todo(todo.id, &TodoPatch::default())
        .await
        .expect("empty patch")
        .expect("row exists");
    assert!(untouched.completed);

    let missing = storage
        .update_todo(TodoId(9999), &TodoPatch::completed(true))
        .await
        .expect("update missing");
    assert!(missing.is_none());
}

#[tokio::test]
async fn delete_returns_removed_row_once() {
    let (storage, alice) = storage_with_user("alice@example.com").await;
    let todo = storage
        .insert_todo(&new_todo(alice, "temp"))
        .await
        .expect("insert");

    let removed = storage.delete_todo(todo.id).await.expect("delete");
    assert_eq!(removed.as_ref().map(|t| t.owner), Some(alice));
    assert!(storage.delete_todo(todo.id).await.expect("delete again").is_none());
    assert!(storage.list_todos(alice).await.expect("list").is_empty());
}

#[test]
fn sqlite_path_skips_memory_urls() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/todos.db?mode=rwc"),
        Some(PathBuf::from("./data/todos.db"))
    );
}
