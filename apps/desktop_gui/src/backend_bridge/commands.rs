//! Backend commands queued from UI to backend worker.

use shared::domain::TodoId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    SignIn { server_url: String, email: String },
    AddTodo { title: String },
    ToggleTodo { id: TodoId },
    DeleteTodo { id: TodoId },
    SignOut,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::SignIn { .. } => "sign_in",
            BackendCommand::AddTodo { .. } => "add_todo",
            BackendCommand::ToggleTodo { .. } => "toggle_todo",
            BackendCommand::DeleteTodo { .. } => "delete_todo",
            BackendCommand::SignOut => "sign_out",
        }
    }
}
