//! UI layer for desktop GUI: sign-in card and the todo dashboard.

pub mod app;

pub use app::{PersistedSignIn, StartupConfig, TodoApp, SETTINGS_STORAGE_KEY};
