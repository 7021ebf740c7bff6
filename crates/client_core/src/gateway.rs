//! The data-access seam between the controller and whatever backend holds the todos.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use shared::{
    domain::{TodoId, UserId},
    protocol::{NewTodo, Todo, TodoChange, TodoPatch},
};
use thiserror::Error;
use tokio::task::JoinHandle;

/// The single failure kind any gateway operation reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct GatewayError {
    pub operation: &'static str,
    pub message: String,
}

impl GatewayError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

pub type ChangeHandler = Arc<dyn Fn(TodoChange) + Send + Sync>;

#[async_trait]
pub trait TodoGateway: Send + Sync {
    /// All todos owned by `owner`, newest first.
    async fn list(&self, owner: UserId) -> Result<Vec<Todo>, GatewayError>;
    /// Returns the stored record including the assigned id and timestamp.
    async fn create(&self, todo: NewTodo) -> Result<Todo, GatewayError>;
    async fn update(&self, id: TodoId, patch: TodoPatch) -> Result<Todo, GatewayError>;
    async fn delete(&self, id: TodoId) -> Result<(), GatewayError>;
    /// Registers `on_change` for changes to `owner`'s todos until the returned
    /// handle is unsubscribed or dropped.
    async fn subscribe(
        &self,
        owner: UserId,
        on_change: ChangeHandler,
    ) -> Result<Subscription, GatewayError>;
}

/// Open/closed switch shared between a subscription handle and its delivery side.
///
/// Delivery runs while holding the gate lock, so once [`DeliveryGate::close`]
/// returns no handler call is in progress and none will start.
#[derive(Clone, Default)]
pub struct DeliveryGate {
    closed: Arc<Mutex<bool>>,
}

impl DeliveryGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `deliver` if the gate is still open. Returns whether it ran.
    pub fn deliver(&self, deliver: impl FnOnce()) -> bool {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return false;
        }
        deliver();
        true
    }

    pub fn close(&self) {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn is_open(&self) -> bool {
        !*self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a live change subscription. Dropping it unsubscribes.
///
/// Must not be released from inside its own change handler.
pub struct Subscription {
    gate: DeliveryGate,
    reader: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(gate: DeliveryGate, reader: Option<JoinHandle<()>>) -> Self {
        Self { gate, reader }
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    /// No change is delivered after this returns.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.gate.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
