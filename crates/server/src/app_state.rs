use server_api::ApiContext;
use shared::protocol::TodoChange;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub api: ApiContext,
    pub events: broadcast::Sender<TodoChange>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(api: ApiContext, event_buffer: usize, max_body_bytes: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            api,
            events,
            max_body_bytes,
        }
    }

    /// Fans a change out to live subscribers. No subscribers is not an error.
    pub fn publish(&self, change: TodoChange) {
        let receivers = self.events.send(change).unwrap_or(0);
        tracing::debug!(receivers, "published todo change");
    }
}
