//! View/state controller: owns the signed-in user's list, issues gateway
//! requests and folds pushed changes into the same state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::{
    domain::{TodoId, UserId},
    protocol::{NewTodo, Todo, TodoChange, TodoPatch},
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    gateway::{ChangeHandler, GatewayError, Subscription, TodoGateway},
    list::{Merge, TodoList},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("todo title cannot be empty")]
    EmptyTitle,
    #[error("todo {0} is not in the current list")]
    UnknownTodo(TodoId),
}

/// Point-in-time copy of what the view renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoSnapshot {
    pub user_id: Option<UserId>,
    pub loading: bool,
    pub todos: Vec<Todo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveSession {
    user_id: UserId,
    generation: u64,
}

#[derive(Default)]
struct ControllerState {
    session: Option<ActiveSession>,
    generation: u64,
    loading: bool,
    todos: TodoList,
}

impl ControllerState {
    /// The session that issued a request, if it is still the current one.
    fn current(&self, generation: u64) -> Option<ActiveSession> {
        self.session.filter(|session| session.generation == generation)
    }
}

pub struct TodoController {
    gateway: Arc<dyn TodoGateway>,
    state: Arc<Mutex<ControllerState>>,
    subscription: Mutex<Option<Subscription>>,
    revision: Arc<watch::Sender<u64>>,
}

impl TodoController {
    pub fn new(gateway: Arc<dyn TodoGateway>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            gateway,
            state: Arc::new(Mutex::new(ControllerState::default())),
            subscription: Mutex::new(None),
            revision: Arc::new(revision),
        }
    }

    /// Bumped after every visible state change.
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn snapshot(&self) -> TodoSnapshot {
        let state = self.state();
        TodoSnapshot {
            user_id: state.session.map(|session| session.user_id),
            loading: state.loading,
            todos: state.todos.items().to_vec(),
        }
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.state().session.map(|session| session.user_id)
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn has_live_subscription(&self) -> bool {
        self.subscription_slot()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Loads `user_id`'s list and opens its change subscription.
    ///
    /// A repeated call for the active user does nothing. The subscription is
    /// opened even when the initial fetch fails; the fetch error is returned.
    pub async fn start(&self, user_id: UserId) -> Result<(), ControllerError> {
        if self.current_user() == Some(user_id) {
            debug!(user_id = user_id.0, "controller: session already active");
            return Ok(());
        }
        if self.current_user().is_some() {
            self.stop();
        }

        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.session = Some(ActiveSession {
                user_id,
                generation: state.generation,
            });
            state.loading = true;
            state.todos.clear();
            state.generation
        };
        self.bump_revision();
        info!(user_id = user_id.0, "controller: session started");

        let fetched = self.gateway.list(user_id).await;
        let fetch_result = {
            let mut state = self.state();
            if state.current(generation).is_none() {
                debug!(user_id = user_id.0, "controller: discarding fetch for ended session");
                return Ok(());
            }
            state.loading = false;
            match fetched {
                Ok(todos) => {
                    debug!(user_id = user_id.0, count = todos.len(), "controller: initial list loaded");
                    state.todos.replace_all(todos);
                    Ok(())
                }
                Err(err) => {
                    error!(user_id = user_id.0, "controller: error fetching todos: {err}");
                    Err(ControllerError::from(err))
                }
            }
        };
        self.bump_revision();

        let subscription = self
            .gateway
            .subscribe(user_id, self.change_handler(user_id, generation))
            .await
            .map_err(|err| {
                error!(user_id = user_id.0, "controller: error subscribing to changes: {err}");
                ControllerError::from(err)
            })?;

        // The session may have ended while the subscription was being opened.
        // Checked with the slot held so a concurrent stop() sees what is stored.
        let mut slot = self.subscription_slot();
        if self.state().current(generation).is_none() {
            drop(slot);
            subscription.unsubscribe();
            return fetch_result;
        }
        let previous = slot.replace(subscription);
        drop(slot);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        fetch_result
    }

    /// Ends the session: releases the subscription and clears local state.
    /// In-flight requests may still complete; their results are discarded.
    pub fn stop(&self) {
        let ended = {
            let mut state = self.state();
            state.generation += 1;
            state.loading = false;
            state.todos.clear();
            state.session.take()
        };
        // Released outside the state lock: an in-progress delivery may be waiting on it.
        if let Some(subscription) = self.subscription_slot().take() {
            subscription.unsubscribe();
        }
        if let Some(session) = ended {
            info!(user_id = session.user_id.0, "controller: session stopped");
            self.bump_revision();
        }
    }

    /// Creates a todo and prepends the stored record once the gateway confirms it,
    /// unless a change notification already listed it.
    pub async fn add(&self, title: &str) -> Result<Todo, ControllerError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ControllerError::EmptyTitle);
        }
        let session = self.session()?;

        let created = self
            .gateway
            .create(NewTodo {
                owner: session.user_id,
                title: title.to_string(),
                completed: false,
            })
            .await
            .map_err(|err| {
                error!(user_id = session.user_id.0, "controller: error adding todo: {err}");
                ControllerError::from(err)
            })?;

        self.apply_if_current(session.generation, |todos| {
            // A change notification may already have delivered this record, and
            // later changes to it; the create response is the oldest version.
            todos.insert_if_absent(created.clone()) != Merge::Unchanged
        });
        Ok(created)
    }

    /// Flips the flag locally, then persists it. On failure the flag goes back
    /// to exactly the value it had before this call.
    pub async fn toggle(&self, id: TodoId) -> Result<Todo, ControllerError> {
        let (session, prior) = {
            let mut state = self.state();
            let session = state.session.ok_or(ControllerError::NotSignedIn)?;
            let prior = state
                .todos
                .get(id)
                .map(|todo| todo.completed)
                .ok_or(ControllerError::UnknownTodo(id))?;
            state.todos.set_completed(id, !prior);
            (session, prior)
        };
        self.bump_revision();

        match self.gateway.update(id, TodoPatch::completed(!prior)).await {
            Ok(updated) => Ok(updated),
            Err(err) => {
                error!(todo_id = id.0, "controller: error updating todo: {err}");
                self.apply_if_current(session.generation, |todos| {
                    todos.set_completed(id, prior).is_some()
                });
                Err(err.into())
            }
        }
    }

    /// Deletes remotely, then drops the todo from the local list.
    pub async fn delete(&self, id: TodoId) -> Result<(), ControllerError> {
        let session = self.session()?;

        self.gateway.delete(id).await.map_err(|err| {
            error!(todo_id = id.0, "controller: error deleting todo: {err}");
            ControllerError::from(err)
        })?;

        self.apply_if_current(session.generation, |todos| todos.remove(id).is_some());
        Ok(())
    }

    /// Merges one pushed change into the list of the session it was issued for.
    fn change_handler(&self, user_id: UserId, generation: u64) -> ChangeHandler {
        let state = Arc::clone(&self.state);
        let revision = Arc::clone(&self.revision);
        Arc::new(move |change: TodoChange| {
            if change.owner() != user_id {
                warn!(
                    user_id = user_id.0,
                    owner = change.owner().0,
                    "controller: ignoring change for another owner"
                );
                return;
            }
            let merge = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.current(generation).is_none() {
                    return;
                }
                state.todos.apply_change(change)
            };
            if merge != Merge::Unchanged {
                revision.send_modify(|rev| *rev += 1);
            }
        })
    }

    fn apply_if_current(&self, generation: u64, apply: impl FnOnce(&mut TodoList) -> bool) {
        let changed = {
            let mut state = self.state();
            if state.current(generation).is_none() {
                debug!("controller: discarding result for ended session");
                return;
            }
            apply(&mut state.todos)
        };
        if changed {
            self.bump_revision();
        }
    }

    fn session(&self) -> Result<ActiveSession, ControllerError> {
        self.state().session.ok_or(ControllerError::NotSignedIn)
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription_slot(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

impl Drop for TodoController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
