//! Backend worker thread: owns the tokio runtime and the controller of the signed-in user.

use std::{sync::Arc, thread};

use client_core::{RestGateway, TodoController};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use shared::domain::TodoId;
use tokio::task::JoinHandle;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{classify_sign_in_failure, UiError, UiErrorContext, UiEvent};

/// Delivers events to the UI thread and wakes it up to render them.
#[derive(Clone)]
struct UiNotifier {
    ui_tx: Sender<UiEvent>,
    repaint: egui::Context,
}

impl UiNotifier {
    fn send(&self, event: UiEvent) {
        if self.ui_tx.try_send(event).is_err() {
            tracing::warn!("ui event queue full or closed; dropping event");
        }
        self.repaint.request_repaint();
    }

    fn error(&self, context: UiErrorContext, message: impl Into<String>) {
        self.send(UiEvent::Error(UiError::from_message(context, message)));
    }
}

struct ActiveUser {
    controller: Arc<TodoController>,
    forwarder: JoinHandle<()>,
}

struct BackendWorker {
    notify: UiNotifier,
    active: Option<ActiveUser>,
}

pub fn launch(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>, repaint: egui::Context) {
    thread::spawn(move || {
        let notify = UiNotifier { ui_tx, repaint };
        notify.send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                notify.error(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                );
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let mut worker = BackendWorker {
                notify: notify.clone(),
                active: None,
            };
            notify.send(UiEvent::Info("Backend worker ready".to_string()));

            while let Ok(cmd) = cmd_rx.recv() {
                tracing::debug!(command = cmd.name(), "backend command received");
                worker.handle(cmd).await;
            }
            worker.release_session();
            tracing::info!("backend worker stopped");
        });
    });
}

impl BackendWorker {
    async fn handle(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::SignIn { server_url, email } => self.sign_in(&server_url, &email).await,
            BackendCommand::AddTodo { title } => {
                let Some(controller) = self.controller(UiErrorContext::AddTodo) else {
                    return;
                };
                let notify = self.notify.clone();
                tokio::spawn(async move {
                    match controller.add(&title).await {
                        Ok(_) => notify.send(UiEvent::TodoAdded),
                        Err(err) => notify.error(UiErrorContext::AddTodo, err.to_string()),
                    }
                });
            }
            BackendCommand::ToggleTodo { id } => self.spawn_item_op(id, UiErrorContext::ToggleTodo),
            BackendCommand::DeleteTodo { id } => self.spawn_item_op(id, UiErrorContext::DeleteTodo),
            BackendCommand::SignOut => {
                self.release_session();
                self.notify.send(UiEvent::SignedOut);
            }
        }
    }

    async fn sign_in(&mut self, server_url: &str, email: &str) {
        self.release_session();

        let gateway = match RestGateway::new(server_url) {
            Ok(gateway) => gateway,
            Err(err) => {
                self.notify.error(UiErrorContext::SignIn, classify_sign_in_failure(&err.to_string()));
                return;
            }
        };
        let session = match gateway.login(email).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(server_url, "sign-in failed: {err}");
                self.notify.error(UiErrorContext::SignIn, classify_sign_in_failure(&err.to_string()));
                return;
            }
        };
        tracing::info!(user_id = session.user_id.0, "signed in");

        let controller = Arc::new(TodoController::new(Arc::new(gateway)));
        let forwarder = tokio::spawn(forward_snapshots(
            Arc::clone(&controller),
            self.notify.clone(),
        ));
        self.active = Some(ActiveUser {
            controller: Arc::clone(&controller),
            forwarder,
        });
        self.notify.send(UiEvent::SignedIn(session.clone()));

        let notify = self.notify.clone();
        tokio::spawn(async move {
            if let Err(err) = controller.start(session.user_id).await {
                notify.error(UiErrorContext::LoadTodos, err.to_string());
            }
        });
    }

    fn spawn_item_op(&self, id: TodoId, context: UiErrorContext) {
        let Some(controller) = self.controller(context) else {
            return;
        };
        let notify = self.notify.clone();
        tokio::spawn(async move {
            let result = match context {
                UiErrorContext::ToggleTodo => controller.toggle(id).await.map(|_| ()),
                _ => controller.delete(id).await,
            };
            if let Err(err) = result {
                notify.error(context, err.to_string());
            }
        });
    }

    fn controller(&self, context: UiErrorContext) -> Option<Arc<TodoController>> {
        let controller = self
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.controller));
        if controller.is_none() {
            self.notify.error(context, "not signed in");
        }
        controller
    }

    fn release_session(&mut self) {
        if let Some(active) = self.active.take() {
            active.forwarder.abort();
            active.controller.stop();
        }
    }
}

/// Pushes a fresh snapshot to the UI every time the controller's state changes.
async fn forward_snapshots(controller: Arc<TodoController>, notify: UiNotifier) {
    let mut revision = controller.watch_revision();
    loop {
        revision.borrow_and_update();
        notify.send(UiEvent::Snapshot(controller.snapshot()));
        if revision.changed().await.is_err() {
            break;
        }
    }
}
