use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use serde::{Deserialize, Serialize};
use shared::{
    domain::TodoId,
    protocol::{Session, Todo},
};

use client_core::TodoSnapshot;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorCategory, UiEvent};
use crate::controller::orchestration::dispatch_backend_command;

pub const SETTINGS_STORAGE_KEY: &str = "todo_desktop_settings";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8787";

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub server_url: String,
    pub email: String,
    /// Sign in immediately instead of waiting on the sign-in screen.
    pub auto_sign_in: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            email: String::new(),
            auto_sign_in: false,
        }
    }
}

/// Sign-in fields remembered between launches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSignIn {
    pub server_url: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppView {
    SignIn,
    Dashboard,
}

#[derive(Debug, Clone)]
struct StatusBanner {
    message: String,
}

fn err_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Auth => "Authentication",
        UiErrorCategory::Transport => "Transport",
        UiErrorCategory::Validation => "Validation",
        UiErrorCategory::Unknown => "Unexpected",
    }
}

enum RowAction {
    Toggle(TodoId),
    Delete(TodoId),
}

pub struct TodoApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    view: AppView,
    server_url: String,
    email: String,
    session: Option<Session>,
    snapshot: TodoSnapshot,
    new_title: String,
    status: String,
    status_banner: Option<StatusBanner>,
    signing_in: bool,
}

impl TodoApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        startup: StartupConfig,
    ) -> Self {
        let mut app = Self {
            cmd_tx,
            ui_rx,
            view: AppView::SignIn,
            server_url: startup.server_url,
            email: startup.email,
            session: None,
            snapshot: TodoSnapshot::default(),
            new_title: String::new(),
            status: "Not signed in".to_string(),
            status_banner: None,
            signing_in: false,
        };
        if startup.auto_sign_in {
            app.try_sign_in();
        }
        app
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Info(message) => self.status = message,
            UiEvent::SignedIn(session) => {
                self.status = format!("Signed in as {}", session.email);
                self.status_banner = None;
                self.signing_in = false;
                self.snapshot = TodoSnapshot {
                    user_id: Some(session.user_id),
                    loading: true,
                    todos: Vec::new(),
                };
                self.new_title.clear();
                self.session = Some(session);
                self.view = AppView::Dashboard;
            }
            UiEvent::SignedOut => self.reset_to_sign_in("Signed out"),
            UiEvent::Snapshot(snapshot) => {
                let current_user = self.session.as_ref().map(|session| session.user_id);
                if snapshot.user_id.is_some() && snapshot.user_id == current_user {
                    self.snapshot = snapshot;
                }
            }
            UiEvent::TodoAdded => self.new_title.clear(),
            UiEvent::Error(err) => self.show_error(err),
        }
    }

    fn show_error(&mut self, err: UiError) {
        tracing::warn!(context = ?err.context(), "{}", err.message());
        self.signing_in = false;
        if err.requires_reauth() {
            self.dispatch(BackendCommand::SignOut);
            self.reset_to_sign_in("Session is no longer valid");
        }
        self.status = format!("{} error: {}", err_label(err.category()), err.message());
        self.status_banner = Some(StatusBanner {
            message: err.message().to_string(),
        });
    }

    fn reset_to_sign_in(&mut self, status: &str) {
        self.view = AppView::SignIn;
        self.session = None;
        self.snapshot = TodoSnapshot::default();
        self.new_title.clear();
        self.signing_in = false;
        self.status = status.to_string();
    }

    fn dispatch(&mut self, cmd: BackendCommand) {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.status);
    }

    fn can_add(&self) -> bool {
        !self.new_title.trim().is_empty()
    }

    fn try_sign_in(&mut self) {
        let server_url = self.server_url.trim().to_string();
        let email = self.email.trim().to_string();
        if server_url.is_empty() || email.is_empty() {
            self.status_banner = Some(StatusBanner {
                message: "Server URL and email are required.".to_string(),
            });
            return;
        }
        self.status_banner = None;
        self.signing_in = true;
        self.status = format!("Signing in to {server_url}...");
        self.dispatch(BackendCommand::SignIn { server_url, email });
    }

    fn submit_new_todo(&mut self) {
        if !self.can_add() {
            return;
        }
        let title = self.new_title.trim().to_string();
        self.dispatch(BackendCommand::AddTodo { title });
    }

    fn sign_out(&mut self) {
        self.dispatch(BackendCommand::SignOut);
        self.reset_to_sign_in("Signing out...");
    }

    fn show_status_banner(&mut self, ui: &mut egui::Ui) {
        if let Some(banner) = self.status_banner.clone() {
            egui::Frame::NONE
                .fill(egui::Color32::from_rgb(111, 53, 53))
                .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(175, 96, 96)))
                .corner_radius(8.0)
                .inner_margin(egui::Margin::symmetric(10, 8))
                .show(ui, |ui| {
                    ui.horizontal_wrapped(|ui| {
                        ui.label(egui::RichText::new(&banner.message).color(egui::Color32::WHITE));
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("Dismiss").clicked() {
                                self.status_banner = None;
                            }
                        });
                    });
                });
        }
    }

    fn show_sign_in_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let avail = ui.available_size();
            let card_width = avail.x.clamp(360.0, 480.0);
            ui.add_space((avail.y * 0.12).clamp(18.0, 90.0));

            ui.vertical_centered(|ui| {
                ui.set_width(card_width);
                egui::Frame::NONE
                    .fill(ui.visuals().faint_bg_color)
                    .corner_radius(14.0)
                    .stroke(egui::Stroke::new(
                        1.0,
                        ui.visuals().widgets.noninteractive.bg_stroke.color,
                    ))
                    .inner_margin(egui::Margin::symmetric(20, 18))
                    .show(ui, |ui| {
                        ui.style_mut().spacing.item_spacing = egui::vec2(10.0, 10.0);
                        ui.heading("Todos");
                        ui.weak("Sign in to see your list.");
                        self.show_status_banner(ui);

                        ui.label("Server URL");
                        let server_resp = ui.add(
                            egui::TextEdit::singleline(&mut self.server_url)
                                .hint_text(DEFAULT_SERVER_URL)
                                .desired_width(f32::INFINITY),
                        );
                        ui.label("Email");
                        let email_resp = ui.add(
                            egui::TextEdit::singleline(&mut self.email)
                                .hint_text("alice@example.com")
                                .desired_width(f32::INFINITY),
                        );

                        let enter_pressed = ctx.input(|i| i.key_pressed(egui::Key::Enter));
                        let field_submitted = server_resp.lost_focus() || email_resp.lost_focus();
                        let button = egui::Button::new(egui::RichText::new("Sign in").strong())
                            .min_size(egui::vec2(ui.available_width(), 36.0));
                        let clicked = ui.add_enabled(!self.signing_in, button).clicked();
                        if !self.signing_in && (clicked || (field_submitted && enter_pressed)) {
                            self.try_sign_in();
                        }

                        ui.separator();
                        ui.horizontal_wrapped(|ui| {
                            ui.small("Status:");
                            ui.small(egui::RichText::new(&self.status).weak());
                        });
                    });
            });
        });
    }

    fn show_dashboard(&mut self, ctx: &egui::Context) {
        let email = self
            .session
            .as_ref()
            .map(|session| session.email.clone())
            .unwrap_or_default();

        egui::TopBottomPanel::top("dashboard_header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(format!("Welcome, {email}"));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Sign out").clicked() {
                        self.sign_out();
                    }
                });
            });
        });

        egui::TopBottomPanel::bottom("dashboard_status").show(ctx, |ui| {
            ui.small(egui::RichText::new(&self.status).weak());
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_status_banner(ui);

            ui.horizontal(|ui| {
                let input = ui.add(
                    egui::TextEdit::singleline(&mut self.new_title)
                        .hint_text("What needs to be done?")
                        .desired_width(ui.available_width() - 60.0),
                );
                let enter_pressed = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                let clicked = ui.add_enabled(self.can_add(), egui::Button::new("Add")).clicked();
                if clicked || enter_pressed {
                    self.submit_new_todo();
                    input.request_focus();
                }
            });
            ui.separator();

            if self.snapshot.loading {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading...");
                });
                return;
            }
            if self.snapshot.todos.is_empty() {
                ui.weak("No todos yet");
                return;
            }

            let mut actions = Vec::new();
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for todo in &self.snapshot.todos {
                        if let Some(action) = todo_row(ui, todo) {
                            actions.push(action);
                        }
                    }
                });
            for action in actions {
                match action {
                    RowAction::Toggle(id) => self.dispatch(BackendCommand::ToggleTodo { id }),
                    RowAction::Delete(id) => self.dispatch(BackendCommand::DeleteTodo { id }),
                }
            }
        });
    }
}

fn todo_row(ui: &mut egui::Ui, todo: &Todo) -> Option<RowAction> {
    let mut action = None;
    ui.horizontal(|ui| {
        let mut completed = todo.completed;
        let title = if todo.completed {
            egui::RichText::new(&todo.title).strikethrough().weak()
        } else {
            egui::RichText::new(&todo.title)
        };
        if ui.checkbox(&mut completed, title).changed() {
            action = Some(RowAction::Toggle(todo.id));
        }
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.small_button("Delete").clicked() {
                action = Some(RowAction::Delete(todo.id));
            }
        });
    });
    action
}

impl eframe::App for TodoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();

        match self.view {
            AppView::SignIn => self.show_sign_in_screen(ctx),
            AppView::Dashboard => self.show_dashboard(ctx),
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let settings = PersistedSignIn {
            server_url: self.server_url.clone(),
            email: self.email.clone(),
        };
        if let Ok(serialized) = serde_json::to_string(&settings) {
            storage.set_string(SETTINGS_STORAGE_KEY, serialized);
        }
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
