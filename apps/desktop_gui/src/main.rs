mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use crossbeam_channel::bounded;
use eframe::egui;
use tracing_subscriber::EnvFilter;

use backend_bridge::commands::BackendCommand;
use controller::events::UiEvent;
use ui::{PersistedSignIn, StartupConfig, TodoApp, SETTINGS_STORAGE_KEY};

#[derive(Parser, Debug)]
#[command(about = "Desktop client for the realtime todo list")]
struct Args {
    /// Todo server base URL.
    #[arg(long, env = "TODO_SERVER_URL")]
    server_url: Option<String>,
    /// Sign in with this email right after launch.
    #[arg(long)]
    email: Option<String>,
}

impl Args {
    fn into_startup(self, persisted: Option<PersistedSignIn>) -> StartupConfig {
        let persisted = persisted.unwrap_or_default();
        let defaults = StartupConfig::default();
        let server_url = self
            .server_url
            .or_else(|| Some(persisted.server_url).filter(|url| !url.trim().is_empty()))
            .unwrap_or(defaults.server_url);
        let auto_sign_in = self.email.is_some();
        let email = self.email.unwrap_or(persisted.email);
        StartupConfig {
            server_url,
            email,
            auto_sign_in,
        }
    }
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Todos")
            .with_inner_size([560.0, 720.0])
            .with_min_inner_size([380.0, 420.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Todos",
        options,
        Box::new(move |cc| {
            backend_bridge::runtime::launch(cmd_rx, ui_tx, cc.egui_ctx.clone());
            let persisted = cc.storage.and_then(|storage| {
                storage
                    .get_string(SETTINGS_STORAGE_KEY)
                    .and_then(|text| serde_json::from_str::<PersistedSignIn>(&text).ok())
            });
            Ok(Box::new(TodoApp::new(
                cmd_tx,
                ui_rx,
                args.into_startup(persisted),
            )))
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_wins_over_persisted_fields() {
        let args = Args::parse_from(["todo_desktop", "--server-url", "http://cli:1", "--email", "cli@example.com"]);
        let startup = args.into_startup(Some(PersistedSignIn {
            server_url: "http://saved:2".to_string(),
            email: "saved@example.com".to_string(),
        }));
        assert_eq!(startup.server_url, "http://cli:1");
        assert_eq!(startup.email, "cli@example.com");
        assert!(startup.auto_sign_in);
    }

    #[test]
    fn persisted_fields_prefill_without_auto_sign_in() {
        let args = Args {
            server_url: None,
            email: None,
        };
        let startup = args.into_startup(Some(PersistedSignIn {
            server_url: "http://saved:2".to_string(),
            email: "saved@example.com".to_string(),
        }));
        assert_eq!(startup.server_url, "http://saved:2");
        assert_eq!(startup.email, "saved@example.com");
        assert!(!startup.auto_sign_in);
    }

    #[test]
    fn falls_back_to_default_server() {
        let args = Args {
            server_url: None,
            email: None,
        };
        let startup = args.into_startup(None);
        assert_eq!(startup.server_url, ui::app::DEFAULT_SERVER_URL);
        assert!(startup.email.is_empty());
    }
}
