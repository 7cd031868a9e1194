use anyhow::{Context, Result};
use clap::Parser;
use eframe::egui;
use lan_monitor::api::ApiClient;
use lan_monitor::config::{config_dir, DashboardConfig, APP_DIR};
use lan_monitor::session::{SessionStore, SESSION_FILE};
use lan_monitor::store::DashboardStore;
use lan_monitor::ui::DashboardApp;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend origin, overrides the config file
    #[arg(short, long)]
    origin: Option<String>,

    /// Log filter such as `debug` or `lan_monitor=trace`
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(default_filter: &str) {
    // RUST_LOG wins over the configured level.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = DashboardConfig::load(args.config.as_deref())?;
    if let Some(origin) = args.origin {
        config.origin = origin;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level);
    info!(origin = %config.origin, "Starting LAN monitor dashboard");

    let sessions = SessionStore::in_config_dir()
        .unwrap_or_else(|| SessionStore::new(PathBuf::from(APP_DIR).join(SESSION_FILE)));
    let first_run = !sessions.path().exists();
    let mut session = sessions.load();
    if first_run {
        session.sync_data_interval = config.poll_interval().as_secs();
    }
    info!(
        path = %sessions.path().display(),
        config_dir = ?config_dir(),
        signed_in = session.access_token().is_some(),
        "Loaded session"
    );

    let api = ApiClient::new(&config.origin, config.request_timeout(), None)
        .context("Invalid backend origin")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    // Fetch tasks are spawned from the UI thread.
    let _guard = runtime.enter();

    let store = DashboardStore::new(api, sessions, session);
    let week_start = config.week_start;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1080.0, 720.0])
            .with_title("LAN Monitor"),
        ..Default::default()
    };

    eframe::run_native(
        "LAN Monitor",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::light());
            Box::new(DashboardApp::new(cc, store, week_start))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))
}
