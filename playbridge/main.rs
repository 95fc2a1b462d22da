mod config;
mod dbus;
mod error;
mod notification;
mod player;

use crate::config::Config;
use crate::error::App;
use crate::player::gst_logic::GstBackend;
use crate::player::surface::{NullSurface, StatusSurface};
use crate::player::{CommandReceiver, Controller};
use clap::Parser;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::fs;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{self, JoinHandle};

#[derive(Parser)]
#[command(
    name = "playbridge",
    about = "Background audio player controlled over DBus.",
    version
)]
struct Args {
    #[arg(long, help = "Path to config.toml")]
    config: Option<PathBuf>,

    #[arg(long, help = "Log level, overrides the config file")]
    log_level: Option<String>,

    #[arg(long, help = "Seconds to wait for a source to become playable, 0 disables")]
    prepare_timeout: Option<u64>,

    #[arg(long, help = "Do not show a desktop notification")]
    no_notification: bool,

    #[arg(long, help = "Also write logs to stderr")]
    foreground: bool,
}

#[tokio::main]
async fn main() -> Result<(), App> {
    let args = Args::parse();
    let home_dir = std::env::var("HOME")
        .map_err(|e| App::Io(format!("Failed to get HOME environment variable: {e}")))?;
    let config_dir = PathBuf::from(home_dir).join(".config/playbridge");
    let log_dir = config_dir.join("logs");
    fs::create_dir_all(&log_dir).await?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path).await?;
    if let Some(level) = args.log_level.clone() {
        config.log_level = level;
    }
    if let Some(secs) = args.prepare_timeout {
        config.prepare_timeout_secs = secs;
    }
    if args.no_notification {
        config.notification.enabled = false;
    }

    let _logger = Logger::try_with_str(&config.log_level)?
        .log_to_file(FileSpec::default().directory(&log_dir))
        .rotate(
            Criterion::Size(1_000_000),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(3),
        )
        .duplicate_to_stderr(if args.foreground {
            Duplicate::All
        } else {
            Duplicate::None
        })
        .start()?;
    info!("Loaded configuration from {}", config_path.display());

    let backend = GstBackend::new()?;
    let (inbox, messages) = mpsc::unbounded_channel();
    let receiver = CommandReceiver::new(inbox.clone());
    let (surface, notifier_task) = start_surface(&config, receiver.clone()).await;
    let (events, _) = broadcast::channel(32);

    let controller = Controller::new(
        Box::new(backend),
        surface,
        inbox,
        events.clone(),
        config.prepare_timeout(),
    );
    let controller_task = task::spawn(player::run(controller, messages));

    let (stop_sender, mut stop_receiver) = watch::channel(());
    task::spawn({
        let receiver = receiver.clone();
        let events = events.subscribe();
        let stop_signal = stop_sender.clone();
        async move {
            if let Err(e) = dbus::run_dbus_server(receiver, events, stop_signal.clone()).await {
                error!("DBus server error: {}", e);
                let _ = stop_signal.send(());
            }
        }
    });

    wait_for_shutdown(&mut stop_receiver).await?;

    if let Err(e) = receiver.shutdown().await {
        warn!("Controller was already gone: {}", e);
    }
    if let Err(e) = controller_task.await {
        error!("Controller task failed: {}", e);
    }
    // Lets the notifier remove the notification before the runtime goes away.
    if let Some(notifier_task) = notifier_task {
        let _ = notifier_task.await;
    }
    info!("playbridge exited");
    Ok(())
}

async fn start_surface(
    config: &Config,
    receiver: CommandReceiver,
) -> (Box<dyn StatusSurface>, Option<JoinHandle<()>>) {
    if !config.notification.enabled {
        info!("Desktop notifications disabled");
        return (Box::new(NullSurface), None);
    }
    match notification::spawn_notifier(config.notification.clone(), receiver).await {
        Ok((notifier, updater)) => (Box::new(notifier), Some(updater)),
        Err(e) => {
            warn!("Desktop notifications unavailable: {}", e);
            (Box::new(NullSurface), None)
        }
    }
}

async fn wait_for_shutdown(stop_receiver: &mut watch::Receiver<()>) -> Result<(), App> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = stop_receiver.changed() => info!("Quit requested"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = terminate.recv() => info!("Terminated"),
    }
    Ok(())
}
