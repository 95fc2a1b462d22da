mod error;

use clap::{Parser, Subcommand};
use error::App;
use futures_util::stream::StreamExt;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;
use zbus::{proxy, Connection};

type StdResult<T> = std::result::Result<T, App>;

#[proxy(
    interface = "org.playbridge.Player",
    default_service = "org.playbridge.Player",
    default_path = "/org/playbridge/Player"
)]
trait Player {
    async fn test_connection(&self) -> zbus::Result<()>;
    async fn play(&self, source: &str) -> zbus::Result<()>;
    async fn pause(&self) -> zbus::Result<()>;
    async fn stop(&self) -> zbus::Result<()>;
    async fn next(&self) -> zbus::Result<()>;
    async fn previous(&self) -> zbus::Result<()>;
    async fn dispatch(&self, command: &str, payload: &str) -> zbus::Result<()>;
    async fn status(&self) -> zbus::Result<String>;
    async fn quit(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn state_changed(&self, state: String, source: String, error: String) -> zbus::Result<()>;
}

#[derive(Parser)]
#[command(name = "pbctl", about = "Control the playbridge player.", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Play a URL or local file from the beginning")]
    Play { source: String },

    #[command(about = "Pause playback")]
    Pause,

    #[command(about = "Stop playback and remove the notification")]
    Stop,

    #[command(about = "Skip to the next track")]
    Next,

    #[command(about = "Go back to the previous track")]
    Previous,

    #[command(about = "Send a raw command identifier with an optional payload")]
    Send {
        command: String,
        payload: Option<String>,
    },

    #[command(about = "Show the current playback state")]
    Status,

    #[command(about = "Print state changes as they happen")]
    Watch,

    #[command(about = "Start playbridge in the background")]
    Start,

    #[command(about = "Shut playbridge down")]
    Quit,
}

#[derive(Deserialize)]
struct Status {
    state: String,
    source: Option<String>,
}

#[tokio::main]
async fn main() -> StdResult<()> {
    let cli = Cli::parse();
    let connection = Connection::session().await?;
    let proxy = PlayerProxy::new(&connection).await?;
    handle_command(cli, proxy).await
}

async fn handle_command(cli: Cli, proxy: PlayerProxy<'_>) -> StdResult<()> {
    match cli.command {
        Commands::Start => start_playbridge(&proxy).await,
        command => {
            ensure_running(&proxy).await?;
            send_command(command, &proxy).await
        }
    }
}

async fn send_command(command: Commands, proxy: &PlayerProxy<'_>) -> StdResult<()> {
    match command {
        Commands::Play { source } => {
            let source = resolve_source(&source)?;
            proxy.play(&source).await?;
            println!("Loading {source}");
        }
        Commands::Pause => {
            proxy.pause().await?;
            println!("Paused");
        }
        Commands::Stop => {
            proxy.stop().await?;
            println!("Stopped");
        }
        Commands::Next => proxy.next().await?,
        Commands::Previous => proxy.previous().await?,
        Commands::Send { command, payload } => {
            proxy
                .dispatch(&command, payload.as_deref().unwrap_or(""))
                .await?;
        }
        Commands::Status => display_status(proxy).await?,
        Commands::Watch => watch_states(proxy).await?,
        Commands::Quit => {
            proxy.quit().await?;
            println!("playbridge has exited");
        }
        Commands::Start => start_playbridge(proxy).await?,
    }
    Ok(())
}

async fn is_playbridge_running(proxy: &PlayerProxy<'_>) -> bool {
    proxy.test_connection().await.is_ok()
}

async fn ensure_running(proxy: &PlayerProxy<'_>) -> StdResult<()> {
    if is_playbridge_running(proxy).await {
        Ok(())
    } else {
        Err(App::ControllerUnavailable)
    }
}

/// URIs are sent as-is; anything else is treated as a local path and made
/// absolute, since the daemon does not share our working directory.
fn resolve_source(source: &str) -> StdResult<String> {
    if source.trim().is_empty() {
        return Err(App::InvalidInput("source must not be empty".to_string()));
    }
    if source.contains("://") {
        return Ok(source.to_string());
    }
    let path = Path::new(source).canonicalize()?;
    path.to_str()
        .map(ToString::to_string)
        .ok_or_else(|| App::InvalidInput(format!("{} is not valid UTF-8", path.display())))
}

fn format_status(state: &str, source: Option<&str>) -> String {
    match source {
        Some(source) if !source.is_empty() => format!("{state}: {source}"),
        _ => state.to_string(),
    }
}

async fn display_status(proxy: &PlayerProxy<'_>) -> StdResult<()> {
    let status: Status = serde_json::from_str(&proxy.status().await?)?;
    println!("{}", format_status(&status.state, status.source.as_deref()));
    Ok(())
}

async fn watch_states(proxy: &PlayerProxy<'_>) -> StdResult<()> {
    let mut changes = proxy.receive_state_changed().await?;
    while let Some(change) = changes.next().await {
        let args = change.args()?;
        println!("{}", format_status(args.state(), Some(args.source().as_str())));
        if !args.error().is_empty() {
            eprintln!("  error: {}", args.error());
        }
    }
    Ok(())
}

async fn start_playbridge(proxy: &PlayerProxy<'_>) -> StdResult<()> {
    if is_playbridge_running(proxy).await {
        println!("playbridge is already running");
        return Ok(());
    }

    let current_exe_path = std::env::current_exe()?;
    let exe_dir = current_exe_path.parent().ok_or_else(|| {
        App::InvalidInput("Failed to get the directory of the executable".to_string())
    })?;
    let playbridge_path = exe_dir.join("playbridge");

    if !playbridge_path.exists() {
        return Err(App::InvalidInput(
            "playbridge executable not found in the same directory".to_string(),
        ));
    }

    let child = Command::new(playbridge_path).spawn()?;
    println!("playbridge started, process ID: {:?}", child.id());
    Ok(())
}
