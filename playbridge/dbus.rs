use crate::error::App;
use crate::player::status::StatusEvent;
use crate::player::CommandReceiver;
use log::{info, warn};
use tokio::sync::{broadcast, watch};
use zbus::{fdo, interface, ConnectionBuilder, SignalContext};

pub const BUS_NAME: &str = "org.playbridge.Player";
pub const OBJECT_PATH: &str = "/org/playbridge/Player";

pub struct PlayerDBus {
    receiver: CommandReceiver,
    stop_signal: watch::Sender<()>,
}

#[interface(name = "org.playbridge.Player")]
impl PlayerDBus {
    #[allow(clippy::unused_self)]
    fn test_connection(&self) {}

    async fn play(&self, source: String) -> fdo::Result<()> {
        Ok(self.receiver.dispatch("play", Some(source.as_str())).await?)
    }

    async fn pause(&self) -> fdo::Result<()> {
        Ok(self.receiver.dispatch("pause", None).await?)
    }

    async fn stop(&self) -> fdo::Result<()> {
        Ok(self.receiver.dispatch("stop", None).await?)
    }

    async fn next(&self) -> fdo::Result<()> {
        Ok(self.receiver.dispatch("next", None).await?)
    }

    async fn previous(&self) -> fdo::Result<()> {
        Ok(self.receiver.dispatch("previous", None).await?)
    }

    /// Raw entry point; an empty payload counts as absent.
    async fn dispatch(&self, command: String, payload: String) -> fdo::Result<()> {
        let payload = (!payload.is_empty()).then_some(payload.as_str());
        Ok(self.receiver.dispatch(&command, payload).await?)
    }

    async fn status(&self) -> fdo::Result<String> {
        let status = self.receiver.status().await?;
        Ok(serde_json::to_string(&status).map_err(App::from)?)
    }

    fn quit(&self) -> fdo::Result<()> {
        info!("Quit requested over DBus");
        self.stop_signal
            .send(())
            .map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    #[zbus(signal)]
    async fn state_changed(
        ctxt: &SignalContext<'_>,
        state: &str,
        source: &str,
        error: &str,
    ) -> zbus::Result<()>;
}

pub async fn run_dbus_server(
    receiver: CommandReceiver,
    mut events: broadcast::Receiver<StatusEvent>,
    stop_signal: watch::Sender<()>,
) -> Result<(), App> {
    let player_dbus = PlayerDBus {
        receiver,
        stop_signal: stop_signal.clone(),
    };

    let connection = ConnectionBuilder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, player_dbus)?
        .build()
        .await?;
    let iface = connection
        .object_server()
        .interface::<_, PlayerDBus>(OBJECT_PATH)
        .await?;
    info!("DBus service {} ready", BUS_NAME);

    let mut stop_receiver = stop_signal.subscribe();
    loop {
        tokio::select! {
            _ = stop_receiver.changed() => {
                info!("Stop signal received, shutting down DBus server...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let source = event.source.as_ref().map_or("", |source| source.as_str());
                    let error = event.error.as_deref().unwrap_or("");
                    if let Err(e) = PlayerDBus::state_changed(
                        iface.signal_context(),
                        event.state.as_str(),
                        source,
                        error,
                    )
                    .await
                    {
                        warn!("Failed to emit StateChanged: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} status events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let _ = stop_receiver.changed().await;
                    break;
                }
            }
        }
    }

    Ok(())
}
