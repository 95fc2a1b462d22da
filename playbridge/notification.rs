use crate::config::NotificationConfig;
use crate::error::App;
use crate::player::command::Source;
use crate::player::surface::{Action, StatusSurface, SurfaceView};
use crate::player::CommandReceiver;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle};
use zbus::zvariant::Value;
use zbus::{proxy, Connection};

#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    #[allow(clippy::too_many_arguments)]
    async fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: &HashMap<&str, &Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    async fn close_notification(&self, id: u32) -> zbus::Result<()>;

    #[zbus(signal)]
    fn action_invoked(&self, id: u32, action_key: String) -> zbus::Result<()>;
}

enum Update {
    Show(SurfaceView),
    Clear,
}

#[derive(Clone, Debug)]
struct Shown {
    id: u32,
    source: Source,
}

/// Status surface backed by the desktop notification server. Updates are
/// handed to a background task so the controller never waits on D-Bus. The
/// task drains pending updates and exits once the notifier is dropped.
pub struct DesktopNotifier {
    updates: mpsc::UnboundedSender<Update>,
}

impl StatusSurface for DesktopNotifier {
    fn show(&mut self, view: &SurfaceView) {
        if self.updates.send(Update::Show(view.clone())).is_err() {
            warn!("Notification task is gone, cannot show status");
        }
    }

    fn clear(&mut self) {
        if self.updates.send(Update::Clear).is_err() {
            warn!("Notification task is gone, cannot clear status");
        }
    }
}

pub async fn spawn_notifier(
    config: NotificationConfig,
    receiver: CommandReceiver,
) -> Result<(DesktopNotifier, JoinHandle<()>), App> {
    let connection = Connection::session().await?;
    let proxy = NotificationsProxy::new(&connection).await?;
    let actions = proxy.receive_action_invoked().await?;

    let (updates, update_receiver) = mpsc::unbounded_channel();
    let (shown, shown_receiver) = watch::channel(None);

    let updater = task::spawn(apply_updates(proxy, config, update_receiver, shown));
    task::spawn(async move {
        forward_actions(actions, shown_receiver, receiver).await;
        debug!("Notification action stream ended");
    });

    info!("Desktop notifications enabled");
    Ok((DesktopNotifier { updates }, updater))
}

/// Flattens the actions into the `[key, label, ...]` list the server expects.
fn action_list(view: &SurfaceView) -> Vec<&'static str> {
    view.actions
        .iter()
        .flat_map(|action| [action.key(), action.label()])
        .collect()
}

async fn apply_updates(
    proxy: NotificationsProxy<'_>,
    config: NotificationConfig,
    mut updates: mpsc::UnboundedReceiver<Update>,
    shown: watch::Sender<Option<Shown>>,
) {
    while let Some(update) = updates.recv().await {
        match update {
            Update::Show(view) => {
                let replaces_id = shown.borrow().as_ref().map_or(0, |current| current.id);
                let resident = Value::from(true);
                let low_urgency = Value::from(0u8);
                let category = Value::from("x-playbridge.playback");
                let hints = HashMap::from([
                    ("resident", &resident),
                    ("urgency", &low_urgency),
                    ("category", &category),
                ]);
                let result = proxy
                    .notify(
                        &config.app_name,
                        replaces_id,
                        &config.icon,
                        &config.title,
                        &view.body(),
                        &action_list(&view),
                        &hints,
                        0,
                    )
                    .await;
                match result {
                    Ok(id) => {
                        shown.send_replace(Some(Shown {
                            id,
                            source: view.source,
                        }));
                    }
                    Err(e) => warn!("Failed to show notification: {}", e),
                }
            }
            Update::Clear => {
                if let Some(current) = shown.send_replace(None) {
                    if let Err(e) = proxy.close_notification(current.id).await {
                        warn!("Failed to close notification: {}", e);
                    }
                }
            }
        }
    }
}

/// Maps a button press on notification `id` to the command it stands for.
/// Play re-submits the source currently on display, since the button itself
/// carries no payload.
fn command_for(
    action_key: &str,
    id: u32,
    shown: Option<&Shown>,
) -> Option<(Action, Option<String>)> {
    let current = shown.filter(|current| current.id == id)?;
    let action = Action::from_key(action_key)?;
    let payload = (action == Action::Play).then(|| current.source.to_string());
    Some((action, payload))
}

async fn forward_actions(
    mut actions: ActionInvokedStream<'_>,
    shown: watch::Receiver<Option<Shown>>,
    receiver: CommandReceiver,
) {
    while let Some(signal) = actions.next().await {
        let args = match signal.args() {
            Ok(args) => args,
            Err(e) => {
                warn!("Malformed ActionInvoked signal: {}", e);
                continue;
            }
        };
        let current = shown.borrow().clone();
        let Some((action, payload)) = command_for(args.action_key(), *args.id(), current.as_ref())
        else {
            debug!("Ignoring notification action {} on {}", args.action_key(), args.id());
            continue;
        };

        if let Err(e) = receiver.dispatch(action.key(), payload.as_deref()).await {
            error!("Notification action {} failed: {}", action.key(), e);
        }
    }
}
