use crate::error::App;
use crate::player::command::Command;
use crate::player::status::StatusEvent;
use crate::player::{Message, MessageSender};
use log::info;
use tokio::sync::oneshot;

/// Entry point for every command, whether it comes from D-Bus or from a
/// notification action. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CommandReceiver {
    inbox: MessageSender,
}

impl CommandReceiver {
    pub fn new(inbox: MessageSender) -> Self {
        Self { inbox }
    }

    /// Validates `command` and forwards it to the controller. Rejected
    /// commands never reach the controller.
    pub async fn dispatch(&self, command: &str, payload: Option<&str>) -> Result<(), App> {
        let command = Command::parse(command, payload)?;
        info!("Dispatching {}", command.name());
        self.send(command).await
    }

    pub async fn send(&self, command: Command) -> Result<(), App> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Message::Request { command, reply })
            .map_err(|_| App::ControllerUnavailable)?;
        response.await.map_err(|_| App::ControllerUnavailable)?
    }

    pub async fn status(&self) -> Result<StatusEvent, App> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Message::Query(reply))
            .map_err(|_| App::ControllerUnavailable)?;
        response.await.map_err(|_| App::ControllerUnavailable)
    }

    pub async fn shutdown(&self) -> Result<(), App> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Message::Shutdown(reply))
            .map_err(|_| App::ControllerUnavailable)?;
        response.await.map_err(|_| App::ControllerUnavailable)
    }
}
