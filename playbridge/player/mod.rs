pub mod command;
pub mod controller;
pub mod decoder;
pub mod gst_logic;
pub mod receiver;
pub mod status;
pub mod surface;

#[cfg(test)]
pub mod testing;

use crate::error::App;
use command::Command;
use decoder::DecoderEvent;
use log::info;
use status::StatusEvent;
use tokio::sync::{mpsc, oneshot};

pub use controller::Controller;
pub use receiver::CommandReceiver;

/// Everything the controller reacts to arrives through one inbox, so caller
/// commands, decoder callbacks and timers are applied strictly one at a time.
#[derive(Debug)]
pub enum Message {
    Request {
        command: Command,
        reply: oneshot::Sender<Result<(), App>>,
    },
    Decoder {
        cycle: u64,
        event: DecoderEvent,
    },
    PrepareTimeout {
        cycle: u64,
    },
    Query(oneshot::Sender<StatusEvent>),
    Shutdown(oneshot::Sender<()>),
}

pub type MessageSender = mpsc::UnboundedSender<Message>;
pub type MessageReceiver = mpsc::UnboundedReceiver<Message>;

pub async fn run(mut controller: Controller, mut messages: MessageReceiver) {
    info!("Playback controller started");
    while let Some(message) = messages.recv().await {
        if !controller.handle(message) {
            break;
        }
    }
    info!("Playback controller stopped");
}
