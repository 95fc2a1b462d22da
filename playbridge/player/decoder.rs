use crate::error::App;
use crate::player::command::Source;
use crate::player::{Message, MessageSender};
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    Ready,
    Completed,
    Failed(String),
}

/// Where a decoder reports asynchronous progress for one prepare cycle.
#[derive(Debug, Clone)]
pub struct EventSink {
    cycle: u64,
    inbox: MessageSender,
}

impl EventSink {
    pub fn new(cycle: u64, inbox: MessageSender) -> Self {
        Self { cycle, inbox }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Safe to call from any thread.
    pub fn emit(&self, event: DecoderEvent) {
        let message = Message::Decoder {
            cycle: self.cycle,
            event,
        };
        if self.inbox.send(message).is_err() {
            debug!("Controller is gone, dropping decoder event");
        }
    }
}

/// One decoding session. Calls come only from the controller task.
pub trait Decoder: Send {
    fn set_source(&mut self, source: &Source) -> Result<(), App>;

    /// Starts preparing the current source. Returns as soon as the request is
    /// issued; readiness is reported through `sink`.
    fn prepare(&mut self, sink: EventSink) -> Result<(), App>;

    fn start(&mut self) -> Result<(), App>;

    fn pause(&mut self) -> Result<(), App>;

    fn stop(&mut self) -> Result<(), App>;

    /// Drops the current source and any in-flight prepare so the session can
    /// be reused.
    fn reset(&mut self) -> Result<(), App>;

    fn release(self: Box<Self>);
}

pub trait Backend: Send {
    fn create(&self) -> Result<Box<dyn Decoder>, App>;
}
