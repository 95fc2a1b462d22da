use crate::error::App;
use crate::player::command::Source;
use crate::player::controller::Controller;
use crate::player::decoder::{Backend, Decoder, DecoderEvent, EventSink};
use crate::player::status::StatusEvent;
use crate::player::surface::{StatusSurface, SurfaceView};
use crate::player::{MessageReceiver, MessageSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    pub journal: Journal,
    failing: Arc<Mutex<Option<&'static str>>>,
    sink: Arc<Mutex<Option<EventSink>>>,
}

impl FakeBackend {
    /// Makes every later call to `operation` fail.
    pub fn fail_on(&self, operation: &'static str) {
        *self.failing.lock().unwrap() = Some(operation);
    }

    pub fn last_sink(&self) -> Option<EventSink> {
        self.sink.lock().unwrap().clone()
    }

    pub fn emit(&self, event: DecoderEvent) {
        self.last_sink()
            .expect("no prepare cycle started")
            .emit(event);
    }

    pub fn live_decoders(&self) -> usize {
        self.journal.count("create") - self.journal.count("release")
    }

    fn check(&self, operation: &str) -> Result<(), App> {
        if *self.failing.lock().unwrap() == Some(operation) {
            return Err(App::DecoderFailure(format!("{operation} failed")));
        }
        Ok(())
    }
}

impl Backend for FakeBackend {
    fn create(&self) -> Result<Box<dyn Decoder>, App> {
        self.check("create")?;
        self.journal.record("create");
        Ok(Box::new(FakeDecoder {
            backend: self.clone(),
        }))
    }
}

struct FakeDecoder {
    backend: FakeBackend,
}

impl FakeDecoder {
    fn op(&self, entry: String, operation: &str) -> Result<(), App> {
        self.backend.journal.record(entry);
        self.backend.check(operation)
    }
}

impl Decoder for FakeDecoder {
    fn set_source(&mut self, source: &Source) -> Result<(), App> {
        self.op(format!("set_source {source}"), "set_source")
    }

    fn prepare(&mut self, sink: EventSink) -> Result<(), App> {
        let cycle = sink.cycle();
        *self.backend.sink.lock().unwrap() = Some(sink);
        self.op(format!("prepare {cycle}"), "prepare")
    }

    fn start(&mut self) -> Result<(), App> {
        self.op("start".to_string(), "start")
    }

    fn pause(&mut self) -> Result<(), App> {
        self.op("pause".to_string(), "pause")
    }

    fn stop(&mut self) -> Result<(), App> {
        self.op("stop".to_string(), "stop")
    }

    fn reset(&mut self) -> Result<(), App> {
        self.op("reset".to_string(), "reset")
    }

    fn release(self: Box<Self>) {
        self.backend.journal.record("release");
    }
}

#[derive(Clone, Default)]
pub struct RecordingSurface {
    current: Arc<Mutex<Option<SurfaceView>>>,
}

impl RecordingSurface {
    pub fn is_visible(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    pub fn current(&self) -> Option<SurfaceView> {
        self.current.lock().unwrap().clone()
    }
}

impl StatusSurface for RecordingSurface {
    fn show(&mut self, view: &SurfaceView) {
        *self.current.lock().unwrap() = Some(view.clone());
    }

    fn clear(&mut self) {
        *self.current.lock().unwrap() = None;
    }
}

/// A controller wired to fakes, driven by hand instead of by `run`.
pub struct Harness {
    pub controller: Controller,
    pub backend: FakeBackend,
    pub surface: RecordingSurface,
    pub messages: MessageReceiver,
    pub inbox: MessageSender,
    pub events: broadcast::Receiver<StatusEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    pub fn with_timeout(prepare_timeout: Option<Duration>) -> Self {
        let backend = FakeBackend::default();
        let surface = RecordingSurface::default();
        let (inbox, messages) = mpsc::unbounded_channel();
        let (events_sender, events) = broadcast::channel(64);
        let controller = Controller::new(
            Box::new(backend.clone()),
            Box::new(surface.clone()),
            inbox.clone(),
            events_sender,
            prepare_timeout,
        );
        Self {
            controller,
            backend,
            surface,
            messages,
            inbox,
            events,
        }
    }

    /// Applies every message already waiting in the inbox.
    pub fn pump(&mut self) {
        while let Ok(message) = self.messages.try_recv() {
            self.controller.handle(message);
        }
    }

    pub fn last_event(&mut self) -> Option<StatusEvent> {
        let mut last = None;
        while let Ok(event) = self.events.try_recv() {
            last = Some(event);
        }
        last
    }
}
