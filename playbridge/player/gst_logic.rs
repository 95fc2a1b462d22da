use crate::error::App;
use crate::player::command::Source;
use crate::player::decoder::{Backend, Decoder, DecoderEvent, EventSink};
use gstreamer::prelude::*;
use gstreamer::{Bus, BusSyncReply, Element, Message, MessageView, State, StateChangeSuccess};
use log::{debug, error, info};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

pub struct GstBackend;

impl GstBackend {
    pub fn new() -> Result<Self, App> {
        gstreamer::init().map_err(|e| App::Init(e.to_string()))?;
        info!("GStreamer initialized: {}", gstreamer::version_string());
        Ok(Self)
    }
}

impl Backend for GstBackend {
    fn create(&self) -> Result<Box<dyn Decoder>, App> {
        Ok(Box::new(GstDecoder::new()?))
    }
}

/// Hands bus messages to the sink of the prepare cycle that was current when
/// the message was posted. Runs on the posting thread, so nothing posted
/// before the sink is replaced can be attributed to a later cycle.
#[derive(Clone, Default)]
struct BusRelay {
    sink: Arc<Mutex<Option<EventSink>>>,
}

impl BusRelay {
    fn install(&self, sink: Option<EventSink>) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    fn forward(&self, event: DecoderEvent) {
        match self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(sink) => sink.emit(event),
            None => debug!("No prepare cycle active, dropping {:?}", event),
        }
    }
}

/// A `playbin` pipeline whose bus feeds the current prepare cycle.
pub struct GstDecoder {
    playbin: Element,
    bus: Bus,
    relay: BusRelay,
}

impl GstDecoder {
    fn new() -> Result<Self, App> {
        let playbin = gstreamer::ElementFactory::make("playbin")
            .build()
            .map_err(|_| App::Init("Failed to create playbin element".to_string()))?;
        let bus = playbin
            .bus()
            .ok_or_else(|| App::Init("Failed to get GStreamer bus".to_string()))?;

        let relay = BusRelay::default();
        bus.set_sync_handler({
            let relay = relay.clone();
            move |_, msg| {
                if let Some(event) = event_for(msg) {
                    relay.forward(event);
                }
                BusSyncReply::Drop
            }
        });
        info!("GStreamer pipeline created");

        Ok(Self {
            playbin,
            bus,
            relay,
        })
    }

    fn set_state(&self, state: State) -> Result<StateChangeSuccess, App> {
        self.playbin
            .set_state(state)
            .map_err(|_| App::DecoderFailure(format!("Failed to set pipeline to {state:?}")))
    }
}

impl Decoder for GstDecoder {
    fn set_source(&mut self, source: &Source) -> Result<(), App> {
        let uri = to_uri(source)?;
        debug!("Setting playbin uri to {}", uri);
        self.playbin.set_property("uri", uri.as_str());
        Ok(())
    }

    fn prepare(&mut self, sink: EventSink) -> Result<(), App> {
        debug!("Preparing cycle {}", sink.cycle());
        self.relay.install(Some(sink.clone()));
        match self.set_state(State::Paused)? {
            StateChangeSuccess::Async => {}
            // Prerolled synchronously or a live source that never prerolls.
            StateChangeSuccess::Success | StateChangeSuccess::NoPreroll => {
                sink.emit(DecoderEvent::Ready);
            }
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), App> {
        self.set_state(State::Playing).map(|_| ())
    }

    fn pause(&mut self) -> Result<(), App> {
        self.set_state(State::Paused).map(|_| ())
    }

    fn stop(&mut self) -> Result<(), App> {
        self.set_state(State::Ready).map(|_| ())
    }

    fn reset(&mut self) -> Result<(), App> {
        self.relay.install(None);
        self.set_state(State::Null).map(|_| ())
    }

    fn release(self: Box<Self>) {
        self.relay.install(None);
        if let Err(e) = self.set_state(State::Null) {
            error!("Failed to release pipeline: {}", e);
        }
        self.bus.unset_sync_handler();
        info!("GStreamer pipeline released");
    }
}

fn event_for(msg: &Message) -> Option<DecoderEvent> {
    match msg.view() {
        MessageView::AsyncDone(_) => Some(DecoderEvent::Ready),
        MessageView::Eos(_) => {
            info!("EOS message received");
            Some(DecoderEvent::Completed)
        }
        MessageView::Error(err) => {
            error!("Error from GStreamer pipeline: {}", err.error());
            Some(DecoderEvent::Failed(err.error().to_string()))
        }
        _ => None,
    }
}

/// Accepts URIs as-is and turns local paths into `file://` URIs.
fn to_uri(source: &Source) -> Result<String, App> {
    let raw = source.as_str();
    // SAFETY: `to_glib_none` yields a NUL-terminated C string that outlives the call.
    let is_uri = unsafe {
        gstreamer::ffi::gst_uri_is_valid(glib::translate::ToGlibPtr::to_glib_none(raw).0)
            != glib::ffi::GFALSE
    };
    if is_uri {
        return Ok(raw.to_string());
    }

    let path = Path::new(raw)
        .canonicalize()
        .map_err(|e| App::DecoderFailure(format!("Cannot open {raw}: {e}")))?;
    glib::filename_to_uri(&path, None)
        .map(|uri| uri.to_string())
        .map_err(|e| App::DecoderFailure(e.to_string()))
}
