use crate::error::App;
use crate::player::command::{Command, Source};
use crate::player::decoder::{Backend, Decoder, DecoderEvent, EventSink};
use crate::player::status::{PlaybackState, StatusEvent};
use crate::player::surface::{render, StatusSurface};
use crate::player::{Message, MessageSender};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{self, JoinHandle};
use tokio::time::sleep;

struct Session {
    source: Source,
    is_prepared: bool,
    is_playing: bool,
    decoder: Box<dyn Decoder>,
}

impl Session {
    fn new(source: Source, decoder: Box<dyn Decoder>) -> Self {
        Self {
            source,
            is_prepared: false,
            is_playing: false,
            decoder,
        }
    }
}

/// Single owner of the decoder session and the status surface.
pub struct Controller {
    backend: Box<dyn Backend>,
    surface: Box<dyn StatusSurface>,
    inbox: MessageSender,
    events: broadcast::Sender<StatusEvent>,
    prepare_timeout: Option<Duration>,
    state: PlaybackState,
    session: Option<Session>,
    cycle: u64,
    timeout: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(
        backend: Box<dyn Backend>,
        surface: Box<dyn StatusSurface>,
        inbox: MessageSender,
        events: broadcast::Sender<StatusEvent>,
        prepare_timeout: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            surface,
            inbox,
            events,
            prepare_timeout,
            state: PlaybackState::Idle,
            session: None,
            cycle: 0,
            timeout: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn source(&self) -> Option<&Source> {
        self.session.as_ref().map(|session| &session.source)
    }

    #[cfg(test)]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn status(&self) -> StatusEvent {
        StatusEvent {
            state: self.state(),
            source: self.source().cloned(),
            error: None,
        }
    }

    /// Applies one inbox message. Returns `false` once the controller has
    /// shut down.
    pub fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::Request { command, reply } => {
                let result = self.apply(command);
                if reply.send(result).is_err() {
                    debug!("Caller went away before the reply was sent");
                }
            }
            Message::Decoder { cycle, event } => self.on_decoder_event(cycle, event),
            Message::PrepareTimeout { cycle } => self.on_prepare_timeout(cycle),
            Message::Query(reply) => {
                let _ = reply.send(self.status());
            }
            Message::Shutdown(reply) => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    pub fn apply(&mut self, command: Command) -> Result<(), App> {
        match command {
            Command::Play(source) => self.play(source),
            Command::Pause => {
                self.pause();
                Ok(())
            }
            Command::Stop => {
                self.stop();
                Ok(())
            }
            Command::Next | Command::Previous => {
                info!(
                    "{} requested; track lists are not supported, ignoring",
                    command.name()
                );
                Ok(())
            }
        }
    }

    pub fn play(&mut self, source: Source) -> Result<(), App> {
        self.cancel_timeout();
        self.cycle += 1;
        info!("Play {} (cycle {})", source, self.cycle);

        let mut decoder = match self.acquire_decoder() {
            Ok(decoder) => decoder,
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        let sink = EventSink::new(self.cycle, self.inbox.clone());
        let requested = decoder
            .set_source(&source)
            .and_then(|()| decoder.prepare(sink));
        self.session = Some(Session::new(source, decoder));

        if let Err(e) = requested {
            self.fail(e.clone());
            return Err(e);
        }

        self.state = PlaybackState::Preparing;
        self.schedule_timeout();
        self.refresh_surface();
        self.publish(None);
        Ok(())
    }

    pub fn pause(&mut self) {
        let Some(session) = self.session.as_mut().filter(|session| session.is_playing) else {
            debug!("Pause ignored while {}", self.state);
            self.refresh_surface();
            return;
        };

        match session.decoder.pause() {
            Ok(()) => {
                session.is_playing = false;
                self.state = PlaybackState::Paused;
                info!("Paused {}", session.source);
                self.publish(None);
            }
            Err(e) => error!("Failed to pause: {}", e),
        }
        self.refresh_surface();
    }

    pub fn stop(&mut self) {
        let previous = self.state;
        self.teardown();
        if previous == PlaybackState::Idle {
            debug!("Stop while idle, nothing to release");
        } else {
            info!("Stopped (was {})", previous);
            self.publish(None);
        }
    }

    pub fn shutdown(&mut self) {
        info!("Shutting down playback controller");
        self.stop();
    }

    fn on_decoder_event(&mut self, cycle: u64, event: DecoderEvent) {
        if cycle != self.cycle || self.session.is_none() {
            debug!("Ignoring {:?} from stale cycle {}", event, cycle);
            return;
        }

        match event {
            DecoderEvent::Ready => self.on_ready(),
            DecoderEvent::Completed => {
                info!("Track finished playing");
                self.stop();
            }
            DecoderEvent::Failed(reason) => {
                self.fail(App::DecoderFailure(reason));
            }
        }
    }

    fn on_ready(&mut self) {
        if self.state != PlaybackState::Preparing {
            debug!("Decoder ready while {}, ignoring", self.state);
            return;
        }
        self.cancel_timeout();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.is_prepared = true;
        if let Err(e) = session.decoder.start() {
            self.fail(e);
            return;
        }
        session.is_playing = true;
        info!("Playing {}", session.source);
        self.state = PlaybackState::Playing;
        self.refresh_surface();
        self.publish(None);
    }

    fn on_prepare_timeout(&mut self, cycle: u64) {
        if cycle != self.cycle || self.state != PlaybackState::Preparing {
            return;
        }
        if let Some(limit) = self.prepare_timeout {
            self.fail(App::PrepareTimeout(limit));
        }
    }

    fn acquire_decoder(&mut self) -> Result<Box<dyn Decoder>, App> {
        let Some(session) = self.session.take() else {
            return self.backend.create();
        };

        let mut decoder = session.decoder;
        match decoder.reset() {
            Ok(()) => Ok(decoder),
            Err(e) => {
                warn!("Failed to reset decoder, creating a new one: {}", e);
                decoder.release();
                self.backend.create()
            }
        }
    }

    /// Implicit stop after an unrecoverable failure.
    fn fail(&mut self, error: App) {
        error!("Playback failed: {}", error);
        let source = self.source().cloned();
        self.teardown();
        let _ = self.events.send(StatusEvent {
            state: self.state,
            source,
            error: Some(error.to_string()),
        });
    }

    fn teardown(&mut self) {
        self.cancel_timeout();
        if let Some(mut session) = self.session.take() {
            if session.is_prepared {
                if let Err(e) = session.decoder.stop() {
                    warn!("Failed to stop decoder: {}", e);
                }
            }
            session.decoder.release();
        }
        self.state = PlaybackState::Idle;
        self.surface.clear();
    }

    fn schedule_timeout(&mut self) {
        let Some(limit) = self.prepare_timeout else {
            return;
        };
        let inbox = self.inbox.clone();
        let cycle = self.cycle;
        self.timeout = Some(task::spawn(async move {
            sleep(limit).await;
            let _ = inbox.send(Message::PrepareTimeout { cycle });
        }));
    }

    fn cancel_timeout(&mut self) {
        if let Some(timeout) = self.timeout.take() {
            timeout.abort();
        }
    }

    fn refresh_surface(&mut self) {
        match render(self.state, self.source()) {
            Some(view) => self.surface.show(&view),
            None => self.surface.clear(),
        }
    }

    fn publish(&self, error: Option<String>) {
        // No subscribers is fine.
        let _ = self.events.send(StatusEvent {
            error,
            ..self.status()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::testing::Harness;

    fn source(uri: &str) -> Source {
        Source::new(uri).unwrap()
    }

    #[tokio::test]
    async fn play_then_ready_starts_playback_with_surface() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        assert_eq!(h.controller.state(), PlaybackState::Preparing);
        assert!(h.surface.is_visible());

        h.backend.emit(DecoderEvent::Ready);
        h.pump();

        assert_eq!(h.controller.state(), PlaybackState::Playing);
        let view = h.surface.current().unwrap();
        assert_eq!(view.state, PlaybackState::Playing);
        assert_eq!(view.actions.len(), 5);
        assert_eq!(
            h.backend.journal.entries(),
            ["create", "set_source http://x/a.mp3", "prepare 1", "start"]
        );
    }

    #[tokio::test]
    async fn pause_only_changes_playing() {
        let mut h = Harness::new();
        h.controller.pause();
        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert!(!h.surface.is_visible());

        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.controller.pause();
        assert_eq!(h.controller.state(), PlaybackState::Preparing);

        h.backend.emit(DecoderEvent::Ready);
        h.pump();
        h.controller.pause();
        assert_eq!(h.controller.state(), PlaybackState::Paused);
        assert!(h.surface.is_visible());

        h.controller.pause();
        assert_eq!(h.controller.state(), PlaybackState::Paused);
        assert_eq!(h.backend.journal.count("pause"), 1);
    }

    #[tokio::test]
    async fn stop_from_paused_releases_everything() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();
        h.controller.pause();

        h.controller.stop();

        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert!(!h.controller.has_session());
        assert!(!h.surface.is_visible());
        assert_eq!(h.backend.live_decoders(), 0);
        let entries = h.backend.journal.entries();
        assert_eq!(&entries[entries.len() - 2..], ["stop", "release"]);
    }

    #[tokio::test]
    async fn stop_is_idempotent_from_every_state() {
        let mut h = Harness::new();
        h.controller.stop();
        h.controller.stop();
        assert_eq!(h.controller.state(), PlaybackState::Idle);

        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.controller.stop();
        h.controller.stop();
        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert!(!h.surface.is_visible());
        assert_eq!(h.backend.live_decoders(), 0);
        // Never prepared, so the decoder is released without a stop.
        assert_eq!(h.backend.journal.count("stop"), 0);
    }

    #[tokio::test]
    async fn replay_discards_in_flight_prepare() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        let stale = h.backend.last_sink().unwrap();
        h.controller.play(source("http://x/b.mp3")).unwrap();

        stale.emit(DecoderEvent::Ready);
        h.pump();
        assert_eq!(h.controller.state(), PlaybackState::Preparing);

        h.backend.emit(DecoderEvent::Ready);
        h.pump();
        assert_eq!(h.controller.state(), PlaybackState::Playing);
        assert_eq!(h.controller.source().unwrap().as_str(), "http://x/b.mp3");
        assert_eq!(h.backend.journal.count("create"), 1);
        assert_eq!(h.backend.journal.count("reset"), 1);
        assert_eq!(h.backend.journal.count("start"), 1);
    }

    #[tokio::test]
    async fn replay_while_playing_starts_fresh_cycle() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();

        h.controller.play(source("http://x/b.mp3")).unwrap();
        assert_eq!(h.controller.state(), PlaybackState::Preparing);
        let entries = h.backend.journal.entries();
        assert_eq!(
            &entries[entries.len() - 3..],
            ["reset", "set_source http://x/b.mp3", "prepare 2"]
        );
    }

    #[tokio::test]
    async fn replay_from_paused_starts_fresh_cycle() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();
        h.controller.pause();

        h.controller.play(source("http://x/b.mp3")).unwrap();

        assert_eq!(h.controller.state(), PlaybackState::Preparing);
        assert_eq!(h.controller.source().unwrap().as_str(), "http://x/b.mp3");
        assert_eq!(h.surface.current().unwrap().state, PlaybackState::Preparing);
        let entries = h.backend.journal.entries();
        assert_eq!(
            &entries[entries.len() - 3..],
            ["reset", "set_source http://x/b.mp3", "prepare 2"]
        );

        h.backend.emit(DecoderEvent::Ready);
        h.pump();
        assert_eq!(h.controller.state(), PlaybackState::Playing);
        assert_eq!(h.backend.journal.count("start"), 2);
    }

    #[tokio::test]
    async fn events_queued_before_replay_are_ignored() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        // Posted by the first source but still waiting in the inbox.
        h.backend.emit(DecoderEvent::Ready);
        h.backend.emit(DecoderEvent::Failed("stream A broke".to_string()));

        h.controller.play(source("http://x/b.mp3")).unwrap();
        h.pump();

        assert_eq!(h.controller.state(), PlaybackState::Preparing);
        assert_eq!(h.controller.source().unwrap().as_str(), "http://x/b.mp3");
        assert_eq!(h.backend.journal.count("start"), 0);
        assert_eq!(h.backend.live_decoders(), 1);
        assert!(h.surface.is_visible());
    }

    #[tokio::test]
    async fn stop_from_playing_stops_then_releases() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();

        h.controller.stop();

        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert!(!h.controller.has_session());
        assert!(!h.surface.is_visible());
        assert_eq!(h.backend.live_decoders(), 0);
        let entries = h.backend.journal.entries();
        assert_eq!(&entries[entries.len() - 2..], ["stop", "release"]);
        let last = h.last_event().unwrap();
        assert_eq!(last.state, PlaybackState::Idle);
        assert_eq!(last.error, None);
    }

    #[tokio::test]
    async fn decoder_error_while_preparing_is_an_implicit_stop() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();

        h.backend.emit(DecoderEvent::Failed("404 Not Found".to_string()));
        h.pump();

        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert!(!h.surface.is_visible());
        assert_eq!(h.backend.live_decoders(), 0);
        let last = h.last_event().unwrap();
        assert_eq!(last.state, PlaybackState::Idle);
        assert_eq!(last.source.unwrap().as_str(), "http://x/a.mp3");
        assert!(last.error.unwrap().contains("404 Not Found"));
    }

    #[tokio::test]
    async fn completion_returns_to_idle() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();

        h.backend.emit(DecoderEvent::Completed);
        h.pump();

        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert!(!h.surface.is_visible());
        assert_eq!(h.last_event().unwrap().error, None);
    }

    #[tokio::test]
    async fn rejected_source_fails_to_idle() {
        let mut h = Harness::new();
        h.backend.fail_on("set_source");

        let result = h.controller.play(source("file:///missing.mp3"));

        assert!(matches!(result, Err(App::DecoderFailure(_))));
        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert!(!h.surface.is_visible());
        assert_eq!(h.backend.live_decoders(), 0);
    }

    #[tokio::test]
    async fn failed_start_never_reports_playing() {
        let mut h = Harness::new();
        h.backend.fail_on("start");
        h.controller.play(source("http://x/a.mp3")).unwrap();

        h.backend.emit(DecoderEvent::Ready);
        h.pump();

        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert_eq!(h.backend.live_decoders(), 0);
    }

    #[tokio::test]
    async fn failed_pause_is_a_no_op() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();
        h.backend.fail_on("pause");

        h.controller.pause();

        assert_eq!(h.controller.state(), PlaybackState::Playing);
        assert!(h.surface.is_visible());
    }

    #[tokio::test]
    async fn failed_stop_still_releases() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();
        h.backend.fail_on("stop");

        h.controller.stop();

        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert_eq!(h.backend.live_decoders(), 0);
        assert!(!h.surface.is_visible());
    }

    #[tokio::test]
    async fn failed_reset_recreates_decoder() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.fail_on("reset");

        h.controller.play(source("http://x/b.mp3")).unwrap();

        assert_eq!(h.controller.state(), PlaybackState::Preparing);
        assert_eq!(h.backend.journal.count("create"), 2);
        assert_eq!(h.backend.live_decoders(), 1);
    }

    #[tokio::test]
    async fn next_and_previous_are_accepted_no_ops() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();
        let before = h.backend.journal.entries();

        assert_eq!(h.controller.apply(Command::Next), Ok(()));
        assert_eq!(h.controller.apply(Command::Previous), Ok(()));

        assert_eq!(h.controller.state(), PlaybackState::Playing);
        assert_eq!(h.backend.journal.entries(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn prepare_timeout_fails_to_idle() {
        let mut h = Harness::with_timeout(Some(Duration::from_secs(5)));
        h.controller.play(source("http://slow/a.mp3")).unwrap();

        let message = h.messages.recv().await.unwrap();
        assert!(matches!(message, Message::PrepareTimeout { cycle: 1 }));
        h.controller.handle(message);

        assert_eq!(h.controller.state(), PlaybackState::Idle);
        assert!(!h.surface.is_visible());
        let last = h.last_event().unwrap();
        assert_eq!(
            last.error,
            Some(App::PrepareTimeout(Duration::from_secs(5)).to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ready_cancels_prepare_timeout() {
        let mut h = Harness::with_timeout(Some(Duration::from_secs(5)));
        h.controller.play(source("http://x/a.mp3")).unwrap();
        h.backend.emit(DecoderEvent::Ready);
        h.pump();

        tokio::time::sleep(Duration::from_secs(10)).await;
        h.pump();

        assert_eq!(h.controller.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn shutdown_releases_and_ends_the_loop() {
        let mut h = Harness::new();
        h.controller.play(source("http://x/a.mp3")).unwrap();
        let (reply, done) = tokio::sync::oneshot::channel();

        assert!(!h.controller.handle(Message::Shutdown(reply)));

        assert!(done.await.is_ok());
        assert_eq!(h.backend.live_decoders(), 0);
        assert!(!h.surface.is_visible());
    }
}
