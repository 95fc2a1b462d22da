use crate::player::command::Source;
use crate::player::status::PlaybackState;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Previous,
    Play,
    Pause,
    Next,
    Stop,
}

impl Action {
    pub const ORDER: [Action; 5] = [
        Action::Previous,
        Action::Play,
        Action::Pause,
        Action::Next,
        Action::Stop,
    ];

    /// Command identifier the action re-enters the receiver with.
    pub fn key(self) -> &'static str {
        match self {
            Action::Previous => "previous",
            Action::Play => "play",
            Action::Pause => "pause",
            Action::Next => "next",
            Action::Stop => "stop",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::Previous => "Previous",
            Action::Play => "Play",
            Action::Pause => "Pause",
            Action::Next => "Next",
            Action::Stop => "Stop",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|action| action.key() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceView {
    pub state: PlaybackState,
    pub source: Source,
    pub actions: [Action; 5],
}

impl SurfaceView {
    pub fn body(&self) -> String {
        match self.state {
            PlaybackState::Preparing => format!("Loading {}", self.source),
            PlaybackState::Playing => format!("Playing {}", self.source),
            PlaybackState::Paused => format!("Paused: {}", self.source),
            PlaybackState::Idle => String::new(),
        }
    }
}

/// Projects controller state onto the status surface. `None` means the
/// surface must not be shown.
pub fn render(state: PlaybackState, source: Option<&Source>) -> Option<SurfaceView> {
    if state == PlaybackState::Idle {
        return None;
    }
    source.map(|source| SurfaceView {
        state,
        source: source.clone(),
        actions: Action::ORDER,
    })
}

pub trait StatusSurface: Send {
    fn show(&mut self, view: &SurfaceView);
    fn clear(&mut self);
}

/// Used when no notification server is available or notifications are off.
pub struct NullSurface;

impl StatusSurface for NullSurface {
    fn show(&mut self, view: &SurfaceView) {
        debug!("Status surface disabled, skipping: {}", view.body());
    }

    fn clear(&mut self) {}
}
