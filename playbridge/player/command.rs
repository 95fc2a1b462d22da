use crate::error::App;
use serde::Serialize;
use std::fmt;

/// A media source the decoder can open. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    pub fn new(source: &str) -> Result<Self, App> {
        let source = source.trim();
        if source.is_empty() {
            return Err(App::InvalidArgument(
                "play requires a non-empty media source".to_string(),
            ));
        }
        Ok(Self(source.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Play(Source),
    Pause,
    Stop,
    Next,
    Previous,
}

impl Command {
    /// Builds a command from its wire identifier. Identifiers are matched
    /// case-insensitively; only `play` looks at the payload.
    pub fn parse(name: &str, payload: Option<&str>) -> Result<Self, App> {
        match name.trim().to_ascii_lowercase().as_str() {
            "play" => {
                let payload = payload.ok_or_else(|| {
                    App::InvalidArgument("play requires a media source".to_string())
                })?;
                Ok(Command::Play(Source::new(payload)?))
            }
            "pause" => Ok(Command::Pause),
            "stop" => Ok(Command::Stop),
            "next" => Ok(Command::Next),
            "previous" => Ok(Command::Previous),
            _ => Err(App::UnsupportedCommand(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Next => "next",
            Command::Previous => "previous",
        }
    }
}
