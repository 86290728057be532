//! Local media playback control.
//!
//! No remote credential is involved: the handle shells out to a scripting
//! interpreter that drives the configured player application, and the gate
//! starts `Ready`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    config::PlaybackConfig,
    error::{ToolError, ToolResult},
    gate::{GateStatus, InitGate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    Play,
    Pause,
    NextTrack,
    PreviousTrack,
}

impl PlaybackAction {
    fn script_verb(&self) -> &'static str {
        match self {
            PlaybackAction::Play => "play",
            PlaybackAction::Pause => "pause",
            PlaybackAction::NextTrack => "next track",
            PlaybackAction::PreviousTrack => "previous track",
        }
    }

    fn ack(&self) -> &'static str {
        match self {
            PlaybackAction::Play => "Playback started",
            PlaybackAction::Pause => "Playback paused",
            PlaybackAction::NextTrack => "Skipped to next track",
            PlaybackAction::PreviousTrack => "Went to previous track",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaybackAck {
    pub message: String,
}

/// Native operations of the local player handle.
#[async_trait]
pub trait PlaybackControl: Send + Sync + 'static {
    async fn run(&self, action: PlaybackAction) -> ToolResult<()>;
}

/// Drives the player through a scripting interpreter
/// (`osascript -e 'tell application "Music" to play'`).
pub struct ScriptedPlayer {
    command: String,
    application: String,
}

impl ScriptedPlayer {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            command: config.command.clone(),
            application: config.application.clone(),
        }
    }
}

#[async_trait]
impl PlaybackControl for ScriptedPlayer {
    async fn run(&self, action: PlaybackAction) -> ToolResult<()> {
        let script = format!(
            "tell application \"{}\" to {}",
            self.application,
            action.script_verb()
        );
        let status = tokio::process::Command::new(&self.command)
            .arg("-e")
            .arg(script)
            .status()
            .await
            .map_err(|e| ToolError::Backend(format!("spawn {}: {e}", self.command)))?;
        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Backend(format!(
                "{} exited with {status}",
                self.command
            )))
        }
    }
}

/// Playback tool. Its gate starts `Ready` because there is nothing to
/// provision; operations still pass through it like every other adapter.
pub struct PlaybackAdapter {
    gate: InitGate<Arc<dyn PlaybackControl>>,
}

impl PlaybackAdapter {
    pub fn new(config: &PlaybackConfig) -> Self {
        let player: Arc<dyn PlaybackControl> = Arc::new(ScriptedPlayer::new(config));
        Self {
            gate: InitGate::ready("playback", player),
        }
    }

    /// Adapter over an arbitrary control; used by tests to inject mocks.
    pub fn with_control(control: Arc<dyn PlaybackControl>) -> Self {
        Self {
            gate: InitGate::ready("playback", control),
        }
    }

    pub fn status(&self) -> GateStatus {
        self.gate.status()
    }

    pub async fn play(&self) -> ToolResult<PlaybackAck> {
        self.run(PlaybackAction::Play).await
    }

    pub async fn pause(&self) -> ToolResult<PlaybackAck> {
        self.run(PlaybackAction::Pause).await
    }

    pub async fn next_track(&self) -> ToolResult<PlaybackAck> {
        self.run(PlaybackAction::NextTrack).await
    }

    pub async fn previous_track(&self) -> ToolResult<PlaybackAck> {
        self.run(PlaybackAction::PreviousTrack).await
    }

    async fn run(&self, action: PlaybackAction) -> ToolResult<PlaybackAck> {
        let player = self
            .gate
            .ensure_ready()
            .await
            .map_err(ToolError::NotInitialized)?;
        player.run(action).await?;
        Ok(PlaybackAck {
            message: action.ack().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    struct RecordingControl {
        calls: AtomicUsize,
        last: Mutex<Option<PlaybackAction>>,
    }

    #[async_trait]
    impl PlaybackControl for RecordingControl {
        async fn run(&self, action: PlaybackAction) -> ToolResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(action);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_playback_gate_starts_ready_and_forwards_actions() {
        let control = Arc::new(RecordingControl {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        });
        let adapter = PlaybackAdapter::with_control(control.clone());
        assert_eq!(adapter.status(), GateStatus::Ready);

        let ack = adapter.play().await.expect("play should succeed");
        assert_eq!(ack.message, "Playback started");

        let ack = adapter.next_track().await.expect("skip should succeed");
        assert_eq!(ack.message, "Skipped to next track");

        assert_eq!(control.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*control.last.lock(), Some(PlaybackAction::NextTrack));
    }
}
