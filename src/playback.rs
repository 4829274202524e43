//! Timed replay of a scripted case transcript.
//!
//! [`DialoguePlayback`] is the pure state machine. [`PlaybackDriver`] runs it
//! on a tokio task with the auto-advance timer and a command channel, so a
//! terminal front-end only forwards key presses and redraws on snapshots.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::catalog::DialogueLine;
use crate::language::Language;

/// Keys the playback view reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKey {
    Space,
    ArrowLeft,
    ArrowRight,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub index: usize,
    pub playing: bool,
    pub len: usize,
}

impl PlaybackSnapshot {
    pub fn progress_percent(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        (self.index + 1) as f64 / self.len as f64 * 100.0
    }

    pub fn progress_label(&self, language: Language) -> String {
        let k = if self.len == 0 { 0 } else { self.index + 1 };
        let n = self.len;
        match language {
            Language::En => format!("{k} of {n}"),
            Language::Zh => format!("第 {k} 条，共 {n} 条"),
        }
    }

    pub fn is_finished(&self) -> bool {
        !self.playing && self.len > 0 && self.index + 1 == self.len
    }
}

#[derive(Debug, Clone)]
pub struct DialoguePlayback {
    lines: Vec<DialogueLine>,
    index: usize,
    playing: bool,
}

impl DialoguePlayback {
    /// Starts at the first line, playing. An empty transcript starts paused.
    pub fn new(lines: Vec<DialogueLine>) -> Self {
        let playing = !lines.is_empty();
        DialoguePlayback {
            lines,
            index: 0,
            playing,
        }
    }

    fn last(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }

    /// Step forward, or pause when already on the last line.
    pub fn advance(&mut self) {
        if self.index < self.last() {
            self.index += 1;
        } else {
            self.playing = false;
        }
    }

    pub fn rewind(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.playing = !self.lines.is_empty();
    }

    pub fn toggle(&mut self) {
        self.playing = !self.playing && !self.lines.is_empty();
    }

    /// Jump to the line under a click at `fraction` (0.0..=1.0) of the
    /// progress bar.
    pub fn seek(&mut self, fraction: f64) {
        if self.lines.is_empty() || !fraction.is_finite() {
            return;
        }
        let target = (fraction.clamp(0.0, 1.0) * self.lines.len() as f64).floor() as usize;
        self.index = target.min(self.last());
    }

    /// Apply a key binding. Returns `true` when the key was consumed and the
    /// caller should suppress its default handling (scrolling).
    pub fn handle_key(&mut self, key: PlaybackKey) -> bool {
        match key {
            PlaybackKey::Space => self.toggle(),
            PlaybackKey::ArrowLeft => self.rewind(),
            PlaybackKey::ArrowRight => self.advance(),
            PlaybackKey::Other => return false,
        }
        true
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.snapshot().is_finished()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            index: self.index,
            playing: self.playing,
            len: self.lines.len(),
        }
    }

    pub fn progress_percent(&self) -> f64 {
        self.snapshot().progress_percent()
    }

    pub fn progress_label(&self, language: Language) -> String {
        self.snapshot().progress_label(language)
    }

    /// Lines revealed so far, the current one last.
    pub fn visible_lines(&self) -> &[DialogueLine] {
        if self.lines.is_empty() {
            return &[];
        }
        &self.lines[..=self.index]
    }

    pub fn current_line(&self) -> Option<&DialogueLine> {
        self.lines.get(self.index)
    }
}

// -- Driver ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackCommand {
    Advance,
    Rewind,
    Reset,
    Toggle,
    Seek(f64),
    Key(PlaybackKey),
}

/// Owns a [`DialoguePlayback`] and fires `advance` every `interval` while
/// playing. The timer restarts whenever the index or the play state changes.
pub struct PlaybackDriver {
    playback: DialoguePlayback,
    interval: Duration,
    commands: mpsc::UnboundedReceiver<PlaybackCommand>,
    snapshots: mpsc::UnboundedSender<PlaybackSnapshot>,
}

/// Control side of a running [`PlaybackDriver`].
pub struct PlaybackHandle {
    commands: mpsc::UnboundedSender<PlaybackCommand>,
    task: JoinHandle<DialoguePlayback>,
}

impl PlaybackHandle {
    /// Returns `false` once the driver has stopped.
    pub fn send(&self, command: PlaybackCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Stop the driver and get the final state back.
    pub async fn stop(self) -> Option<DialoguePlayback> {
        drop(self.commands);
        self.task.await.ok()
    }
}

impl PlaybackDriver {
    /// Spawn the driver. The first snapshot is sent immediately.
    pub fn spawn(
        playback: DialoguePlayback,
        interval: Duration,
    ) -> (PlaybackHandle, mpsc::UnboundedReceiver<PlaybackSnapshot>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snap_tx, snap_rx) = mpsc::unbounded_channel();
        let driver = PlaybackDriver {
            playback,
            interval,
            commands: cmd_rx,
            snapshots: snap_tx,
        };
        let task = tokio::spawn(driver.run());
        (
            PlaybackHandle {
                commands: cmd_tx,
                task,
            },
            snap_rx,
        )
    }

    async fn run(mut self) -> DialoguePlayback {
        let _ = self.snapshots.send(self.playback.snapshot());
        let mut deadline = Instant::now() + self.interval;

        loop {
            let before = self.playback.snapshot();
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.apply(cmd);
                }
                _ = sleep_until(deadline), if self.playback.is_playing() => {
                    self.playback.advance();
                }
            }
            let after = self.playback.snapshot();
            if after != before {
                deadline = Instant::now() + self.interval;
                debug!(index = after.index, playing = after.playing, "playback state changed");
                // The view may have gone away; keep ticking until told to stop.
                let _ = self.snapshots.send(after);
            }
        }
        self.playback
    }

    fn apply(&mut self, cmd: PlaybackCommand) {
        match cmd {
            PlaybackCommand::Advance => self.playback.advance(),
            PlaybackCommand::Rewind => self.playback.rewind(),
            PlaybackCommand::Reset => self.playback.reset(),
            PlaybackCommand::Toggle => self.playback.toggle(),
            PlaybackCommand::Seek(fraction) => self.playback.seek(fraction),
            PlaybackCommand::Key(key) => {
                self.playback.handle_key(key);
            }
        }
    }
}
