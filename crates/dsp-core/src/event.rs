//! `Event`, `Command`, `StateBroadcast` — the reducer's sum-type vocabulary.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// Where a `SetVolumeAbsolute` originated, carried through for future policy
/// (the reducer does not currently branch on it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeOrigin {
    Ingress,
    Librespot,
    Plex,
}

/// An immutable snapshot of cached DSP state, built by the reducer and
/// delivered by the effects worker via `Command::PublishStateSnapshot`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub volume_db: f64,
    pub volume_known: bool,
    pub volume_at: DateTime<Utc>,
    pub muted: bool,
    pub mute_known: bool,
    pub mute_at: DateTime<Utc>,
}

/// A non-`PublishStateSnapshot` command, retained in `DspCommandFailed` so
/// the failure event can describe what failed without requiring `Command`
/// itself (which carries a one-shot sender) to be `Clone`.
#[derive(Debug, Clone, PartialEq)]
pub enum FailedCommand {
    SetVolume { target_db: f64 },
    GetVolume,
    ToggleMute,
    SetMute { muted: bool },
    GetMute,
    GetConfigFilePath,
    GetProcessingState,
}

/// Reducer input. `TimedEvent` wraps any ingress-originated variant with the
/// loop's assigned wall-clock timestamp; `Tick` and the `Dsp*Observed`
/// variants already carry their own.
#[derive(Debug)]
pub enum Event {
    DaemonStarted,
    Tick {
        now: DateTime<Utc>,
        dt_seconds: f64,
    },
    TimedEvent {
        inner: Box<Event>,
        at: DateTime<Utc>,
    },
    VolumeHeld {
        direction: i8,
    },
    VolumeRelease,
    RotaryTurn {
        steps: i32,
    },
    VolumeStep {
        steps: i32,
        db_per_step: f64,
    },
    ToggleMute,
    SetVolumeAbsolute {
        db: f64,
        origin: VolumeOrigin,
    },
    MediaPlayPause,
    MediaNext,
    MediaPrevious,
    MediaPlay,
    MediaPause,
    MediaStop,
    LibrespotSessionConnected,
    LibrespotSessionDisconnected,
    LibrespotVolumeChanged {
        volume: f64,
    },
    LibrespotTrackChanged {
        track: String,
    },
    LibrespotPlaybackState {
        state: String,
    },
    PlexStateChanged {
        state: String,
    },
    DspVolumeObserved {
        db: f64,
        at: DateTime<Utc>,
    },
    DspMuteObserved {
        muted: bool,
        at: DateTime<Utc>,
    },
    DspConfigFilePathObserved {
        path: String,
        at: DateTime<Utc>,
    },
    DspProcessingStateObserved {
        state: String,
        at: DateTime<Utc>,
    },
    DspCommandFailed {
        cmd: FailedCommand,
        err: String,
        at: DateTime<Utc>,
    },
    RequestStateSnapshot {
        reply_sink: oneshot::Sender<StateSnapshot>,
    },
}

impl Event {
    /// Wraps `self` as a `TimedEvent` carrying `at`. Used by the daemon loop
    /// for every ingress-originated event.
    pub fn timed(self, at: DateTime<Utc>) -> Event {
        Event::TimedEvent {
            inner: Box::new(self),
            at,
        }
    }
}

/// Reducer output, effects-worker input.
#[derive(Debug)]
pub enum Command {
    SetVolume {
        target_db: f64,
    },
    GetVolume,
    ToggleMute,
    SetMute {
        muted: bool,
    },
    GetMute,
    GetConfigFilePath,
    GetProcessingState,
    PublishStateSnapshot {
        snapshot: StateSnapshot,
        reply_sink: oneshot::Sender<StateSnapshot>,
    },
}

/// Reducer output, broadcaster input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateBroadcast {
    VolumeChanged { volume_db: f64, at: DateTime<Utc> },
    MuteChanged { muted: bool, at: DateTime<Utc> },
}
