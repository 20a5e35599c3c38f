//! Wire shapes for the three external interfaces: the DSP WebSocket, the
//! ingress line-JSON channel, and the subscriber broadcast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dsp_core::{Event, VolumeOrigin};

/// Request frame sent to the DSP over its WebSocket. Serde's default
/// external-tagging gives exactly the shapes spec.md requires: unit variants
/// become bare strings (`"GetVolume"`), one-field variants become
/// `{"SetVolume": <value>}`.
#[derive(Debug, Clone, Serialize)]
pub enum DspRequest {
    SetVolume(f64),
    GetVolume,
    SetMute(bool),
    GetMute,
    ToggleMute,
    GetConfigFilePath,
    GetState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultOnly {
    #[allow(dead_code)]
    pub result: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueReply<T> {
    #[allow(dead_code)]
    pub result: String,
    pub value: T,
}

/// Reply frame received from the DSP. Parsing is tolerant by design: callers
/// fall back to treating an unparseable `SetVolume`/`SetMute`/`ToggleMute`
/// reply as success (spec.md §6), so this type is only used when the frame
/// *does* parse cleanly.
#[derive(Debug, Clone, Deserialize)]
pub enum DspReply {
    SetVolume(ResultOnly),
    GetVolume(ValueReply<f64>),
    SetMute(ResultOnly),
    GetMute(ValueReply<bool>),
    ToggleMute(ValueReply<bool>),
    GetConfigFilePath(ValueReply<String>),
    GetState(ValueReply<String>),
}

/// A message arriving on the ingress channel: `{"type": <discriminator>,
/// "data": <payload>}`. Units carry `data: null` implicitly via serde's
/// externally-tagged + `content` representation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum IngressMessage {
    VolumeHeld { direction: i8 },
    VolumeRelease,
    RotaryTurn { steps: i32 },
    VolumeStep { steps: i32, db_per_step: f64 },
    ToggleMute,
    SetVolumeAbsolute { db: f64 },
    MediaPlayPause,
    MediaNext,
    MediaPrevious,
    MediaPlay,
    MediaPause,
    MediaStop,
    LibrespotSessionConnected,
    LibrespotSessionDisconnected,
    LibrespotVolumeChanged { volume: f64 },
    LibrespotTrackChanged { track: String },
    LibrespotPlaybackState { state: String },
    PlexStateChanged { state: String },
}

impl IngressMessage {
    /// Converts to the reducer's `Event` vocabulary. `VolumeHeld` and
    /// `RotaryTurn` are bare no-ops unless the caller wraps the result in
    /// `Event::timed` — that wrapping is the daemon loop's job, not this
    /// parser's, so callers must apply it themselves for those two variants.
    pub fn into_event(self) -> Event {
        match self {
            IngressMessage::VolumeHeld { direction } => Event::VolumeHeld { direction },
            IngressMessage::VolumeRelease => Event::VolumeRelease,
            IngressMessage::RotaryTurn { steps } => Event::RotaryTurn { steps },
            IngressMessage::VolumeStep { steps, db_per_step } => {
                Event::VolumeStep { steps, db_per_step }
            }
            IngressMessage::ToggleMute => Event::ToggleMute,
            IngressMessage::SetVolumeAbsolute { db } => Event::SetVolumeAbsolute {
                db,
                origin: VolumeOrigin::Ingress,
            },
            IngressMessage::MediaPlayPause => Event::MediaPlayPause,
            IngressMessage::MediaNext => Event::MediaNext,
            IngressMessage::MediaPrevious => Event::MediaPrevious,
            IngressMessage::MediaPlay => Event::MediaPlay,
            IngressMessage::MediaPause => Event::MediaPause,
            IngressMessage::MediaStop => Event::MediaStop,
            IngressMessage::LibrespotSessionConnected => Event::LibrespotSessionConnected,
            IngressMessage::LibrespotSessionDisconnected => Event::LibrespotSessionDisconnected,
            IngressMessage::LibrespotVolumeChanged { volume } => {
                Event::LibrespotVolumeChanged { volume }
            }
            IngressMessage::LibrespotTrackChanged { track } => {
                Event::LibrespotTrackChanged { track }
            }
            IngressMessage::LibrespotPlaybackState { state } => {
                Event::LibrespotPlaybackState { state }
            }
            IngressMessage::PlexStateChanged { state } => Event::PlexStateChanged { state },
        }
    }

    /// True for the two variants spec.md §9 requires `TimedEvent` wrapping
    /// for; bare `VolumeHeld`/`RotaryTurn` events are no-ops in the reducer.
    pub fn needs_timestamp(&self) -> bool {
        matches!(
            self,
            IngressMessage::VolumeHeld { .. } | IngressMessage::RotaryTurn { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngressResponse {
    Ok,
    Error { error: String },
}

/// The subscriber-facing envelope: `{"type", "ts", "data"}`.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberEnvelope<T: Serialize> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ts: DateTime<Utc>,
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateInitData {
    pub volume_db: f64,
    pub volume_known: bool,
    pub volume_at: DateTime<Utc>,
    pub muted: bool,
    pub mute_known: bool,
    pub mute_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeChangedData {
    pub volume_db: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MuteChangedData {
    pub muted: bool,
}

impl SubscriberEnvelope<StateInitData> {
    pub fn state_init(snapshot: &dsp_core::StateSnapshot, ts: DateTime<Utc>) -> Self {
        SubscriberEnvelope {
            kind: "state_init",
            ts,
            data: StateInitData {
                volume_db: snapshot.volume_db,
                volume_known: snapshot.volume_known,
                volume_at: snapshot.volume_at,
                muted: snapshot.muted,
                mute_known: snapshot.mute_known,
                mute_at: snapshot.mute_at,
            },
        }
    }
}

impl SubscriberEnvelope<VolumeChangedData> {
    /// `volume_db` must already be rounded to 0.1 dB (spec.md §6) —
    /// `dsp_core::round_to_0_1` is the single source of that rounding.
    pub fn volume_changed(volume_db: f64, ts: DateTime<Utc>) -> Self {
        SubscriberEnvelope {
            kind: "volume_changed",
            ts,
            data: VolumeChangedData { volume_db },
        }
    }
}

impl SubscriberEnvelope<MuteChangedData> {
    pub fn mute_changed(muted: bool, ts: DateTime<Utc>) -> Self {
        SubscriberEnvelope {
            kind: "mute_changed",
            ts,
            data: MuteChangedData { muted },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsp_request_wire_shapes_match_spec() {
        assert_eq!(
            serde_json::to_string(&DspRequest::SetVolume(-12.5)).unwrap(),
            r#"{"SetVolume":-12.5}"#
        );
        assert_eq!(
            serde_json::to_string(&DspRequest::GetVolume).unwrap(),
            r#""GetVolume""#
        );
    }

    #[test]
    fn dsp_reply_parses_value_shape() {
        let reply: DspReply = serde_json::from_str(r#"{"GetVolume":{"result":"Ok","value":-6.0}}"#).unwrap();
        match reply {
            DspReply::GetVolume(v) => assert_eq!(v.value, -6.0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn ingress_message_parses_discriminated_json() {
        let msg: IngressMessage =
            serde_json::from_str(r#"{"type":"rotary_turn","data":{"steps":3}}"#).unwrap();
        match msg {
            IngressMessage::RotaryTurn { steps } => assert_eq!(steps, 3),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn ingress_unit_variant_parses_without_data() {
        let msg: IngressMessage = serde_json::from_str(r#"{"type":"toggle_mute"}"#).unwrap();
        assert!(matches!(msg, IngressMessage::ToggleMute));
    }

    #[test]
    fn needs_timestamp_only_for_held_and_turn() {
        assert!(IngressMessage::VolumeHeld { direction: 1 }.needs_timestamp());
        assert!(IngressMessage::RotaryTurn { steps: 1 }.needs_timestamp());
        assert!(!IngressMessage::ToggleMute.needs_timestamp());
        assert!(!IngressMessage::VolumeStep { steps: 1, db_per_step: 1.0 }.needs_timestamp());
    }

    #[test]
    fn ingress_response_serializes_with_status_tag() {
        assert_eq!(
            serde_json::to_string(&IngressResponse::Ok).unwrap(),
            r#"{"status":"ok"}"#
        );
        let err = IngressResponse::Error { error: "bad json".to_string() };
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"status":"error","error":"bad json"}"#
        );
    }
}
