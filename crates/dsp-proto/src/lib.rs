//! Config loading, platform paths, and wire shapes for `dsp-daemon`'s three
//! external interfaces (DSP WebSocket, ingress channel, subscriber channel).

pub mod config;
pub mod platform;
pub mod protocol;

pub use config::{Config, ConfigError, DspConfig, IngressConfig, Mode, RotaryOptions, SubscriberConfig};
pub use protocol::{
    DspReply, DspRequest, IngressMessage, IngressResponse, MuteChangedData, StateInitData,
    SubscriberEnvelope, VolumeChangedData,
};

pub use dsp_core;
