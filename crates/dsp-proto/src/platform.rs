//! Platform paths and network defaults for `dsp-daemon`.

use std::path::PathBuf;

/// Default port the ingress listener binds to (line-delimited JSON, local IPC).
pub const INGRESS_TCP_PORT: u16 = 9877;

/// Default port the subscriber hub's `GET /ws` endpoint binds to.
pub const SUBSCRIBER_WS_PORT: u16 = 9878;

const LOCAL_HOST: &str = "127.0.0.1";

pub fn ingress_address() -> String {
    format!("{}:{}", LOCAL_HOST, INGRESS_TCP_PORT)
}

pub fn subscriber_address() -> String {
    format!("{}:{}", LOCAL_HOST, SUBSCRIBER_WS_PORT)
}

/// `~/.config/dsp-daemon` on Unix, the platform config dir joined with
/// `dsp-daemon` elsewhere.
pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("dsp-daemon")
    }
    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dsp-daemon")
    }
}

/// `~/.local/share/dsp-daemon` on Unix, the platform data dir elsewhere.
/// Used for the log file (`daemon.log`).
pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("dsp-daemon")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dsp-daemon")
    }
}
