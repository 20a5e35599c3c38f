//! The effects worker: the only task that performs DSP I/O.
//!
//! Owns the WebSocket connection to the DSP, serializes requests one at a
//! time, and reconnects with a fixed backoff on transport failure. Grounded
//! on the reader/writer split of an IPC driver, adapted to a single
//! request-at-a-time worker (spec.md requires strict command serialization,
//! unlike a request-id-keyed pending map).

use std::time::Duration;

use dsp_core::{Command, Event, FailedCommand};
use dsp_proto::{DspReply, DspRequest};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub struct DspClientConfig {
    pub url: String,
    pub read_timeout: Duration,
    pub reconnect_delay: Duration,
}

type DspSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn run(
    config: DspClientConfig,
    mut command_rx: mpsc::Receiver<Command>,
    observation_tx: mpsc::Sender<Event>,
) {
    let mut socket: Option<DspSocket> = None;

    while let Some(command) = command_rx.recv().await {
        if let Command::PublishStateSnapshot { snapshot, reply_sink } = command {
            if reply_sink.send(snapshot).is_err() {
                warn!("snapshot reply sink dropped before publish");
            }
            continue;
        }

        if socket.is_none() {
            socket = Some(connect_with_backoff(&config).await);
        }
        let conn = socket.as_mut().expect("just connected");

        let at = chrono::Utc::now();
        match execute(conn, &config, &command).await {
            Ok(event) => emit(&observation_tx, event),
            Err(err) => {
                warn!("dsp command failed: {err}");
                emit(
                    &observation_tx,
                    Event::DspCommandFailed {
                        cmd: to_failed_command(&command),
                        err: err.to_string(),
                        at,
                    },
                );
                socket = None;
            }
        }
    }
}

fn emit(observation_tx: &mpsc::Sender<Event>, event: Event) {
    if observation_tx.try_send(event).is_err() {
        warn!("observation channel full, dropping observation");
    }
}

fn to_failed_command(command: &Command) -> FailedCommand {
    match command {
        Command::SetVolume { target_db } => FailedCommand::SetVolume { target_db: *target_db },
        Command::GetVolume => FailedCommand::GetVolume,
        Command::ToggleMute => FailedCommand::ToggleMute,
        Command::SetMute { muted } => FailedCommand::SetMute { muted: *muted },
        Command::GetMute => FailedCommand::GetMute,
        Command::GetConfigFilePath => FailedCommand::GetConfigFilePath,
        Command::GetProcessingState => FailedCommand::GetProcessingState,
        Command::PublishStateSnapshot { .. } => {
            unreachable!("PublishStateSnapshot is handled before reaching the DSP transport")
        }
    }
}

async fn connect_with_backoff(config: &DspClientConfig) -> DspSocket {
    loop {
        match tokio_tungstenite::connect_async(&config.url).await {
            Ok((socket, _response)) => {
                info!("connected to DSP at {}", config.url);
                return socket;
            }
            Err(err) => {
                warn!(
                    "dsp connection failed: {err}, retrying in {:?}",
                    config.reconnect_delay
                );
                tokio::time::sleep(config.reconnect_delay).await;
            }
        }
    }
}

async fn execute(
    socket: &mut DspSocket,
    config: &DspClientConfig,
    command: &Command,
) -> anyhow::Result<Event> {
    let at = chrono::Utc::now();
    match command {
        Command::SetVolume { target_db } => {
            // Tolerant parsing: a reply that arrived but didn't parse as a
            // known shape still confirms the requested value (spec.md §6).
            // A transport failure (send error, timeout, closed connection)
            // is a real failure and must not be reported as success.
            match round_trip(socket, config, DspRequest::SetVolume(*target_db)).await {
                Ok(_) | Err(RoundTripError::UnparsedReply) => {
                    Ok(Event::DspVolumeObserved { db: *target_db, at })
                }
                Err(RoundTripError::Transport(err)) => Err(err),
            }
        }
        Command::GetVolume => {
            let reply = round_trip(socket, config, DspRequest::GetVolume).await?;
            match reply {
                DspReply::GetVolume(v) => Ok(Event::DspVolumeObserved { db: v.value, at }),
                _ => anyhow::bail!("unexpected reply to GetVolume"),
            }
        }
        Command::SetMute { muted } => {
            match round_trip(socket, config, DspRequest::SetMute(*muted)).await {
                Ok(_) | Err(RoundTripError::UnparsedReply) => {
                    Ok(Event::DspMuteObserved { muted: *muted, at })
                }
                Err(RoundTripError::Transport(err)) => Err(err),
            }
        }
        Command::GetMute => {
            let reply = round_trip(socket, config, DspRequest::GetMute).await?;
            match reply {
                DspReply::GetMute(v) => Ok(Event::DspMuteObserved { muted: v.value, at }),
                _ => anyhow::bail!("unexpected reply to GetMute"),
            }
        }
        Command::ToggleMute => {
            let reply = round_trip(socket, config, DspRequest::ToggleMute).await?;
            match reply {
                DspReply::ToggleMute(v) => Ok(Event::DspMuteObserved { muted: v.value, at }),
                _ => anyhow::bail!("unexpected reply to ToggleMute"),
            }
        }
        Command::GetConfigFilePath => {
            let reply = round_trip(socket, config, DspRequest::GetConfigFilePath).await?;
            match reply {
                DspReply::GetConfigFilePath(v) => {
                    Ok(Event::DspConfigFilePathObserved { path: v.value, at })
                }
                _ => anyhow::bail!("unexpected reply to GetConfigFilePath"),
            }
        }
        Command::GetProcessingState => {
            let reply = round_trip(socket, config, DspRequest::GetState).await?;
            match reply {
                DspReply::GetState(v) => Ok(Event::DspProcessingStateObserved { state: v.value, at }),
                _ => anyhow::bail!("unexpected reply to GetProcessingState"),
            }
        }
        Command::PublishStateSnapshot { .. } => {
            unreachable!("PublishStateSnapshot is handled before reaching the DSP transport")
        }
    }
}

/// `round_trip`'s failure modes, split so callers can tell a reply that
/// arrived but didn't parse (tolerated by SetVolume/SetMute per spec.md §6)
/// apart from a transport failure (never tolerated; forces reconnection).
enum RoundTripError {
    Transport(anyhow::Error),
    UnparsedReply,
}

impl From<RoundTripError> for anyhow::Error {
    fn from(err: RoundTripError) -> Self {
        match err {
            RoundTripError::Transport(err) => err,
            RoundTripError::UnparsedReply => anyhow::anyhow!("dsp reply did not parse"),
        }
    }
}

async fn round_trip(
    socket: &mut DspSocket,
    config: &DspClientConfig,
    request: DspRequest,
) -> Result<DspReply, RoundTripError> {
    let payload =
        serde_json::to_string(&request).map_err(|err| RoundTripError::Transport(err.into()))?;
    debug!("dsp request: {payload}");
    socket
        .send(WsMessage::Text(payload))
        .await
        .map_err(|err| RoundTripError::Transport(err.into()))?;

    let frame = tokio::time::timeout(config.read_timeout, socket.next())
        .await
        .map_err(|_| RoundTripError::Transport(anyhow::anyhow!("dsp read timeout")))?
        .ok_or_else(|| RoundTripError::Transport(anyhow::anyhow!("dsp connection closed")))?
        .map_err(|err| RoundTripError::Transport(err.into()))?;

    let text = match frame {
        WsMessage::Text(text) => text,
        WsMessage::Close(_) => {
            return Err(RoundTripError::Transport(anyhow::anyhow!(
                "dsp connection closed"
            )))
        }
        other => {
            return Err(RoundTripError::Transport(anyhow::anyhow!(
                "unexpected dsp frame: {other:?}"
            )))
        }
    };
    debug!("dsp reply: {text}");
    serde_json::from_str(&text).map_err(|_| RoundTripError::UnparsedReply)
}
