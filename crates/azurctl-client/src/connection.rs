//! Connection lifecycle and the session task.
//!
//! All socket I/O runs on one session task that owns the stream, the
//! line codec, and the dispatcher, so the hot path needs no locking.
//! The task selects over socket reads, caller requests, and the
//! acknowledgment sweep tick; a supervisor loop around it applies the
//! reconnect policy.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use azurctl_protocol::{Command, LineCodec, Message, Property, PropertyValue};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::WriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::backoff::retry_delay;
use crate::dispatcher::{AckSender, Dispatcher};
use crate::error::{ClientError, ClientResult};
use crate::state::StateStore;

/// How often expired acknowledgments are swept.
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// Timeout for a single TCP connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read buffer size; device bursts are far smaller.
const READ_BUFFER_SIZE: usize = 1024;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and none being established.
    Disconnected,
    /// Initial connection attempt in progress.
    Connecting,
    /// Live session.
    Connected,
    /// Session lost; retrying with backoff.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Options for configuring a client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long to wait for a command acknowledgment.
    pub command_timeout: Duration,
    /// Reconnect automatically after a lost session.
    pub auto_reconnect: bool,
    /// Upper bound for the reconnect backoff delay.
    pub reconnect_max_delay: Duration,
    /// Probe volume and version state when a session starts.
    pub resync_on_connect: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            command_timeout: Duration::from_secs(2),
            auto_reconnect: true,
            reconnect_max_delay: Duration::from_secs(30),
            resync_on_connect: true,
        }
    }
}

/// Requests from client handles to the session task.
pub(crate) enum Request {
    /// Dispatch a command.
    Send {
        /// The command to send.
        command: Command,
        /// Completion signal for the caller's handle.
        tx: AckSender,
    },
    /// Step the volume toward a target attenuation.
    RampVolume {
        /// Target attenuation in dB, clamped to the device domain.
        target_db: i64,
    },
    /// Close the session and stop.
    Shutdown,
}

/// Why the session loop ended.
enum SessionExit {
    /// Caller asked to stop; do not reconnect.
    Shutdown,
    /// Transport failed or the peer closed.
    ConnectionLost,
}

/// Connect a TCP stream to the bridge.
pub(crate) async fn connect_stream(addr: &str) -> ClientResult<TcpStream> {
    debug!(%addr, "connecting");
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            ClientError::ConnectFailed(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
        })?
        .map_err(ClientError::ConnectFailed)?;

    // Disable Nagle for low-latency command/reply exchanges.
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// State owned by the session task.
pub(crate) struct Session {
    options: ClientOptions,
    store: Arc<StateStore>,
    state_tx: watch::Sender<ConnectionState>,
    dispatcher: Dispatcher,
    codec: LineCodec,
    /// Active volume ramp target, if any.
    volume_target: Option<i64>,
    /// Last power value seen, for edge-triggered power-on probing.
    last_power: Option<bool>,
}

impl Session {
    pub(crate) fn new(
        options: ClientOptions,
        store: Arc<StateStore>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let dispatcher = Dispatcher::new(options.command_timeout);
        Session {
            options,
            store,
            state_tx,
            dispatcher,
            codec: LineCodec::new(),
            volume_target: None,
            last_power: None,
        }
    }

    /// Run one session over an established stream until it ends.
    async fn run(
        &mut self,
        request_rx: &mut mpsc::Receiver<Request>,
        mut stream: TcpStream,
    ) -> SessionExit {
        self.codec.clear();
        let (mut reader, mut writer) = stream.split();
        let mut read_buf = [0u8; READ_BUFFER_SIZE];
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);

        if self.options.resync_on_connect && self.resync(&mut writer).await.is_err() {
            self.end_session();
            return SessionExit::ConnectionLost;
        }

        let exit = 'session: loop {
            tokio::select! {
                result = reader.read(&mut read_buf) => match result {
                    Ok(0) => {
                        warn!("bridge closed the connection");
                        break SessionExit::ConnectionLost;
                    }
                    Ok(n) => {
                        if self.ingest(&read_buf[..n], &mut writer).await.is_err() {
                            break SessionExit::ConnectionLost;
                        }
                    }
                    Err(error) => {
                        warn!(%error, "read failed");
                        break SessionExit::ConnectionLost;
                    }
                },
                request = request_rx.recv() => match request {
                    Some(Request::Send { command, tx }) => {
                        debug!(kind = ?command.kind(), "dispatching command");
                        if let Some(bytes) = self.dispatcher.dispatch(command, tx) {
                            if write_line(&mut writer, &bytes).await.is_err() {
                                break SessionExit::ConnectionLost;
                            }
                        }
                    }
                    Some(Request::RampVolume { target_db }) => {
                        if self.start_ramp(target_db, &mut writer).await.is_err() {
                            break SessionExit::ConnectionLost;
                        }
                    }
                    Some(Request::Shutdown) | None => break SessionExit::Shutdown,
                },
                _ = sweep.tick() => {
                    for bytes in self.dispatcher.sweep() {
                        if write_line(&mut writer, &bytes).await.is_err() {
                            break 'session SessionExit::ConnectionLost;
                        }
                    }
                },
            }
        };

        self.end_session();
        exit
    }

    /// Resolve everything outstanding; no partial state survives a
    /// session.
    fn end_session(&mut self) {
        self.volume_target = None;
        self.dispatcher.fail_all();
    }

    /// Feed received bytes through codec, parser, dispatcher and store.
    async fn ingest(&mut self, data: &[u8], writer: &mut WriteHalf<'_>) -> io::Result<()> {
        self.codec.push(data);
        while let Some(decoded) = self.codec.decode_line() {
            let line = match decoded {
                Ok(line) => line,
                Err(error) => {
                    // Recoverable: the fragment is gone but the
                    // session continues.
                    warn!(%error, "dropped oversized fragment");
                    continue;
                }
            };
            trace!(line = %line, "rx");

            match Message::parse(&line) {
                Message::Status {
                    key,
                    property,
                    value,
                } => {
                    if let Some(bytes) = self.dispatcher.on_status(key, property, &value) {
                        write_line(writer, &bytes).await?;
                    }
                    if self.store.apply(property, value.clone()) {
                        debug!(%property, %value, "state updated");
                    }
                    self.react(property, &value, writer).await?;
                }
                Message::Rejected(reason) => {
                    if let Some(bytes) = self.dispatcher.on_rejected(reason) {
                        write_line(writer, &bytes).await?;
                    }
                }
                Message::Unknown(raw) => {
                    debug!(line = %raw, "unrecognized line");
                }
            }
        }
        Ok(())
    }

    /// Follow-up actions driven by incoming status lines.
    async fn react(
        &mut self,
        property: Property,
        value: &PropertyValue,
        writer: &mut WriteHalf<'_>,
    ) -> io::Result<()> {
        match property {
            Property::Power => {
                let on = value.as_bool().unwrap_or(false);
                if on && self.last_power != Some(true) {
                    debug!("receiver powered on, probing volume");
                    self.probe_volume(writer).await?;
                }
                self.last_power = Some(on);
            }
            Property::Volume => {
                if let (Some(target), Some(current)) = (self.volume_target, value.as_i64()) {
                    if current == target {
                        debug!(target, "volume ramp complete");
                        self.volume_target = None;
                    } else {
                        let step = if target > current {
                            Command::VolumeUp
                        } else {
                            Command::VolumeDown
                        };
                        self.issue_internal(step, writer).await?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Probe state the device does not push on its own.
    async fn resync(&mut self, writer: &mut WriteHalf<'_>) -> io::Result<()> {
        debug!("probing receiver state");
        self.issue_internal(Command::QuerySoftwareVersion, writer)
            .await?;
        self.issue_internal(Command::QueryProtocolVersion, writer)
            .await?;
        self.probe_volume(writer).await
    }

    /// Nudge the volume down then up; net zero, but the device reports
    /// the level after each step.
    async fn probe_volume(&mut self, writer: &mut WriteHalf<'_>) -> io::Result<()> {
        self.issue_internal(Command::VolumeDown, writer).await?;
        self.issue_internal(Command::VolumeUp, writer).await
    }

    /// Begin stepping the volume toward a target attenuation.
    async fn start_ramp(&mut self, target_db: i64, writer: &mut WriteHalf<'_>) -> io::Result<()> {
        let target = target_db.clamp(-90, 0);
        let current = self.store.get(Property::Volume).as_i64();
        if current == Some(target) {
            self.volume_target = None;
            return Ok(());
        }

        debug!(target, ?current, "starting volume ramp");
        self.volume_target = Some(target);
        let step = match current {
            Some(level) if target > level => Command::VolumeUp,
            // Unknown level: a down-step is the safe probe, and the
            // reported level steers the ramp from there.
            _ => Command::VolumeDown,
        };
        self.issue_internal(step, writer).await
    }

    /// Dispatch a command whose acknowledgment nobody awaits.
    async fn issue_internal(
        &mut self,
        command: Command,
        writer: &mut WriteHalf<'_>,
    ) -> io::Result<()> {
        let (tx, _rx) = oneshot::channel();
        if let Some(bytes) = self.dispatcher.dispatch(command, tx) {
            write_line(writer, &bytes).await?;
        }
        Ok(())
    }
}

/// Drive sessions and the reconnect policy until shutdown.
pub(crate) async fn supervise(
    mut session: Session,
    mut request_rx: mpsc::Receiver<Request>,
    addr: String,
    initial: TcpStream,
) {
    let mut stream = initial;
    loop {
        session.state_tx.send_replace(ConnectionState::Connected);
        info!(%addr, "session established");

        let exit = session.run(&mut request_rx, stream).await;
        session.state_tx.send_replace(ConnectionState::Disconnected);

        match exit {
            SessionExit::Shutdown => {
                debug!("session shut down");
                return;
            }
            SessionExit::ConnectionLost => {
                if !session.options.auto_reconnect {
                    return;
                }
                session.state_tx.send_replace(ConnectionState::Reconnecting);
                match reconnect(&mut request_rx, &addr, &session.options).await {
                    Some(next) => stream = next,
                    None => {
                        session
                            .state_tx
                            .send_replace(ConnectionState::Disconnected);
                        return;
                    }
                }
            }
        }
    }
}

/// Retry connecting with exponential backoff. At most one attempt is in
/// flight at a time; commands arriving meanwhile fail `NotConnected`.
/// Returns `None` when shutdown was requested instead.
async fn reconnect(
    request_rx: &mut mpsc::Receiver<Request>,
    addr: &str,
    options: &ClientOptions,
) -> Option<TcpStream> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let delay = retry_delay(attempt, options.reconnect_max_delay);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                request = request_rx.recv() => match request {
                    Some(Request::Send { tx, .. }) => {
                        let _ = tx.send(Err(ClientError::NotConnected));
                    }
                    Some(Request::RampVolume { .. }) => {}
                    Some(Request::Shutdown) | None => return None,
                },
            }
        }

        match connect_stream(addr).await {
            Ok(stream) => {
                info!(attempt, "reconnected");
                return Some(stream);
            }
            Err(error) => warn!(attempt, %error, "reconnect attempt failed"),
        }
    }
}

/// Write one encoded line to the stream.
async fn write_line(writer: &mut WriteHalf<'_>, bytes: &[u8]) -> io::Result<()> {
    trace!(line = %String::from_utf8_lossy(bytes).trim_end(), "tx");
    writer.write_all(bytes).await?;
    writer.flush().await
}
