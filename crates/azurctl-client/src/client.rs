//! Client facade.
//!
//! [`AvrClient`] is the caller-facing handle: it owns the background
//! session and notifier tasks and exposes typed access to receiver
//! state alongside command dispatch. The getters mirror what the
//! receiver reports; they return `None` until the corresponding status
//! line has been observed.

use std::collections::HashMap;
use std::sync::Arc;

use azurctl_protocol::{
    attenuation_to_volume, volume_to_attenuation, AudioSource, Command, DynamicRange, InputSource,
    Property, PropertyValue, ProtocolError,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::connection::{connect_stream, supervise, ClientOptions, ConnectionState, Request, Session};
use crate::dispatcher::Ack;
use crate::error::{ClientError, ClientResult};
use crate::state::{StateStore, Subscription, SubscriptionId};

/// Capacity of the caller-request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Handle for one dispatched command.
///
/// Await [`wait`](CommandHandle::wait) for the outcome, or drop the
/// handle to fire and forget.
pub struct CommandHandle {
    rx: oneshot::Receiver<ClientResult<Ack>>,
}

impl CommandHandle {
    /// Wait for the command to be acknowledged, rejected, or to fail.
    pub async fn wait(self) -> ClientResult<Ack> {
        self.rx.await.map_err(|_| ClientError::Closed)?
    }
}

/// Client for an Azur receiver behind a TCP-serial bridge.
///
/// Holds a single live session at a time; dropped or lost sessions are
/// re-established per [`ClientOptions::auto_reconnect`]. State survives
/// reconnects and is re-probed on each new session.
pub struct AvrClient {
    request_tx: mpsc::Sender<Request>,
    store: Arc<StateStore>,
    state_rx: watch::Receiver<ConnectionState>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    notifier: Mutex<Option<JoinHandle<()>>>,
}

impl AvrClient {
    /// Connect to a bridge with default options.
    pub async fn connect(host: &str, port: u16) -> ClientResult<AvrClient> {
        Self::connect_with_options(host, port, ClientOptions::default()).await
    }

    /// Connect to a bridge with custom options.
    ///
    /// The initial connection attempt is made inline so an unreachable
    /// bridge surfaces as [`ClientError::ConnectFailed`]; the reconnect
    /// policy takes over once a session has existed.
    pub async fn connect_with_options(
        host: &str,
        port: u16,
        options: ClientOptions,
    ) -> ClientResult<AvrClient> {
        let addr = format!("{}:{}", host, port);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let stream = connect_stream(&addr).await?;

        let (store, state_notifier) = StateStore::new();
        let notifier = tokio::spawn(state_notifier.run());

        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let session = Session::new(options, Arc::clone(&store), state_tx);
        let supervisor = tokio::spawn(supervise(session, request_rx, addr, stream));

        Ok(AvrClient {
            request_tx,
            store,
            state_rx,
            supervisor: Mutex::new(Some(supervisor)),
            notifier: Mutex::new(Some(notifier)),
        })
    }

    /// Get the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Get a watch receiver following connection state transitions.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Dispatch a command to the receiver.
    ///
    /// Fails with [`ClientError::NotConnected`] when no session is
    /// running. The returned handle resolves on acknowledgment,
    /// rejection, timeout, or connection loss.
    pub async fn send(&self, command: Command) -> ClientResult<CommandHandle> {
        let (tx, rx) = oneshot::channel();
        self.request_tx
            .send(Request::Send { command, tx })
            .await
            .map_err(|_| ClientError::NotConnected)?;
        Ok(CommandHandle { rx })
    }

    /// Close the session and stop background tasks.
    ///
    /// Outstanding commands resolve with [`ClientError::ConnectionLost`].
    /// Does not reconnect.
    pub async fn disconnect(&self) {
        let _ = self.request_tx.send(Request::Shutdown).await;
        // Take the handle before awaiting so the lock is not held
        // across the await point.
        let supervisor = self.supervisor.lock().take();
        if let Some(handle) = supervisor {
            let _ = handle.await;
        }
        let notifier = self.notifier.lock().take();
        if let Some(handle) = notifier {
            handle.abort();
        }
    }

    // ========================================================================
    // State access
    // ========================================================================

    /// Get the last known value of a property.
    pub fn get_state(&self, property: Property) -> PropertyValue {
        self.store.get(property)
    }

    /// Get an owned copy of all known property values.
    pub fn snapshot(&self) -> HashMap<Property, PropertyValue> {
        self.store.snapshot()
    }

    /// Register an observer for property changes.
    pub fn subscribe<F>(&self, filter: Subscription, callback: F) -> SubscriptionId
    where
        F: Fn(Property, &PropertyValue) + Send + Sync + 'static,
    {
        self.store.subscribe(filter, callback)
    }

    /// Remove a previously registered observer.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Report if the device is powered on.
    pub fn power(&self) -> Option<bool> {
        self.store.get(Property::Power).as_bool()
    }

    /// Report if the device is muted.
    pub fn mute(&self) -> Option<bool> {
        self.store.get(Property::Mute).as_bool()
    }

    /// Current volume attenuation in dB (-90..=0).
    pub fn attenuation(&self) -> Option<i64> {
        self.store.get(Property::Volume).as_i64()
    }

    /// Current volume on a 0..=100 scale.
    pub fn volume(&self) -> Option<u8> {
        self.attenuation().map(attenuation_to_volume)
    }

    /// Current volume as a fraction, 0.0..=1.0.
    pub fn volume_percent(&self) -> Option<f64> {
        self.volume().map(|v| v as f64 / 100.0)
    }

    /// Currently selected input, if it is one of the known inputs.
    pub fn input(&self) -> Option<InputSource> {
        self.store
            .get(Property::SelectedInput)
            .as_i64()
            .and_then(|n| u8::try_from(n).ok())
            .and_then(InputSource::from_number)
    }

    /// Front-panel name of the selected input.
    pub fn input_name(&self) -> Option<&'static str> {
        self.input().map(|i| i.name())
    }

    /// Audio source of the active input.
    pub fn audio_source(&self) -> Option<AudioSource> {
        self.store
            .get(Property::AudioSource)
            .as_str()
            .and_then(AudioSource::from_name)
    }

    /// Main software version reported by the device.
    pub fn software_version(&self) -> Option<String> {
        self.store
            .get(Property::SoftwareVersion)
            .as_str()
            .map(str::to_string)
    }

    /// Control protocol version reported by the device.
    pub fn protocol_version(&self) -> Option<String> {
        self.store
            .get(Property::ProtocolVersion)
            .as_str()
            .map(str::to_string)
    }

    // ========================================================================
    // Setters
    // ========================================================================

    /// Power the device on or off.
    pub async fn set_power(&self, on: bool) -> ClientResult<CommandHandle> {
        self.send(Command::SetPower(on)).await
    }

    /// Mute or unmute.
    pub async fn set_mute(&self, on: bool) -> ClientResult<CommandHandle> {
        self.send(Command::SetMute(on)).await
    }

    /// Select an input.
    pub async fn select_input(&self, input: InputSource) -> ClientResult<CommandHandle> {
        self.send(Command::SelectInput(input.number())).await
    }

    /// Select an input by its front-panel name.
    pub async fn select_input_by_name(&self, name: &str) -> ClientResult<CommandHandle> {
        let input = InputSource::from_name(name)
            .ok_or_else(|| ProtocolError::UnknownInput(name.to_string()))?;
        self.select_input(input).await
    }

    /// Set the audio source for the active input.
    pub async fn set_audio_source(&self, source: AudioSource) -> ClientResult<CommandHandle> {
        self.send(Command::SetAudioSource(source)).await
    }

    /// Set the dynamic range compression mode.
    pub async fn set_dynamic_range(&self, mode: DynamicRange) -> ClientResult<CommandHandle> {
        self.send(Command::SetDynamicRange(mode)).await
    }

    /// Set the LFE channel trim in dB.
    pub async fn set_lfe_trim(&self, db: i8) -> ClientResult<CommandHandle> {
        self.send(Command::SetLfeTrim(db)).await
    }

    /// Step the volume up one dB.
    pub async fn volume_up(&self) -> ClientResult<CommandHandle> {
        self.send(Command::VolumeUp).await
    }

    /// Step the volume down one dB.
    pub async fn volume_down(&self) -> ClientResult<CommandHandle> {
        self.send(Command::VolumeDown).await
    }

    /// Step bass up.
    pub async fn bass_up(&self) -> ClientResult<CommandHandle> {
        self.send(Command::BassUp).await
    }

    /// Step bass down.
    pub async fn bass_down(&self) -> ClientResult<CommandHandle> {
        self.send(Command::BassDown).await
    }

    /// Step treble up.
    pub async fn treble_up(&self) -> ClientResult<CommandHandle> {
        self.send(Command::TrebleUp).await
    }

    /// Step treble down.
    pub async fn treble_down(&self) -> ClientResult<CommandHandle> {
        self.send(Command::TrebleDown).await
    }

    /// Step lip sync delay up.
    pub async fn lip_sync_up(&self) -> ClientResult<CommandHandle> {
        self.send(Command::LipSyncUp).await
    }

    /// Step lip sync delay down.
    pub async fn lip_sync_down(&self) -> ClientResult<CommandHandle> {
        self.send(Command::LipSyncDown).await
    }

    /// Ramp the volume to a target attenuation in dB (-90..=0).
    ///
    /// The protocol has no absolute volume command; the session steps
    /// toward the target as the device reports each level. The ramp is
    /// abandoned on disconnect.
    pub async fn set_attenuation(&self, db: i64) -> ClientResult<()> {
        self.request_tx
            .send(Request::RampVolume { target_db: db })
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    /// Ramp the volume to a 0..=100 level.
    pub async fn set_volume(&self, volume: u8) -> ClientResult<()> {
        self.set_attenuation(volume_to_attenuation(volume)).await
    }
}

impl Drop for AvrClient {
    fn drop(&mut self) {
        // Background tasks hold the store alive; cut them loose if the
        // caller never disconnected.
        if let Some(handle) = self.supervisor.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.notifier.lock().take() {
            handle.abort();
        }
    }
}
