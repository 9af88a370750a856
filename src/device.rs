use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::codec::{self, Frame, QueryKind, Reading};
use crate::colors::{self, ColorSpec, Rgb};
use crate::transport::Transport;
use crate::{Error, Result};

/// Characteristic commands are written to
pub const WRITE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00010203_0405_0607_0809_0a0b0c0d2b11);
/// Characteristic status notifications arrive on
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00010203_0405_0607_0809_0a0b0c0d2b10);
/// Standard GAP Device Name characteristic
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);

/// Timing and addressing for one device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// UUID for write characteristic
    pub write_uuid: Uuid,
    /// UUID for notify characteristic
    pub notify_uuid: Uuid,
    /// UUID of the characteristic holding the device name
    pub name_uuid: Uuid,
    /// Settle time after every command write. Shorter values make the
    /// strip drop or misapply frames.
    pub command_delay: Duration,
    /// Upper bound for establishing a connection
    pub connect_timeout: Duration,
    /// How long a status query waits for its notification
    pub status_timeout: Duration,
    /// Brightness change per step of a smooth on/off ramp
    pub ramp_step: u8,
    /// Pause between ramp steps
    pub ramp_delay: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            write_uuid: WRITE_CHARACTERISTIC_UUID,
            notify_uuid: NOTIFY_CHARACTERISTIC_UUID,
            name_uuid: DEVICE_NAME_UUID,
            command_delay: Duration::from_millis(300),
            connect_timeout: Duration::from_secs(15),
            status_timeout: Duration::from_secs(2),
            ramp_step: 50,
            ramp_delay: Duration::from_millis(150),
        }
    }
}

/// Connection lifecycle of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
        }
    }
}

/// Last state reported by the device.
///
/// Only status queries fill these in; commands never do. Everything is
/// cleared on disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub power: Option<bool>,
    pub rgb: Option<Rgb>,
    /// Nearest table name for `rgb`
    pub color_name: Option<String>,
    pub brightness: Option<u8>,
}

impl DeviceState {
    fn apply(&mut self, reading: &Reading) {
        match reading {
            Reading::Power(on) => self.power = Some(*on),
            Reading::Rgb(rgb) => {
                self.rgb = Some(*rgb);
                self.color_name = Some(colors::nearest_color_name(*rgb).to_string());
            }
            Reading::Brightness(level) => self.brightness = Some(*level),
            Reading::Unknown(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Ramp {
    Up,
    Down,
}

/// Brightness levels for a smooth transition, e.g. 255, 205, ..., 5 going down.
fn ramp_levels(step: u8, direction: Ramp) -> Vec<u8> {
    let mut levels: Vec<u8> = (1..=u8::MAX)
        .rev()
        .step_by(usize::from(step.max(1)))
        .collect();
    if let Ramp::Up = direction {
        levels.reverse();
    }
    levels
}

/// A connection to one LED strip.
///
/// All operations take `&mut self`, so a session runs one exchange at a
/// time. Use [`SharedSession`] to drive it from several tasks.
pub struct Session<T: Transport> {
    transport: T,
    address: String,
    config: DeviceConfig,
    state: SessionState,
    handle: Option<T::Handle>,
    device_name: Option<String>,
    device_state: DeviceState,
}

impl<T: Transport> Session<T> {
    /// Creates a disconnected session for the device at `address`
    pub fn new(transport: T, address: impl Into<String>) -> Self {
        Self::with_config(transport, address, DeviceConfig::default())
    }

    pub fn with_config(transport: T, address: impl Into<String>, config: DeviceConfig) -> Self {
        Self {
            transport,
            address: address.into(),
            config,
            state: SessionState::Disconnected,
            handle: None,
            device_name: None,
            device_state: DeviceState::default(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Name read from the device on connect
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.device_state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Wraps the session for use from several tasks
    pub fn into_shared(self) -> SharedSession<T> {
        SharedSession::new(self)
    }

    /// Connects and reads the device name. Does nothing when already connected.
    ///
    /// Fails with [`Error::DeviceNotFound`] when the device does not answer
    /// within [`DeviceConfig::connect_timeout`].
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn connect(&mut self) -> Result<()> {
        if self.handle.is_some() {
            debug!("Already connected");
            return Ok(());
        }

        self.state = SessionState::Connecting;
        match self.open().await {
            Ok((handle, name)) => {
                info!("Connected to {} ({})", self.address, name);
                self.handle = Some(handle);
                self.device_name = Some(name);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect: {}", e);
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<(T::Handle, String)> {
        let timeout = self.config.connect_timeout;
        let handle = self.transport.connect(&self.address, timeout).await?;

        debug!("Reading device name");
        match self
            .transport
            .read_characteristic(&handle, self.config.name_uuid)
            .await
        {
            Ok(raw) => Ok((handle, decode_name(&raw))),
            Err(e) => {
                if let Err(err) = self.transport.disconnect(&handle).await {
                    warn!("Failed to release connection: {}", err);
                }
                Err(e)
            }
        }
    }

    /// Releases the connection and forgets all device state.
    ///
    /// Does nothing when already disconnected. The handle is released even
    /// if the transport reports an error.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            debug!("Already disconnected");
            return Ok(());
        };

        if let Err(e) = self.transport.disconnect(&handle).await {
            warn!("Transport disconnect failed, dropping handle anyway: {}", e);
        }

        self.state = SessionState::Disconnected;
        self.device_name = None;
        self.device_state = DeviceState::default();
        info!("Disconnected");
        Ok(())
    }

    /// Turns the LED strip on, optionally ramping brightness up first
    #[instrument(skip(self))]
    pub async fn turn_on(&mut self, smooth: bool) -> Result<()> {
        self.handle()?;
        if smooth {
            self.ramp(Ramp::Up).await?;
        }
        self.send_command(codec::encode_turn_on()).await?;
        info!("LED strip powered on");
        Ok(())
    }

    /// Turns the LED strip off, optionally ramping brightness down first
    #[instrument(skip(self))]
    pub async fn turn_off(&mut self, smooth: bool) -> Result<()> {
        self.handle()?;
        if smooth {
            self.ramp(Ramp::Down).await?;
        }
        self.send_command(codec::encode_turn_off()).await?;
        info!("LED strip powered off");
        Ok(())
    }

    /// Sets the brightness level
    ///
    /// # Arguments
    ///
    /// * `level` - Brightness level (0-255); anything else is rejected
    #[instrument(skip(self, level), fields(level = %level))]
    pub async fn set_brightness<L>(&mut self, level: L) -> Result<()>
    where
        L: TryInto<u8> + Copy + fmt::Display,
    {
        let value: u8 = level.try_into().map_err(|_| {
            Error::InvalidArgument(format!("brightness {level} out of range (0-255)"))
        })?;

        self.send_command(codec::encode_set_brightness(value))
            .await?;
        info!("Brightness set to {}", value);
        Ok(())
    }

    /// Sets the color from channels or a table name
    #[instrument(skip(self, color))]
    pub async fn set_color(&mut self, color: impl Into<ColorSpec>) -> Result<()> {
        let spec = color.into();
        let rgb = spec.resolve()?;

        debug!("Setting color {} as {}", spec, rgb);
        self.send_command(codec::encode_set_color(rgb)).await?;
        info!("Color set to {} (~{})", rgb, colors::nearest_color_name(rgb));
        Ok(())
    }

    /// Asks the device whether it is on
    pub async fn get_power(&mut self) -> Result<bool> {
        match self.query(QueryKind::Power).await? {
            Reading::Power(on) => Ok(on),
            other => Err(unexpected(QueryKind::Power, &other)),
        }
    }

    /// Asks the device for its current color
    pub async fn get_rgb(&mut self) -> Result<Rgb> {
        match self.query(QueryKind::Rgb).await? {
            Reading::Rgb(rgb) => Ok(rgb),
            other => Err(unexpected(QueryKind::Rgb, &other)),
        }
    }

    /// Asks the device for its current brightness
    pub async fn get_brightness(&mut self) -> Result<u8> {
        match self.query(QueryKind::Brightness).await? {
            Reading::Brightness(level) => Ok(level),
            other => Err(unexpected(QueryKind::Brightness, &other)),
        }
    }

    /// Queries power, color and brightness in turn
    pub async fn refresh(&mut self) -> Result<DeviceState> {
        self.get_power().await?;
        self.get_rgb().await?;
        self.get_brightness().await?;
        Ok(self.device_state.clone())
    }

    /// Runs one status exchange and records the reading in [`DeviceState`]
    #[instrument(skip(self))]
    async fn query(&mut self, kind: QueryKind) -> Result<Reading> {
        let reading = self.exchange(kind).await?;
        debug!("Received {:?}", reading);
        self.device_state.apply(&reading);

        time::sleep(self.config.command_delay).await;
        Ok(reading)
    }

    /// Subscribe, send the query, wait for the matching reading, unsubscribe.
    async fn exchange(&self, kind: QueryKind) -> Result<Reading> {
        let handle = self.handle()?;
        let notify_uuid = self.config.notify_uuid;

        let mut notifications = self
            .transport
            .subscribe_notify(handle, notify_uuid)
            .await?;
        let outcome = self.await_reading(kind, &mut notifications).await;
        drop(notifications);

        // Unsubscribe even if the query itself failed
        if let Err(e) = self.transport.unsubscribe_notify(handle, notify_uuid).await {
            warn!("Failed to unsubscribe from notifications: {}", e);
        }
        outcome
    }

    async fn await_reading(
        &self,
        kind: QueryKind,
        notifications: &mut mpsc::Receiver<Vec<u8>>,
    ) -> Result<Reading> {
        self.write_frame(codec::encode_query(kind)).await?;

        let wait = self.config.status_timeout;
        let received = time::timeout(wait, async {
            while let Some(raw) = notifications.recv().await {
                let reading = codec::decode_notification(&raw);
                if reading.kind() == Some(kind) {
                    return Some(reading);
                }
                debug!(
                    "Ignoring notification {} while waiting for {}",
                    hex::encode(&raw),
                    kind
                );
            }
            None
        })
        .await;

        match received {
            Ok(Some(reading)) => Ok(reading),
            Ok(None) => Err(Error::Transport(
                "notification stream closed before a reply arrived".to_string(),
            )),
            Err(_) => {
                warn!("No {} status within {:?}", kind, wait);
                Err(Error::StatusTimeout(kind, wait))
            }
        }
    }

    async fn ramp(&self, direction: Ramp) -> Result<()> {
        let levels = ramp_levels(self.config.ramp_step, direction);
        debug!("Ramping {:?} through {} levels", direction, levels.len());
        for level in levels {
            self.write_frame(codec::encode_set_brightness(level)).await?;
            time::sleep(self.config.ramp_delay).await;
        }
        Ok(())
    }

    /// Writes a frame and waits for the device to settle
    async fn send_command(&self, frame: Frame) -> Result<()> {
        self.write_frame(frame).await?;
        trace!("Waiting {:?} for the device to settle", self.config.command_delay);
        time::sleep(self.config.command_delay).await;
        Ok(())
    }

    async fn write_frame(&self, frame: Frame) -> Result<()> {
        let handle = self.handle()?;
        debug!("Sending: {}", frame);
        self.transport
            .write_characteristic(handle, self.config.write_uuid, frame.as_ref())
            .await
    }

    fn handle(&self) -> Result<&T::Handle> {
        self.handle.as_ref().ok_or(Error::NotConnected)
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!(
                "Session for {} dropped while connected; call disconnect() to release it",
                self.address
            );
        }
    }
}

fn decode_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

fn unexpected(kind: QueryKind, reading: &Reading) -> Error {
    Error::Transport(format!("expected {kind} reading, got {reading:?}"))
}

/// A [`Session`] behind an async mutex.
///
/// Every clone refers to the same session; holding the guard keeps other
/// callers out until the current operation finishes.
pub struct SharedSession<T: Transport> {
    inner: Arc<Mutex<Session<T>>>,
}

impl<T: Transport> SharedSession<T> {
    pub fn new(session: Session<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Waits for exclusive access to the session
    pub async fn lock(&self) -> MutexGuard<'_, Session<T>> {
        self.inner.lock().await
    }
}

impl<T: Transport> Clone for SharedSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_down_matches_vendor_steps() {
        assert_eq!(
            ramp_levels(50, Ramp::Down),
            vec![255, 205, 155, 105, 55, 5]
        );
    }

    #[test]
    fn ramp_up_ends_at_full_brightness() {
        let levels = ramp_levels(50, Ramp::Up);
        assert_eq!(levels.first(), Some(&5));
        assert_eq!(levels.last(), Some(&255));
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_step_is_treated_as_one() {
        assert_eq!(ramp_levels(0, Ramp::Down).len(), 255);
    }

    #[test]
    fn state_tracks_readings() {
        let mut state = DeviceState::default();
        state.apply(&Reading::Rgb(Rgb::new(255, 0, 14)));
        state.apply(&Reading::Power(true));
        state.apply(&Reading::Unknown(vec![0x33]));
        assert_eq!(state.power, Some(true));
        assert_eq!(state.rgb, Some(Rgb::new(255, 0, 14)));
        assert_eq!(state.color_name.as_deref(), Some("red"));
        assert_eq!(state.brightness, None);
    }

    #[test]
    fn device_name_is_trimmed() {
        assert_eq!(decode_name(b"ihoment_H613_2A3F\0\0"), "ihoment_H613_2A3F");
    }

    #[test]
    fn default_uuids() {
        let config = DeviceConfig::default();
        assert_eq!(
            config.write_uuid.to_string(),
            "00010203-0405-0607-0809-0a0b0c0d2b11"
        );
        assert_eq!(
            config.notify_uuid.to_string(),
            "00010203-0405-0607-0809-0a0b0c0d2b10"
        );
        assert_eq!(
            config.name_uuid.to_string(),
            "00002a00-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.command_delay, Duration::from_millis(300));
    }
}
