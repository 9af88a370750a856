/*!
 # Govee H613 Bluetooth LED Strip Controller Library

 A Rust library for controlling Govee H613 Bluetooth LED strips over their
 vendor GATT protocol.

 ## Features

 * Power on/off control, optionally with a smooth brightness ramp
 * RGB color control, by channels or by name
 * Brightness adjustment (0-255)
 * Power, color and brightness status queries

 ## Example

 ```no_run
 use govee_led_controller::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let transport = BtleplugTransport::new().await?;
     let mut session = Session::new(transport, "A4:C1:38:35:97:24");
     session.connect().await?;

     // Basic operations
     session.turn_on(false).await?;
     session.set_color("lime").await?;
     session.set_brightness(128).await?;
     println!("power: {}", session.get_power().await?);

     session.disconnect().await?;
     Ok(())
 }
 ```
*/

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Custom error types for the Govee LED controller library
#[derive(Error, Debug)]
pub enum Error {
    /// The device could not be reached within the connect timeout
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Operation attempted without a live connection
    #[error("Not connected to a device")]
    NotConnected,

    /// Out-of-range brightness, unknown color name, malformed color value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by the BLE transport
    #[error("BLE transport error: {0}")]
    Transport(String),

    /// No matching notification arrived for a status query
    #[error("No {0} status received within {1:?}")]
    StatusTimeout(codec::QueryKind, Duration),

    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// Failed to find required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(Uuid),
}

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::DeviceNotFound => Error::DeviceNotFound(err.to_string()),
            other => Error::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod codec;
pub mod colors;
pub mod device;
pub mod transport;

// Re-export key types
pub use codec::{Frame, QueryKind, Reading};
pub use colors::{ColorEntry, ColorSpec, Rgb, COLORS};
pub use device::{DeviceConfig, DeviceState, Session, SessionState, SharedSession};
pub use transport::{BtleplugTransport, Transport};
