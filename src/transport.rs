/*!
 # BLE transport

 The [`Transport`] trait is everything a [`Session`](crate::Session) needs
 from a BLE stack: connect, disconnect, characteristic read/write, and
 notification subscription. Notifications are handed over through a bounded
 channel rather than a callback.

 [`BtleplugTransport`] implements it on top of `btleplug`.
*/

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::device::DEVICE_NAME_UUID;
use crate::{Error, Result};

/// Capacity of the per-subscription notification queue
pub const NOTIFICATION_QUEUE: usize = 16;

/// The BLE operations a session relies on.
///
/// Implementations must be usable from any task; the session only ever runs
/// one operation at a time against a given handle.
pub trait Transport: Send + Sync {
    /// A live connection to one device
    type Handle: Send + Sync;

    /// Connects to the device at `address`, giving up after `timeout`.
    ///
    /// The timeout is owned by the implementation: callers do not wrap this
    /// in a deadline of their own. On error nothing may be left connected.
    fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Handle>> + Send;

    fn disconnect(&self, handle: &Self::Handle) -> impl Future<Output = Result<()>> + Send;

    fn write_characteristic(
        &self,
        handle: &Self::Handle,
        uuid: Uuid,
        data: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;

    fn read_characteristic(
        &self,
        handle: &Self::Handle,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Enables notifications on `uuid` and returns the queue they arrive on.
    fn subscribe_notify(
        &self,
        handle: &Self::Handle,
        uuid: Uuid,
    ) -> impl Future<Output = Result<mpsc::Receiver<Vec<u8>>>> + Send;

    fn unsubscribe_notify(
        &self,
        handle: &Self::Handle,
        uuid: Uuid,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapter = manager.adapters().await?.into_iter().next().ok_or_else(|| {
        error!("No Bluetooth adapters found");
        Error::NoBluetoothAdapters
    })?;
    debug!("Using Bluetooth adapter");
    Ok(adapter)
}

/// A connected `btleplug` peripheral plus its notification forwarders
pub struct BleHandle {
    peripheral: Peripheral,
    forwarders: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl BleHandle {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(Error::CharacteristicNotFound(uuid))
    }

    fn stop_forwarder(&self, uuid: Uuid) {
        if let Some(task) = self.forwarders.lock().remove(&uuid) {
            task.abort();
        }
    }
}

/// [`Transport`] backed by the first `btleplug` adapter on the system
pub struct BtleplugTransport {
    adapter: Adapter,
}

impl BtleplugTransport {
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = get_central(&manager).await?;
        Ok(Self { adapter })
    }

    /// Polls the adapter until a peripheral with a matching address or id shows up
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let wanted = address.to_lowercase();
        loop {
            for p in self.adapter.peripherals().await? {
                if p.address().to_string().to_lowercase() == wanted
                    || p.id().to_string().to_lowercase() == wanted
                {
                    return Ok(p);
                }
            }
            trace!("Device {} not seen yet", address);
            time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Falls back to the advertised local name when the GAP service is hidden
    /// by the platform, as it is on some desktop stacks.
    async fn advertised_name(&self, handle: &BleHandle) -> Result<Vec<u8>> {
        let props = handle.peripheral.properties().await?;
        props
            .and_then(|p| p.local_name)
            .map(String::into_bytes)
            .ok_or(Error::CharacteristicNotFound(DEVICE_NAME_UUID))
    }
}

/// Brings the link up and discovers services
async fn attach(peripheral: &Peripheral) -> Result<()> {
    info!("Connecting to device...");
    if !peripheral.is_connected().await? {
        peripheral.connect().await?;
    }

    debug!("Discovering services...");
    peripheral.discover_services().await?;
    Ok(())
}

/// Drops a half-open link after a failed connect
async fn release(peripheral: &Peripheral) {
    if let Err(e) = peripheral.disconnect().await {
        warn!("Failed to drop half-open connection: {}", e);
    }
}

impl Transport for BtleplugTransport {
    type Handle = BleHandle;

    #[instrument(skip(self))]
    async fn connect(&self, address: &str, timeout: Duration) -> Result<BleHandle> {
        let deadline = time::Instant::now() + timeout;

        self.adapter.start_scan(ScanFilter::default()).await?;
        let found = time::timeout_at(deadline, self.find_peripheral(address)).await;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scanning: {}", e);
        }

        let peripheral = match found {
            Ok(found) => found?,
            Err(_) => {
                error!("Device {} not found within {:?}", address, timeout);
                return Err(Error::DeviceNotFound(address.to_string()));
            }
        };

        let attached = match time::timeout_at(deadline, attach(&peripheral)).await {
            Ok(attached) => attached,
            Err(_) => {
                error!("Device {} did not finish connecting within {:?}", address, timeout);
                Err(Error::DeviceNotFound(address.to_string()))
            }
        };
        if let Err(e) = attached {
            release(&peripheral).await;
            return Err(e);
        }

        Ok(BleHandle {
            peripheral,
            forwarders: Mutex::new(HashMap::new()),
        })
    }

    #[instrument(skip(self, handle))]
    async fn disconnect(&self, handle: &BleHandle) -> Result<()> {
        for (_, task) in handle.forwarders.lock().drain() {
            task.abort();
        }
        handle.peripheral.disconnect().await?;
        Ok(())
    }

    async fn write_characteristic(&self, handle: &BleHandle, uuid: Uuid, data: &[u8]) -> Result<()> {
        let characteristic = handle.characteristic(uuid)?;

        // Prefer WriteWithResponse when supported
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        handle
            .peripheral
            .write(&characteristic, data, write_type)
            .await?;
        Ok(())
    }

    async fn read_characteristic(&self, handle: &BleHandle, uuid: Uuid) -> Result<Vec<u8>> {
        match handle.characteristic(uuid) {
            Ok(characteristic) => Ok(handle.peripheral.read(&characteristic).await?),
            Err(_) if uuid == DEVICE_NAME_UUID => {
                debug!("Device name characteristic not exposed, using advertised name");
                self.advertised_name(handle).await
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, handle))]
    async fn subscribe_notify(
        &self,
        handle: &BleHandle,
        uuid: Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>> {
        let characteristic = handle.characteristic(uuid)?;

        // Take the stream before subscribing so no early notification is lost
        let mut notifications = handle.peripheral.notifications().await?;
        handle.peripheral.subscribe(&characteristic).await?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != uuid {
                    continue;
                }
                trace!("Notification: {}", hex::encode(&notification.value));
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = handle.forwarders.lock().insert(uuid, task) {
            previous.abort();
        }
        Ok(rx)
    }

    #[instrument(skip(self, handle))]
    async fn unsubscribe_notify(&self, handle: &BleHandle, uuid: Uuid) -> Result<()> {
        handle.stop_forwarder(uuid);
        let characteristic = handle.characteristic(uuid)?;
        handle.peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }
}
