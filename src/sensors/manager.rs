//! Sensor manager for BLE device discovery, connection and I/O.
//!
//! Everything the device reports is forwarded as a [`ProbeEvent`] over a
//! crossbeam channel. Command writes announce themselves on the same channel
//! before they hit the air, so the consumer sees a send ordered against the
//! notifications around it.

use crate::config::ScanSettings;
use crate::diagnosis::record::DeviceIdentity;
use crate::diagnosis::session::ProbeEvent;
use crate::sensors::ftms::{
    CommandKind, CSC_SERVICE_UUID, FTMS_CONTROL_POINT_UUID, FTMS_SERVICE_UUID,
    INDOOR_BIKE_DATA_UUID, MOBI_SERVICE_UUID, REBORN_SERVICE_UUID, TACX_SERVICE_UUID,
};
use crate::sensors::types::{DiscoveredDevice, Protocol, SensorError};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use crossbeam::channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Manages BLE discovery, the connection to one device, and its traffic.
pub struct SensorManager {
    /// Configuration
    config: ScanSettings,
    /// BLE adapter
    adapter: Option<Adapter>,
    /// Channel for probe events
    event_tx: Option<Sender<ProbeEvent>>,
    /// Discovered devices (device_id -> DiscoveredDevice)
    discovered: Arc<Mutex<HashMap<String, DiscoveredDevice>>>,
    /// Connected peripheral
    peripheral: Option<Peripheral>,
    /// Notification forwarding task
    notification_task: Option<JoinHandle<()>>,
    /// Discovery event task
    discovery_task: Option<JoinHandle<()>>,
    /// Whether currently scanning
    is_scanning: Arc<Mutex<bool>>,
}

impl SensorManager {
    /// Create a new sensor manager.
    pub fn new(config: ScanSettings) -> Self {
        Self {
            config,
            adapter: None,
            event_tx: None,
            discovered: Arc::new(Mutex::new(HashMap::new())),
            peripheral: None,
            notification_task: None,
            discovery_task: None,
            is_scanning: Arc::new(Mutex::new(false)),
        }
    }

    /// Initialize the BLE adapter.
    ///
    /// This must be called before any other operation.
    pub async fn initialize(&mut self) -> Result<(), SensorError> {
        tracing::info!("Initializing SensorManager");

        let manager = Manager::new()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(SensorError::AdapterNotFound)?;

        tracing::info!("BLE adapter initialized");
        self.adapter = Some(adapter);

        Ok(())
    }

    /// Get a receiver for probe events.
    ///
    /// The channel closes once the manager and its notification task are
    /// gone.
    pub fn event_receiver(&mut self) -> Receiver<ProbeEvent> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.event_tx = Some(tx);
        rx
    }

    /// Send an event if the channel is available.
    pub(crate) fn send_event(&self, event: ProbeEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Start scanning for devices that speak a recognized protocol.
    pub async fn start_discovery(&mut self) -> Result<(), SensorError> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or(SensorError::AdapterNotFound)?;

        {
            let mut is_scanning = self.is_scanning.lock().await;
            if *is_scanning {
                return Ok(());
            }
            *is_scanning = true;
        }

        tracing::info!("Starting device discovery");

        self.discovered.lock().await.clear();

        let scan_filter = ScanFilter {
            services: vec![
                FTMS_SERVICE_UUID,
                CSC_SERVICE_UUID,
                MOBI_SERVICE_UUID,
                REBORN_SERVICE_UUID,
                TACX_SERVICE_UUID,
            ],
        };

        adapter
            .start_scan(scan_filter)
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

        let adapter_clone = adapter.clone();
        let discovered = self.discovered.clone();
        let is_scanning = self.is_scanning.clone();

        self.discovery_task = Some(tokio::spawn(async move {
            Self::process_discovery_events(adapter_clone, discovered, is_scanning).await;
        }));

        Ok(())
    }

    /// Process discovery events from the adapter.
    async fn process_discovery_events(
        adapter: Adapter,
        discovered: Arc<Mutex<HashMap<String, DiscoveredDevice>>>,
        is_scanning: Arc<Mutex<bool>>,
    ) {
        use futures::stream::StreamExt;

        let mut events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Failed to get adapter events: {}", e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            if !*is_scanning.lock().await {
                break;
            }

            // Services often arrive in a later advertisement than the name.
            let id = match event {
                CentralEvent::DeviceDiscovered(id)
                | CentralEvent::DeviceUpdated(id)
                | CentralEvent::ServicesAdvertisement { id, .. } => id,
                _ => continue,
            };

            let Ok(peripheral) = adapter.peripheral(&id).await else {
                continue;
            };

            if let Some(device) = Self::classify_peripheral(&peripheral).await {
                let mut discovered = discovered.lock().await;
                if !discovered.contains_key(&device.device_id) {
                    tracing::info!(
                        name = %device.name,
                        address = %device.address,
                        protocol = %device.protocols_label(),
                        rssi = ?device.signal_strength,
                        "Device found"
                    );
                }
                discovered.insert(device.device_id.clone(), device);
            }
        }
    }

    /// Classify a peripheral based on its advertised services.
    async fn classify_peripheral(peripheral: &Peripheral) -> Option<DiscoveredDevice> {
        let properties = peripheral.properties().await.ok()??;

        let services = properties.services;
        let supported_protocols = Protocol::supported(&services);
        let protocol = *supported_protocols.first()?;

        Some(DiscoveredDevice {
            device_id: peripheral.id().to_string(),
            address: properties.address.to_string(),
            name: properties
                .local_name
                .unwrap_or_else(|| "Unknown Device".to_string()),
            services,
            protocol,
            supported_protocols,
            signal_strength: properties.rssi,
            last_seen: Instant::now(),
        })
    }

    /// Stop scanning.
    pub async fn stop_discovery(&mut self) -> Result<(), SensorError> {
        let adapter = self.adapter.as_ref().ok_or(SensorError::AdapterNotFound)?;

        {
            let mut is_scanning = self.is_scanning.lock().await;
            if !*is_scanning {
                return Ok(());
            }
            *is_scanning = false;
        }

        tracing::info!("Stopping device discovery");

        if let Some(task) = self.discovery_task.take() {
            task.abort();
        }

        adapter
            .stop_scan()
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

        Ok(())
    }

    /// Scan for the configured discovery timeout and return what was found,
    /// FTMS devices first.
    pub async fn scan(&mut self) -> Result<Vec<DiscoveredDevice>, SensorError> {
        let timeout = self.config.discovery_timeout();
        tracing::info!(secs = timeout.as_secs(), "Scanning for devices");

        self.start_discovery().await?;
        tokio::time::sleep(timeout).await;
        self.stop_discovery().await?;

        let mut devices = self.get_discovered().await;
        devices.sort_by_key(|d| {
            (
                d.protocol != Protocol::Ftms,
                std::cmp::Reverse(d.signal_strength),
            )
        });
        Ok(devices)
    }

    /// Get list of discovered devices.
    pub async fn get_discovered(&self) -> Vec<DiscoveredDevice> {
        self.discovered.lock().await.values().cloned().collect()
    }

    /// Connect to a device by ID and enumerate its services.
    ///
    /// Emits `Connected` on success and `ConnectionFailed` otherwise.
    pub async fn connect(&mut self, device_id: &str) -> Result<DeviceIdentity, SensorError> {
        match self.try_connect(device_id).await {
            Ok((peripheral, identity)) => {
                self.peripheral = Some(peripheral);
                self.send_event(ProbeEvent::Connected(identity.clone()));
                Ok(identity)
            }
            Err(e) => {
                tracing::error!(device_id, error = %e, "Connection failed");
                self.send_event(ProbeEvent::ConnectionFailed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn try_connect(
        &self,
        device_id: &str,
    ) -> Result<(Peripheral, DeviceIdentity), SensorError> {
        let adapter = self.adapter.as_ref().ok_or(SensorError::AdapterNotFound)?;

        tracing::info!("Connecting to device: {}", device_id);

        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let peripheral = peripherals
            .into_iter()
            .find(|p| p.id().to_string() == device_id)
            .ok_or_else(|| SensorError::DeviceNotFound(device_id.to_string()))?;

        tokio::time::timeout(self.config.connection_timeout(), peripheral.connect())
            .await
            .map_err(|_| SensorError::ConnectionTimeout)?
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        let properties = peripheral
            .properties()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?
            .unwrap_or_default();

        let services: Vec<Uuid> = peripheral.services().iter().map(|s| s.uuid).collect();
        for service in &services {
            tracing::debug!(%service, "Found service");
        }

        let identity = DeviceIdentity {
            name: properties
                .local_name
                .unwrap_or_else(|| "Unknown Device".to_string()),
            address: properties.address.to_string(),
            services,
        };

        tracing::info!("Connected to device: {}", device_id);

        Ok((peripheral, identity))
    }

    fn connected_peripheral(&self) -> Result<&Peripheral, SensorError> {
        self.peripheral.as_ref().ok_or(SensorError::NotConnected)
    }

    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic, SensorError> {
        self.connected_peripheral()?
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(SensorError::CharacteristicNotFound(uuid))
    }

    /// Whether the connected device exposes a characteristic.
    pub fn has_characteristic(&self, uuid: Uuid) -> bool {
        self.find_characteristic(uuid).is_ok()
    }

    /// Subscribe to Indoor Bike Data and Control Point indications and start
    /// forwarding them.
    pub async fn subscribe(&mut self) -> Result<(), SensorError> {
        let peripheral = self.connected_peripheral()?.clone();
        let bike_data = self.find_characteristic(INDOOR_BIKE_DATA_UUID)?;
        let control_point = self.find_characteristic(FTMS_CONTROL_POINT_UUID)?;

        for characteristic in [&bike_data, &control_point] {
            peripheral
                .subscribe(characteristic)
                .await
                .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;

            tracing::debug!("Subscribed to characteristic: {}", characteristic.uuid);
        }

        let event_tx = self.event_tx.clone();
        self.notification_task = Some(tokio::spawn(async move {
            Self::handle_notifications(peripheral, event_tx).await;
        }));

        Ok(())
    }

    /// Forward notifications from the connected peripheral.
    async fn handle_notifications(peripheral: Peripheral, event_tx: Option<Sender<ProbeEvent>>) {
        use futures::stream::StreamExt;

        let Some(tx) = event_tx else {
            return;
        };

        let mut notification_stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to get notification stream: {}", e);
                let _ = tx.send(ProbeEvent::TransportError(e.to_string()));
                return;
            }
        };

        while let Some(notification) = notification_stream.next().await {
            let event = if notification.uuid == INDOOR_BIKE_DATA_UUID {
                ProbeEvent::IndoorBikeData(notification.value)
            } else if notification.uuid == FTMS_CONTROL_POINT_UUID {
                ProbeEvent::ControlPointResponse(notification.value)
            } else {
                tracing::debug!(uuid = %notification.uuid, "Unhandled notification");
                continue;
            };

            if tx.send(event).is_err() {
                break;
            }
        }

        tracing::debug!("Notification stream ended");
    }

    /// Read a characteristic value.
    pub async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, SensorError> {
        let characteristic = self.find_characteristic(uuid)?;

        self.connected_peripheral()?
            .read(&characteristic)
            .await
            .map_err(|e| SensorError::ReadFailed(e.to_string()))
    }

    /// Write a command to the FTMS Control Point.
    ///
    /// `CommandSent` is emitted before the write; a failed write additionally
    /// emits `CommandWriteFailed`.
    pub async fn send_command(&self, kind: CommandKind, data: &[u8]) -> Result<(), SensorError> {
        let result = self.write_control_point(kind, data).await;

        if let Err(e) = &result {
            tracing::warn!(command = %kind, error = %e, "Command write failed");
            self.send_event(ProbeEvent::CommandWriteFailed {
                kind,
                error: e.to_string(),
            });
        }

        result
    }

    async fn write_control_point(&self, kind: CommandKind, data: &[u8]) -> Result<(), SensorError> {
        let peripheral = self.connected_peripheral()?;
        let control_point = self.find_characteristic(FTMS_CONTROL_POINT_UUID)?;

        tracing::info!(command = %kind, "Sending command");
        self.send_event(ProbeEvent::CommandSent {
            kind,
            at: Instant::now(),
        });

        peripheral
            .write(&control_point, data, WriteType::WithResponse)
            .await
            .map_err(|e| SensorError::WriteFailed(e.to_string()))
    }

    /// Disconnect from the device and stop forwarding notifications.
    pub async fn disconnect(&mut self) -> Result<(), SensorError> {
        if let Some(task) = self.notification_task.take() {
            task.abort();
        }

        if let Some(peripheral) = self.peripheral.take() {
            tracing::info!("Disconnecting from device: {}", peripheral.id());
            peripheral
                .disconnect()
                .await
                .map_err(|e| SensorError::BleError(e.to_string()))?;
        }

        Ok(())
    }

    /// Shutdown the manager and close the event channel.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down SensorManager");

        let _ = self.stop_discovery().await;

        if let Err(e) = self.disconnect().await {
            tracing::warn!(error = %e, "Disconnect failed");
        }

        self.event_tx = None;
    }
}

impl std::fmt::Debug for SensorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorManager")
            .field("config", &self.config)
            .field("initialized", &self.adapter.is_some())
            .field("connected", &self.peripheral.is_some())
            .finish()
    }
}
