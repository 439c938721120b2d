//! Sensor types and enums for the probed BLE device.

use crate::sensors::ftms::{
    CSC_SERVICE_UUID, FTMS_SERVICE_UUID, MOBI_SERVICE_UUID, REBORN_SERVICE_UUID,
    TACX_SERVICE_UUID,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// Protocol family a device speaks, derived from its advertised services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// BLE Fitness Machine Service (0x1826)
    Ftms,
    /// BLE Cycling Speed and Cadence (0x1816), sensor only
    Csc,
    /// MOBI vendor protocol
    Mobi,
    /// Reborn vendor protocol
    Reborn,
    /// Tacx vendor protocol
    Tacx,
    /// None of the recognized services
    Unknown,
}

impl Protocol {
    /// Detection priority: FTMS first, vendor protocols, then the sensor-only
    /// CSC profile.
    const PRIORITY: [Protocol; 5] = [
        Protocol::Ftms,
        Protocol::Mobi,
        Protocol::Reborn,
        Protocol::Tacx,
        Protocol::Csc,
    ];

    /// Service UUID identifying this protocol.
    pub fn service_uuid(&self) -> Option<Uuid> {
        match self {
            Protocol::Ftms => Some(FTMS_SERVICE_UUID),
            Protocol::Csc => Some(CSC_SERVICE_UUID),
            Protocol::Mobi => Some(MOBI_SERVICE_UUID),
            Protocol::Reborn => Some(REBORN_SERVICE_UUID),
            Protocol::Tacx => Some(TACX_SERVICE_UUID),
            Protocol::Unknown => None,
        }
    }

    /// Every recognized protocol whose service is present, in priority order.
    pub fn supported(services: &[Uuid]) -> Vec<Protocol> {
        Self::PRIORITY
            .iter()
            .filter(|p| p.service_uuid().is_some_and(|uuid| services.contains(&uuid)))
            .copied()
            .collect()
    }

    /// Primary protocol for a set of services.
    pub fn detect(services: &[Uuid]) -> Protocol {
        Self::supported(services)
            .first()
            .copied()
            .unwrap_or(Protocol::Unknown)
    }

    /// Vendor protocols whose compatibility cannot be verified over FTMS.
    pub fn is_custom(&self) -> bool {
        matches!(self, Protocol::Mobi | Protocol::Reborn | Protocol::Tacx)
    }

}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Ftms => write!(f, "FTMS (standard)"),
            Protocol::Csc => write!(f, "CSC (standard)"),
            Protocol::Mobi => write!(f, "MOBI (custom)"),
            Protocol::Reborn => write!(f, "REBORN (custom)"),
            Protocol::Tacx => write!(f, "TACX (custom)"),
            Protocol::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Capability advertised by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AverageSpeed,
    Cadence,
    TotalDistance,
    Inclination,
    ElevationGain,
    Pace,
    StepCount,
    ResistanceLevel,
    StrideCount,
    ExpendedEnergy,
    HeartRate,
    MetabolicEquivalent,
    ElapsedTime,
    RemainingTime,
    PowerMeasurement,
    ForceOnBelt,
    /// CSC Measurement characteristic present
    CscMeasurement,
    /// CSC Feature characteristic present
    CscFeature,
}

impl Capability {
    /// A standalone speed/cadence sensor.
    pub fn is_speed_cadence_sensor(&self) -> bool {
        matches!(self, Capability::CscMeasurement | Capability::CscFeature)
    }
}

/// Support range characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    /// km/h
    Speed,
    /// percent
    Incline,
    /// unitless level
    Resistance,
    /// watts
    Power,
}

impl std::fmt::Display for RangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeKind::Speed => write!(f, "speed"),
            RangeKind::Incline => write!(f, "incline"),
            RangeKind::Resistance => write!(f, "resistance"),
            RangeKind::Power => write!(f, "power"),
        }
    }
}

/// Range a device accepts for one control target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportRange {
    pub min: f64,
    pub max: f64,
    pub increment: f64,
}

impl SupportRange {
    /// Midpoint of the range.
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// A device discovered during BLE scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Platform peripheral identifier
    pub device_id: String,
    /// BLE address
    pub address: String,
    /// Name from the advertisement
    pub name: String,
    /// Advertised service UUIDs
    pub services: Vec<Uuid>,
    /// Primary protocol
    pub protocol: Protocol,
    /// All recognized protocols, in priority order
    pub supported_protocols: Vec<Protocol>,
    /// Signal strength (RSSI)
    pub signal_strength: Option<i16>,
    /// When the device was last seen
    pub last_seen: Instant,
}

impl DiscoveredDevice {
    /// Protocols joined for display, e.g. `FTMS+CSC`.
    pub fn protocols_label(&self) -> String {
        if self.supported_protocols.len() > 1 {
            self.supported_protocols
                .iter()
                .map(|p| format!("{p:?}").to_uppercase())
                .collect::<Vec<_>>()
                .join("+")
        } else {
            self.protocol.to_string()
        }
    }

    /// Case-insensitive name substring match.
    pub fn name_matches(&self, pattern: &str) -> bool {
        self.name.to_lowercase().contains(&pattern.to_lowercase())
    }

    /// Match against either the address or the platform identifier.
    pub fn address_matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address) || self.device_id.eq_ignore_ascii_case(address)
    }
}

/// Errors that can occur talking to the device.
#[derive(Debug, Error)]
pub enum SensorError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failed to start BLE scanning
    #[error("Failed to start scanning: {0}")]
    ScanFailed(String),

    /// Device not found with given identifier
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Connection to device failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timed out
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Device is not connected
    #[error("Device not connected")]
    NotConnected,

    /// Required characteristic missing
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    /// Failed to subscribe to notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// Failed to read a characteristic
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Failed to write to a characteristic
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),
}
