//! BLE device communication: GATT constants, command builders and the
//! btleplug-backed manager.

pub mod ftms;
pub mod manager;
pub mod types;

pub use ftms::{CommandKind, CommandTarget, ControlPointResponse};
pub use manager::SensorManager;
pub use types::{Capability, DiscoveredDevice, Protocol, RangeKind, SensorError, SupportRange};
