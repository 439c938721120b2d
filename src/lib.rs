//! RideProbe - BLE indoor bike compatibility diagnostics
//!
//! Connects to a smart trainer, decodes its FTMS Indoor Bike Data, exercises
//! the Control Point and checks that resistance actually follows the commands
//! sent. The result is a compatibility verdict with the reasons behind it.

pub mod config;
pub mod diagnosis;
pub mod sensors;
pub mod telemetry;

// Re-export commonly used types
pub use config::ProbeConfig;
pub use diagnosis::{run_session, CompatibilityReport, ObservationRecord, ProbeSession, Verdict};
pub use sensors::manager::SensorManager;
pub use telemetry::{MergeBuffer, TelemetrySample};
