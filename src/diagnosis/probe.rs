//! Scripted test sequence run against a connected device.
//!
//! The probe only drives the device. Everything it learns travels as
//! [`ProbeEvent`]s to the session, which owns the observation record.

use crate::config::TestSettings;
use crate::diagnosis::record::DeviceIdentity;
use crate::diagnosis::session::ProbeEvent;
use crate::sensors::ftms::{
    build_request_control, build_reset, build_set_resistance_level, build_set_simulation,
    build_set_target_power, build_start_training, build_stop_training, parse_support_range,
    CommandKind, FTMS_FEATURE_UUID, INCLINE_RANGE_UUID, POWER_RANGE_UUID, RESISTANCE_RANGE_UUID,
    SPEED_RANGE_UUID,
};
use crate::sensors::manager::SensorManager;
use crate::sensors::types::{Protocol, RangeKind};
use std::time::Duration;
use uuid::Uuid;

/// Which part of the sequence applies to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePath {
    /// FTMS: full control and telemetry test
    Ftms,
    /// CSC only: nothing to control
    SensorOnly,
    /// Vendor protocol: not probed
    Custom(Protocol),
    /// Nothing recognized
    Unsupported,
}

impl ProbePath {
    /// Choose the path from the services found after connecting.
    pub fn for_services(services: &[Uuid]) -> Self {
        let supported = Protocol::supported(services);
        if supported.contains(&Protocol::Ftms) {
            ProbePath::Ftms
        } else if supported.contains(&Protocol::Csc) {
            ProbePath::SensorOnly
        } else {
            match supported.first() {
                Some(protocol) => ProbePath::Custom(*protocol),
                None => ProbePath::Unsupported,
            }
        }
    }
}

/// Support range characteristics, read in this order.
const RANGE_CHARACTERISTICS: [(RangeKind, Uuid); 4] = [
    (RangeKind::Speed, SPEED_RANGE_UUID),
    (RangeKind::Incline, INCLINE_RANGE_UUID),
    (RangeKind::Resistance, RESISTANCE_RANGE_UUID),
    (RangeKind::Power, POWER_RANGE_UUID),
];

/// Pick the resistance level to probe with: the middle of the advertised
/// range, or the configured fallback.
pub fn probe_resistance_level(range_data: Option<&[u8]>, fallback: u8) -> u8 {
    range_data
        .and_then(|data| parse_support_range(RangeKind::Resistance, data).ok())
        .map(|range| range.midpoint().floor().clamp(0.0, u8::MAX as f64) as u8)
        .unwrap_or(fallback)
}

/// Drives the test sequence over a connected [`SensorManager`].
pub struct DeviceProbe<'a> {
    manager: &'a mut SensorManager,
    settings: TestSettings,
}

impl<'a> DeviceProbe<'a> {
    pub fn new(manager: &'a mut SensorManager, settings: TestSettings) -> Self {
        Self { manager, settings }
    }

    /// Run everything up to the pedaling window.
    ///
    /// Returns the path taken; only [`ProbePath::Ftms`] continues with
    /// [`DeviceProbe::collect_pedaling`].
    pub async fn run_control_tests(&mut self, device: &DeviceIdentity) -> ProbePath {
        let path = ProbePath::for_services(&device.services);

        match path {
            ProbePath::Ftms => {
                tracing::info!("FTMS supported, running the full compatibility test");
            }
            ProbePath::SensorOnly => {
                tracing::info!("Only the CSC profile is available, nothing to control");
                return path;
            }
            ProbePath::Custom(protocol) => {
                tracing::info!(%protocol, "Vendor protocol, skipping control tests");
                return path;
            }
            ProbePath::Unsupported => {
                tracing::warn!("No supported protocol found");
                return path;
            }
        }

        if let Err(e) = self.manager.subscribe().await {
            tracing::error!(error = %e, "FTMS characteristics unavailable");
            self.manager
                .send_event(ProbeEvent::TransportError(e.to_string()));
            return ProbePath::Unsupported;
        }

        tracing::info!("Requesting control");
        self.command(CommandKind::RequestControl, &build_request_control())
            .await;
        self.settle(self.settings.control_settle()).await;

        self.read_features().await;
        let resistance_range = self.read_support_ranges().await;

        let level = probe_resistance_level(
            resistance_range.as_deref(),
            self.settings.fallback_resistance_level,
        );
        self.probe_command(
            CommandKind::SetResistanceLevel,
            &build_set_resistance_level(level),
        )
        .await;
        self.probe_command(
            CommandKind::SetTargetPower,
            &build_set_target_power(self.settings.target_power_watts),
        )
        .await;
        self.probe_command(
            CommandKind::SetSimParams,
            &build_set_simulation(0, self.settings.probe_grade, 0, 0),
        )
        .await;

        self.command(CommandKind::Reset, &build_reset()).await;
        self.settle(self.settings.command_settle()).await;
        self.command(CommandKind::Start, &build_start_training())
            .await;
        self.settle(self.settings.step_settle()).await;

        tracing::info!(
            grade = self.settings.sim_test_grade,
            "Simulation mode test while stationary"
        );
        self.settle(self.settings.control_settle()).await;
        self.command(
            CommandKind::SetSimParams,
            &build_set_simulation(0, self.settings.sim_test_grade, 0, 0),
        )
        .await;
        self.settle(self.settings.step_settle()).await;

        path
    }

    /// Collect pedaling data for the configured window, then stop.
    pub async fn collect_pedaling(&mut self) {
        tracing::info!(
            secs = self.settings.pedaling_secs,
            "Collecting pedaling data"
        );
        self.settle(self.settings.pedaling()).await;

        self.command(CommandKind::Stop, &build_stop_training())
            .await;
        self.settle(self.settings.control_settle()).await;
        tracing::info!("Test sequence complete");
    }

    async fn read_features(&mut self) {
        match self.manager.read_characteristic(FTMS_FEATURE_UUID).await {
            Ok(data) => self.manager.send_event(ProbeEvent::FeaturesRead(data)),
            Err(e) => self.manager.send_event(ProbeEvent::ReadFailed {
                what: "Fitness Machine Feature".to_string(),
                error: e.to_string(),
            }),
        }
    }

    /// Read every advertised support range; returns the raw resistance range.
    async fn read_support_ranges(&mut self) -> Option<Vec<u8>> {
        let mut resistance = None;

        for (kind, uuid) in RANGE_CHARACTERISTICS {
            if !self.manager.has_characteristic(uuid) {
                tracing::info!(%kind, "Support range not provided");
                continue;
            }

            match self.manager.read_characteristic(uuid).await {
                Ok(data) => {
                    if kind == RangeKind::Resistance {
                        resistance = Some(data.clone());
                    }
                    self.manager
                        .send_event(ProbeEvent::SupportRangeRead { kind, data });
                }
                Err(e) => self.manager.send_event(ProbeEvent::ReadFailed {
                    what: format!("{kind} range"),
                    error: e.to_string(),
                }),
            }
        }

        resistance
    }

    async fn command(&mut self, kind: CommandKind, data: &[u8]) {
        // Failures are reported to the session by the manager.
        let _ = self.manager.send_command(kind, data).await;
    }

    /// Send a command under test and wait for its acknowledgement.
    async fn probe_command(&mut self, kind: CommandKind, data: &[u8]) {
        self.command(kind, data).await;
        self.settle(self.settings.command_settle()).await;
    }

    async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
