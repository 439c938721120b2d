//! Observation record accumulated over one probe session.

use crate::diagnosis::classifier::{Classification, Verdict};
use crate::sensors::ftms::CommandKind;
use crate::sensors::types::{Capability, Protocol, RangeKind, SupportRange};
use crate::telemetry::decoder::{FieldKind, TelemetrySample};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Identity of the probed device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceIdentity {
    pub name: String,
    pub address: String,
    /// Service UUIDs found after connecting
    pub services: Vec<Uuid>,
}

/// Result of one Control Point acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub opcode: u8,
    pub kind: CommandKind,
    pub result_code: u8,
}

impl CommandOutcome {
    /// Whether the device accepted the command.
    pub fn is_success(&self) -> bool {
        self.result_code == crate::sensors::ftms::RESULT_SUCCESS
    }
}

/// Something unexpected observed during the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Anomaly {
    /// The trainer changed resistance on its own
    UnexpectedResistanceChange { from: i16, to: i16 },
    /// A notification or response could not be decoded
    DecodeFailure { source: String, error: String },
    /// A command write failed at the transport
    CommandWriteFailed { kind: CommandKind, error: String },
    /// A GATT read failed
    ReadFailed { what: String, error: String },
    /// The transport reported an error
    Transport(String),
}

impl Anomaly {
    /// Resistance drift not explained by a command.
    pub fn is_unexpected_resistance_change(&self) -> bool {
        matches!(self, Anomaly::UnexpectedResistanceChange { .. })
    }
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Anomaly::UnexpectedResistanceChange { from, to } => write!(
                f,
                "Resistance changed without a preceding resistance-related command ({from} -> {to})"
            ),
            Anomaly::DecodeFailure { source, error } => {
                write!(f, "{source} processing error: {error}")
            }
            Anomaly::CommandWriteFailed { kind, error } => {
                write!(f, "{kind} could not be sent: {error}")
            }
            Anomaly::ReadFailed { what, error } => write!(f, "Could not read {what}: {error}"),
            Anomaly::Transport(error) => write!(f, "Connection/testing error: {error}"),
        }
    }
}

impl Serialize for Anomaly {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Everything learned about the device during one session.
///
/// Owned by the probe session; the classifier reads it once at the end.
#[derive(Debug, Clone, Default)]
pub struct ObservationRecord {
    pub device: Option<DeviceIdentity>,
    pub connected: bool,
    pub protocol: Option<Protocol>,
    pub supported_protocols: Vec<Protocol>,
    pub capabilities: BTreeSet<Capability>,
    pub support_ranges: BTreeMap<RangeKind, SupportRange>,
    /// Last value seen per field
    pub detected_fields: BTreeMap<FieldKind, f64>,
    /// Latest success flag per command
    pub command_results: BTreeMap<CommandKind, bool>,
    /// Every acknowledgement, in arrival order
    pub command_outcomes: Vec<CommandOutcome>,
    pub sim_mode_support: bool,
    pub resistance_control: bool,
    pub anomalies: Vec<Anomaly>,
    pub reasons: Vec<String>,
    verdict: Option<Verdict>,
}

impl ObservationRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an emitted telemetry sample into the detected fields.
    pub fn absorb_sample(&mut self, sample: &TelemetrySample) {
        self.detected_fields
            .extend(sample.fields.iter().map(|(kind, value)| (*kind, *value)));
    }

    /// Record a Control Point acknowledgement in the command ledger.
    pub fn record_outcome(&mut self, outcome: CommandOutcome) {
        self.command_results.insert(outcome.kind, outcome.is_success());
        self.command_outcomes.push(outcome);
    }

    /// Append an anomaly.
    pub fn push_anomaly(&mut self, anomaly: Anomaly) {
        tracing::warn!(%anomaly, "Anomaly recorded");
        self.anomalies.push(anomaly);
    }

    /// Whether a field was seen at least once.
    pub fn has_field(&self, kind: FieldKind) -> bool {
        self.detected_fields.contains_key(&kind)
    }

    /// Speed and cadence both detected.
    pub fn has_speed_and_cadence(&self) -> bool {
        self.has_field(FieldKind::Speed) && self.has_field(FieldKind::Cadence)
    }

    /// A standalone speed/cadence sensor was found, by capability or service.
    pub fn has_speed_cadence_sensor(&self) -> bool {
        let by_capability = self
            .capabilities
            .iter()
            .any(Capability::is_speed_cadence_sensor);
        let by_service = self.device.as_ref().is_some_and(|d| {
            Protocol::Csc
                .service_uuid()
                .is_some_and(|csc| d.services.contains(&csc))
        });
        by_capability || by_service
    }

    /// Resistance drifted without a command at least once.
    pub fn has_unexpected_resistance_change(&self) -> bool {
        self.anomalies
            .iter()
            .any(Anomaly::is_unexpected_resistance_change)
    }

    /// Final verdict, once classified.
    pub fn verdict(&self) -> Option<Verdict> {
        self.verdict
    }

    /// Store a classification, replacing reasons wholesale.
    pub fn apply_classification(&mut self, classification: Classification) {
        self.verdict = Some(classification.verdict);
        self.reasons = classification.reasons;
    }
}
