//! Compatibility classification.
//!
//! Rules are evaluated in order and the first match wins. The classifier is
//! total: any record, however incomplete, yields exactly one verdict and at
//! least one reason.

use crate::diagnosis::record::ObservationRecord;
use crate::sensors::types::Protocol;
use serde::Serialize;

/// Compatibility verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The device cannot be used
    Impossible,
    /// Vendor protocol; compatibility cannot be checked
    UnverifiableCustomProtocol,
    /// Usable only through the manufacturer's own app
    VendorAppRequired,
    /// Usable with reduced functionality
    Partial,
    /// Partial today; a device setting change would make it fully compatible
    PartialFixable,
    /// Fully compatible
    Full,
}

impl Verdict {
    /// Every verdict, from worst to best.
    pub const ALL: [Verdict; 6] = [
        Verdict::Impossible,
        Verdict::UnverifiableCustomProtocol,
        Verdict::VendorAppRequired,
        Verdict::Partial,
        Verdict::PartialFixable,
        Verdict::Full,
    ];
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Impossible => write!(f, "Impossible"),
            Verdict::UnverifiableCustomProtocol => write!(f, "Unverifiable (custom protocol)"),
            Verdict::VendorAppRequired => write!(f, "Vendor app required"),
            Verdict::Partial => write!(f, "Partial"),
            Verdict::PartialFixable => write!(f, "Partial (full after a settings fix)"),
            Verdict::Full => write!(f, "Full"),
        }
    }
}

/// A verdict with its justification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
}

impl Classification {
    fn new(verdict: Verdict, reason: impl Into<String>) -> Self {
        Self {
            verdict,
            reasons: vec![reason.into()],
        }
    }
}

/// Classify a record.
pub fn classify(record: &ObservationRecord) -> Classification {
    if !record.connected {
        return Classification::new(
            Verdict::Impossible,
            "Connection failed. Check the Bluetooth settings.",
        );
    }

    if !(record.has_speed_cadence_sensor() || record.has_speed_and_cadence()) {
        return Classification::new(
            Verdict::Impossible,
            "Essential speed/cadence sensor or data not found.",
        );
    }

    let protocol = record.protocol.unwrap_or(Protocol::Unknown);

    if protocol.is_custom() {
        return Classification::new(
            Verdict::UnverifiableCustomProtocol,
            format!("Compatibility of the {protocol} protocol cannot currently be verified."),
        );
    }

    match protocol {
        Protocol::Ftms => classify_ftms(record),
        Protocol::Csc => Classification::new(
            Verdict::Partial,
            "The CSC sensor-only protocol provides speed/cadence data only.",
        ),
        _ => Classification::new(Verdict::Impossible, "Unsupported protocol."),
    }
}

fn classify_ftms(record: &ObservationRecord) -> Classification {
    let both = record.has_speed_and_cadence();
    let sim = record.sim_mode_support;

    match (both, sim) {
        (true, true) => Classification::new(
            Verdict::Full,
            "Speed and cadence data are both present and simulation mode works.",
        ),
        (true, false) if record.has_unexpected_resistance_change() => Classification::new(
            Verdict::PartialFixable,
            "Resistance changes on its own without a related command. \
             Full compatibility is possible after changing the device settings.",
        ),
        (true, false) => Classification::new(
            Verdict::Partial,
            "Speed and cadence data are both present, but simulation mode \
             is not supported or another problem occurred.",
        ),
        (false, _) => Classification::new(
            Verdict::Impossible,
            "Speed or cadence, or both, were not detected.",
        ),
    }
}
