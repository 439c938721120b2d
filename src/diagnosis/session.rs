//! Probe session: the single owner of all per-device diagnostic state.
//!
//! The BLE notification task and the probe driver both feed [`ProbeEvent`]s
//! into one channel. The session consumes them strictly in arrival order, so
//! the merge buffer, the correlator and the observation record never need
//! locking. Command sends travel through the same channel, which keeps a send
//! ordered against the notifications around it.

use crate::diagnosis::classifier::{classify, Classification};
use crate::diagnosis::correlator::{ResistanceChange, ResistanceCorrelator};
use crate::diagnosis::record::{Anomaly, CommandOutcome, DeviceIdentity, ObservationRecord};
use crate::sensors::ftms::{
    parse_control_point_response, parse_machine_features, parse_support_range, CommandKind,
    CommandTarget,
};
use crate::sensors::types::{Capability, Protocol, RangeKind};
use crate::telemetry::decoder::{read_flags, TelemetrySample};
use crate::telemetry::merge::MergeBuffer;
use crossbeam::channel::Receiver;
use std::time::Instant;

/// Inbound events, in the order the transport and driver observed them.
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    /// Connected; services enumerated
    Connected(DeviceIdentity),
    /// Connection could not be established or was lost
    ConnectionFailed(String),
    /// Fitness Machine Feature characteristic value
    FeaturesRead(Vec<u8>),
    /// Support range characteristic value
    SupportRangeRead { kind: RangeKind, data: Vec<u8> },
    /// A GATT read failed
    ReadFailed { what: String, error: String },
    /// A command is about to be written to the Control Point
    CommandSent { kind: CommandKind, at: Instant },
    /// Writing a command failed at the transport
    CommandWriteFailed { kind: CommandKind, error: String },
    /// Control Point indication
    ControlPointResponse(Vec<u8>),
    /// Indoor Bike Data notification
    IndoorBikeData(Vec<u8>),
    /// The transport reported an error
    TransportError(String),
}

/// Per-device state machine fed by [`ProbeEvent`]s.
#[derive(Debug, Default)]
pub struct ProbeSession {
    record: ObservationRecord,
    buffer: MergeBuffer,
    correlator: ResistanceCorrelator,
}

impl ProbeSession {
    /// Create a session with an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record.
    pub fn record(&self) -> &ObservationRecord {
        &self.record
    }

    /// Resistance correlator, for inspection.
    pub fn correlator(&self) -> &ResistanceCorrelator {
        &self.correlator
    }

    /// Handle one event.
    pub fn handle(&mut self, event: ProbeEvent) {
        match event {
            ProbeEvent::Connected(device) => self.on_connected(device),
            ProbeEvent::ConnectionFailed(error) => {
                self.record.connected = false;
                self.record.push_anomaly(Anomaly::Transport(error));
            }
            ProbeEvent::FeaturesRead(data) => {
                let features = parse_machine_features(&data);
                tracing::info!(?features, "Fitness machine features");
                self.record.capabilities.extend(features);
            }
            ProbeEvent::SupportRangeRead { kind, data } => match parse_support_range(kind, &data) {
                Ok(range) => {
                    tracing::info!(%kind, min = range.min, max = range.max, increment = range.increment, "Support range");
                    self.record.support_ranges.insert(kind, range);
                }
                Err(error) => self.record.push_anomaly(Anomaly::DecodeFailure {
                    source: format!("{kind} range"),
                    error: error.to_string(),
                }),
            },
            ProbeEvent::ReadFailed { what, error } => {
                self.record.push_anomaly(Anomaly::ReadFailed { what, error });
            }
            ProbeEvent::CommandSent { kind, at } => {
                tracing::debug!(target: "bike_data", %kind, "Command sent");
                self.correlator.command_sent(kind, at);
            }
            ProbeEvent::CommandWriteFailed { kind, error } => {
                self.record.command_results.insert(kind, false);
                self.record
                    .push_anomaly(Anomaly::CommandWriteFailed { kind, error });
            }
            ProbeEvent::ControlPointResponse(data) => self.on_control_point_response(&data),
            ProbeEvent::IndoorBikeData(data) => self.on_indoor_bike_data(&data),
            ProbeEvent::TransportError(error) => {
                self.record.push_anomaly(Anomaly::Transport(error));
            }
        }
    }

    fn on_connected(&mut self, device: DeviceIdentity) {
        let supported = Protocol::supported(&device.services);
        let protocol = Protocol::detect(&device.services);

        if supported.contains(&Protocol::Csc) {
            self.record.capabilities.insert(Capability::CscMeasurement);
            self.record.capabilities.insert(Capability::CscFeature);
        }

        tracing::info!(
            name = %device.name,
            address = %device.address,
            %protocol,
            services = device.services.len(),
            "Device connected"
        );

        self.record.connected = true;
        self.record.protocol = Some(protocol);
        self.record.supported_protocols = supported;
        self.record.device = Some(device);
    }

    fn on_control_point_response(&mut self, data: &[u8]) {
        let response = match parse_control_point_response(data) {
            Ok(response) => response,
            Err(error) => {
                self.record.push_anomaly(Anomaly::DecodeFailure {
                    source: "Control Point response".to_string(),
                    error: error.to_string(),
                });
                return;
            }
        };

        let outcome = CommandOutcome {
            opcode: response.request_opcode,
            kind: CommandKind::from_opcode(response.request_opcode, CommandTarget::ControlPoint),
            result_code: response.result_code,
        };

        if outcome.is_success() {
            tracing::info!(command = %outcome.kind, "Control point operation succeeded");
        } else {
            tracing::warn!(
                command = %outcome.kind,
                result = %format_args!("0x{:02x}", outcome.result_code),
                "Control point operation failed"
            );
        }

        self.correlator.acknowledged(&outcome);
        self.record.record_outcome(outcome);
    }

    fn on_indoor_bike_data(&mut self, data: &[u8]) {
        let flags = match read_flags(data) {
            Ok(flags) => flags,
            Err(error) => {
                self.record.push_anomaly(Anomaly::DecodeFailure {
                    source: "Notification".to_string(),
                    error: error.to_string(),
                });
                return;
            }
        };

        tracing::debug!(
            target: "bike_data",
            flags = %format_args!("0x{flags:04x}"),
            raw = %hex(data),
            "Indoor bike data"
        );

        for sample in self.buffer.ingest(flags, data) {
            self.fold(&sample);
        }
    }

    fn fold(&mut self, sample: &TelemetrySample) {
        tracing::debug!(target: "bike_data", fields = ?sample.fields, "Sample finalized");
        self.record.absorb_sample(sample);

        if let Some(resistance) = sample.resistance() {
            if let ResistanceChange::Unexpected { from, to } =
                self.correlator.observe(resistance, &mut self.record)
            {
                tracing::warn!(from, to, "Unexpected resistance change");
            }
        }
    }

    /// Flush the merge buffer into the record.
    ///
    /// Must run before classification or the last fragment is lost.
    pub fn flush(&mut self) {
        if let Some(sample) = self.buffer.flush() {
            self.fold(&sample);
        }
    }

    /// End the session: flush, classify once and hand over the record.
    pub fn finish(mut self) -> ObservationRecord {
        self.flush();

        let classification: Classification = classify(&self.record);
        tracing::info!(
            verdict = %classification.verdict,
            reasons = ?classification.reasons,
            "Classification complete"
        );
        self.record.apply_classification(classification);
        self.record
    }
}

/// Drain `events` until every sender is dropped, then finish the session.
pub fn run_session(events: Receiver<ProbeEvent>) -> ObservationRecord {
    let mut session = ProbeSession::new();
    for event in events.iter() {
        session.handle(event);
    }
    session.finish()
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
