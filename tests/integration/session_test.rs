//! Session scenarios driven by scripted event traces.

use crate::sensor_mock::{ack, sent, MockTrainer};
use rideprobe::diagnosis::{run_session, ProbeEvent, ProbeSession, Verdict};
use rideprobe::sensors::{Capability, CommandKind, Protocol, RangeKind};
use rideprobe::telemetry::FieldKind;

fn replay(events: Vec<ProbeEvent>) -> ProbeSession {
    let mut session = ProbeSession::new();
    for event in events {
        session.handle(event);
    }
    session
}

#[test]
fn test_commanded_resistance_change_confirms_control() {
    let mut trainer = MockTrainer::default();
    let mut events = vec![trainer.connected(), trainer.resistance_packet()];

    events.push(sent(CommandKind::SetResistanceLevel));
    events.push(ack(CommandKind::SetResistanceLevel, 0x01));
    trainer.resistance = 8;
    events.push(trainer.resistance_packet());

    let record = replay(events).finish();

    assert!(record.resistance_control);
    assert!(!record.sim_mode_support);
    assert!(record.anomalies.is_empty());
    assert_eq!(
        record.command_results.get(&CommandKind::SetResistanceLevel),
        Some(&true)
    );
}

#[test]
fn test_uncommanded_resistance_change_is_anomaly() {
    let mut trainer = MockTrainer::default();
    let mut events = vec![trainer.connected(), trainer.resistance_packet()];
    trainer.resistance = 8;
    events.push(trainer.resistance_packet());

    let record = replay(events).finish();

    assert!(!record.resistance_control);
    assert_eq!(record.anomalies.len(), 1);
    assert!(record.has_unexpected_resistance_change());
}

#[test]
fn test_buffered_sample_survives_teardown() {
    let trainer = MockTrainer::default();
    let [first, _] = trainer.split_packets();

    let session = replay(vec![trainer.connected(), first]);
    assert!(!session.record().has_field(FieldKind::Speed));

    let record = session.finish();
    assert!(record.has_field(FieldKind::Speed));
    assert!(record.has_field(FieldKind::Cadence));
}

#[test]
fn test_split_notifications_merge_into_one_sample() {
    let trainer = MockTrainer::default();
    let [first, second] = trainer.split_packets();

    let session = replay(vec![trainer.connected(), first, second]);
    let record = session.record();

    for kind in [
        FieldKind::Speed,
        FieldKind::Cadence,
        FieldKind::Resistance,
        FieldKind::Power,
    ] {
        assert!(record.has_field(kind), "{kind} missing after merge");
    }
}

#[test]
fn test_full_compatibility_trace() {
    let mut trainer = MockTrainer::default();
    let mut events = vec![
        trainer.connected(),
        ProbeEvent::FeaturesRead(vec![0x82, 0x40, 0x00, 0x00]),
        ProbeEvent::SupportRangeRead {
            kind: RangeKind::Resistance,
            data: vec![0x00, 0x00, 0x0F, 0x00, 0x01, 0x00],
        },
        sent(CommandKind::RequestControl),
        ack(CommandKind::RequestControl, 0x01),
    ];
    events.extend(trainer.split_packets());

    events.push(sent(CommandKind::SetSimParams));
    events.push(ack(CommandKind::SetSimParams, 0x01));
    trainer.resistance = 9;
    events.extend(trainer.split_packets());
    events.push(trainer.full_packet());

    let record = replay(events).finish();

    assert_eq!(record.verdict(), Some(Verdict::Full));
    assert!(record.sim_mode_support);
    assert_eq!(record.protocol, Some(Protocol::Ftms));
    assert!(record.capabilities.contains(&Capability::ResistanceLevel));
    assert_eq!(record.support_ranges[&RangeKind::Resistance].max, 15.0);
    assert!(record.anomalies.is_empty());
}

#[test]
fn test_drift_with_both_fields_is_fixable() {
    let mut trainer = MockTrainer::default();
    let mut events = vec![trainer.connected(), trainer.full_packet()];
    trainer.resistance = 12;
    events.push(trainer.full_packet());

    let record = replay(events).finish();

    assert_eq!(record.verdict(), Some(Verdict::PartialFixable));
}

#[test]
fn test_failed_command_and_write_failure_are_recorded() {
    let trainer = MockTrainer::default();
    let events = vec![
        trainer.connected(),
        sent(CommandKind::SetTargetPower),
        ack(CommandKind::SetTargetPower, 0x03),
        ProbeEvent::CommandWriteFailed {
            kind: CommandKind::Stop,
            error: "not connected".to_string(),
        },
    ];

    let record = replay(events).finish();

    assert_eq!(record.command_results.get(&CommandKind::SetTargetPower), Some(&false));
    assert_eq!(record.command_results.get(&CommandKind::Stop), Some(&false));
    assert_eq!(record.anomalies.len(), 1);
}

#[test]
fn test_csc_service_adds_capabilities() {
    let trainer = MockTrainer::with_csc();
    let session = replay(vec![trainer.connected()]);
    let record = session.record();

    assert!(record.capabilities.contains(&Capability::CscMeasurement));
    assert!(record.capabilities.contains(&Capability::CscFeature));
    assert_eq!(record.supported_protocols, vec![Protocol::Ftms, Protocol::Csc]);
}

#[test]
fn test_malformed_payloads_do_not_stop_session() {
    let trainer = MockTrainer::default();
    let events = vec![
        trainer.connected(),
        ProbeEvent::ControlPointResponse(vec![0x80]),
        ProbeEvent::SupportRangeRead {
            kind: RangeKind::Speed,
            data: vec![0x00],
        },
        ProbeEvent::IndoorBikeData(vec![]),
        trainer.full_packet(),
    ];

    let record = replay(events).finish();

    assert_eq!(record.anomalies.len(), 3);
    assert!(record.has_speed_and_cadence());
    assert_eq!(record.verdict(), Some(Verdict::Partial));
}

#[test]
fn test_run_session_across_threads() {
    let trainer = MockTrainer::default();
    let (tx, rx) = crossbeam::channel::unbounded();
    let consumer = std::thread::spawn(move || run_session(rx));

    let notifications = tx.clone();
    let producer = std::thread::spawn(move || {
        for _ in 0..10 {
            notifications.send(trainer.full_packet()).unwrap();
        }
    });

    tx.send(sent(CommandKind::Start)).unwrap();
    producer.join().unwrap();
    drop(tx);

    let record = consumer.join().unwrap();
    assert!(!record.connected);
    assert_eq!(record.verdict(), Some(Verdict::Impossible));
    assert!(record.has_speed_and_cadence());
}
