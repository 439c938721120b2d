//! Unit tests for Control Point commands and FTMS characteristic parsing.

use rideprobe::sensors::ftms::{
    build_request_control, build_reset, build_set_resistance_level, build_set_simulation,
    build_set_target_power, build_start_training, build_stop_training,
    parse_control_point_response, parse_machine_features, parse_support_range,
};
use rideprobe::sensors::{Capability, CommandKind, CommandTarget, RangeKind};
use rideprobe::telemetry::DecodeError;

#[test]
fn test_build_simple_commands() {
    assert_eq!(build_request_control(), vec![0x00]);
    assert_eq!(build_reset(), vec![0x01]);
    assert_eq!(build_start_training(), vec![0x07]);
    assert_eq!(build_stop_training(), vec![0x08]);
}

#[test]
fn test_build_set_resistance_level() {
    assert_eq!(build_set_resistance_level(8), vec![0x04, 0x08]);
}

#[test]
fn test_build_set_target_power() {
    // 100W = 0x0064
    assert_eq!(build_set_target_power(100), vec![0x05, 0x64, 0x00]);
}

#[test]
fn test_build_set_simulation() {
    // Grade 10.00% = 1000 = 0x03E8
    assert_eq!(
        build_set_simulation(0, 1000, 0, 0),
        vec![0x11, 0x00, 0x00, 0xE8, 0x03, 0x00, 0x00]
    );
    // Grade -3.06%
    let cmd = build_set_simulation(0, -306, 40, 51);
    assert_eq!(&cmd[3..5], &(-306i16).to_le_bytes());
    assert_eq!(&cmd[5..], &[40, 51]);
}

#[test]
fn test_opcodes_round_trip_per_target() {
    for kind in [
        CommandKind::RequestControl,
        CommandKind::Reset,
        CommandKind::SetResistanceLevel,
        CommandKind::SetTargetPower,
        CommandKind::Start,
        CommandKind::Stop,
        CommandKind::SetSimParams,
    ] {
        assert_eq!(
            CommandKind::from_opcode(kind.opcode(), CommandTarget::ControlPoint),
            kind
        );
    }

    for kind in [
        CommandKind::GetSpeedRange,
        CommandKind::GetInclineRange,
        CommandKind::GetResistanceRange,
        CommandKind::GetPowerRange,
    ] {
        assert_eq!(
            CommandKind::from_opcode(kind.opcode(), CommandTarget::SupportRange),
            kind
        );
    }
}

#[test]
fn test_resistance_related_commands() {
    assert!(CommandKind::SetResistanceLevel.is_resistance_related());
    assert!(CommandKind::SetTargetPower.is_resistance_related());
    assert!(CommandKind::SetSimParams.is_resistance_related());
    assert!(!CommandKind::GetInclineRange.is_resistance_related());
    assert!(!CommandKind::Start.is_resistance_related());
}

#[test]
fn test_control_point_response() {
    let response = parse_control_point_response(&[0x80, 0x04, 0x01]).unwrap();
    assert_eq!(response.request_opcode, 0x04);
    assert!(response.is_success());

    let response = parse_control_point_response(&[0x80, 0x11, 0x02, 0xFF]).unwrap();
    assert!(!response.is_success());

    assert_eq!(
        parse_control_point_response(&[0x00, 0x04, 0x01]),
        Err(DecodeError::UnexpectedResponseCode(0x00))
    );
    assert!(matches!(
        parse_control_point_response(&[0x80, 0x04]),
        Err(DecodeError::TooShort { len: 2, min: 3 })
    ));
}

#[test]
fn test_machine_features() {
    // Cadence (bit 1), resistance level (bit 7), power measurement (bit 14),
    // plus target setting bits in the second word, which are ignored.
    let data = [0x82, 0x40, 0x00, 0x00, 0x0C, 0xE0, 0x00, 0x00];
    let features = parse_machine_features(&data);

    assert_eq!(
        features,
        vec![
            Capability::Cadence,
            Capability::ResistanceLevel,
            Capability::PowerMeasurement
        ]
    );
}

#[test]
fn test_machine_features_short_payload() {
    assert_eq!(parse_machine_features(&[0x01]), vec![Capability::AverageSpeed]);
    assert!(parse_machine_features(&[]).is_empty());
}

#[test]
fn test_support_ranges() {
    // Speed 0.00 - 60.00 km/h, step 0.01
    let speed = parse_support_range(RangeKind::Speed, &[0x00, 0x00, 0x70, 0x17, 0x01, 0x00]).unwrap();
    assert_eq!(speed.max, 60.0);
    assert!((speed.increment - 0.01).abs() < 1e-9);

    // Incline -10.0% - 20.0%, step 0.5
    let incline =
        parse_support_range(RangeKind::Incline, &[0x9C, 0xFF, 0xC8, 0x00, 0x05, 0x00]).unwrap();
    assert_eq!(incline.min, -10.0);
    assert_eq!(incline.max, 20.0);
    assert_eq!(incline.increment, 0.5);

    // Power 0 - 2000 W, step 5
    let power = parse_support_range(RangeKind::Power, &[0x00, 0x00, 0xD0, 0x07, 0x05, 0x00]).unwrap();
    assert_eq!(power.max, 2000.0);
    assert_eq!(power.midpoint(), 1000.0);

    assert!(parse_support_range(RangeKind::Resistance, &[0x01, 0x00]).is_err());
}
