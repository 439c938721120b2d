//! Unit tests for Indoor Bike Data decoding.

use rideprobe::telemetry::{decode_indoor_bike_data, parse_indoor_bike_data, DecodeError, FieldKind};

#[test]
fn test_decode_speed_only() {
    // Flags: 0x0000 (only instantaneous speed)
    // Speed: 10000 = 100.00 km/h
    let sample = decode_indoor_bike_data(&[0x00, 0x00, 0x10, 0x27], 0x0000);

    assert_eq!(sample.len(), 1);
    assert!((sample.get(FieldKind::Speed).unwrap() - 100.0).abs() < 0.001);
}

#[test]
fn test_decode_cadence_with_more_data() {
    // Flags: 0x0005 (more data + instantaneous cadence)
    // Cadence: 100 = 50 RPM (0.5 resolution)
    let sample = decode_indoor_bike_data(&[0x05, 0x00, 0x64, 0x00], 0x0005);

    assert_eq!(sample.len(), 1);
    assert_eq!(sample.get(FieldKind::Cadence), Some(50.0));
}

#[test]
fn test_decode_cadence_flag_without_more_data() {
    // Flags: 0x0004, speed is still present and takes the only two bytes
    let sample = decode_indoor_bike_data(&[0x04, 0x00, 0x64, 0x00], 0x0004);

    assert_eq!(sample.get(FieldKind::Speed), Some(1.0));
    assert!(!sample.contains(FieldKind::Cadence));
}

#[test]
fn test_decode_all_fields() {
    // Every field flag set except More Data
    let flags: u16 = 0x1FFE;
    let mut data = flags.to_le_bytes().to_vec();
    data.extend_from_slice(&2500u16.to_le_bytes()); // speed 25.00
    data.extend_from_slice(&2400u16.to_le_bytes()); // avg speed 24.00
    data.extend_from_slice(&180u16.to_le_bytes()); // cadence 90
    data.extend_from_slice(&170u16.to_le_bytes()); // avg cadence 85
    data.extend_from_slice(&[0x10, 0x27, 0x00]); // distance 1000.0
    data.extend_from_slice(&7i16.to_le_bytes()); // resistance
    data.extend_from_slice(&250i16.to_le_bytes()); // power
    data.extend_from_slice(&230i16.to_le_bytes()); // avg power
    data.extend_from_slice(&120u16.to_le_bytes()); // energy
    data.push(142); // heart rate
    data.extend_from_slice(&850u16.to_le_bytes()); // MET 8.50
    data.extend_from_slice(&600u16.to_le_bytes()); // elapsed
    data.extend_from_slice(&1200u16.to_le_bytes()); // remaining

    let sample = parse_indoor_bike_data(&data).unwrap();

    assert_eq!(sample.len(), 13);
    assert_eq!(sample.get(FieldKind::AvgSpeed), Some(24.0));
    assert_eq!(sample.get(FieldKind::AvgCadence), Some(85.0));
    assert_eq!(sample.get(FieldKind::Distance), Some(1000.0));
    assert_eq!(sample.resistance(), Some(7));
    assert_eq!(sample.get(FieldKind::AvgPower), Some(230.0));
    assert_eq!(sample.get(FieldKind::Energy), Some(120.0));
    assert_eq!(sample.get(FieldKind::HeartRate), Some(142.0));
    assert!((sample.get(FieldKind::Met).unwrap() - 8.5).abs() < 1e-9);
    assert_eq!(sample.get(FieldKind::RemainingTime), Some(1200.0));
}

#[test]
fn test_decode_negative_power() {
    // More data + power, -20 W
    let sample = decode_indoor_bike_data(&[0x41, 0x00, 0xEC, 0xFF], 0x0041);
    assert_eq!(sample.get(FieldKind::Power), Some(-20.0));
}

#[test]
fn test_truncated_field_misaligns_later_fields() {
    // Flags: more data + cadence + power, but only two payload bytes.
    // Cadence is decoded, power is dropped.
    let sample = decode_indoor_bike_data(&[0x45, 0x00, 0xB4, 0x00], 0x0045);
    assert_eq!(sample.get(FieldKind::Cadence), Some(90.0));
    assert!(!sample.contains(FieldKind::Power));

    // Flags: more data + distance + heart rate with two payload bytes.
    // Distance does not fit, heart rate is read from where distance began.
    let sample = decode_indoor_bike_data(&[0x11, 0x02, 0x50, 0x60], 0x0211);
    assert!(!sample.contains(FieldKind::Distance));
    assert_eq!(sample.get(FieldKind::HeartRate), Some(80.0));
}

#[test]
fn test_decode_is_repeatable() {
    let data = [0x44, 0x00, 0xAC, 0x0D, 0xBE, 0x00, 0x2C, 0x01];
    assert_eq!(
        parse_indoor_bike_data(&data).unwrap(),
        parse_indoor_bike_data(&data).unwrap()
    );
}

#[test]
fn test_parse_too_short() {
    assert_eq!(
        parse_indoor_bike_data(&[]),
        Err(DecodeError::TooShort { len: 0, min: 2 })
    );
}

#[test]
fn test_field_kind_names() {
    assert_eq!(FieldKind::HeartRate.to_string(), "heart_rate");
    assert_eq!(FieldKind::Met.as_str(), "met");
}
