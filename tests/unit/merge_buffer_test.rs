//! Unit tests for split-notification merging.

use rideprobe::telemetry::{
    can_merge, decode_indoor_bike_data, merge_packets, FieldKind, MergeBuffer,
};
use std::collections::BTreeMap;

/// Decode both halves separately and as a merged record.
fn decode_pair(
    first: &[u8],
    first_flags: u16,
    second: &[u8],
    second_flags: u16,
) -> (BTreeMap<FieldKind, f64>, BTreeMap<FieldKind, f64>) {
    let mut union = decode_indoor_bike_data(second, second_flags).fields;
    union.extend(decode_indoor_bike_data(first, first_flags).fields);

    let (merged, merged_flags) = merge_packets(first, first_flags, second, second_flags);
    (union, decode_indoor_bike_data(&merged, merged_flags).fields)
}

#[test]
fn test_merge_is_union_of_parts() {
    let cases: [(&[u8], u16, &[u8], u16); 4] = [
        // speed + cadence, then more data + power
        (&[0x04, 0x00, 0xD0, 0x07, 0xB4, 0x00], 0x0004, &[0x41, 0x00, 0xFA, 0x00], 0x0041),
        // more data + resistance, then speed + heart rate
        (&[0x21, 0x00, 0x05, 0x00], 0x0021, &[0x00, 0x02, 0xC4, 0x09, 0x8C], 0x0200),
        // more data + distance, then cadence + elapsed time
        (&[0x11, 0x00, 0x40, 0xE2, 0x01], 0x0011, &[0x04, 0x08, 0x10, 0x27, 0xB4, 0x00, 0x3C, 0x00], 0x0804),
        // speed, then more data + avg power + energy
        (&[0x00, 0x00, 0x10, 0x27], 0x0000, &[0x81, 0x01, 0xC8, 0x00, 0x0A, 0x00], 0x0181),
    ];

    for (first, first_flags, second, second_flags) in cases {
        assert!(can_merge(first_flags, second_flags));
        let (union, merged) = decode_pair(first, first_flags, second, second_flags);
        assert_eq!(merged, union, "flags 0x{first_flags:04x} + 0x{second_flags:04x}");
    }
}

#[test]
fn test_overlap_is_never_merged() {
    assert!(!can_merge(0x0044, 0x0040));
    assert!(!can_merge(0x0001, 0x0041));
    assert!(can_merge(0x0004, 0x0040));
}

#[test]
fn test_overlapping_samples_finalize_in_order() {
    let mut buffer = MergeBuffer::new();
    let first = [0x41, 0x00, 0x64, 0x00]; // power 100
    let second = [0x41, 0x00, 0xC8, 0x00]; // power 200
    let third = [0x41, 0x00, 0x2C, 0x01]; // power 300

    assert!(buffer.ingest(0x0041, &first).is_empty());

    let emitted = buffer.ingest(0x0041, &second);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].get(FieldKind::Power), Some(100.0));

    let emitted = buffer.ingest(0x0041, &third);
    assert_eq!(emitted[0].get(FieldKind::Power), Some(200.0));

    let last = buffer.flush().unwrap();
    assert_eq!(last.get(FieldKind::Power), Some(300.0));
    assert!(buffer.flush().is_none());
}

#[test]
fn test_third_notification_starts_fresh_after_merge() {
    let mut buffer = MergeBuffer::new();

    buffer.ingest(0x0004, &[0x04, 0x00, 0xD0, 0x07, 0xB4, 0x00]);
    let merged = buffer.ingest(0x0041, &[0x41, 0x00, 0xFA, 0x00]);
    assert_eq!(merged.len(), 1);
    assert!(!buffer.is_pending());

    // A third notification is held, not merged into the emitted sample.
    assert!(buffer.ingest(0x0200, &[0x00, 0x02, 0xC4, 0x09, 0x8C]).is_empty());
    assert_eq!(buffer.pending_flags(), Some(0x0200));
}

#[test]
fn test_merged_record_flags() {
    let (merged, flags) = merge_packets(
        &[0x04, 0x00, 0xD0, 0x07, 0xB4, 0x00],
        0x0004,
        &[0x41, 0x00, 0xFA, 0x00],
        0x0041,
    );

    assert_eq!(flags, 0x0044);
    assert_eq!(merged, vec![0x44, 0x00, 0xD0, 0x07, 0xB4, 0x00, 0xFA, 0x00]);
}

#[test]
fn test_truncated_field_dropped_from_merge() {
    // more data + cadence, cut short after one cadence byte
    let first = [0x05, 0x00, 0x64];
    // speed 1.0 + power 200
    let second = [0x40, 0x00, 0x64, 0x00, 0xC8, 0x00];
    assert!(can_merge(0x0005, 0x0040));

    let (merged, merged_flags) = merge_packets(&first, 0x0005, &second, 0x0040);
    assert_eq!(merged_flags, 0x0040);
    assert_eq!(merged, vec![0x40, 0x00, 0x64, 0x00, 0xC8, 0x00]);

    let sample = decode_indoor_bike_data(&merged, merged_flags);
    assert_eq!(sample.get(FieldKind::Speed), Some(1.0));
    assert_eq!(sample.get(FieldKind::Power), Some(200.0));
    assert!(!sample.contains(FieldKind::Cadence));

    let mut buffer = MergeBuffer::new();
    assert!(buffer.ingest(0x0005, &first).is_empty());
    let emitted = buffer.ingest(0x0040, &second);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].flags, 0x0040);
    assert!(!emitted[0].contains(FieldKind::Cadence));
}
