//! Reassembly of split Indoor Bike Data notifications.
//!
//! Some trainers spread one logical sample over two consecutive notifications
//! whose flag words claim disjoint field sets. The buffer holds at most one
//! notification and combines it with the next one when their flags do not
//! overlap.

use crate::telemetry::decoder::{decode_indoor_bike_data, flags_for, raw_fields, TelemetrySample};

/// Flag bits with no field assigned.
const RESERVED_FLAGS: u16 = 0xE000;

/// A notification waiting for a possible merge partner.
#[derive(Debug, Clone)]
struct PendingPacket {
    flags: u16,
    raw: Vec<u8>,
    sample: TelemetrySample,
}

/// Single-slot buffer deciding hold / emit / combine for each notification.
#[derive(Debug, Default)]
pub struct MergeBuffer {
    pending: Option<PendingPacket>,
}

impl MergeBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a notification is currently held.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Flag word of the held notification.
    pub fn pending_flags(&self) -> Option<u16> {
        self.pending.as_ref().map(|p| p.flags)
    }

    /// Feed one notification and return the samples that became final.
    pub fn ingest(&mut self, flags: u16, raw: &[u8]) -> Vec<TelemetrySample> {
        let Some(prior) = self.pending.take() else {
            self.hold(flags, raw);
            return Vec::new();
        };

        if can_merge(prior.flags, flags) {
            let (merged, merged_flags) = merge_packets(&prior.raw, prior.flags, raw, flags);
            tracing::debug!(
                target: "bike_data",
                first = %format_args!("0x{:04x}", prior.flags),
                second = %format_args!("0x{flags:04x}"),
                merged = %format_args!("0x{merged_flags:04x}"),
                "Merging notifications"
            );
            return vec![decode_indoor_bike_data(&merged, merged_flags)];
        }

        tracing::debug!(
            target: "bike_data",
            pending = %format_args!("0x{:04x}", prior.flags),
            incoming = %format_args!("0x{flags:04x}"),
            "Flags overlap, finalizing pending notification"
        );
        self.hold(flags, raw);
        vec![prior.sample]
    }

    /// Emit the held notification, if any, and clear the buffer.
    pub fn flush(&mut self) -> Option<TelemetrySample> {
        let pending = self.pending.take()?;
        tracing::debug!(
            target: "bike_data",
            flags = %format_args!("0x{:04x}", pending.flags),
            "Flushing buffered notification"
        );
        Some(pending.sample)
    }

    fn hold(&mut self, flags: u16, raw: &[u8]) {
        self.pending = Some(PendingPacket {
            flags,
            raw: raw.to_vec(),
            sample: decode_indoor_bike_data(raw, flags),
        });
    }
}

/// Two notifications can be combined when no flag bit is claimed by both.
pub fn can_merge(first: u16, second: u16) -> bool {
    first & second == 0
}

/// Build the combined record for two notifications with disjoint flags.
///
/// The result carries every field of both records in flag-bit order under one
/// flag word. When all fields of `first` precede those of `second`, this is the
/// first record with its flag prefix replaced, followed by the second record's
/// field bytes. Speed presence is inverted on the wire, so the union of the
/// two flag words cannot be used as-is; the flag word is rebuilt from the
/// fields actually carried. Bits above the field table are kept from both.
pub fn merge_packets(first: &[u8], first_flags: u16, second: &[u8], second_flags: u16) -> (Vec<u8>, u16) {
    let mut segments = raw_fields(second, second_flags);
    // The earlier notification wins a field both carry.
    segments.extend(raw_fields(first, first_flags));

    let reserved = (first_flags | second_flags) & RESERVED_FLAGS;
    let merged_flags = flags_for(segments.keys()) | reserved;

    let mut merged = Vec::with_capacity(first.len() + second.len());
    merged.extend_from_slice(&merged_flags.to_le_bytes());
    for bytes in segments.values() {
        merged.extend_from_slice(bytes);
    }

    (merged, merged_flags)
}
