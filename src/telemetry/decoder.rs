//! Indoor Bike Data (0x2AD2) field decoder.
//!
//! The notification starts with a little-endian flag word; each flag bit
//! announces an optional field and the fields follow in bit order. Bit 0 is
//! inverted: instantaneous speed is present when the "More Data" bit is clear.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Kind of field carried by an Indoor Bike Data notification.
///
/// Declaration order matches flag bit order, so a `BTreeMap` keyed by this
/// type iterates fields in the order they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Instantaneous speed in km/h
    Speed,
    /// Average speed in km/h
    AvgSpeed,
    /// Instantaneous cadence in RPM
    Cadence,
    /// Average cadence in RPM
    AvgCadence,
    /// Total distance in meters
    Distance,
    /// Resistance level (unitless)
    Resistance,
    /// Instantaneous power in watts
    Power,
    /// Average power in watts
    AvgPower,
    /// Expended energy in kJ
    Energy,
    /// Heart rate in BPM
    HeartRate,
    /// Metabolic equivalent
    Met,
    /// Elapsed time in seconds
    ElapsedTime,
    /// Remaining time in seconds
    RemainingTime,
}

impl FieldKind {
    /// Stable snake_case name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Speed => "speed",
            FieldKind::AvgSpeed => "avg_speed",
            FieldKind::Cadence => "cadence",
            FieldKind::AvgCadence => "avg_cadence",
            FieldKind::Distance => "distance",
            FieldKind::Resistance => "resistance",
            FieldKind::Power => "power",
            FieldKind::AvgPower => "avg_power",
            FieldKind::Energy => "energy",
            FieldKind::HeartRate => "heart_rate",
            FieldKind::Met => "met",
            FieldKind::ElapsedTime => "elapsed_time",
            FieldKind::RemainingTime => "remaining_time",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a flag bit signals the presence of its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    /// Field follows when the bit is set
    BitSet,
    /// Field follows when the bit is clear (bit 0, "More Data")
    BitClear,
}

/// Wire layout of one optional field.
#[derive(Debug, Clone, Copy)]
struct FieldLayout {
    bit: u8,
    presence: Presence,
    width: usize,
    divisor: f64,
    signed: bool,
    kind: FieldKind,
}

const fn field(bit: u8, width: usize, divisor: f64, signed: bool, kind: FieldKind) -> FieldLayout {
    FieldLayout {
        bit,
        presence: Presence::BitSet,
        width,
        divisor,
        signed,
        kind,
    }
}

/// Field layouts in flag-bit order.
static FIELD_LAYOUTS: [FieldLayout; 13] = [
    FieldLayout {
        bit: 0,
        presence: Presence::BitClear,
        width: 2,
        divisor: 100.0,
        signed: false,
        kind: FieldKind::Speed,
    },
    field(1, 2, 100.0, false, FieldKind::AvgSpeed),
    field(2, 2, 2.0, false, FieldKind::Cadence),
    field(3, 2, 2.0, false, FieldKind::AvgCadence),
    field(4, 3, 10.0, false, FieldKind::Distance),
    field(5, 2, 1.0, true, FieldKind::Resistance),
    field(6, 2, 1.0, true, FieldKind::Power),
    field(7, 2, 1.0, true, FieldKind::AvgPower),
    field(8, 2, 1.0, false, FieldKind::Energy),
    field(9, 1, 1.0, false, FieldKind::HeartRate),
    field(10, 2, 100.0, false, FieldKind::Met),
    field(11, 2, 1.0, false, FieldKind::ElapsedTime),
    field(12, 2, 1.0, false, FieldKind::RemainingTime),
];

impl FieldLayout {
    fn is_present(&self, flags: u16) -> bool {
        let set = flags & (1 << self.bit) != 0;
        match self.presence {
            Presence::BitSet => set,
            Presence::BitClear => !set,
        }
    }

    fn read(&self, bytes: &[u8]) -> f64 {
        let raw = bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));

        let value = if self.signed {
            // Sign-extend from the field width.
            let shift = 32 - 8 * self.width as u32;
            f64::from(((raw << shift) as i32) >> shift)
        } else {
            f64::from(raw)
        };

        value / self.divisor
    }
}

/// One decoded Indoor Bike Data sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Flag word the sample was decoded with
    pub flags: u16,
    /// Decoded fields in wire order
    pub fields: BTreeMap<FieldKind, f64>,
}

impl TelemetrySample {
    /// Value of a decoded field.
    pub fn get(&self, kind: FieldKind) -> Option<f64> {
        self.fields.get(&kind).copied()
    }

    /// Whether the field was decoded.
    pub fn contains(&self, kind: FieldKind) -> bool {
        self.fields.contains_key(&kind)
    }

    /// Resistance level as the signed integer carried on the wire.
    pub fn resistance(&self) -> Option<i16> {
        self.get(FieldKind::Resistance).map(|v| v as i16)
    }

    /// Number of decoded fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no field could be decoded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Errors raised before field decoding can start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload too short to carry its flag or header bytes
    #[error("payload too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    /// Unexpected leading byte
    #[error("unexpected response code 0x{0:02x}")]
    UnexpectedResponseCode(u8),
}

/// Read the little-endian flag word from the first two bytes.
pub fn read_flags(data: &[u8]) -> Result<u16, DecodeError> {
    match data {
        [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
        _ => Err(DecodeError::TooShort {
            len: data.len(),
            min: 2,
        }),
    }
}

/// Parse an Indoor Bike Data notification, extracting its own flag word.
pub fn parse_indoor_bike_data(data: &[u8]) -> Result<TelemetrySample, DecodeError> {
    let flags = read_flags(data)?;
    Ok(decode_indoor_bike_data(data, flags))
}

/// Decode the fields of an Indoor Bike Data record using `flags`.
///
/// Decoding starts after the 2-byte flag prefix. A flagged field that does not
/// fit in the remaining bytes is skipped and the cursor stays where it was, so
/// a later, narrower field may be read from the skipped field's bytes.
pub fn decode_indoor_bike_data(data: &[u8], flags: u16) -> TelemetrySample {
    let fields = field_segments(data, flags)
        .into_iter()
        .map(|(layout, bytes)| {
            let value = layout.read(bytes);
            tracing::trace!(target: "bike_data", field = %layout.kind, value, "Decoded field");
            (layout.kind, value)
        })
        .collect();

    TelemetrySample { flags, fields }
}

/// Raw byte slices of every field that fits, keyed by kind.
///
/// Shares the cursor rules of [`decode_indoor_bike_data`].
pub(crate) fn raw_fields(data: &[u8], flags: u16) -> BTreeMap<FieldKind, &[u8]> {
    field_segments(data, flags)
        .into_iter()
        .map(|(layout, bytes)| (layout.kind, bytes))
        .collect()
}

/// Flag word announcing exactly the given fields.
///
/// Bit 0 stays set ("More Data") unless speed is among them.
pub(crate) fn flags_for<'a>(kinds: impl IntoIterator<Item = &'a FieldKind>) -> u16 {
    let mut flags = 0x0001;
    for kind in kinds {
        let Some(layout) = FIELD_LAYOUTS.iter().find(|l| l.kind == *kind) else {
            continue;
        };
        match layout.presence {
            Presence::BitSet => flags |= 1 << layout.bit,
            Presence::BitClear => flags &= !(1 << layout.bit),
        }
    }
    flags
}

fn field_segments(data: &[u8], flags: u16) -> Vec<(&'static FieldLayout, &[u8])> {
    let mut segments = Vec::new();
    let mut offset = 2usize;

    for layout in FIELD_LAYOUTS.iter().filter(|l| l.is_present(flags)) {
        let Some(bytes) = data.get(offset..offset + layout.width) else {
            tracing::trace!(
                target: "bike_data",
                field = %layout.kind,
                offset,
                len = data.len(),
                "Field truncated, skipping"
            );
            continue;
        };

        segments.push((layout, bytes));
        offset += layout.width;
    }

    segments
}
