//! Indoor Bike Data decoding and fragment merging.

pub mod decoder;
pub mod merge;

pub use decoder::{
    decode_indoor_bike_data, parse_indoor_bike_data, read_flags, DecodeError, FieldKind,
    TelemetrySample,
};
pub use merge::{can_merge, merge_packets, MergeBuffer};
