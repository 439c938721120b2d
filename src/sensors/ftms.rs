//! FTMS (Fitness Machine Service) protocol definitions.
//!
//! GATT identifiers for the standard and vendor services the probe recognizes,
//! Control Point opcodes and command builders, and parsers for the read-only
//! characteristics (feature bits, support ranges) and Control Point responses.

use crate::sensors::types::{Capability, RangeKind, SupportRange};
use crate::telemetry::decoder::DecodeError;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// FTMS Service UUID (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Speed and Cadence Service UUID (0x1816)
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// MOBI bike vendor service (0xFFE0)
pub const MOBI_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_ffe0_0000_1000_8000_0080_5f9b_34fb);

/// Reborn bike vendor service
pub const REBORN_SERVICE_UUID: Uuid = Uuid::from_u128(0x0001_0203_0405_0607_0809_0a0b_0c0d_1910);

/// Tacx vendor service
pub const TACX_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_fec1_b5a3_f393_e0a9_e50e_24dc_ca9e);

/// Indoor Bike Data Characteristic UUID (0x2AD2)
pub const INDOOR_BIKE_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2ad2_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Control Point UUID (0x2AD9)
pub const FTMS_CONTROL_POINT_UUID: Uuid =
    Uuid::from_u128(0x0000_2ad9_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Feature UUID (0x2ACC)
pub const FTMS_FEATURE_UUID: Uuid = Uuid::from_u128(0x0000_2acc_0000_1000_8000_0080_5f9b_34fb);

/// Supported Speed Range UUID (0x2AD4)
pub const SPEED_RANGE_UUID: Uuid = Uuid::from_u128(0x0000_2ad4_0000_1000_8000_0080_5f9b_34fb);

/// Supported Inclination Range UUID (0x2AD5)
pub const INCLINE_RANGE_UUID: Uuid = Uuid::from_u128(0x0000_2ad5_0000_1000_8000_0080_5f9b_34fb);

/// Supported Resistance Level Range UUID (0x2AD6)
pub const RESISTANCE_RANGE_UUID: Uuid =
    Uuid::from_u128(0x0000_2ad6_0000_1000_8000_0080_5f9b_34fb);

/// Supported Power Range UUID (0x2AD8)
pub const POWER_RANGE_UUID: Uuid = Uuid::from_u128(0x0000_2ad8_0000_1000_8000_0080_5f9b_34fb);

/// Control Point response op code.
pub const RESPONSE_CODE: u8 = 0x80;

/// Control Point result code for a successful request.
pub const RESULT_SUCCESS: u8 = 0x01;

/// Characteristic a command opcode was written to.
///
/// Opcode 0x11 means "set simulation parameters" on the Control Point but
/// "get incline range" as a range request, so opcodes only identify a command
/// together with their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTarget {
    /// Fitness Machine Control Point
    ControlPoint,
    /// Support range requests
    SupportRange,
}

/// Commands the probe issues, used as correlation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandKind {
    RequestControl,
    Reset,
    SetResistanceLevel,
    SetTargetPower,
    Start,
    Stop,
    GetSpeedRange,
    GetInclineRange,
    GetResistanceRange,
    GetPowerRange,
    SetSimParams,
    /// Opcode not recognized for its target
    Unknown(u8),
}

impl CommandKind {
    /// Resolve an opcode in the context of the characteristic it targeted.
    pub fn from_opcode(opcode: u8, target: CommandTarget) -> Self {
        match (target, opcode) {
            (CommandTarget::ControlPoint, 0x00) => CommandKind::RequestControl,
            (CommandTarget::ControlPoint, 0x01) => CommandKind::Reset,
            (CommandTarget::ControlPoint, 0x04) => CommandKind::SetResistanceLevel,
            (CommandTarget::ControlPoint, 0x05) => CommandKind::SetTargetPower,
            (CommandTarget::ControlPoint, 0x07) => CommandKind::Start,
            (CommandTarget::ControlPoint, 0x08) => CommandKind::Stop,
            (CommandTarget::ControlPoint, 0x11) => CommandKind::SetSimParams,
            (CommandTarget::SupportRange, 0x10) => CommandKind::GetSpeedRange,
            (CommandTarget::SupportRange, 0x11) => CommandKind::GetInclineRange,
            (CommandTarget::SupportRange, 0x12) => CommandKind::GetResistanceRange,
            (CommandTarget::SupportRange, 0x13) => CommandKind::GetPowerRange,
            (_, op) => CommandKind::Unknown(op),
        }
    }

    /// Opcode byte for this command.
    pub fn opcode(&self) -> u8 {
        match self {
            CommandKind::RequestControl => 0x00,
            CommandKind::Reset => 0x01,
            CommandKind::SetResistanceLevel => 0x04,
            CommandKind::SetTargetPower => 0x05,
            CommandKind::Start => 0x07,
            CommandKind::Stop => 0x08,
            CommandKind::GetSpeedRange => 0x10,
            CommandKind::GetInclineRange => 0x11,
            CommandKind::GetResistanceRange => 0x12,
            CommandKind::GetPowerRange => 0x13,
            CommandKind::SetSimParams => 0x11,
            CommandKind::Unknown(op) => *op,
        }
    }

    /// Commands expected to move the resistance reported by the trainer.
    pub fn is_resistance_related(&self) -> bool {
        matches!(
            self,
            CommandKind::SetResistanceLevel | CommandKind::SetTargetPower | CommandKind::SetSimParams
        )
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::RequestControl => write!(f, "REQUEST_CONTROL"),
            CommandKind::Reset => write!(f, "RESET"),
            CommandKind::SetResistanceLevel => write!(f, "SET_RESISTANCE_LEVEL"),
            CommandKind::SetTargetPower => write!(f, "SET_TARGET_POWER"),
            CommandKind::Start => write!(f, "START"),
            CommandKind::Stop => write!(f, "STOP"),
            CommandKind::GetSpeedRange => write!(f, "GET_SPEED_RANGE"),
            CommandKind::GetInclineRange => write!(f, "GET_INCLINE_RANGE"),
            CommandKind::GetResistanceRange => write!(f, "GET_RESISTANCE_RANGE"),
            CommandKind::GetPowerRange => write!(f, "GET_POWER_RANGE"),
            CommandKind::SetSimParams => write!(f, "SET_SIM_PARAMS"),
            CommandKind::Unknown(op) => write!(f, "UNKNOWN_0x{op:02x}"),
        }
    }
}

impl Serialize for CommandKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parsed Control Point response (`[0x80, request opcode, result code, ...]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPointResponse {
    /// Opcode of the request being answered
    pub request_opcode: u8,
    /// Result code, 0x01 on success
    pub result_code: u8,
}

impl ControlPointResponse {
    /// Whether the device accepted the request.
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_SUCCESS
    }
}

/// Parse a Control Point indication.
pub fn parse_control_point_response(data: &[u8]) -> Result<ControlPointResponse, DecodeError> {
    match data {
        [RESPONSE_CODE, request_opcode, result_code, ..] => Ok(ControlPointResponse {
            request_opcode: *request_opcode,
            result_code: *result_code,
        }),
        [code, _, _, ..] => Err(DecodeError::UnexpectedResponseCode(*code)),
        _ => Err(DecodeError::TooShort {
            len: data.len(),
            min: 3,
        }),
    }
}

/// Fitness Machine Feature bits (first 32-bit word of 0x2ACC), in bit order.
const MACHINE_FEATURE_BITS: [Capability; 16] = [
    Capability::AverageSpeed,
    Capability::Cadence,
    Capability::TotalDistance,
    Capability::Inclination,
    Capability::ElevationGain,
    Capability::Pace,
    Capability::StepCount,
    Capability::ResistanceLevel,
    Capability::StrideCount,
    Capability::ExpendedEnergy,
    Capability::HeartRate,
    Capability::MetabolicEquivalent,
    Capability::ElapsedTime,
    Capability::RemainingTime,
    Capability::PowerMeasurement,
    Capability::ForceOnBelt,
];

/// Parse the Fitness Machine Feature characteristic into capabilities.
///
/// Only the machine feature word is interpreted; shorter payloads are
/// zero-extended.
pub fn parse_machine_features(data: &[u8]) -> Vec<Capability> {
    let mut word = [0u8; 4];
    for (dst, src) in word.iter_mut().zip(data) {
        *dst = *src;
    }
    let bits = u32::from_le_bytes(word);

    MACHINE_FEATURE_BITS
        .iter()
        .enumerate()
        .filter(|(bit, _)| bits & (1 << bit) != 0)
        .map(|(_, capability)| *capability)
        .collect()
}

/// Parse a support range characteristic (`[min, max, increment]`, 16-bit LE).
pub fn parse_support_range(kind: RangeKind, data: &[u8]) -> Result<SupportRange, DecodeError> {
    if data.len() < 6 {
        return Err(DecodeError::TooShort {
            len: data.len(),
            min: 6,
        });
    }

    let value = |i: usize| -> f64 {
        let bytes = [data[i], data[i + 1]];
        match kind {
            RangeKind::Speed => f64::from(u16::from_le_bytes(bytes)) / 100.0,
            RangeKind::Incline => f64::from(i16::from_le_bytes(bytes)) / 10.0,
            RangeKind::Resistance | RangeKind::Power => f64::from(u16::from_le_bytes(bytes)),
        }
    };

    Ok(SupportRange {
        min: value(0),
        max: value(2),
        increment: value(4),
    })
}

/// Build a control point command to request control.
pub fn build_request_control() -> Vec<u8> {
    vec![CommandKind::RequestControl.opcode()]
}

/// Build a control point command to reset the machine.
pub fn build_reset() -> Vec<u8> {
    vec![CommandKind::Reset.opcode()]
}

/// Build a control point command to start training.
pub fn build_start_training() -> Vec<u8> {
    vec![CommandKind::Start.opcode()]
}

/// Build a control point command to stop training.
pub fn build_stop_training() -> Vec<u8> {
    vec![CommandKind::Stop.opcode()]
}

/// Build a control point command to set target resistance level.
///
/// Trainers in the field accept the level as a single byte.
pub fn build_set_resistance_level(level: u8) -> Vec<u8> {
    vec![CommandKind::SetResistanceLevel.opcode(), level]
}

/// Build a control point command to set target power (ERG mode).
pub fn build_set_target_power(target_watts: u16) -> Vec<u8> {
    let mut cmd = vec![CommandKind::SetTargetPower.opcode()];
    cmd.extend_from_slice(&target_watts.to_le_bytes());
    cmd
}

/// Build a control point command to set simulation parameters.
///
/// Uses the 7-byte FTMS layout with one-byte `crr` and `cw`.
///
/// `wind_speed` - Wind speed in m/s (0.001 resolution)
/// `grade` - Grade in percent (0.01 resolution)
/// `crr` - Coefficient of rolling resistance (0.0001 resolution)
/// `cw` - Wind resistance coefficient (0.01 resolution)
pub fn build_set_simulation(wind_speed: i16, grade: i16, crr: u8, cw: u8) -> Vec<u8> {
    let mut cmd = vec![CommandKind::SetSimParams.opcode()];
    cmd.extend_from_slice(&wind_speed.to_le_bytes());
    cmd.extend_from_slice(&grade.to_le_bytes());
    cmd.push(crr);
    cmd.push(cw);
    cmd
}
