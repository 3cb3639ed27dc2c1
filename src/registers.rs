//! AMTRON register map
//!
//! All registers are holding registers (FC03), addressed as documented for
//! the AMTRON 4Business/Professional Modbus TCP interface. The poll plan
//! groups them into blocks in a fixed order; the status registers sit at
//! non-contiguous addresses and are read one by one.

use crate::codec::FieldSpec;
use crate::protocol::RegisterBlock;
use crate::snapshot::Field;

// ============================================================================
// Device information
// ============================================================================

/// Firmware version, 2 registers ASCII
pub const REG_FIRMWARE_VERSION: u16 = 100;
/// OCPP status code
pub const REG_OCPP_STATUS: u16 = 104;
/// Protocol version, 2 registers ASCII
pub const REG_PROTOCOL_VERSION: u16 = 120;
/// IEC 61851 vehicle state (A-E)
pub const REG_VEHICLE_STATE: u16 = 122;
/// 0 = unavailable, 1 = available
pub const REG_CHARGE_POINT_AVAILABILITY: u16 = 124;
/// 0 = off, 1 = on
pub const REG_RELAY_STATE: u16 = 140;
/// Device id ("AM")
pub const REG_DEVICE_ID: u16 = 141;
/// Model name, 10 registers ASCII
pub const REG_CHARGE_POINT_MODEL: u16 = 142;
/// Plug lock status
pub const REG_PLUG_LOCK_STATUS: u16 = 152;
/// Device name, 16 registers ASCII
pub const REG_DEVICE_NAME: u16 = 2158;

// ============================================================================
// Meter
// ============================================================================

/// Per-phase energy L1/L2/L3 in Wh, 3 x int32
pub const REG_METER_ENERGY: u16 = 200;
/// Start of the polled meter block: power L1/L2/L3 in W, 3 x int32
pub const REG_METER_POWER: u16 = 206;
/// Current L1/L2/L3 in mA, 3 x int32
pub const REG_METER_CURRENT: u16 = 212;
/// Total energy in Wh, int32
pub const REG_METER_TOTAL_ENERGY: u16 = 218;
/// Total power in W, int32
pub const REG_METER_TOTAL_POWER: u16 = 220;
/// Voltage L1/L2/L3, 3 x int32
pub const REG_METER_VOLTAGE: u16 = 222;

// ============================================================================
// HEMS fallback and charging information
// ============================================================================

/// Fallback current after a HEMS timeout
pub const REG_SAFE_CURRENT: u16 = 131;
/// HEMS communication timeout in seconds
pub const REG_COMMUNICATION_TIMEOUT: u16 = 132;
/// Operator current limit
pub const REG_OPERATOR_CURRENT_LIMIT: u16 = 134;
/// Current signaled to the EV in A
pub const REG_SIGNALED_CURRENT: u16 = 706;
/// Minimum charging current in A
pub const REG_MIN_CHARGING_CURRENT: u16 = 712;
/// Maximum charging current in A
pub const REG_MAX_CHARGING_CURRENT: u16 = 715;
/// Session energy in Wh, int32
pub const REG_SESSION_ENERGY: u16 = 716;
/// Session duration in seconds, int32
pub const REG_CHARGING_DURATION: u16 = 718;

// ============================================================================
// HEMS control (read/write)
// ============================================================================

/// HEMS current limit in A: 0 or 6-32
pub const REG_HEMS_CURRENT_LIMIT: u16 = 2000;
/// HEMS current limit in 0.1 A steps
pub const REG_HEMS_CURRENT_LIMIT_TENTH: u16 = 2001;
/// HEMS power limit in W
pub const REG_HEMS_POWER_LIMIT: u16 = 2002;
/// 0 = not active, 1 = read-only, 2 = read/write
pub const REG_MODBUS_HEMS_CONFIG: u16 = 2010;
/// 0 = OK, 1 = timeout (device error 1073)
pub const REG_HEMS_COMM_STATUS: u16 = 2011;
/// Minimum HEMS power in W
pub const REG_HEMS_POWER_LIMIT_MIN: u16 = 2012;
/// Maximum HEMS power in W
pub const REG_HEMS_POWER_LIMIT_MAX: u16 = 2013;

// ============================================================================
// Phases and authorization
// ============================================================================

/// Phase switching mode, read-only over Modbus
pub const REG_PHASE_SWITCH_MODE: u16 = 2020;
/// Pause after a phase switch in seconds
pub const REG_PHASE_SWITCH_PAUSE: u16 = 2021;
/// 0 = not running, 1 = running
pub const REG_PHASE_SWITCH_STATUS: u16 = 2022;
/// 0 = none, 1 = one, 2 = three
pub const REG_ASSIGNED_PHASES: u16 = 2023;
/// 0 = autostart, 1 = authorized, 2 = not authorized
pub const REG_AUTHORIZATION_STATUS: u16 = 2030;

// ============================================================================
// Poll plan
// ============================================================================

/// Blocks read by one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    OcppStatus,
    VehicleState,
    Availability,
    Relay,
    Meter,
    SignaledCurrent,
    Session,
    HemsLimits,
    HemsComm,
    Phases,
    Authorization,
}

impl BlockKind {
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::OcppStatus => "ocpp status",
            BlockKind::VehicleState => "vehicle state",
            BlockKind::Availability => "availability",
            BlockKind::Relay => "relay",
            BlockKind::Meter => "meter",
            BlockKind::SignaledCurrent => "signaled current",
            BlockKind::Session => "session",
            BlockKind::HemsLimits => "hems limits",
            BlockKind::HemsComm => "hems comm",
            BlockKind::Phases => "phases",
            BlockKind::Authorization => "authorization",
        }
    }
}

/// One block of the poll plan and the fields decoded from it
#[derive(Debug, Clone, Copy)]
pub struct BlockSpec {
    pub kind: BlockKind,
    pub block: RegisterBlock,
    /// A failure of this block discards the whole cycle
    pub fatal: bool,
    pub fields: &'static [(Field, FieldSpec)],
}

const fn block(start: u16, count: u16) -> RegisterBlock {
    RegisterBlock { start, count }
}

/// Fixed read sequence of one poll cycle
pub static POLL_PLAN: [BlockSpec; 11] = [
    BlockSpec {
        kind: BlockKind::OcppStatus,
        block: block(REG_OCPP_STATUS, 1),
        fatal: true,
        fields: &[(Field::OcppStatus, FieldSpec::word(0))],
    },
    BlockSpec {
        kind: BlockKind::VehicleState,
        block: block(REG_VEHICLE_STATE, 1),
        fatal: false,
        fields: &[(Field::VehicleState, FieldSpec::word(0))],
    },
    BlockSpec {
        kind: BlockKind::Availability,
        block: block(REG_CHARGE_POINT_AVAILABILITY, 1),
        fatal: false,
        fields: &[(Field::ChargePointAvailability, FieldSpec::word(0))],
    },
    BlockSpec {
        kind: BlockKind::Relay,
        block: block(REG_RELAY_STATE, 1),
        fatal: false,
        fields: &[(Field::RelayState, FieldSpec::word(0))],
    },
    // 206-227: power, current, total energy, total power, voltage
    BlockSpec {
        kind: BlockKind::Meter,
        block: block(REG_METER_POWER, 22),
        fatal: false,
        fields: &[
            (Field::PowerL1, FieldSpec::signed32(0)),
            (Field::PowerL2, FieldSpec::signed32(2)),
            (Field::PowerL3, FieldSpec::signed32(4)),
            (Field::CurrentL1, FieldSpec::signed32(6).milli()),
            (Field::CurrentL2, FieldSpec::signed32(8).milli()),
            (Field::CurrentL3, FieldSpec::signed32(10).milli()),
            (Field::TotalEnergy, FieldSpec::signed32(12).milli()),
            (Field::TotalPower, FieldSpec::signed32(14)),
            // Reported in volts on the devices seen so far, not scaled
            (Field::VoltageL1, FieldSpec::signed32(16)),
            (Field::VoltageL2, FieldSpec::signed32(18)),
            (Field::VoltageL3, FieldSpec::signed32(20)),
        ],
    },
    BlockSpec {
        kind: BlockKind::SignaledCurrent,
        block: block(REG_SIGNALED_CURRENT, 1),
        fatal: false,
        fields: &[(Field::SignaledCurrent, FieldSpec::word(0))],
    },
    BlockSpec {
        kind: BlockKind::Session,
        block: block(REG_SESSION_ENERGY, 4),
        fatal: false,
        fields: &[
            (Field::SessionEnergy, FieldSpec::signed32(0).milli()),
            (Field::ChargingDuration, FieldSpec::signed32(2)),
        ],
    },
    BlockSpec {
        kind: BlockKind::HemsLimits,
        block: block(REG_HEMS_CURRENT_LIMIT, 3),
        fatal: false,
        fields: &[
            (Field::HemsCurrentLimit, FieldSpec::word(0)),
            (Field::HemsPowerLimit, FieldSpec::word(2)),
        ],
    },
    BlockSpec {
        kind: BlockKind::HemsComm,
        block: block(REG_HEMS_COMM_STATUS, 1),
        fatal: false,
        fields: &[(Field::HemsCommStatus, FieldSpec::word(0))],
    },
    BlockSpec {
        kind: BlockKind::Phases,
        block: block(REG_PHASE_SWITCH_MODE, 4),
        fatal: false,
        fields: &[
            (Field::PhaseSwitchMode, FieldSpec::word(0)),
            (Field::AssignedPhases, FieldSpec::word(3)),
        ],
    },
    BlockSpec {
        kind: BlockKind::Authorization,
        block: block(REG_AUTHORIZATION_STATUS, 1),
        fatal: false,
        fields: &[(Field::AuthorizationStatus, FieldSpec::word(0))],
    },
];

/// Block that carries `field`, if it is polled
pub fn block_for_field(field: Field) -> Option<&'static BlockSpec> {
    POLL_PLAN
        .iter()
        .find(|spec| spec.fields.iter().any(|(f, _)| *f == field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_READ_REGISTERS;
    use std::collections::HashSet;

    #[test]
    fn test_only_status_block_is_fatal() {
        let fatal: Vec<_> = POLL_PLAN.iter().filter(|b| b.fatal).collect();
        assert_eq!(fatal.len(), 1);
        assert_eq!(fatal[0].kind, BlockKind::OcppStatus);
        assert_eq!(fatal[0].block.start, 104);
        // The liveness read goes first
        assert_eq!(POLL_PLAN[0].kind, BlockKind::OcppStatus);
    }

    #[test]
    fn test_fields_fit_inside_blocks() {
        for spec in POLL_PLAN.iter() {
            assert!(spec.block.count >= 1);
            assert!(spec.block.count as usize <= MAX_READ_REGISTERS);
            for (field, field_spec) in spec.fields {
                assert!(
                    field_spec.end() <= spec.block.count as usize,
                    "{} overruns block {}",
                    field,
                    spec.block
                );
            }
        }
    }

    #[test]
    fn test_every_field_polled_once_except_derived_power() {
        let mut seen = HashSet::new();
        for spec in POLL_PLAN.iter() {
            for (field, _) in spec.fields {
                assert!(seen.insert(*field), "{} decoded twice", field);
            }
        }
        for field in Field::ALL {
            if field == Field::Power {
                assert!(!seen.contains(&field));
            } else {
                assert!(seen.contains(&field), "{} never polled", field);
            }
        }
    }

    #[test]
    fn test_block_addresses() {
        let starts: Vec<(u16, u16)> = POLL_PLAN
            .iter()
            .map(|b| (b.block.start, b.block.count))
            .collect();
        assert_eq!(
            starts,
            vec![
                (104, 1),
                (122, 1),
                (124, 1),
                (140, 1),
                (206, 22),
                (706, 1),
                (716, 4),
                (2000, 3),
                (2011, 1),
                (2020, 4),
                (2030, 1),
            ]
        );
        assert_eq!(block_for_field(Field::VoltageL3).map(|b| b.kind), Some(BlockKind::Meter));
        assert!(block_for_field(Field::Power).is_none());
    }
}
