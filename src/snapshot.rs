//! Charger snapshot
//!
//! One [`Snapshot`] is the complete decoded state produced by one poll cycle.
//! It has a fixed shape: every field exists from construction with its
//! default (zero) and is overwritten only by a successfully decoded block.
//! Once published it is shared as `Arc<Snapshot>` and never mutated.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::control::MIN_CHARGING_CURRENT;
use crate::status::{
    AssignedPhases, AuthorizationStatus, ChargePointAvailability, HemsCommStatus, OcppStatus,
    PhaseSwitchMode, RelayState, VehicleState,
};
use crate::value::FieldValue;

/// Every field of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    OcppStatus,
    VehicleState,
    ChargePointAvailability,
    RelayState,
    Power,
    PowerL1,
    PowerL2,
    PowerL3,
    CurrentL1,
    CurrentL2,
    CurrentL3,
    TotalEnergy,
    TotalPower,
    VoltageL1,
    VoltageL2,
    VoltageL3,
    SignaledCurrent,
    SessionEnergy,
    ChargingDuration,
    HemsCurrentLimit,
    HemsPowerLimit,
    HemsCommStatus,
    PhaseSwitchMode,
    AssignedPhases,
    AuthorizationStatus,
}

impl Field {
    /// All fields in display order
    pub const ALL: [Field; 25] = [
        Field::OcppStatus,
        Field::VehicleState,
        Field::ChargePointAvailability,
        Field::RelayState,
        Field::Power,
        Field::PowerL1,
        Field::PowerL2,
        Field::PowerL3,
        Field::CurrentL1,
        Field::CurrentL2,
        Field::CurrentL3,
        Field::TotalEnergy,
        Field::TotalPower,
        Field::VoltageL1,
        Field::VoltageL2,
        Field::VoltageL3,
        Field::SignaledCurrent,
        Field::SessionEnergy,
        Field::ChargingDuration,
        Field::HemsCurrentLimit,
        Field::HemsPowerLimit,
        Field::HemsCommStatus,
        Field::PhaseSwitchMode,
        Field::AssignedPhases,
        Field::AuthorizationStatus,
    ];

    /// Stable snake_case key, also used as the JSON member name
    pub fn name(self) -> &'static str {
        match self {
            Field::OcppStatus => "ocpp_status",
            Field::VehicleState => "vehicle_state",
            Field::ChargePointAvailability => "charge_point_availability",
            Field::RelayState => "relay_state",
            Field::Power => "power",
            Field::PowerL1 => "power_l1",
            Field::PowerL2 => "power_l2",
            Field::PowerL3 => "power_l3",
            Field::CurrentL1 => "current_l1",
            Field::CurrentL2 => "current_l2",
            Field::CurrentL3 => "current_l3",
            Field::TotalEnergy => "total_energy",
            Field::TotalPower => "total_power",
            Field::VoltageL1 => "voltage_l1",
            Field::VoltageL2 => "voltage_l2",
            Field::VoltageL3 => "voltage_l3",
            Field::SignaledCurrent => "signaled_current",
            Field::SessionEnergy => "session_energy",
            Field::ChargingDuration => "charging_duration",
            Field::HemsCurrentLimit => "hems_current_limit",
            Field::HemsPowerLimit => "hems_power_limit",
            Field::HemsCommStatus => "hems_comm_status",
            Field::PhaseSwitchMode => "phase_switch_mode",
            Field::AssignedPhases => "assigned_phases",
            Field::AuthorizationStatus => "authorization_status",
        }
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Field::OcppStatus => "Charging Status",
            Field::VehicleState => "Vehicle State",
            Field::ChargePointAvailability => "Availability",
            Field::RelayState => "Relay State",
            Field::Power => "Power",
            Field::PowerL1 => "Power L1",
            Field::PowerL2 => "Power L2",
            Field::PowerL3 => "Power L3",
            Field::CurrentL1 => "Current L1",
            Field::CurrentL2 => "Current L2",
            Field::CurrentL3 => "Current L3",
            Field::TotalEnergy => "Total Energy",
            Field::TotalPower => "Total Power",
            Field::VoltageL1 => "Voltage L1",
            Field::VoltageL2 => "Voltage L2",
            Field::VoltageL3 => "Voltage L3",
            Field::SignaledCurrent => "Signaled Current",
            Field::SessionEnergy => "Session Energy",
            Field::ChargingDuration => "Charging Duration",
            Field::HemsCurrentLimit => "Current Limit",
            Field::HemsPowerLimit => "Power Limit",
            Field::HemsCommStatus => "HEMS Status",
            Field::PhaseSwitchMode => "Phase Switch Mode",
            Field::AssignedPhases => "Assigned Phases",
            Field::AuthorizationStatus => "Authorization",
        }
    }

    /// Display unit, `None` for status codes
    pub fn unit(self) -> Option<&'static str> {
        match self {
            Field::Power
            | Field::PowerL1
            | Field::PowerL2
            | Field::PowerL3
            | Field::TotalPower
            | Field::HemsPowerLimit => Some("W"),
            Field::CurrentL1
            | Field::CurrentL2
            | Field::CurrentL3
            | Field::SignaledCurrent
            | Field::HemsCurrentLimit => Some("A"),
            Field::TotalEnergy | Field::SessionEnergy => Some("kWh"),
            Field::VoltageL1 | Field::VoltageL2 | Field::VoltageL3 => Some("V"),
            Field::ChargingDuration => Some("s"),
            _ => None,
        }
    }

    /// Look a field up by its snake_case key
    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Complete decoded state of the charger at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub ocpp_status: u16,
    pub vehicle_state: u16,
    pub charge_point_availability: u16,
    pub relay_state: u16,
    /// Sum of the three phase powers, W
    pub power: i64,
    pub power_l1: i64,
    pub power_l2: i64,
    pub power_l3: i64,
    pub current_l1: f64,
    pub current_l2: f64,
    pub current_l3: f64,
    pub total_energy: f64,
    pub total_power: i64,
    pub voltage_l1: i64,
    pub voltage_l2: i64,
    pub voltage_l3: i64,
    pub signaled_current: u16,
    pub session_energy: f64,
    pub charging_duration: i64,
    pub hems_current_limit: u16,
    pub hems_power_limit: u16,
    pub hems_comm_status: u16,
    pub phase_switch_mode: u16,
    pub assigned_phases: u16,
    pub authorization_status: u16,
    /// When the poll cycle that produced this snapshot finished
    pub captured_at: DateTime<Utc>,
}

fn to_word(value: FieldValue) -> u16 {
    match value.as_word() {
        Some(w) => w,
        None => value.as_i64().clamp(0, i64::from(u16::MAX)) as u16,
    }
}

impl Snapshot {
    /// All-default snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one field
    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::OcppStatus => FieldValue::Word(self.ocpp_status),
            Field::VehicleState => FieldValue::Word(self.vehicle_state),
            Field::ChargePointAvailability => FieldValue::Word(self.charge_point_availability),
            Field::RelayState => FieldValue::Word(self.relay_state),
            Field::Power => FieldValue::Integer(self.power),
            Field::PowerL1 => FieldValue::Integer(self.power_l1),
            Field::PowerL2 => FieldValue::Integer(self.power_l2),
            Field::PowerL3 => FieldValue::Integer(self.power_l3),
            Field::CurrentL1 => FieldValue::Scaled(self.current_l1),
            Field::CurrentL2 => FieldValue::Scaled(self.current_l2),
            Field::CurrentL3 => FieldValue::Scaled(self.current_l3),
            Field::TotalEnergy => FieldValue::Scaled(self.total_energy),
            Field::TotalPower => FieldValue::Integer(self.total_power),
            Field::VoltageL1 => FieldValue::Integer(self.voltage_l1),
            Field::VoltageL2 => FieldValue::Integer(self.voltage_l2),
            Field::VoltageL3 => FieldValue::Integer(self.voltage_l3),
            Field::SignaledCurrent => FieldValue::Word(self.signaled_current),
            Field::SessionEnergy => FieldValue::Scaled(self.session_energy),
            Field::ChargingDuration => FieldValue::Integer(self.charging_duration),
            Field::HemsCurrentLimit => FieldValue::Word(self.hems_current_limit),
            Field::HemsPowerLimit => FieldValue::Word(self.hems_power_limit),
            Field::HemsCommStatus => FieldValue::Word(self.hems_comm_status),
            Field::PhaseSwitchMode => FieldValue::Word(self.phase_switch_mode),
            Field::AssignedPhases => FieldValue::Word(self.assigned_phases),
            Field::AuthorizationStatus => FieldValue::Word(self.authorization_status),
        }
    }

    /// Overwrite one field, converting the value to the field's type
    pub fn set(&mut self, field: Field, value: FieldValue) {
        match field {
            Field::OcppStatus => self.ocpp_status = to_word(value),
            Field::VehicleState => self.vehicle_state = to_word(value),
            Field::ChargePointAvailability => self.charge_point_availability = to_word(value),
            Field::RelayState => self.relay_state = to_word(value),
            Field::Power => self.power = value.as_i64(),
            Field::PowerL1 => self.power_l1 = value.as_i64(),
            Field::PowerL2 => self.power_l2 = value.as_i64(),
            Field::PowerL3 => self.power_l3 = value.as_i64(),
            Field::CurrentL1 => self.current_l1 = value.as_f64(),
            Field::CurrentL2 => self.current_l2 = value.as_f64(),
            Field::CurrentL3 => self.current_l3 = value.as_f64(),
            Field::TotalEnergy => self.total_energy = value.as_f64(),
            Field::TotalPower => self.total_power = value.as_i64(),
            Field::VoltageL1 => self.voltage_l1 = value.as_i64(),
            Field::VoltageL2 => self.voltage_l2 = value.as_i64(),
            Field::VoltageL3 => self.voltage_l3 = value.as_i64(),
            Field::SignaledCurrent => self.signaled_current = to_word(value),
            Field::SessionEnergy => self.session_energy = value.as_f64(),
            Field::ChargingDuration => self.charging_duration = value.as_i64(),
            Field::HemsCurrentLimit => self.hems_current_limit = to_word(value),
            Field::HemsPowerLimit => self.hems_power_limit = to_word(value),
            Field::HemsCommStatus => self.hems_comm_status = to_word(value),
            Field::PhaseSwitchMode => self.phase_switch_mode = to_word(value),
            Field::AssignedPhases => self.assigned_phases = to_word(value),
            Field::AuthorizationStatus => self.authorization_status = to_word(value),
        }
    }

    /// Field rendered for display: status codes through their label table,
    /// quantities with their unit.
    pub fn display_value(&self, field: Field) -> String {
        match field {
            Field::OcppStatus => self.ocpp_status().to_string(),
            Field::VehicleState => self.vehicle_state().to_string(),
            Field::ChargePointAvailability => self.charge_point_availability().to_string(),
            Field::RelayState => self.relay_state().to_string(),
            Field::HemsCommStatus => self.hems_comm_status().to_string(),
            Field::PhaseSwitchMode => self.phase_switch_mode().to_string(),
            Field::AssignedPhases => self.assigned_phases().to_string(),
            Field::AuthorizationStatus => self.authorization_status().to_string(),
            other => match other.unit() {
                Some(unit) => format!("{} {}", self.get(other), unit),
                None => self.get(other).to_string(),
            },
        }
    }

    /// Iterate over every field and its value
    pub fn iter(&self) -> impl Iterator<Item = (Field, FieldValue)> + '_ {
        Field::ALL.into_iter().map(move |f| (f, self.get(f)))
    }

    pub fn ocpp_status(&self) -> OcppStatus {
        OcppStatus::from(self.ocpp_status)
    }

    pub fn vehicle_state(&self) -> VehicleState {
        VehicleState::from(self.vehicle_state)
    }

    pub fn charge_point_availability(&self) -> ChargePointAvailability {
        ChargePointAvailability::from(self.charge_point_availability)
    }

    pub fn relay_state(&self) -> RelayState {
        RelayState::from(self.relay_state)
    }

    pub fn hems_comm_status(&self) -> HemsCommStatus {
        HemsCommStatus::from(self.hems_comm_status)
    }

    pub fn phase_switch_mode(&self) -> PhaseSwitchMode {
        PhaseSwitchMode::from(self.phase_switch_mode)
    }

    pub fn assigned_phases(&self) -> AssignedPhases {
        AssignedPhases::from(self.assigned_phases)
    }

    pub fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::from(self.authorization_status)
    }

    /// Charging is enabled when the HEMS current limit allows the minimum
    /// operating current.
    pub fn is_charging_enabled(&self) -> bool {
        self.hems_current_limit >= MIN_CHARGING_CURRENT
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "captured at {}", self.captured_at.to_rfc3339())?;
        for field in Field::ALL {
            writeln!(f, "  {:<20} {}", field.label(), self.display_value(field))?;
        }
        write!(
            f,
            "  {:<20} {}",
            "Charging Enabled",
            if self.is_charging_enabled() { "yes" } else { "no" }
        )
    }
}
