//! Modbus request/response model for the two operations the charger uses
//!
//! | Code | Function | Used for |
//! |------|----------|----------|
//! | 0x03 | Read Holding Registers | every telemetry block |
//! | 0x06 | Write Single Register | HEMS current/power limits |

use std::fmt;

use crate::constants::{
    exception_description, FC_READ_HOLDING_REGISTERS, FC_WRITE_SINGLE_REGISTER,
    MAX_READ_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};

/// Modbus unit identifier (slave id), 1-247 for addressed devices
pub type UnitId = u8;

/// Supported Modbus function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFunction {
    /// FC03
    ReadHoldingRegisters,
    /// FC06
    WriteSingleRegister,
}

impl ModbusFunction {
    /// Wire code
    pub fn to_u8(self) -> u8 {
        match self {
            Self::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            Self::WriteSingleRegister => FC_WRITE_SINGLE_REGISTER,
        }
    }

    /// Parse a wire code, ignoring the exception bit
    pub fn from_u8(code: u8) -> ModbusResult<Self> {
        match code & 0x7F {
            FC_READ_HOLDING_REGISTERS => Ok(Self::ReadHoldingRegisters),
            FC_WRITE_SINGLE_REGISTER => Ok(Self::WriteSingleRegister),
            other => Err(ModbusError::invalid_function(other)),
        }
    }
}

/// A contiguous range of holding registers read in one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterBlock {
    /// First register address
    pub start: u16,
    /// Number of 16-bit words, 1..=125
    pub count: u16,
}

impl RegisterBlock {
    /// Create a block, checking the FC03 quantity limit and address overflow.
    pub fn new(start: u16, count: u16) -> ModbusResult<Self> {
        if count == 0 || count as usize > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_data(format!(
                "Invalid register count {} (must be 1-{})",
                count, MAX_READ_REGISTERS
            )));
        }
        if start.checked_add(count - 1).is_none() {
            return Err(ModbusError::invalid_data(format!(
                "Register block {}+{} exceeds address space",
                start, count
            )));
        }
        Ok(Self { start, count })
    }

    /// Single-register block
    pub const fn single(start: u16) -> Self {
        Self { start, count: 1 }
    }

    /// Last address covered by the block
    pub fn end(&self) -> u16 {
        self.start + (self.count - 1)
    }
}

impl fmt::Display for RegisterBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 1 {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end())
        }
    }
}

/// Outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub unit_id: UnitId,
    pub function: ModbusFunction,
    pub address: u16,
    /// Register count for FC03, always 1 for FC06
    pub quantity: u16,
    /// Value written by FC06, unused for FC03
    pub value: u16,
}

impl ModbusRequest {
    /// FC03 request for a block
    pub fn read_holding_registers(unit_id: UnitId, block: &RegisterBlock) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::ReadHoldingRegisters,
            address: block.start,
            quantity: block.count,
            value: 0,
        }
    }

    /// FC06 request for one register
    pub fn write_single_register(unit_id: UnitId, address: u16, value: u16) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::WriteSingleRegister,
            address,
            quantity: 1,
            value,
        }
    }

    /// Encode the request PDU
    pub fn to_pdu(&self) -> ModbusResult<ModbusPdu> {
        match self.function {
            ModbusFunction::ReadHoldingRegisters => {
                PduBuilder::build_read_holding_registers(self.address, self.quantity)
            }
            ModbusFunction::WriteSingleRegister => {
                PduBuilder::build_write_single_register(self.address, self.value)
            }
        }
    }
}

/// Successful (non-exception) response
#[derive(Debug, Clone)]
pub struct ModbusResponse {
    pub unit_id: UnitId,
    pub function: ModbusFunction,
    pdu: ModbusPdu,
}

impl ModbusResponse {
    /// Interpret a received PDU. Exception responses become
    /// [`ModbusError::Exception`].
    pub fn from_pdu(unit_id: UnitId, pdu: ModbusPdu) -> ModbusResult<Self> {
        let fc = pdu
            .function_code()
            .ok_or_else(|| ModbusError::protocol("Empty response PDU"))?;

        if pdu.is_exception() {
            let code = pdu.exception_code().unwrap_or(0);
            return Err(ModbusError::Exception {
                function: fc & 0x7F,
                code,
                message: exception_description(code).to_string(),
            });
        }

        let function = ModbusFunction::from_u8(fc)?;
        Ok(Self {
            unit_id,
            function,
            pdu,
        })
    }

    /// Build an FC03 response carrying `values`
    pub fn new_registers(unit_id: UnitId, values: &[u16]) -> ModbusResult<Self> {
        let mut pdu = ModbusPdu::new();
        pdu.push(FC_READ_HOLDING_REGISTERS)?;
        pdu.push((values.len() * 2) as u8)?;
        for &v in values {
            pdu.push_u16(v)?;
        }
        Self::from_pdu(unit_id, pdu)
    }

    /// Build an FC06 echo response
    pub fn new_write_echo(unit_id: UnitId, address: u16, value: u16) -> ModbusResult<Self> {
        let pdu = PduBuilder::build_write_single_register(address, value)?;
        Self::from_pdu(unit_id, pdu)
    }

    /// Raw PDU
    pub fn pdu(&self) -> &ModbusPdu {
        &self.pdu
    }

    /// Extract register words from an FC03 response.
    ///
    /// The byte count must match the requested quantity exactly; a short or
    /// padded payload is a register-level error for that block.
    pub fn parse_registers(&self, expected: u16) -> ModbusResult<Vec<u16>> {
        self.expect_function(ModbusFunction::ReadHoldingRegisters)?;

        let data = self.pdu.as_slice();
        let byte_count = *data
            .get(1)
            .ok_or_else(|| ModbusError::invalid_data("Missing byte count"))? as usize;
        let payload = &data[2..];

        if byte_count != expected as usize * 2 || payload.len() != byte_count {
            return Err(ModbusError::invalid_data(format!(
                "Expected {} registers, got byte_count={} payload={}B",
                expected,
                byte_count,
                payload.len()
            )));
        }

        Ok(payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Check that an FC06 response echoes the written address and value.
    pub fn verify_write_echo(&self, address: u16, value: u16) -> ModbusResult<()> {
        self.expect_function(ModbusFunction::WriteSingleRegister)?;

        match (self.pdu.read_u16(1), self.pdu.read_u16(3)) {
            (Some(a), Some(v)) if a == address && v == value => Ok(()),
            (Some(a), Some(v)) => Err(ModbusError::invalid_data(format!(
                "Write echo mismatch: sent {}={}, device echoed {}={}",
                address, value, a, v
            ))),
            _ => Err(ModbusError::invalid_data("Truncated write echo")),
        }
    }

    fn expect_function(&self, expected: ModbusFunction) -> ModbusResult<()> {
        if self.function != expected {
            return Err(ModbusError::protocol(format!(
                "Function code mismatch: expected {:02X}, got {:02X}",
                expected.to_u8(),
                self.function.to_u8()
            )));
        }
        Ok(())
    }
}
