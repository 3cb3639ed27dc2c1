//! # Device Limits Configuration
//!
//! Per-device pacing and size limits applied by the poll cycle.
//!
//! ## Modbus Specification Limits
//!
//! - **Read Holding Registers (FC03)**: Max 125 registers per request
//!
//! The AMTRON's largest block (the meter, 22 registers) is far below that,
//! but some firmware revisions and gateways in front of the charger answer
//! slowly when hammered with back-to-back requests. The inter-request delay
//! spaces the block reads of one cycle.

use std::time::Duration;

use crate::error::{ModbusError, ModbusResult};
use crate::protocol::RegisterBlock;

/// Default maximum registers per read operation (Modbus specification).
pub const DEFAULT_MAX_READ_REGISTERS: u16 = 125;

/// Default inter-request delay in milliseconds.
pub const DEFAULT_INTER_REQUEST_DELAY_MS: u64 = 0;

/// Device-specific Modbus protocol limits.
///
/// # Example
///
/// ```rust
/// use amtron_modbus::DeviceLimits;
///
/// let limits = DeviceLimits::new()
///     .with_max_read_registers(50)
///     .with_inter_request_delay_ms(10);
///
/// assert_eq!(limits.max_read_registers, 50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum registers per read request.
    pub max_read_registers: u16,
    /// Minimum delay between requests (milliseconds).
    pub inter_request_delay_ms: u64,
}

impl DeviceLimits {
    /// Create new device limits with default (Modbus spec) values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits for a slow gateway: 50 registers per read, 10ms between requests
    pub fn conservative() -> Self {
        Self {
            max_read_registers: 50,
            inter_request_delay_ms: 10,
        }
    }

    /// Set maximum read registers.
    pub fn with_max_read_registers(mut self, count: u16) -> Self {
        self.max_read_registers = count;
        self
    }

    /// Set inter-request delay in milliseconds.
    pub fn with_inter_request_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_request_delay_ms = delay_ms;
        self
    }

    /// Delay to wait between two requests, if any
    pub fn inter_request_delay(&self) -> Option<Duration> {
        (self.inter_request_delay_ms > 0).then(|| Duration::from_millis(self.inter_request_delay_ms))
    }

    /// Check if a read request is within limits.
    pub fn is_read_within_limits(&self, register_count: u16) -> bool {
        register_count <= self.max_read_registers
    }

    /// Reject a block that cannot be fetched in a single FC03 exchange.
    pub fn check_block(&self, block: &RegisterBlock) -> ModbusResult<()> {
        if !self.is_read_within_limits(block.count) {
            return Err(ModbusError::configuration(format!(
                "Block {} needs {} registers, device limit is {}",
                block, block.count, self.max_read_registers
            )));
        }
        Ok(())
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_read_registers: DEFAULT_MAX_READ_REGISTERS,
            inter_request_delay_ms: DEFAULT_INTER_REQUEST_DELAY_MS,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
