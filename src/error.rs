//! Error types for the AMTRON Modbus client
//!
//! Two layers:
//! - [`ModbusError`] describes what went wrong on a single protocol exchange.
//! - [`ChargerError`] describes what a poll cycle or a control write reports
//!   to its caller.
//!
//! The split between *register-level* and *connectivity* failures drives the
//! poll algorithm: a register-level error degrades one block to its defaults,
//! a connectivity error aborts the whole cycle.

use thiserror::Error;

use crate::control::ControlPoint;

/// Result type for protocol operations
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors produced by the transport, framing and decode layers.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Socket level I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TCP connection could not be established
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// An operation was attempted without a live connection
    #[error("Not connected")]
    NotConnected,

    /// No complete response within the configured timeout
    #[error("Timeout: {message} (after {timeout_ms}ms)")]
    Timeout { message: String, timeout_ms: u64 },

    /// Malformed frame or session desync (MBAP, transaction id, function code)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Device answered with a Modbus exception response
    #[error("Modbus exception (FC{function:02X}, code {code:02X}): {message}")]
    Exception {
        function: u8,
        code: u8,
        message: String,
    },

    /// Register payload does not match what was requested
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Function code outside the supported set
    #[error("Invalid function code: {code:02X}")]
    InvalidFunction { code: u8 },

    /// Invalid connection parameters
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModbusError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            message: message.into(),
            timeout_ms,
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an invalid function error
    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True when the device serviced the exchange but rejected or garbled the
    /// requested address range. These are expected and isolated per block.
    pub fn is_register_error(&self) -> bool {
        matches!(self, Self::Exception { .. } | Self::InvalidData { .. })
    }

    /// True when the session itself is unusable and the poll cycle must abort.
    pub fn is_connectivity_error(&self) -> bool {
        !self.is_register_error()
    }

    /// True for timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors reported by a poll cycle or a control operation.
#[derive(Debug, Error)]
pub enum ChargerError {
    /// Transport session could not be established or was lost mid-cycle.
    /// No snapshot is produced.
    #[error("charger unreachable: {0}")]
    Connectivity(#[source] ModbusError),

    /// The OCPP status register (104) could not be read. It is the liveness
    /// signal of the device, so the whole cycle is discarded.
    #[error("cannot read OCPP status (register 104): {0}")]
    StatusUnavailable(#[source] ModbusError),

    /// A control write was rejected or failed on the wire.
    #[error("failed to set {point}: {source}")]
    WriteFailed {
        point: ControlPoint,
        #[source]
        source: ModbusError,
    },

    /// A control request the register cannot hold (negative, too large,
    /// not a number). Nothing was written.
    #[error("invalid {point} request: {requested}")]
    InvalidRequest { point: ControlPoint, requested: f64 },

    /// Connection parameters are invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl ChargerError {
    /// Underlying protocol error, if any
    pub fn modbus_error(&self) -> Option<&ModbusError> {
        match self {
            Self::Connectivity(e) | Self::StatusUnavailable(e) => Some(e),
            Self::WriteFailed { source, .. } => Some(source),
            Self::InvalidRequest { .. } | Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let exc = ModbusError::Exception {
            function: 0x03,
            code: 0x02,
            message: "Illegal Data Address".to_string(),
        };
        assert!(exc.is_register_error());
        assert!(!exc.is_connectivity_error());

        assert!(ModbusError::invalid_data("short block").is_register_error());

        assert!(ModbusError::NotConnected.is_connectivity_error());
        assert!(ModbusError::timeout("read", 10_000).is_connectivity_error());
        assert!(ModbusError::protocol("tid mismatch").is_connectivity_error());
        assert!(ModbusError::connection("refused").is_connectivity_error());

        let io = ModbusError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        ));
        assert!(io.is_connectivity_error());
    }

    #[test]
    fn test_error_display() {
        let err = ModbusError::timeout("TCP header read", 5000);
        assert_eq!(err.to_string(), "Timeout: TCP header read (after 5000ms)");

        let err = ChargerError::StatusUnavailable(ModbusError::NotConnected);
        assert!(err.to_string().contains("register 104"));
    }

    #[test]
    fn test_charger_error_source() {
        let err = ChargerError::WriteFailed {
            point: ControlPoint::CurrentLimit,
            source: ModbusError::invalid_data("echo mismatch"),
        };
        assert!(err.modbus_error().is_some());
        assert!(err.to_string().contains("current limit"));
        assert!(ChargerError::Config("bad".into()).modbus_error().is_none());
    }
}
