//! # AMTRON Modbus - Telemetry and HEMS control for MENNEKES AMTRON chargers
//!
//! **Author:** Evan Liu <liuyifanz.1996@gmail.com>
//! **License:** MIT
//!
//! Polls a MENNEKES AMTRON charging station over Modbus TCP, decodes its
//! register map into one typed [`Snapshot`] per cycle, and writes the two
//! HEMS limits (current and power) with the device's pause-below-minimum
//! policy.
//!
//! ## Layers
//!
//! | Layer | Module | Role |
//! |-------|--------|------|
//! | Register transport | [`transport`], [`client`] | MBAP framing, one exchange at a time |
//! | Decoder | [`codec`], [`status`] | signed 32-bit pairs, scaling, status labels |
//! | Snapshot acquirer | [`acquirer`], [`registers`] | fixed poll plan, per-block degradation |
//! | Control mediator | [`control`] | coercion, write, refresh |
//! | Poll scheduler | [`scheduler`] | interval loop, atomic publication |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amtron_modbus::{ChargerConfig, ControlMediator, Coordinator, SnapshotAcquirer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), amtron_modbus::ChargerError> {
//!     let config = ChargerConfig::new("192.168.1.50");
//!     let client = Arc::new(config.build_client());
//!
//!     let coordinator = Arc::new(Coordinator::new(SnapshotAcquirer::new(client)));
//!     let snapshot = coordinator.refresh().await?;
//!     println!("{} W, status {}", snapshot.power, snapshot.ocpp_status());
//!
//!     let control = ControlMediator::new(coordinator.clone());
//!     control.set_current_limit(10.0).await?;
//!
//!     coordinator.shutdown().await.ok();
//!     Ok(())
//! }
//! ```

// ============================================================================
// Protocol modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants
pub mod constants;

/// Stack-allocated PDU
pub mod pdu;

/// FC03/FC06 request and response model
pub mod protocol;

/// Modbus TCP frame transport
pub mod transport;

/// Register-level client
pub mod client;

/// Logging setup and packet tracing
pub mod logging;

/// Device-specific protocol limits configuration
pub mod device_limits;

// ============================================================================
// Charger modules
// ============================================================================

/// Decoded field values
pub mod value;

/// Register word decoding and scaling
pub mod codec;

/// Status code label tables
pub mod status;

/// AMTRON register map and poll plan
pub mod registers;

/// Fixed-shape charger snapshot
pub mod snapshot;

/// Poll cycle
pub mod acquirer;

/// HEMS control points
pub mod control;

/// Snapshot publication and periodic polling
pub mod scheduler;

/// Connection configuration
pub mod config;

/// Connect-only setup validation
pub mod setup;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use amtron_modbus::tokio) ===
pub use tokio;

// === Transport ===
pub use client::{ModbusTcpClient, RegisterTransport};
pub use transport::{ModbusTransport, TcpTransport, TransportStats};

// === Error handling ===
pub use error::{ChargerError, ModbusError, ModbusResult};

// === Core types ===
pub use protocol::{ModbusFunction, ModbusRequest, ModbusResponse, RegisterBlock, UnitId};
pub use value::FieldValue;

// === Decoding ===
pub use codec::{combine_signed32, decode_field, Decode, FieldSpec, Scale};
pub use status::{
    AssignedPhases, AuthorizationStatus, ChargePointAvailability, HemsCommStatus, OcppStatus,
    PhaseSwitchMode, RelayState, VehicleState,
};

// === Charger ===
pub use acquirer::{DegradedBlock, PollReport, SnapshotAcquirer};
pub use config::ChargerConfig;
pub use control::{ControlMediator, ControlPoint, ControlRequest, DisplayRange};
pub use device_limits::DeviceLimits;
pub use registers::{BlockKind, BlockSpec, POLL_PLAN};
pub use scheduler::{Coordinator, PollScheduler};
pub use setup::{validate_connection, SetupError};
pub use snapshot::{Field, Snapshot};

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};

/// Timeout for poll reads and control writes (10 seconds)
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10_000;

/// Timeout for the connect-only setup check (5 seconds)
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 5_000;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("AMTRON Modbus v{} - MENNEKES AMTRON charger client", VERSION)
}
