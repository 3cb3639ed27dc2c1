//! Snapshot acquisition
//!
//! One poll cycle reads every block of [`POLL_PLAN`] in order and assembles a
//! [`Snapshot`]. Failures are handled per kind:
//!
//! | Failure | Effect |
//! |---------|--------|
//! | connect fails | cycle fails, [`ChargerError::Connectivity`] |
//! | connectivity error on any block | cycle aborts, [`ChargerError::Connectivity`] |
//! | any error on the OCPP status block | cycle fails, [`ChargerError::StatusUnavailable`] |
//! | register-level error on another block | block fields stay at defaults |

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::client::RegisterTransport;
use crate::codec::decode_field;
use crate::device_limits::DeviceLimits;
use crate::error::{ChargerError, ModbusError, ModbusResult};
use crate::protocol::RegisterBlock;
use crate::registers::{BlockKind, BlockSpec, POLL_PLAN};
use crate::snapshot::{Field, Snapshot};
use crate::value::FieldValue;

/// A block whose fields were left at defaults during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedBlock {
    pub kind: BlockKind,
    pub block: RegisterBlock,
    pub reason: String,
}

/// Outcome of one successful cycle beyond the snapshot itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub blocks_read: usize,
    pub degraded: Vec<DegradedBlock>,
}

impl PollReport {
    /// Whether every block decoded
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }

    /// Whether `kind` fell back to defaults
    pub fn is_degraded(&self, kind: BlockKind) -> bool {
        self.degraded.iter().any(|d| d.kind == kind)
    }
}

/// Runs poll cycles against a shared register transport
pub struct SnapshotAcquirer<T: RegisterTransport> {
    transport: Arc<T>,
    limits: DeviceLimits,
}

impl<T: RegisterTransport> SnapshotAcquirer<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_limits(transport, DeviceLimits::default())
    }

    pub fn with_limits(transport: Arc<T>, limits: DeviceLimits) -> Self {
        Self { transport, limits }
    }

    /// Shared transport handle
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Run one poll cycle
    pub async fn poll(&self) -> Result<Snapshot, ChargerError> {
        self.poll_with_report().await.map(|(snapshot, _)| snapshot)
    }

    /// Run one poll cycle and report which blocks degraded
    pub async fn poll_with_report(&self) -> Result<(Snapshot, PollReport), ChargerError> {
        if !self.transport.is_connected() {
            debug!("Connecting before poll cycle");
            self.transport
                .connect()
                .await
                .map_err(ChargerError::Connectivity)?;
        }

        let mut snapshot = Snapshot::new();
        let mut report = PollReport::default();

        for (index, spec) in POLL_PLAN.iter().enumerate() {
            if index > 0 {
                if let Some(delay) = self.limits.inter_request_delay() {
                    tokio::time::sleep(delay).await;
                }
            }

            match self.read_and_decode(spec).await {
                Ok(values) => {
                    for (field, value) in values {
                        snapshot.set(field, value);
                    }
                    report.blocks_read += 1;
                }
                Err(e) if spec.fatal => {
                    warn!("Cannot read {} block ({}): {}", spec.kind.name(), spec.block, e);
                    return Err(if e.is_register_error() {
                        ChargerError::StatusUnavailable(e)
                    } else {
                        ChargerError::Connectivity(e)
                    });
                }
                Err(e) if e.is_register_error() => {
                    warn!(
                        "Read error at {} block ({}), using defaults: {}",
                        spec.kind.name(),
                        spec.block,
                        e
                    );
                    report.degraded.push(DegradedBlock {
                        kind: spec.kind,
                        block: spec.block,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Poll cycle aborted at {} block: {}", spec.kind.name(), e);
                    return Err(ChargerError::Connectivity(e));
                }
            }
        }

        if !report.is_degraded(BlockKind::Meter) {
            snapshot.power = snapshot.power_l1 + snapshot.power_l2 + snapshot.power_l3;
        }
        snapshot.captured_at = Utc::now();

        debug!(
            "Poll cycle done: {}/{} blocks, ocpp_status={}",
            report.blocks_read,
            POLL_PLAN.len(),
            snapshot.ocpp_status()
        );
        Ok((snapshot, report))
    }

    /// Read one block and decode all of its fields, or none of them.
    async fn read_and_decode(&self, spec: &BlockSpec) -> ModbusResult<Vec<(Field, FieldValue)>> {
        self.limits
            .check_block(&spec.block)
            .map_err(|e| ModbusError::invalid_data(e.to_string()))?;

        let words = self.transport.read_block(&spec.block).await?;
        spec.fields
            .iter()
            .map(|(field, field_spec)| Ok((*field, decode_field(&words, field_spec)?)))
            .collect()
    }
}
