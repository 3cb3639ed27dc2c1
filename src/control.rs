//! HEMS control points
//!
//! The charger accepts two write-back limits. Neither is a plain clamp: a
//! request strictly between zero and the device's minimum operating level is
//! written as zero (pause), because the charger cannot sustain it.
//!
//! | Point | Register | Unit | Pause below | Display range |
//! |-------|----------|------|-------------|---------------|
//! | current limit | 2000 | A | 6 | 0-32, step 1 |
//! | power limit | 2002 | W | 1380 | 0-22080, step 230 |

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::client::RegisterTransport;
use crate::error::ChargerError;
use crate::registers::{REG_HEMS_CURRENT_LIMIT, REG_HEMS_POWER_LIMIT};
use crate::scheduler::Coordinator;
use crate::snapshot::Field;

/// Minimum current the charger can sustain, A
pub const MIN_CHARGING_CURRENT: u16 = 6;

/// Maximum charging current, A
pub const MAX_CHARGING_CURRENT: u16 = 32;

/// Minimum single-phase charging power (6 A x 230 V), W
pub const MIN_CHARGING_POWER: u16 = 1380;

/// Maximum charging power (32 A x 3 phases x 230 V), W
pub const MAX_CHARGING_POWER: u16 = 22080;

/// Power slider step, about 1 A per phase, W
pub const CHARGING_POWER_STEP: u16 = 230;

/// Current written when charging is switched on, A
pub const DEFAULT_ENABLE_CURRENT: u16 = 16;

/// Bounds a user interface should offer for a control point.
///
/// These are hints only; the write policy is [`ControlPoint::coerce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRange {
    pub min: u16,
    pub max: u16,
    pub step: u16,
}

/// Writable HEMS limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPoint {
    CurrentLimit,
    PowerLimit,
}

impl ControlPoint {
    /// Holding register written
    pub fn address(self) -> u16 {
        match self {
            ControlPoint::CurrentLimit => REG_HEMS_CURRENT_LIMIT,
            ControlPoint::PowerLimit => REG_HEMS_POWER_LIMIT,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            ControlPoint::CurrentLimit => "A",
            ControlPoint::PowerLimit => "W",
        }
    }

    /// Smallest non-zero value the device accepts
    pub fn minimum(self) -> u16 {
        match self {
            ControlPoint::CurrentLimit => MIN_CHARGING_CURRENT,
            ControlPoint::PowerLimit => MIN_CHARGING_POWER,
        }
    }

    pub fn display_range(self) -> DisplayRange {
        match self {
            ControlPoint::CurrentLimit => DisplayRange {
                min: 0,
                max: MAX_CHARGING_CURRENT,
                step: 1,
            },
            ControlPoint::PowerLimit => DisplayRange {
                min: 0,
                max: MAX_CHARGING_POWER,
                step: CHARGING_POWER_STEP,
            },
        }
    }

    /// Snapshot field that reflects this limit
    pub fn field(self) -> Field {
        match self {
            ControlPoint::CurrentLimit => Field::HemsCurrentLimit,
            ControlPoint::PowerLimit => Field::HemsPowerLimit,
        }
    }

    /// Apply the write policy: `0 < value < minimum` becomes 0, anything
    /// else is written unchanged. Values above the display maximum are left
    /// for the device to judge.
    pub fn coerce(self, value: u16) -> u16 {
        if value > 0 && value < self.minimum() {
            0
        } else {
            value
        }
    }

    /// Coerce a caller-supplied number: truncated toward zero, then
    /// [`coerce`](Self::coerce)d. `None` when the number does not fit the
    /// register (negative, above `u16::MAX`, NaN or infinite).
    pub fn coerce_requested(self, requested: f64) -> Option<u16> {
        if !requested.is_finite() || requested < 0.0 {
            return None;
        }
        let whole = requested.trunc();
        if whole > f64::from(u16::MAX) {
            return None;
        }
        Some(self.coerce(whole as u16))
    }
}

impl fmt::Display for ControlPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlPoint::CurrentLimit => f.write_str("current limit"),
            ControlPoint::PowerLimit => f.write_str("power limit"),
        }
    }
}

/// A requested write, before coercion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlRequest {
    pub point: ControlPoint,
    pub requested: f64,
}

impl ControlRequest {
    pub fn new(point: ControlPoint, requested: f64) -> Self {
        Self { point, requested }
    }

    pub fn current_limit(amps: f64) -> Self {
        Self::new(ControlPoint::CurrentLimit, amps)
    }

    pub fn power_limit(watts: f64) -> Self {
        Self::new(ControlPoint::PowerLimit, watts)
    }

    /// Value that will actually be written, `None` if the request is out
    /// of the register range
    pub fn coerced(&self) -> Option<u16> {
        self.point.coerce_requested(self.requested)
    }
}

/// Writes control points and triggers a refresh afterwards
pub struct ControlMediator<T: RegisterTransport> {
    coordinator: Arc<Coordinator<T>>,
}

impl<T: RegisterTransport> ControlMediator<T> {
    pub fn new(coordinator: Arc<Coordinator<T>>) -> Self {
        Self { coordinator }
    }

    /// Coerce and write one control point.
    ///
    /// Returns the value written. A number the register cannot hold is
    /// rejected before anything is sent. A failed write leaves no local trace
    /// and is not retried. After a successful write a refresh is attempted; its
    /// failure does not fail the write.
    pub async fn apply(&self, request: ControlRequest) -> Result<u16, ChargerError> {
        let point = request.point;
        let value = request.coerced().ok_or_else(|| {
            warn!("Rejected {} request {} {}", point, request.requested, point.unit());
            ChargerError::InvalidRequest {
                point,
                requested: request.requested,
            }
        })?;
        if f64::from(value) != request.requested.trunc() {
            info!(
                "Requested {} {} {} adjusted to {} {}",
                point,
                request.requested,
                point.unit(),
                value,
                point.unit()
            );
        }

        let transport = self.coordinator.transport();
        let written = async {
            if !transport.is_connected() {
                transport.connect().await?;
            }
            transport.write_register(point.address(), value).await
        }
        .await;

        if let Err(e) = written {
            error!("Failed to set {}: {}", point, e);
            return Err(ChargerError::WriteFailed { point, source: e });
        }
        info!("Set {} to {} {}", point, value, point.unit());

        if let Err(e) = self.coordinator.refresh().await {
            warn!("Refresh after setting {} failed: {}", point, e);
        }
        Ok(value)
    }

    /// Write the HEMS current limit in amperes
    pub async fn set_current_limit(&self, amps: f64) -> Result<u16, ChargerError> {
        self.apply(ControlRequest::current_limit(amps)).await
    }

    /// Write the HEMS power limit in watts
    pub async fn set_power_limit(&self, watts: f64) -> Result<u16, ChargerError> {
        self.apply(ControlRequest::power_limit(watts)).await
    }

    /// Allow charging at the default current
    pub async fn enable_charging(&self) -> Result<u16, ChargerError> {
        self.set_current_limit(f64::from(DEFAULT_ENABLE_CURRENT)).await
    }

    /// Pause charging
    pub async fn disable_charging(&self) -> Result<u16, ChargerError> {
        self.set_current_limit(0.0).await
    }

    /// From the latest snapshot; `None` before the first successful poll
    pub fn is_charging_enabled(&self) -> Option<bool> {
        self.coordinator
            .latest()
            .map(|snapshot| snapshot.is_charging_enabled())
    }

    /// Current value of a control point from the latest snapshot
    pub fn current_value(&self, point: ControlPoint) -> Option<u16> {
        self.coordinator
            .latest()
            .and_then(|snapshot| snapshot.get(point.field()).as_word())
    }
}
