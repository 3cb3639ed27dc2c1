//! # Field Values
//!
//! Decoded value of one snapshot field. Every charger field is either a raw
//! 16-bit code, a signed integer built from two registers, or a scaled
//! quantity (A, kWh).

use std::fmt;

use serde::Serialize;

/// Decoded value of one snapshot field.
///
/// # Example
///
/// ```rust
/// use amtron_modbus::FieldValue;
///
/// let current = FieldValue::Scaled(15.75);
/// assert!((current.as_f64() - 15.75).abs() < 1e-9);
/// assert_eq!(FieldValue::Word(16).as_i64(), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Raw 16-bit register (status codes, limits)
    Word(u16),
    /// Signed integer from a 32-bit register pair (W, s)
    Integer(i64),
    /// Scaled quantity (A, kWh)
    Scaled(f64),
}

impl FieldValue {
    /// Convert the value to f64 for uniform numeric handling.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Word(v) => f64::from(*v),
            FieldValue::Integer(v) => *v as f64,
            FieldValue::Scaled(v) => *v,
        }
    }

    /// Convert the value to i64, truncating scaled values toward zero.
    #[inline]
    pub fn as_i64(&self) -> i64 {
        match self {
            FieldValue::Word(v) => i64::from(*v),
            FieldValue::Integer(v) => *v,
            FieldValue::Scaled(v) => *v as i64,
        }
    }

    /// Raw register code, if this is a word value
    pub fn as_word(&self) -> Option<u16> {
        match self {
            FieldValue::Word(v) => Some(*v),
            _ => None,
        }
    }

    /// Check if the value is zero.
    pub fn is_zero(&self) -> bool {
        match self {
            FieldValue::Word(v) => *v == 0,
            FieldValue::Integer(v) => *v == 0,
            FieldValue::Scaled(v) => *v == 0.0,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Word(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Scaled(v) => write!(f, "{:.3}", v),
        }
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::Word(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Scaled(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(FieldValue::Word(230).as_f64(), 230.0);
        assert_eq!(FieldValue::Integer(-175).as_i64(), -175);
        assert_eq!(FieldValue::Scaled(-2.9).as_i64(), -2);
        assert_eq!(FieldValue::Word(3).as_word(), Some(3));
        assert_eq!(FieldValue::Integer(3).as_word(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Word(16).to_string(), "16");
        assert_eq!(FieldValue::Integer(-40).to_string(), "-40");
        assert_eq!(FieldValue::Scaled(123.0).to_string(), "123.000");
    }

    #[test]
    fn test_is_zero() {
        assert!(FieldValue::Word(0).is_zero());
        assert!(FieldValue::Scaled(0.0).is_zero());
        assert!(!FieldValue::Integer(1).is_zero());
    }

    #[test]
    fn test_serialize_untagged() {
        assert_eq!(serde_json::to_string(&FieldValue::Word(16)).unwrap(), "16");
        assert_eq!(serde_json::to_string(&FieldValue::Scaled(1.5)).unwrap(), "1.5");
    }
}
