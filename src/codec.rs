//! # Register Codec
//!
//! Pure decoding of raw register words into field values. No I/O.
//!
//! ## Supported Layouts
//!
//! | Layout | Registers | Result |
//! |--------|-----------|--------|
//! | word | 1 | raw `u16` (status codes, limits) |
//! | signed32 | 2, high word first | `i64` or scaled `f64` |
//!
//! ## Scaling
//!
//! | Scale | Factor | Used for |
//! |-------|--------|----------|
//! | unit | 1 | W, V, s, A (limits) |
//! | milli | 1/1000 | mA → A, Wh → kWh |

use crate::error::{ModbusError, ModbusResult};
use crate::value::FieldValue;

/// Combine two registers into a signed 32-bit value, high word first.
///
/// `(high << 16) | low` read as two's complement. A zero high word always
/// gives a non-negative value; only a high word with bit 15 set is negative.
///
/// ```rust
/// use amtron_modbus::combine_signed32;
///
/// assert_eq!(combine_signed32(0x0000, 0xFFFF), 65535);
/// assert_eq!(combine_signed32(0xFFFF, 0xFFFF), -1);
/// assert_eq!(combine_signed32(0x8000, 0x0000), i32::MIN);
/// ```
#[inline]
pub fn combine_signed32(high: u16, low: u16) -> i32 {
    (((high as u32) << 16) | low as u32) as i32
}

/// Split a signed 32-bit value into (high, low) register words.
#[inline]
pub fn split_signed32(value: i32) -> (u16, u16) {
    let bits = value as u32;
    ((bits >> 16) as u16, bits as u16)
}

/// Register layout of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// One raw register
    Word,
    /// Two registers, high word first, two's complement
    Signed32,
}

impl Decode {
    /// Registers consumed
    pub const fn register_count(self) -> usize {
        match self {
            Decode::Word => 1,
            Decode::Signed32 => 2,
        }
    }
}

/// Scale applied after combining registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Value is already in its display unit
    Unit,
    /// Divide by 1000 (mA → A, Wh → kWh)
    Milli,
}

impl Scale {
    /// Apply the scale to a raw integer
    #[inline]
    pub fn apply(self, raw: i64) -> FieldValue {
        match self {
            Scale::Unit => FieldValue::Integer(raw),
            Scale::Milli => FieldValue::Scaled(raw as f64 / 1000.0),
        }
    }
}

/// Where a field lives inside its block and how to turn it into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Word offset from the block start
    pub offset: usize,
    pub decode: Decode,
    pub scale: Scale,
}

impl FieldSpec {
    /// Raw word at `offset`
    pub const fn word(offset: usize) -> Self {
        Self {
            offset,
            decode: Decode::Word,
            scale: Scale::Unit,
        }
    }

    /// Signed 32-bit pair at `offset`, unscaled
    pub const fn signed32(offset: usize) -> Self {
        Self {
            offset,
            decode: Decode::Signed32,
            scale: Scale::Unit,
        }
    }

    /// Same field, divided by 1000
    pub const fn milli(self) -> Self {
        Self {
            scale: Scale::Milli,
            ..self
        }
    }

    /// One past the last word this field reads
    pub const fn end(&self) -> usize {
        self.offset + self.decode.register_count()
    }
}

/// Decode one field out of a block's words.
///
/// A block shorter than the field needs is an `InvalidData` error, which the
/// poll cycle treats as a register-level failure of that block.
pub fn decode_field(words: &[u16], spec: &FieldSpec) -> ModbusResult<FieldValue> {
    let regs = words.get(spec.offset..spec.end()).ok_or_else(|| {
        ModbusError::invalid_data(format!(
            "Field at offset {} needs {} registers, block has {}",
            spec.offset,
            spec.decode.register_count(),
            words.len()
        ))
    })?;

    Ok(match (spec.decode, spec.scale) {
        (Decode::Word, Scale::Unit) => FieldValue::Word(regs[0]),
        (Decode::Word, scale) => scale.apply(i64::from(regs[0])),
        (Decode::Signed32, scale) => scale.apply(i64::from(combine_signed32(regs[0], regs[1]))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_combine_signed32_boundaries() {
        assert_eq!(combine_signed32(0x0000, 0xFFFF), 65535);
        assert_eq!(combine_signed32(0x0000, 0x0000), 0);
        assert_eq!(combine_signed32(0xFFFF, 0xFFFF), -1);
        assert_eq!(combine_signed32(0x7FFF, 0xFFFF), 2147483647);
        assert_eq!(combine_signed32(0x8000, 0x0000), -2147483648);
        assert_eq!(combine_signed32(0xFFFF, 0xFF51), -175);
    }

    #[test]
    fn test_decode_word() {
        let words = [3, 16, 0];
        assert_eq!(decode_field(&words, &FieldSpec::word(0)).unwrap(), FieldValue::Word(3));
        assert_eq!(decode_field(&words, &FieldSpec::word(1)).unwrap(), FieldValue::Word(16));
    }

    #[test]
    fn test_decode_signed32_scaling() {
        // 2000 mA, 123000 Wh, 230 V
        let words = [0, 2000, 0x0001, 0xE078, 0, 230];
        assert_eq!(
            decode_field(&words, &FieldSpec::signed32(0).milli()).unwrap(),
            FieldValue::Scaled(2.0)
        );
        assert_eq!(
            decode_field(&words, &FieldSpec::signed32(2).milli()).unwrap(),
            FieldValue::Scaled(123.0)
        );
        assert_eq!(
            decode_field(&words, &FieldSpec::signed32(4)).unwrap(),
            FieldValue::Integer(230)
        );
    }

    #[test]
    fn test_decode_negative_power() {
        let (hi, lo) = split_signed32(-1200);
        assert_eq!(
            decode_field(&[hi, lo], &FieldSpec::signed32(0)).unwrap(),
            FieldValue::Integer(-1200)
        );
    }

    #[test]
    fn test_decode_short_block() {
        let err = decode_field(&[0, 1, 2], &FieldSpec::signed32(2)).unwrap_err();
        assert!(err.is_register_error());
        assert!(decode_field(&[], &FieldSpec::word(0)).is_err());
    }

    #[test]
    fn test_field_spec_end() {
        assert_eq!(FieldSpec::word(3).end(), 4);
        assert_eq!(FieldSpec::signed32(20).milli().end(), 22);
    }

    proptest! {
        #[test]
        fn prop_signed32_roundtrip(v in any::<i32>()) {
            let (high, low) = split_signed32(v);
            prop_assert_eq!(combine_signed32(high, low), v);
        }

        #[test]
        fn prop_decode_never_panics(words in proptest::collection::vec(any::<u16>(), 0..8), offset in 0usize..10) {
            let _ = decode_field(&words, &FieldSpec::signed32(offset).milli());
            let _ = decode_field(&words, &FieldSpec::word(offset));
        }
    }
}
