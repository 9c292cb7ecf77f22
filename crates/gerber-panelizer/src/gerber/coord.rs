use std::fmt;

use crate::error::PanelError;
use crate::geometry::{Coord, COORD_DECIMALS};

/// Which zeros a coordinate field may omit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroOmission {
    Leading,
    Trailing,
}

/// Coordinate format from the %FS (Format Specification) command.
///
/// Example: `%FSLAX34Y34*%` means leading-zero omission, absolute notation,
/// 3 integer digits + 4 decimal digits for both X and Y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateFormat {
    pub zeros: ZeroOmission,
    pub incremental: bool,
    pub x_integer: u8,
    pub x_decimal: u8,
    pub y_integer: u8,
    pub y_decimal: u8,
}

/// Which coordinate field a value belongs to. `I` follows X digits, `J` follows Y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl CoordinateFormat {
    /// The format every merged layer is written with: `FSLAX46Y46`.
    pub const MERGED: CoordinateFormat = CoordinateFormat {
        zeros: ZeroOmission::Leading,
        incremental: false,
        x_integer: 4,
        x_decimal: 6,
        y_integer: 4,
        y_decimal: 6,
    };

    fn digits(&self, axis: Axis) -> (u8, u8) {
        match axis {
            Axis::X => (self.x_integer, self.x_decimal),
            Axis::Y => (self.y_integer, self.y_decimal),
        }
    }

    /// Decode one coordinate field (sign and digits, without the axis letter).
    pub fn decode(&self, field: &str, axis: Axis) -> Result<Coord, PanelError> {
        let (integer, decimal) = self.digits(axis);
        let (negative, digits) = match field.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, field.strip_prefix('+').unwrap_or(field)),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PanelError::Format(format!("bad coordinate field: {field}")));
        }

        let mut padded = digits.to_string();
        if self.zeros == ZeroOmission::Trailing {
            let total = usize::from(integer) + usize::from(decimal);
            while padded.len() < total {
                padded.push('0');
            }
        }

        let raw: i64 = padded
            .parse()
            .map_err(|_| PanelError::Format(format!("coordinate out of range: {field}")))?;
        let value = Coord::from_fixed(raw, decimal)?;
        Ok(if negative { -value } else { value })
    }

    /// Encode a coordinate as a zero-padded fixed-point integer.
    pub fn encode(&self, value: Coord, axis: Axis) -> String {
        let (integer, decimal) = self.digits(axis);
        let raw = value.to_fixed(decimal);
        let width = usize::from(integer) + usize::from(decimal);
        if raw < 0 {
            format!("-{:0width$}", raw.unsigned_abs())
        } else {
            format!("{raw:0width$}")
        }
    }

    /// Reject formats whose decimals exceed the stored precision.
    pub fn validate(&self) -> Result<(), PanelError> {
        if self.x_decimal > COORD_DECIMALS || self.y_decimal > COORD_DECIMALS {
            return Err(PanelError::Format(format!(
                "format {self} declares more than {COORD_DECIMALS} decimal digits"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CoordinateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let zeros = match self.zeros {
            ZeroOmission::Leading => 'L',
            ZeroOmission::Trailing => 'T',
        };
        let notation = if self.incremental { 'I' } else { 'A' };
        write!(
            f,
            "FS{zeros}{notation}X{}{}Y{}{}",
            self.x_integer, self.x_decimal, self.y_integer, self.y_decimal
        )
    }
}

/// Unit system from the %MO command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::Millimeters => write!(f, "MOMM"),
            Units::Inches => write!(f, "MOIN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs(zeros: ZeroOmission, integer: u8, decimal: u8) -> CoordinateFormat {
        CoordinateFormat {
            zeros,
            incremental: false,
            x_integer: integer,
            x_decimal: decimal,
            y_integer: integer,
            y_decimal: decimal,
        }
    }

    #[test]
    fn test_decode_3_4() {
        let f = fs(ZeroOmission::Leading, 3, 4);
        assert_eq!(
            f.decode("0012340", Axis::X).unwrap(),
            Coord::parse_decimal("1.2340").unwrap()
        );
        assert_eq!(
            f.decode("-56780", Axis::Y).unwrap(),
            Coord::parse_decimal("-5.678").unwrap()
        );
    }

    #[test]
    fn test_decode_trailing_zero_omission() {
        let f = fs(ZeroOmission::Trailing, 2, 4);
        // "15" is left aligned: 15.0000
        assert_eq!(
            f.decode("15", Axis::X).unwrap(),
            Coord::parse_decimal("15").unwrap()
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let f = fs(ZeroOmission::Leading, 2, 4);
        assert!(f.decode("", Axis::X).is_err());
        assert!(f.decode("12a", Axis::X).is_err());
    }

    #[test]
    fn test_encode_pads_to_declared_digits() {
        let f = fs(ZeroOmission::Leading, 3, 4);
        let v = Coord::parse_decimal("1.234").unwrap();
        assert_eq!(f.encode(v, Axis::X), "0012340");
        assert_eq!(f.encode(-v, Axis::Y), "-0012340");
    }

    #[test]
    fn test_encode_decode_identity() {
        let f = CoordinateFormat::MERGED;
        for text in ["0", "-0.000001", "123.456789", "-9999.5"] {
            let v = Coord::parse_decimal(text).unwrap();
            assert_eq!(f.decode(&f.encode(v, Axis::X), Axis::X).unwrap(), v);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(CoordinateFormat::MERGED.to_string(), "FSLAX46Y46");
        let f = CoordinateFormat {
            incremental: true,
            ..fs(ZeroOmission::Trailing, 2, 5)
        };
        assert_eq!(f.to_string(), "FSTIX25Y25");
    }

    #[test]
    fn test_validate() {
        assert!(fs(ZeroOmission::Leading, 2, 6).validate().is_ok());
        assert!(fs(ZeroOmission::Leading, 2, 7).validate().is_err());
    }
}
