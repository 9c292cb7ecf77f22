use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Serialize, Serializer};

use crate::error::PanelError;

/// Fractional digits kept for every stored coordinate. Gerber allows at most six.
pub const COORD_DECIMALS: u8 = 6;

const SCALE: i64 = 1_000_000;

/// Exact fixed-point decimal with [`COORD_DECIMALS`] fractional digits.
///
/// All stored positions, offsets and diameters use this type so that a value read
/// from a file is written back with the same digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord(i64);

impl Coord {
    pub const ZERO: Coord = Coord(0);
    pub const MIN: Coord = Coord(i64::MIN);
    pub const MAX: Coord = Coord(i64::MAX);

    /// Build from an integer count of millionths.
    pub const fn from_units(units: i64) -> Self {
        Coord(units)
    }

    pub const fn units(self) -> i64 {
        self.0
    }

    /// Decode a fixed-point integer carrying `decimals` implied fractional digits.
    ///
    /// With 4 decimals, the raw value `12340` is `1.2340`.
    pub fn from_fixed(raw: i64, decimals: u8) -> Result<Self, PanelError> {
        if decimals > COORD_DECIMALS {
            return Err(PanelError::Format(format!(
                "{decimals} fractional digits exceed the supported {COORD_DECIMALS}"
            )));
        }
        let factor = 10i64.pow(u32::from(COORD_DECIMALS - decimals));
        raw.checked_mul(factor)
            .map(Coord)
            .ok_or_else(|| PanelError::Format(format!("coordinate {raw} out of range")))
    }

    /// Encode as a fixed-point integer with `decimals` fractional digits.
    ///
    /// Exact whenever the value is representable with that many digits, otherwise
    /// rounded half away from zero.
    pub fn to_fixed(self, decimals: u8) -> i64 {
        let decimals = decimals.min(COORD_DECIMALS);
        let factor = 10i64.pow(u32::from(COORD_DECIMALS - decimals));
        let quotient = self.0 / factor;
        let remainder = self.0 % factor;
        if remainder.abs() * 2 >= factor {
            quotient + self.0.signum()
        } else {
            quotient
        }
    }

    /// Quantize a floating-point value to the stored precision.
    pub fn from_f64(v: f64) -> Self {
        Coord((v * SCALE as f64).round() as i64)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub fn abs(self) -> Self {
        Coord(self.0.abs())
    }

    /// Parse a plain decimal literal such as `-12.345` or `0.6`.
    pub fn parse_decimal(s: &str) -> Result<Self, PanelError> {
        let bad = || PanelError::Format(format!("bad decimal value: {s}"));
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if (int_part.is_empty() && frac_part.is_empty())
            || !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(bad());
        }

        let int_value: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| bad())?
        };

        let keep = frac_part.len().min(COORD_DECIMALS as usize);
        let mut frac: String = frac_part[..keep].to_string();
        while frac.len() < COORD_DECIMALS as usize {
            frac.push('0');
        }
        let mut frac_value: i64 = frac.parse().map_err(|_| bad())?;
        if frac_part.as_bytes().get(keep).is_some_and(|d| *d >= b'5') {
            frac_value += 1;
        }

        let units = int_value
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(bad)?;
        Ok(Coord(if negative { -units } else { units }))
    }

    /// Format with exactly `decimals` fractional digits (rounded).
    pub fn format_fixed(self, decimals: u8) -> String {
        let decimals = decimals.min(COORD_DECIMALS);
        let raw = self.to_fixed(decimals);
        if decimals == 0 {
            return raw.to_string();
        }
        let divisor = 10i64.pow(u32::from(decimals));
        let sign = if raw < 0 { "-" } else { "" };
        let raw = raw.abs();
        format!(
            "{sign}{}.{:0width$}",
            raw / divisor,
            raw % divisor,
            width = decimals as usize
        )
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let int_part = abs / SCALE;
        let frac_part = abs % SCALE;
        if frac_part == 0 {
            return write!(f, "{sign}{int_part}");
        }
        let frac = format!("{frac_part:06}");
        write!(f, "{sign}{int_part}.{}", frac.trim_end_matches('0'))
    }
}

impl Serialize for Coord {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(self.to_f64())
    }
}

impl Add for Coord {
    type Output = Coord;
    fn add(self, rhs: Coord) -> Coord {
        Coord(self.0 + rhs.0)
    }
}

impl Sub for Coord {
    type Output = Coord;
    fn sub(self, rhs: Coord) -> Coord {
        Coord(self.0 - rhs.0)
    }
}

impl Neg for Coord {
    type Output = Coord;
    fn neg(self) -> Coord {
        Coord(-self.0)
    }
}

/// A position on the board plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

impl Point {
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    pub fn from_f64(x: f64, y: f64) -> Self {
        Self::new(Coord::from_f64(x), Coord::from_f64(y))
    }

    pub fn offset(&self, dx: Coord, dy: Coord) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x.to_f64() - other.x.to_f64();
        let dy = self.y.to_f64() - other.y.to_f64();
        (dx * dx + dy * dy).sqrt()
    }

    /// Whichever of `a` and `b` lies nearer to this point; ties go to `b`.
    pub fn closest_of(&self, a: Point, b: Point) -> Point {
        if self.distance_to(&a) < self.distance_to(&b) {
            a
        } else {
            b
        }
    }

    /// Polar angle of this point around `center`, in radians within (-PI, PI].
    pub fn angle_around(&self, center: &Point) -> f64 {
        let dy = self.y.to_f64() - center.y.to_f64();
        let dx = self.x.to_f64() - center.x.to_f64();
        dy.atan2(dx)
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        (self.x, self.y).serialize(s)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}
