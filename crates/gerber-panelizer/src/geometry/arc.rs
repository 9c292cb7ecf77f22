use super::point::{Coord, Point};
use super::{Interpolation, QuadrantMode};

/// A circular draw from `start` to `end` around `start + (i, j)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Arc {
    pub start: Point,
    pub end: Point,
    pub i: Coord,
    pub j: Coord,
    pub interpolation: Interpolation,
    pub quadrant: QuadrantMode,
    pub aperture: u32,
}

impl Arc {
    pub fn center(&self) -> Point {
        self.start.offset(self.i, self.j)
    }

    pub fn radius(&self) -> f64 {
        self.i.to_f64().hypot(self.j.to_f64())
    }
}
