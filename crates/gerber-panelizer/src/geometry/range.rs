use std::fmt;

use super::point::{Coord, Point};

/// A straight segment between two points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: Point,
    pub end: Point,
}

impl Range {
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn is_horizontal(&self) -> bool {
        self.start.y == self.end.y
    }

    pub fn is_vertical(&self) -> bool {
        self.start.x == self.end.x
    }

    /// Signed extent along X.
    pub fn width(&self) -> f64 {
        (self.end.x - self.start.x).to_f64()
    }

    /// Signed extent along Y.
    pub fn height(&self) -> f64 {
        (self.end.y - self.start.y).to_f64()
    }

    pub fn length(&self) -> f64 {
        if self.is_horizontal() {
            self.width().abs()
        } else if self.is_vertical() {
            self.height().abs()
        } else {
            self.width().hypot(self.height())
        }
    }

    /// The point `distance` along the segment, measured from `start` towards `end`.
    ///
    /// Axis-aligned segments stay exact on the fixed axis; the result is quantized to
    /// the stored precision.
    pub fn point_at_distance(&self, distance: f64) -> Point {
        let step = Coord::from_f64(distance);
        if self.is_horizontal() {
            let x = if self.start.x <= self.end.x {
                self.start.x + step
            } else {
                self.start.x - step
            };
            Point::new(x, self.start.y)
        } else if self.is_vertical() {
            let y = if self.start.y <= self.end.y {
                self.start.y + step
            } else {
                self.start.y - step
            };
            Point::new(self.start.x, y)
        } else {
            let length = self.length();
            let dx = self.width() / length * distance;
            let dy = self.height() / length * distance;
            self.start.offset(Coord::from_f64(dx), Coord::from_f64(dy))
        }
    }

    pub fn midpoint(&self) -> Point {
        self.point_at_distance(self.length() / 2.0)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) - ({})", self.start, self.end)
    }
}
