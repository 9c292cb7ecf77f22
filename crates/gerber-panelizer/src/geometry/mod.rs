pub mod arc;
pub mod hole;
pub mod line;
pub mod point;
pub mod range;

pub use arc::Arc;
pub use hole::Hole;
pub use line::Line;
pub use point::{Coord, Point, COORD_DECIMALS};
pub use range::Range;

/// Interpolation mode set by G01/G02/G03.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Clockwise,
    CounterClockwise,
}

impl Interpolation {
    pub fn g_code(self) -> u32 {
        match self {
            Interpolation::Linear => 1,
            Interpolation::Clockwise => 2,
            Interpolation::CounterClockwise => 3,
        }
    }
}

/// Arc quadrant mode set by G74/G75.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuadrantMode {
    #[default]
    Single,
    Multi,
}

impl QuadrantMode {
    pub fn g_code(self) -> u32 {
        match self {
            QuadrantMode::Single => 74,
            QuadrantMode::Multi => 75,
        }
    }
}

/// A primitive produced by replaying a drawing.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Line(Line),
    Arc(Arc),
}

impl Geometry {
    pub fn start(&self) -> Point {
        match self {
            Geometry::Line(l) => l.start,
            Geometry::Arc(a) => a.start,
        }
    }

    pub fn end(&self) -> Point {
        match self {
            Geometry::Line(l) => l.end,
            Geometry::Arc(a) => a.end,
        }
    }

    pub fn aperture(&self) -> u32 {
        match self {
            Geometry::Line(l) => l.aperture,
            Geometry::Arc(a) => a.aperture,
        }
    }
}
