pub mod mouse_bites;

use uuid::Uuid;

use crate::geometry::{Coord, Geometry, Hole, Range};
use crate::layer::LayerFunction;

pub use mouse_bites::{MouseBites, MouseBitesSettings};

/// A machining edit applied to merged layers.
#[derive(Debug, Clone)]
pub enum Feature {
    MouseBites(MouseBites),
}

impl Feature {
    pub fn id(&self) -> Uuid {
        match self {
            Feature::MouseBites(m) => m.id(),
        }
    }

    /// Whether merged layers of `function` carry this feature's edits.
    pub fn affects(&self, function: LayerFunction) -> bool {
        match self {
            Feature::MouseBites(m) => m.affects(function),
        }
    }

    /// The layer whose geometry the feature is computed against.
    pub fn source_function(&self) -> LayerFunction {
        match self {
            Feature::MouseBites(_) => LayerFunction::EdgeCuts,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Feature::MouseBites(m) => m.is_valid(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Feature::MouseBites(m) => m.clear(),
        }
    }

    pub fn move_offset(&mut self, dx: Coord, dy: Coord) {
        match self {
            Feature::MouseBites(m) => m.move_offset(dx, dy),
        }
    }

    pub fn calculate_affected_geometry(&mut self, index: usize, geometry: &Geometry) {
        let range = Range::new(geometry.start(), geometry.end());
        match self {
            Feature::MouseBites(m) => {
                m.calculate_affected_geometry(index, range, geometry.aperture())
            }
        }
    }

    pub fn is_affected(&self, index: usize) -> bool {
        match self {
            Feature::MouseBites(m) => m.is_affected(index),
        }
    }

    pub fn pierces(&self, index: usize) -> Vec<Range> {
        match self {
            Feature::MouseBites(m) => m.pierce(index).into_iter().collect(),
        }
    }

    pub fn build_geometry(&self) -> Vec<Geometry> {
        match self {
            Feature::MouseBites(m) => m.build_geometry(),
        }
    }

    pub fn build_holes(&self) -> Vec<Hole> {
        match self {
            Feature::MouseBites(m) => m.build_holes(),
        }
    }
}

impl From<MouseBites> for Feature {
    fn from(m: MouseBites) -> Self {
        Feature::MouseBites(m)
    }
}
