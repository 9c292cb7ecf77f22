use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Arc, Coord, Geometry, Hole, Interpolation, Line, Point, QuadrantMode, Range};
use crate::layer::LayerFunction;

/// Perforation parameters for a break-away bridge, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseBitesSettings {
    /// Spacing between neighbouring holes.
    pub drill_distance: f64,
    pub drill_diameter: f64,
}

impl Default for MouseBitesSettings {
    fn default() -> Self {
        Self {
            drill_distance: 1.5,
            drill_diameter: 0.6,
        }
    }
}

/// Where the circle crosses one outline primitive.
#[derive(Debug, Clone, PartialEq)]
struct Intersection {
    aperture: u32,
    first: Option<Point>,
    second: Option<Point>,
}

impl Intersection {
    fn chord(&self) -> Option<Range> {
        Some(Range::new(self.first?, self.second?))
    }
}

/// A break-away bridge between two board outlines.
///
/// The circle cuts a gap into every outline edge it crosses. When exactly two edges
/// are crossed, the gaps are stitched together with arcs and a row of perforation
/// holes is drilled along each removed stretch of outline.
#[derive(Debug, Clone)]
pub struct MouseBites {
    id: Uuid,
    center: Point,
    radius: Coord,
    settings: MouseBitesSettings,
    /// Keyed by the index of the primitive in the replayed outline.
    intersections: BTreeMap<usize, Intersection>,
}

impl MouseBites {
    pub fn new(center: Point, radius: Coord, settings: MouseBitesSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            center,
            radius,
            settings,
            intersections: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn radius(&self) -> Coord {
        self.radius
    }

    pub fn settings(&self) -> &MouseBitesSettings {
        &self.settings
    }

    pub fn affects(&self, function: LayerFunction) -> bool {
        matches!(function, LayerFunction::EdgeCuts | LayerFunction::TopDrill)
    }

    /// Exactly two crossed primitives, each entered and left within its extent.
    pub fn is_valid(&self) -> bool {
        self.intersections.len() == 2
            && self
                .intersections
                .values()
                .all(|i| i.first.is_some() && i.second.is_some())
    }

    pub fn clear(&mut self) {
        self.intersections.clear();
    }

    /// Drag the circle. Cached intersections are dropped until the next outline replay.
    pub fn move_offset(&mut self, dx: Coord, dy: Coord) {
        self.center = self.center.offset(dx, dy);
        self.clear();
    }

    /// Intersect the circle with one outline primitive, treated as the straight
    /// segment between its end points.
    pub fn calculate_affected_geometry(&mut self, index: usize, range: Range, aperture: u32) {
        let (sx, sy) = (range.start.x.to_f64(), range.start.y.to_f64());
        let dx = range.width();
        let dy = range.height();
        let fx = sx - self.center.x.to_f64();
        let fy = sy - self.center.y.to_f64();
        let r = self.radius.to_f64();

        let a = dx * dx + dy * dy;
        let b = 2.0 * (fx * dx + fy * dy);
        let c = fx * fx + fy * fy - r * r;
        let discriminant = b * b - 4.0 * a * c;
        if a == 0.0 || discriminant <= 0.0 {
            return;
        }

        let root = discriminant.sqrt();
        let on_segment = |t: f64| {
            (0.0..=1.0)
                .contains(&t)
                .then(|| Point::from_f64(sx + t * dx, sy + t * dy))
        };
        let first = on_segment((-b - root) / (2.0 * a));
        let second = on_segment((-b + root) / (2.0 * a));
        if first.is_none() && second.is_none() {
            return;
        }

        debug!(
            "Bridge {} crosses outline primitive {index} at {first:?} / {second:?}",
            self.id
        );
        self.intersections.insert(
            index,
            Intersection {
                aperture,
                first,
                second,
            },
        );
    }

    /// Whether the primitive at `index` must be redrawn with a gap.
    pub fn is_affected(&self, index: usize) -> bool {
        self.is_valid() && self.intersections.contains_key(&index)
    }

    /// The stretch of the primitive at `index` that lies inside the circle.
    pub fn pierce(&self, index: usize) -> Option<Range> {
        if !self.is_valid() {
            return None;
        }
        self.intersections.get(&index).and_then(Intersection::chord)
    }

    /// Intersection points with their primitive index, sorted by descending angle
    /// around the center (clockwise).
    fn sorted_points(&self) -> Vec<(Point, usize, u32)> {
        let mut points: Vec<(Point, usize, u32)> = self
            .intersections
            .iter()
            .flat_map(|(&index, i)| {
                [i.first, i.second]
                    .into_iter()
                    .flatten()
                    .map(move |p| (p, index, i.aperture))
            })
            .collect();
        points.sort_by(|a, b| {
            b.0.angle_around(&self.center)
                .total_cmp(&a.0.angle_around(&self.center))
        });
        points
    }

    /// Stitches joining the two gaps: an arc plus its chord for every pair of
    /// neighbouring points taken from different primitives.
    pub fn build_geometry(&self) -> Vec<Geometry> {
        if !self.is_valid() {
            return Vec::new();
        }
        let points = self.sorted_points();
        let n = points.len();
        let mut geometry = Vec::new();
        for k in 0..n {
            let (p1, line1, aperture) = points[k];
            let (p2, line2, _) = points[(k + 1) % n];
            // Neighbours on the same primitive are joined by what remains of it.
            if line1 == line2 || p1 == p2 {
                continue;
            }
            let i = Coord::from_f64((p2.x - p1.x).to_f64() / 2.0);
            let j = Coord::from_f64((p2.y - p1.y).to_f64() / 2.0);
            geometry.push(Geometry::Arc(Arc {
                start: p1,
                end: p2,
                i,
                j,
                interpolation: Interpolation::CounterClockwise,
                quadrant: QuadrantMode::Multi,
                aperture,
            }));
            geometry.push(Geometry::Line(Line::new(p1, p2, aperture)));
        }
        geometry
    }

    /// Perforation holes: one at the middle of every gap, then pairs stepping outwards
    /// while a full step still fits before the gap's end.
    pub fn build_holes(&self) -> Vec<Hole> {
        if !self.is_valid() {
            return Vec::new();
        }
        let step = self.settings.drill_distance;
        let diameter = Coord::from_f64(self.settings.drill_diameter);
        let mut holes = Vec::new();
        for chord in self.intersections.values().filter_map(Intersection::chord) {
            let half = chord.length() / 2.0;
            holes.push(Hole::round(chord.midpoint(), diameter));
            if step <= 0.0 {
                continue;
            }
            let mut offset = step;
            while half - offset >= step - 1e-9 {
                holes.push(Hole::round(chord.point_at_distance(half - offset), diameter));
                holes.push(Hole::round(chord.point_at_distance(half + offset), diameter));
                offset += step;
            }
        }
        holes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(x: f64, y: f64) -> Point {
        Point::from_f64(x, y)
    }

    /// Two boards side by side with a 2 mm gap: right edge of one at x=50, left edge
    /// of the other at x=52.
    fn crossed_gap(radius: f64) -> MouseBites {
        let mut bites = MouseBites::new(
            p(51.0, 10.0),
            Coord::from_f64(radius),
            MouseBitesSettings::default(),
        );
        bites.calculate_affected_geometry(3, Range::new(p(50.0, 0.0), p(50.0, 20.0)), 10);
        bites.calculate_affected_geometry(7, Range::new(p(52.0, 20.0), p(52.0, 0.0)), 10);
        bites
    }

    #[test]
    fn test_two_crossed_edges_are_valid() {
        let bites = crossed_gap(1.5);
        assert!(bites.is_valid());
        assert!(bites.is_affected(3));
        assert!(bites.is_affected(7));
        assert!(!bites.is_affected(0));
        let pierce = bites.pierce(3).unwrap();
        assert_eq!(pierce.start.x, Coord::from_f64(50.0));
        assert_relative_eq!(pierce.length(), 2.0 * 1.25f64.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_single_edge_is_invalid() {
        let mut bites = MouseBites::new(p(5.0, 0.0), Coord::from_f64(1.5), Default::default());
        bites.calculate_affected_geometry(0, Range::new(p(0.0, 0.0), p(10.0, 0.0)), 10);
        assert!(!bites.is_valid());
        assert!(bites.pierce(0).is_none());
        assert!(bites.build_holes().is_empty());
        assert!(bites.build_geometry().is_empty());
    }

    #[test]
    fn test_miss_and_tangent_record_nothing() {
        let mut bites = MouseBites::new(p(0.0, 0.0), Coord::from_f64(1.0), Default::default());
        bites.calculate_affected_geometry(0, Range::new(p(-5.0, 3.0), p(5.0, 3.0)), 10);
        bites.calculate_affected_geometry(1, Range::new(p(-5.0, 1.0), p(5.0, 1.0)), 10);
        bites.calculate_affected_geometry(2, Range::new(p(3.0, 0.0), p(9.0, 0.0)), 10);
        assert!(bites.intersections.is_empty());
    }

    #[test]
    fn test_edge_ending_inside_circle_is_incomplete() {
        let mut bites = MouseBites::new(p(0.0, 0.0), Coord::from_f64(2.0), Default::default());
        bites.calculate_affected_geometry(0, Range::new(p(-5.0, 0.0), p(0.0, 0.0)), 10);
        bites.calculate_affected_geometry(1, Range::new(p(-5.0, 1.0), p(5.0, 1.0)), 10);
        assert_eq!(bites.intersections.len(), 2);
        assert!(!bites.is_valid());
    }

    #[test]
    fn test_build_geometry_stitches_across_the_gap() {
        let geometry = crossed_gap(1.5).build_geometry();
        // Two bridges, each an arc and its chord.
        assert_eq!(geometry.len(), 4);
        for pair in geometry.chunks(2) {
            let (Geometry::Arc(arc), Geometry::Line(line)) = (&pair[0], &pair[1]) else {
                panic!("expected arc then line, got {pair:?}");
            };
            assert_eq!(arc.interpolation, Interpolation::CounterClockwise);
            assert_eq!(arc.quadrant, QuadrantMode::Multi);
            assert_eq!((arc.start, arc.end), (line.start, line.end));
            assert_ne!(arc.start.x, arc.end.x);
            assert_relative_eq!(arc.radius(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_hole_count_and_symmetry() {
        // Coincident edges: both boards share x=50, each edge crossed across the full
        // diameter.
        let mut bites = MouseBites::new(p(50.0, 10.0), Coord::from_f64(4.0), Default::default());
        bites.calculate_affected_geometry(0, Range::new(p(50.0, 0.0), p(50.0, 20.0)), 10);
        bites.calculate_affected_geometry(1, Range::new(p(50.0, 20.0), p(50.0, 0.0)), 10);
        assert!(bites.is_valid());

        let holes = bites.build_holes();
        // Half chord 4, step 1.5: 1 + 2 * floor((4 - 1.5) / 1.5) = 3 per edge.
        assert_eq!(holes.len(), 6);
        assert!(holes.iter().all(|h| h.diameter() == Coord::from_f64(0.6)));
        let mut ys: Vec<f64> = holes[..3].iter().map(|h| h.position().y.to_f64()).collect();
        ys.sort_by(f64::total_cmp);
        assert_relative_eq!(ys[0], 8.5, epsilon = 1e-6);
        assert_relative_eq!(ys[1], 10.0, epsilon = 1e-6);
        assert_relative_eq!(ys[2], 11.5, epsilon = 1e-6);
    }

    #[test]
    fn test_small_bridge_drills_one_hole_per_edge() {
        let mut bites = MouseBites::new(p(50.0, 10.0), Coord::from_f64(1.5), Default::default());
        bites.calculate_affected_geometry(0, Range::new(p(50.0, 0.0), p(50.0, 20.0)), 10);
        bites.calculate_affected_geometry(1, Range::new(p(50.0, 20.0), p(50.0, 0.0)), 10);
        let holes = bites.build_holes();
        assert_eq!(holes.len(), 2);
        assert_eq!(holes[0].position(), p(50.0, 10.0));
    }

    #[test]
    fn test_move_offset_clears_intersections() {
        let mut bites = crossed_gap(1.5);
        bites.move_offset(Coord::from_f64(1.0), Coord::ZERO);
        assert_eq!(bites.center(), p(52.0, 10.0));
        assert!(!bites.is_valid());
        assert!(bites.pierce(3).is_none());
    }

    #[test]
    fn test_settings_defaults_from_partial_json() {
        let s: MouseBitesSettings = serde_json::from_str(r#"{"drill_distance": 2.0}"#).unwrap();
        assert_eq!(s.drill_distance, 2.0);
        assert_eq!(s.drill_diameter, 0.6);
    }
}
