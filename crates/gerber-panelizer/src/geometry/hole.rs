use serde::Serialize;

use super::point::{Coord, Point};

/// A drilled feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Hole {
    Round {
        center: Point,
        diameter: Coord,
    },
    /// A slot: the tool plunges at `start` and mills through every point of `path`.
    Routed {
        start: Point,
        diameter: Coord,
        path: Vec<Point>,
    },
}

impl Hole {
    pub fn round(center: Point, diameter: Coord) -> Self {
        Hole::Round { center, diameter }
    }

    pub fn diameter(&self) -> Coord {
        match self {
            Hole::Round { diameter, .. } | Hole::Routed { diameter, .. } => *diameter,
        }
    }

    /// Centre of a round hole, plunge point of a routed one.
    pub fn position(&self) -> Point {
        match self {
            Hole::Round { center, .. } => *center,
            Hole::Routed { start, .. } => *start,
        }
    }

    pub fn offset(&self, dx: Coord, dy: Coord) -> Hole {
        match self {
            Hole::Round { center, diameter } => Hole::Round {
                center: center.offset(dx, dy),
                diameter: *diameter,
            },
            Hole::Routed {
                start,
                diameter,
                path,
            } => Hole::Routed {
                start: start.offset(dx, dy),
                diameter: *diameter,
                path: path.iter().map(|p| p.offset(dx, dy)).collect(),
            },
        }
    }

    /// Every point the tool visits.
    pub fn points(&self) -> Vec<Point> {
        match self {
            Hole::Round { center, .. } => vec![*center],
            Hole::Routed { start, path, .. } => {
                std::iter::once(*start).chain(path.iter().copied()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_routed_moves_every_point() {
        let hole = Hole::Routed {
            start: Point::from_f64(0.0, 0.0),
            diameter: Coord::from_f64(1.0),
            path: vec![Point::from_f64(1.0, 0.0), Point::from_f64(1.0, 1.0)],
        };
        let moved = hole.offset(Coord::from_f64(10.0), Coord::from_f64(-1.0));
        assert_eq!(
            moved.points(),
            vec![
                Point::from_f64(10.0, -1.0),
                Point::from_f64(11.0, -1.0),
                Point::from_f64(11.0, 0.0),
            ]
        );
        assert_eq!(moved.diameter(), Coord::from_f64(1.0));
    }

    #[test]
    fn test_serialize_round() {
        let hole = Hole::round(Point::from_f64(1.5, 2.0), Coord::from_f64(0.6));
        let json = serde_json::to_string(&hole).unwrap();
        assert_eq!(json, r#"{"kind":"round","center":[1.5,2.0],"diameter":0.6}"#);
    }
}
