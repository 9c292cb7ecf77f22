use super::point::Point;
use super::range::Range;

/// A straight draw with an aperture, optionally interrupted by pierces.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub start: Point,
    pub end: Point,
    pub aperture: u32,
    pierces: Vec<Range>,
}

impl Line {
    pub fn new(start: Point, end: Point, aperture: u32) -> Self {
        Self {
            start,
            end,
            aperture,
            pierces: Vec::new(),
        }
    }

    pub fn range(&self) -> Range {
        Range::new(self.start, self.end)
    }

    pub fn pierces(&self) -> &[Range] {
        &self.pierces
    }

    pub fn clean_pierces(&mut self) {
        self.pierces.clear();
    }

    /// Add interruptions, keeping them ordered by how close they come to `start`.
    pub fn add_pierces(&mut self, pierces: &[Range]) {
        self.pierces.extend_from_slice(pierces);
        let start = self.start;
        let key = |r: &Range| start.distance_to(&start.closest_of(r.start, r.end));
        self.pierces.sort_by(|a, b| key(a).total_cmp(&key(b)));
    }

    /// The segments left once every pierce is cut out of the line.
    pub fn sub_lines(&self) -> Vec<Line> {
        let mut lines = Vec::with_capacity(self.pierces.len() + 1);
        let mut from = self.start;
        for pierce in &self.pierces {
            let to = from.closest_of(pierce.start, pierce.end);
            lines.push(Line::new(from, to, self.aperture));
            from = if to == pierce.start {
                pierce.end
            } else {
                pierce.start
            };
        }
        lines.push(Line::new(from, self.end, self.aperture));
        lines
    }
}
