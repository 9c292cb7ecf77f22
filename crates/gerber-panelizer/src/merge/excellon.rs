use log::{info, warn};

use crate::geometry::Coord;
use crate::layer::{ExcellonLayer, LayerFunction};

/// Accumulates drill files of one function into a single hole list.
#[derive(Debug, Clone)]
pub struct ExcellonMerger {
    function: LayerFunction,
    layer: ExcellonLayer,
}

impl ExcellonMerger {
    pub fn new(panel_name: &str, function: LayerFunction) -> Self {
        Self {
            function,
            layer: ExcellonLayer::new(panel_name, function),
        }
    }

    pub fn function(&self) -> LayerFunction {
        self.function
    }

    pub fn layer(&self) -> &ExcellonLayer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut ExcellonLayer {
        &mut self.layer
    }

    pub fn clean(&mut self) {
        self.layer.clean();
    }

    /// Copy every hole of `source` translated by (dx, dy). Diameters are kept.
    pub fn add(&mut self, source: &ExcellonLayer, dx: Coord, dy: Coord) {
        if source.function() != self.function {
            warn!(
                "Not merging {} ({}) into {}",
                source.name(),
                source.function(),
                self.function
            );
            return;
        }
        for hole in source.holes() {
            self.layer.add_hole(hole.offset(dx, dy));
        }
        info!(
            "Merged {} into {} at ({dx}, {dy}): {} holes",
            source.name(),
            self.function,
            source.holes().len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Hole, Point};

    fn mm(v: f64) -> Coord {
        Coord::from_f64(v)
    }

    #[test]
    fn test_holes_translated_with_diameter_kept() {
        let mut source = ExcellonLayer::new("a.drl", LayerFunction::TopDrill);
        source.add_hole(Hole::round(Point::from_f64(1.0, 2.0), mm(0.8)));
        source.add_hole(Hole::Routed {
            start: Point::from_f64(0.0, 0.0),
            diameter: mm(1.0),
            path: vec![Point::from_f64(3.0, 0.0)],
        });

        let mut merger = ExcellonMerger::new("panel", LayerFunction::TopDrill);
        merger.add(&source, mm(10.0), mm(5.0));
        merger.add(&source, mm(20.0), mm(5.0));

        let holes = merger.layer().holes();
        assert_eq!(holes.len(), 4);
        assert_eq!(holes[0], Hole::round(Point::from_f64(11.0, 7.0), mm(0.8)));
        assert_eq!(
            holes[3].points(),
            vec![Point::from_f64(20.0, 5.0), Point::from_f64(23.0, 5.0)]
        );
        assert_eq!(merger.layer().bbox().maxx, mm(23.0));
    }

    #[test]
    fn test_other_function_skipped_and_clean() {
        let mut source = ExcellonLayer::new("npth.drl", LayerFunction::BottomDrill);
        source.add_hole(Hole::round(Point::from_f64(1.0, 1.0), mm(3.0)));
        let mut merger = ExcellonMerger::new("panel", LayerFunction::TopDrill);
        merger.add(&source, mm(0.0), mm(0.0));
        assert!(merger.layer().holes().is_empty());

        let mut plated = ExcellonLayer::new("pth.drl", LayerFunction::TopDrill);
        plated.add_hole(Hole::round(Point::from_f64(1.0, 1.0), mm(0.3)));
        merger.add(&plated, mm(0.0), mm(0.0));
        assert_eq!(merger.layer().holes().len(), 1);
        merger.clean();
        assert!(merger.layer().holes().is_empty());
        assert_eq!(merger.layer().function(), LayerFunction::TopDrill);
    }
}
