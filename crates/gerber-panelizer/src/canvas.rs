use log::{debug, info};

use crate::error::PanelError;
use crate::features::Feature;
use crate::geometry::{Arc, Coord, Geometry, Hole, Interpolation, Line, Point, QuadrantMode};
use crate::gerber::commands::{Aperture, GerberCommand, MacroDefinition, Operation, OperationCode};
use crate::layer::{ExcellonLayer, GerberLayer, Layer, LayerFunction};

/// A layer replayed into drawable primitives.
///
/// Primitives are identified by their index in replay order; features key their
/// intersections on that index, so it is only meaningful until the next `draw`.
#[derive(Debug, Default)]
pub struct Canvas {
    geometry: Vec<Geometry>,
    holes: Vec<Hole>,
    apertures: Vec<Aperture>,
    macros: Vec<MacroDefinition>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(&self) -> &[Geometry] {
        &self.geometry
    }

    pub fn holes(&self) -> &[Hole] {
        &self.holes
    }

    pub fn apertures(&self) -> &[Aperture] {
        &self.apertures
    }

    pub fn draw(&mut self, layer: &Layer) {
        match layer {
            Layer::Gerber(g) => self.draw_gerber(g),
            Layer::Excellon(e) => self.draw_excellon(e),
        }
    }

    /// Replay draws into lines and arcs. Moves only reposition; flashes and region
    /// contours produce no primitives.
    pub fn draw_gerber(&mut self, layer: &GerberLayer) {
        self.reset();
        self.apertures = layer.apertures().cloned().collect();
        self.macros = layer.macros().cloned().collect();

        let mut current = Point::default();
        let mut aperture = 0;
        let mut interpolation = Interpolation::Linear;
        let mut quadrant = QuadrantMode::Single;
        let mut in_region = false;

        for cmd in layer.commands() {
            match cmd {
                GerberCommand::SelectAperture(code) => aperture = *code,
                GerberCommand::Interpolation(i) => interpolation = *i,
                GerberCommand::QuadrantMode(q) => quadrant = *q,
                GerberCommand::RegionBegin => in_region = true,
                GerberCommand::RegionEnd => in_region = false,
                GerberCommand::Operation(op) => {
                    if op.code == OperationCode::Draw && !in_region {
                        self.geometry.push(match interpolation {
                            Interpolation::Linear => {
                                Geometry::Line(Line::new(current, op.point, aperture))
                            }
                            _ => {
                                let (i, j) = op.offset.unwrap_or_default();
                                Geometry::Arc(Arc {
                                    start: current,
                                    end: op.point,
                                    i,
                                    j,
                                    interpolation,
                                    quadrant,
                                    aperture,
                                })
                            }
                        });
                    }
                    current = op.point;
                }
                _ => {}
            }
        }
        debug!(
            "Replayed {}: {} primitives",
            layer.name(),
            self.geometry.len()
        );
    }

    pub fn draw_excellon(&mut self, layer: &ExcellonLayer) {
        self.reset();
        self.holes = layer.holes().to_vec();
    }

    fn reset(&mut self) {
        self.geometry.clear();
        self.holes.clear();
        self.apertures.clear();
        self.macros.clear();
    }

    /// Recompute every feature computed against `function` from the replayed primitives.
    pub fn recalculate(&self, function: LayerFunction, features: &mut [Feature]) {
        for feature in features
            .iter_mut()
            .filter(|f| f.source_function() == function)
        {
            feature.clear();
            for (index, geometry) in self.geometry.iter().enumerate() {
                feature.calculate_affected_geometry(index, geometry);
            }
        }
    }

    /// Rebuild `layer` from the replayed primitives with feature gaps cut out and
    /// feature geometry appended. The layer is left untouched on error.
    pub fn write_to_gerber(
        &self,
        layer: &mut GerberLayer,
        features: &[Feature],
    ) -> Result<(), PanelError> {
        let function = layer.function();
        let valid: Vec<&Feature> = features
            .iter()
            .filter(|f| f.is_valid() && function.is_some_and(|func| f.affects(func)))
            .collect();

        let mut out = GerberLayer::new(layer.name());
        for cmd in layer.header() {
            out.add(cmd.clone())?;
        }
        for m in &self.macros {
            out.add(GerberCommand::MacroDefine(m.clone()))?;
        }
        for a in &self.apertures {
            out.add(GerberCommand::ApertureDefine(a.clone()))?;
        }

        let mut emitter = Emitter::new(out);
        for (index, geometry) in self.geometry.iter().enumerate() {
            let affecting: Vec<&&Feature> =
                valid.iter().filter(|f| f.is_affected(index)).collect();
            if affecting.is_empty() {
                emitter.geometry(geometry)?;
                continue;
            }
            match geometry {
                Geometry::Line(line) => {
                    let mut line = line.clone();
                    line.clean_pierces();
                    for feature in affecting {
                        line.add_pierces(&feature.pierces(index));
                    }
                    for sub in line.sub_lines() {
                        emitter.line(&sub)?;
                    }
                }
                Geometry::Arc(arc) => {
                    return Err(PanelError::Merge(format!(
                        "{}: arc from {} to {} crosses a feature; arcs cannot be split",
                        layer.name(),
                        arc.start,
                        arc.end
                    )));
                }
            }
        }

        let mut added = 0;
        for feature in &valid {
            for geometry in feature.build_geometry() {
                emitter.geometry(&geometry)?;
                added += 1;
            }
        }

        info!(
            "Rewrote {} with {} features, {added} added primitives",
            layer.name(),
            valid.len()
        );
        *layer = emitter.finish();
        Ok(())
    }

    /// Append the holes of every valid feature that affects the layer.
    pub fn write_to_excellon(&self, layer: &mut ExcellonLayer, features: &[Feature]) {
        let function = layer.function();
        for feature in features
            .iter()
            .filter(|f| f.is_valid() && f.affects(function))
        {
            let holes = feature.build_holes();
            debug!("Adding {} feature holes to {}", holes.len(), layer.name());
            for hole in holes {
                layer.add_hole(hole);
            }
        }
    }
}

/// Writes primitives as commands, emitting mode changes only when they differ.
struct Emitter {
    layer: GerberLayer,
    aperture: Option<u32>,
    interpolation: Option<Interpolation>,
    quadrant: Option<QuadrantMode>,
    position: Option<Point>,
}

impl Emitter {
    fn new(layer: GerberLayer) -> Self {
        Self {
            layer,
            aperture: None,
            interpolation: None,
            quadrant: None,
            position: None,
        }
    }

    fn geometry(&mut self, geometry: &Geometry) -> Result<(), PanelError> {
        match geometry {
            Geometry::Line(line) => self.line(line),
            Geometry::Arc(arc) => self.arc(arc),
        }
    }

    fn line(&mut self, line: &Line) -> Result<(), PanelError> {
        self.prepare(line.aperture, Interpolation::Linear, line.start)?;
        self.draw(line.end, None)
    }

    fn arc(&mut self, arc: &Arc) -> Result<(), PanelError> {
        self.prepare(arc.aperture, arc.interpolation, arc.start)?;
        if self.quadrant != Some(arc.quadrant) {
            self.layer.add(GerberCommand::QuadrantMode(arc.quadrant))?;
            self.quadrant = Some(arc.quadrant);
        }
        self.draw(arc.end, Some((arc.i, arc.j)))
    }

    fn prepare(
        &mut self,
        aperture: u32,
        interpolation: Interpolation,
        start: Point,
    ) -> Result<(), PanelError> {
        if aperture >= 10 && self.aperture != Some(aperture) {
            self.layer.add(GerberCommand::SelectAperture(aperture))?;
            self.aperture = Some(aperture);
        }
        if self.interpolation != Some(interpolation) {
            self.layer.add(GerberCommand::Interpolation(interpolation))?;
            self.interpolation = Some(interpolation);
        }
        if self.position != Some(start) {
            self.layer.add(GerberCommand::Operation(Operation {
                code: OperationCode::Move,
                point: start,
                offset: None,
            }))?;
        }
        Ok(())
    }

    fn draw(&mut self, end: Point, offset: Option<(Coord, Coord)>) -> Result<(), PanelError> {
        self.layer.add(GerberCommand::Operation(Operation {
            code: OperationCode::Draw,
            point: end,
            offset,
        }))?;
        self.position = Some(end);
        Ok(())
    }

    fn finish(self) -> GerberLayer {
        self.layer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{MouseBites, MouseBitesSettings};
    use crate::geometry::Range;
    use crate::gerber;

    const OUTLINE: &str = "\
%TF.FileFunction,Profile,NP*%
%FSLAX46Y46*%
%MOMM*%
%ADD10C,0.100000*%
D10*
G01*
X0Y0D02*
X50000000Y0D01*
X50000000Y20000000D01*
X0Y20000000D01*
X0Y0D01*
X1000000Y1000000D03*
M02*
";

    fn outline() -> GerberLayer {
        gerber::parse("edge.gbr", OUTLINE).unwrap()
    }

    fn p(x: f64, y: f64) -> Point {
        Point::from_f64(x, y)
    }

    #[test]
    fn test_draw_replays_lines_and_skips_flashes() {
        let mut canvas = Canvas::new();
        canvas.draw_gerber(&outline());
        assert_eq!(canvas.geometry().len(), 4);
        assert_eq!(canvas.apertures().len(), 1);
        assert_eq!(
            canvas.geometry()[1],
            Geometry::Line(Line::new(p(50.0, 0.0), p(50.0, 20.0), 10))
        );
    }

    #[test]
    fn test_draw_replays_arcs() {
        let text = "%FSLAX46Y46*%%MOMM*%%ADD10C,0.1*%D10*G75*X1000000Y0D02*G03*X-1000000Y0I-1000000J0D01*M02*";
        let mut canvas = Canvas::new();
        canvas.draw_gerber(&gerber::parse("a.gbr", text).unwrap());
        let Geometry::Arc(arc) = &canvas.geometry()[0] else {
            panic!("expected an arc");
        };
        assert_eq!(arc.center(), p(0.0, 0.0));
        assert_eq!(arc.quadrant, QuadrantMode::Multi);
        assert_eq!(arc.interpolation, Interpolation::CounterClockwise);
    }

    #[test]
    fn test_write_without_features_keeps_geometry() {
        let mut layer = outline();
        let mut canvas = Canvas::new();
        canvas.draw_gerber(&layer);
        canvas.write_to_gerber(&mut layer, &[]).unwrap();

        let mut reread = Canvas::new();
        reread.draw_gerber(&layer);
        assert_eq!(reread.geometry(), canvas.geometry());
        assert_eq!(layer.function(), Some(LayerFunction::EdgeCuts));

        // A closed outline needs one move; modes are set once.
        let moves = layer
            .commands()
            .iter()
            .filter(|c| matches!(c, GerberCommand::Operation(op) if op.code == OperationCode::Move))
            .count();
        assert_eq!(moves, 1);
        let modes = layer
            .commands()
            .iter()
            .filter(|c| matches!(c, GerberCommand::Interpolation(_) | GerberCommand::SelectAperture(_)))
            .count();
        assert_eq!(modes, 2);
    }

    #[test]
    fn test_write_cuts_feature_gap() {
        let mut layer = outline();
        let mut canvas = Canvas::new();
        canvas.draw_gerber(&layer);

        let mut bites = MouseBites::new(p(51.0, 10.0), Coord::from_f64(1.5), MouseBitesSettings::default());
        bites.calculate_affected_geometry(9, Range::new(p(52.0, 0.0), p(52.0, 20.0)), 10);
        let mut features = vec![Feature::from(bites)];
        canvas.recalculate(LayerFunction::EdgeCuts, &mut features);
        // Recalculation starts from scratch; only one edge of this outline is crossed.
        assert!(!features[0].is_valid());

        // A mirrored copy with its left edge at x=52, leaving a 2 mm gap.
        for cmd in outline().contents() {
            if let GerberCommand::Operation(op) = cmd {
                let mut moved = *op;
                moved.point = Point::new(Coord::from_f64(102.0) - op.point.x, op.point.y);
                layer.add(GerberCommand::Operation(moved)).unwrap();
            }
        }
        canvas.draw_gerber(&layer);
        canvas.recalculate(LayerFunction::EdgeCuts, &mut features);
        assert!(features[0].is_valid());

        canvas.write_to_gerber(&mut layer, &features).unwrap();
        let mut reread = Canvas::new();
        reread.draw_gerber(&layer);
        let on_gap_edges = reread
            .geometry()
            .iter()
            .filter(|g| {
                matches!(g, Geometry::Line(l) if l.start.x == l.end.x
                    && (l.start.x == Coord::from_f64(50.0) || l.start.x == Coord::from_f64(52.0)))
            })
            .count();
        // Both edges facing the gap are split in two.
        assert_eq!(on_gap_edges, 4);
        let arcs = reread
            .geometry()
            .iter()
            .filter(|g| matches!(g, Geometry::Arc(_)))
            .count();
        assert_eq!(arcs, 2);
    }

    #[test]
    fn test_write_fails_on_pierced_arc() {
        let text = "%TF.FileFunction,Profile,NP*%%FSLAX46Y46*%%MOMM*%%ADD10C,0.1*%D10*G75*\
X0Y-5000000D02*G03*X0Y5000000I0J5000000D01*\
G01*X2000000Y-5000000D02*X2000000Y5000000D01*M02*";
        let mut layer = gerber::parse("a.gbr", text).unwrap();
        let mut canvas = Canvas::new();
        canvas.draw_gerber(&layer);
        let bites = MouseBites::new(p(1.0, 0.0), Coord::from_f64(1.5), MouseBitesSettings::default());
        let mut features = vec![Feature::from(bites)];
        canvas.recalculate(LayerFunction::EdgeCuts, &mut features);
        assert!(features[0].is_valid());

        let before = layer.commands().to_vec();
        assert!(matches!(
            canvas.write_to_gerber(&mut layer, &features),
            Err(PanelError::Merge(_))
        ));
        assert_eq!(layer.commands(), &before[..]);
    }

    #[test]
    fn test_write_to_excellon_appends_feature_holes() {
        let mut canvas = Canvas::new();
        let mut drill = ExcellonLayer::new("d.drl", LayerFunction::TopDrill);
        drill.add_hole(Hole::round(p(1.0, 1.0), Coord::from_f64(0.8)));
        canvas.draw_excellon(&drill);
        assert_eq!(canvas.holes().len(), 1);

        let mut bites = MouseBites::new(p(50.0, 10.0), Coord::from_f64(1.5), MouseBitesSettings::default());
        bites.calculate_affected_geometry(0, Range::new(p(50.0, 0.0), p(50.0, 20.0)), 10);
        bites.calculate_affected_geometry(1, Range::new(p(50.0, 20.0), p(50.0, 0.0)), 10);
        canvas.write_to_excellon(&mut drill, &[Feature::from(bites)]);
        assert_eq!(drill.holes().len(), 3);
    }
}
