use std::collections::HashMap;

use chrono::Local;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::PanelError;
use crate::geometry::{Coord, Interpolation, QuadrantMode};
use crate::gerber::commands::{Aperture, Attribute, GerberCommand, FILE_FUNCTION};
use crate::gerber::coord::{CoordinateFormat, Units};
use crate::layer::{GerberLayer, LayerFunction};

pub const GENERATION_SOFTWARE: &str = "gerber-panelizer";

const INCH: f64 = 25.4;

/// Accumulates drawings of one function into a single layer.
///
/// Aperture and macro tables are owned here; sources are mapped into them as they
/// are added.
#[derive(Debug, Clone)]
pub struct GerberMerger {
    function: LayerFunction,
    header: Vec<GerberCommand>,
    layer: GerberLayer,
}

impl GerberMerger {
    /// The header is built once so that every merge pass writes the same bytes.
    pub fn new(panel_name: &str, function: LayerFunction) -> Self {
        let created = Local::now().format("%Y-%m-%dT%H:%M:%S%z").to_string();
        let project_id = Uuid::new_v4().to_string();
        let header = vec![
            GerberCommand::Attribute(Attribute::file(
                ".GenerationSoftware",
                &[GENERATION_SOFTWARE, env!("CARGO_PKG_VERSION")],
            )),
            GerberCommand::Attribute(Attribute::file(".CreationDate", &[created.as_str()])),
            GerberCommand::Attribute(Attribute::file(
                ".ProjectId",
                &[panel_name, project_id.as_str(), "1"],
            )),
            GerberCommand::Attribute(Attribute::file(".SameCoordinates", &["Original"])),
            GerberCommand::Attribute(Attribute::file(
                FILE_FUNCTION,
                &function.file_function().split(',').collect::<Vec<_>>(),
            )),
            GerberCommand::Attribute(Attribute::file(".FilePolarity", &["Positive"])),
            GerberCommand::FormatSpec(CoordinateFormat::MERGED),
            GerberCommand::Units(Units::Millimeters),
        ];

        let mut merger = Self {
            function,
            header,
            layer: GerberLayer::new(panel_name),
        };
        merger.reset_layer();
        merger
    }

    pub fn function(&self) -> LayerFunction {
        self.function
    }

    pub fn layer(&self) -> &GerberLayer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut GerberLayer {
        &mut self.layer
    }

    /// Drop everything merged so far, keeping the header.
    pub fn clean(&mut self) {
        self.reset_layer();
    }

    fn reset_layer(&mut self) {
        self.layer.clean();
        for cmd in &self.header {
            // The header holds one format spec and one unit mode, so this cannot fail.
            if let Err(e) = self.layer.add(cmd.clone()) {
                warn!("{}: {e}", self.layer.name());
            }
        }
    }

    /// Merge `source` translated by (dx, dy).
    ///
    /// A source of another function is skipped with a warning. Sources in inches are
    /// converted to millimetres. A source selecting an undefined aperture, or an inch
    /// source using macro apertures, is rejected before anything is merged.
    pub fn add(&mut self, source: &GerberLayer, dx: Coord, dy: Coord) -> Result<(), PanelError> {
        match source.function() {
            Some(f) if f == self.function => {}
            other => {
                warn!(
                    "Not merging {} ({}) into {}",
                    source.name(),
                    other.map_or("unknown", LayerFunction::display_name),
                    self.function
                );
                return Ok(());
            }
        }
        let factor = match source.units() {
            Some(Units::Inches) => {
                info!("{}: converting from inches", source.name());
                Some(INCH)
            }
            _ => None,
        };

        for cmd in source.contents() {
            if let GerberCommand::SelectAperture(code) = cmd {
                if source.aperture(*code).is_none() {
                    return Err(PanelError::Format(format!(
                        "{}: D{code} selected but never defined",
                        source.name()
                    )));
                }
            }
        }

        // Resolve every aperture first so a failed conversion leaves the layer as it was.
        let apertures = source
            .apertures()
            .map(|a| match factor {
                Some(f) => a.scaled(f),
                None => Ok(a.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        for m in source.macros() {
            if self.layer.has_macro(&m.name) {
                debug!("Macro {} already defined, keeping the first", m.name);
            } else {
                self.layer.add(GerberCommand::MacroDefine(m.clone()))?;
            }
        }

        let mut mapping: HashMap<u32, u32> = HashMap::new();
        for aperture in &apertures {
            let existing = self
                .layer
                .apertures()
                .find(|a| a.is_equivalent(aperture))
                .map(|a| a.code);
            let code = match existing {
                Some(code) => code,
                None => {
                    let code = self.layer.next_aperture_code();
                    self.layer.add(GerberCommand::ApertureDefine(Aperture {
                        code,
                        ..aperture.clone()
                    }))?;
                    code
                }
            };
            debug!("{}: D{} -> D{code}", source.name(), aperture.code);
            mapping.insert(aperture.code, code);
        }

        // Each source starts from the default drawing and arc modes.
        self.layer
            .add(GerberCommand::Interpolation(Interpolation::Linear))?;
        self.layer
            .add(GerberCommand::QuadrantMode(QuadrantMode::Single))?;
        let mut copied = 0;
        for cmd in source.contents() {
            let cmd = match cmd {
                GerberCommand::SelectAperture(code) => {
                    GerberCommand::SelectAperture(mapping.get(code).copied().unwrap_or(*code))
                }
                GerberCommand::Operation(op) => {
                    let op = match factor {
                        Some(f) => op.scaled(f),
                        None => *op,
                    };
                    GerberCommand::Operation(op.translated(dx, dy))
                }
                other => other.clone(),
            };
            self.layer.add(cmd)?;
            copied += 1;
        }
        info!(
            "Merged {} into {} at ({dx}, {dy}): {copied} commands",
            source.name(),
            self.function
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gerber::{self, OperationCode};
    use crate::geometry::Point;

    const FRONT_A: &str = "\
%TF.FileFunction,Copper,L1,Top*%
%FSLAX46Y46*%
%MOMM*%
%AMPAD*
21,1,$1,$2,0,0,0*%
%ADD10C,0.200000*%
%ADD11PAD,1.5X0.5*%
D10*
X0Y0D02*
X1000000Y0D01*
D11*
X500000Y500000D03*
M02*
";

    const FRONT_B: &str = "\
%TF.FileFunction,Copper,L1,Top*%
%FSLAX46Y46*%
%MOMM*%
%AMPAD*
1,1,$1,0,0*%
%ADD10C,0.300000*%
%ADD12C,0.200000*%
D12*
X0Y0D02*
X0Y1000000D01*
D10*
X200000Y200000D03*
M02*
";

    fn mm(v: f64) -> Coord {
        Coord::from_f64(v)
    }

    fn ops(layer: &GerberLayer) -> Vec<(OperationCode, Point)> {
        layer
            .commands()
            .iter()
            .filter_map(|c| match c {
                GerberCommand::Operation(op) => Some((op.code, op.point)),
                _ => None,
            })
            .collect()
    }

    fn selects(layer: &GerberLayer) -> Vec<u32> {
        layer
            .commands()
            .iter()
            .filter_map(|c| match c {
                GerberCommand::SelectAperture(code) => Some(*code),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_merger_has_header() {
        let merger = GerberMerger::new("panel", LayerFunction::FrontCopper);
        let layer = merger.layer();
        assert_eq!(layer.function(), Some(LayerFunction::FrontCopper));
        assert_eq!(layer.format(), Some(&CoordinateFormat::MERGED));
        assert_eq!(layer.units(), Some(Units::Millimeters));
        assert!(layer.file_attribute(".ProjectId").unwrap().starts_with("panel,"));
        assert_eq!(layer.apertures().count(), 0);
    }

    #[test]
    fn test_apertures_deduplicated_and_remapped() {
        let a = gerber::parse("a.gbr", FRONT_A).unwrap();
        let b = gerber::parse("b.gbr", FRONT_B).unwrap();
        let mut merger = GerberMerger::new("panel", LayerFunction::FrontCopper);
        merger.add(&a, mm(0.0), mm(0.0)).unwrap();
        merger.add(&b, mm(10.0), mm(0.0)).unwrap();

        let layer = merger.layer();
        let apertures: Vec<(u32, &str, &str)> = layer
            .apertures()
            .map(|a| (a.code, a.template.as_str(), a.value.as_str()))
            .collect();
        // B's D12 is the same circle as A's D10; B's D10 is new.
        assert_eq!(
            apertures,
            vec![
                (10, "C", "0.200000"),
                (11, "PAD", "1.5X0.5"),
                (12, "C", "0.300000"),
            ]
        );
        assert_eq!(selects(layer), vec![10, 11, 10, 12]);

        // First macro definition wins.
        assert_eq!(layer.macros().count(), 1);
        assert_eq!(layer.macros().next().unwrap().blocks[0], "21,1,$1,$2,0,0,0");
    }

    #[test]
    fn test_operations_translated() {
        let b = gerber::parse("b.gbr", FRONT_B).unwrap();
        let mut merger = GerberMerger::new("panel", LayerFunction::FrontCopper);
        merger.add(&b, mm(10.0), mm(-2.5)).unwrap();
        assert_eq!(
            ops(merger.layer()),
            vec![
                (OperationCode::Move, Point::from_f64(10.0, -2.5)),
                (OperationCode::Draw, Point::from_f64(10.0, -1.5)),
                (OperationCode::Flash, Point::from_f64(10.2, -2.3)),
            ]
        );
        assert_eq!(merger.layer().bbox().maxx, mm(10.2));
    }

    #[test]
    fn test_function_mismatch_is_skipped() {
        let a = gerber::parse("a.gbr", FRONT_A).unwrap();
        let mut merger = GerberMerger::new("panel", LayerFunction::BackCopper);
        let before = merger.layer().commands().to_vec();
        merger.add(&a, mm(0.0), mm(0.0)).unwrap();
        assert_eq!(merger.layer().commands(), &before[..]);
    }

    #[test]
    fn test_clean_keeps_header_and_output_is_stable() {
        let a = gerber::parse("a.gbr", FRONT_A).unwrap();
        let mut merger = GerberMerger::new("panel", LayerFunction::FrontCopper);
        merger.add(&a, mm(1.0), mm(1.0)).unwrap();
        let first = gerber::to_string(merger.layer()).unwrap();

        merger.clean();
        assert_eq!(merger.layer().apertures().count(), 0);
        assert!(merger.layer().format().is_some());
        merger.add(&a, mm(1.0), mm(1.0)).unwrap();
        assert_eq!(gerber::to_string(merger.layer()).unwrap(), first);
    }

    #[test]
    fn test_undefined_aperture_select_fails() {
        let text = "%TF.FileFunction,Copper,L1,Top*%%FSLAX46Y46*%%MOMM*%D15*X0Y0D03*M02*";
        let layer = gerber::parse("bad.gbr", text).unwrap();
        let mut merger = GerberMerger::new("panel", LayerFunction::FrontCopper);
        assert!(matches!(
            merger.add(&layer, mm(0.0), mm(0.0)),
            Err(PanelError::Format(_))
        ));
    }

    #[test]
    fn test_each_source_starts_in_default_modes() {
        let arcs = "%TF.FileFunction,Copper,L1,Top*%%FSLAX46Y46*%%MOMM*%%ADD10C,0.1*%D10*G75*G03*X0Y0D02*X2000000Y0I1000000J0D01*M02*";
        let a = gerber::parse("arcs.gbr", arcs).unwrap();
        let b = gerber::parse("b.gbr", FRONT_B).unwrap();
        let mut merger = GerberMerger::new("panel", LayerFunction::FrontCopper);
        merger.add(&a, mm(0.0), mm(0.0)).unwrap();
        merger.add(&b, mm(10.0), mm(0.0)).unwrap();

        // Both sources are preceded by G01 and G74, so B does not inherit A's G75.
        let commands = merger.layer().commands();
        let resets: Vec<usize> = commands
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == GerberCommand::QuadrantMode(QuadrantMode::Single))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(resets.len(), 2);
        let i = resets[1];
        assert_eq!(
            commands[i - 1..i + 2],
            [
                GerberCommand::Interpolation(Interpolation::Linear),
                GerberCommand::QuadrantMode(QuadrantMode::Single),
                GerberCommand::SelectAperture(12),
            ]
        );
    }

    #[test]
    fn test_inch_source_converted_to_millimetres() {
        let text = "%TF.FileFunction,Copper,L1,Top*%%FSLAX25Y25*%%MOIN*%%ADD10C,0.01*%D10*X100000Y50000D02*X200000Y50000D01*M02*";
        let layer = gerber::parse("inch.gbr", text).unwrap();
        let mut merger = GerberMerger::new("panel", LayerFunction::FrontCopper);
        merger.add(&layer, mm(1.0), mm(0.0)).unwrap();

        let merged = merger.layer();
        assert_eq!(merged.units(), Some(Units::Millimeters));
        assert_eq!(merged.aperture(10).unwrap().value, "0.254000");
        assert_eq!(
            ops(merged),
            vec![
                (OperationCode::Move, Point::from_f64(26.4, 12.7)),
                (OperationCode::Draw, Point::from_f64(51.8, 12.7)),
            ]
        );
    }

    #[test]
    fn test_inch_source_with_macro_aperture_rejected() {
        let text = "%TF.FileFunction,Copper,L1,Top*%%FSLAX25Y25*%%MOIN*%%AMPAD*1,1,$1,0,0*%%ADD10PAD,0.02*%D10*X0Y0D03*M02*";
        let layer = gerber::parse("inch.gbr", text).unwrap();
        let mut merger = GerberMerger::new("panel", LayerFunction::FrontCopper);
        let before = merger.layer().commands().to_vec();
        assert!(matches!(
            merger.add(&layer, mm(0.0), mm(0.0)),
            Err(PanelError::Format(_))
        ));
        assert_eq!(merger.layer().commands(), &before[..]);
    }
}
