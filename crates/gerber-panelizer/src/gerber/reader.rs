use std::io::Read;

use log::{debug, info};

use crate::error::PanelError;
use crate::geometry::{Coord, Point};
use crate::layer::GerberLayer;

use super::commands::{
    parse_coordinate_fields, parse_extended, parse_g_code, parse_m_code, GerberCommand, Operation,
    OperationCode,
};
use super::coord::{Axis, CoordinateFormat};
use super::lexer::{tokenize, GerberToken};

/// Read a drawing file from a byte stream.
pub fn read<R: Read>(name: &str, mut reader: R) -> Result<GerberLayer, PanelError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    parse(name, &content)
}

/// Parse drawing file text into a layer.
pub fn parse(name: &str, content: &str) -> Result<GerberLayer, PanelError> {
    let tokens = tokenize(content)?;
    let mut layer = GerberLayer::new(name);
    let mut state = ReaderState::default();

    for token in tokens {
        match token {
            GerberToken::Extended(blocks) => {
                for cmd in parse_extended(&blocks)? {
                    if let GerberCommand::FormatSpec(format) = &cmd {
                        state.format = Some(*format);
                    }
                    layer.add(cmd)?;
                }
            }
            GerberToken::GCode(word) => {
                if let Some(cmd) = parse_g_code(&word)? {
                    layer.add(cmd)?;
                }
            }
            GerberToken::MCode(word) => {
                if let Some(cmd) = parse_m_code(&word)? {
                    layer.add(cmd)?;
                }
            }
            GerberToken::DCode { coords, code } if coords.is_empty() => match code {
                10.. => layer.add(GerberCommand::SelectAperture(code))?,
                // A bare D01-D03 operates at the current point.
                _ => {
                    let op = state.operation("", OperationCode::from_code(code)?, true)?;
                    layer.add(GerberCommand::Operation(op))?;
                }
            },
            GerberToken::DCode { coords, code } => {
                let op = state.operation(&coords, OperationCode::from_code(code)?, false)?;
                layer.add(GerberCommand::Operation(op))?;
            }
            GerberToken::Coordinates(coords) => {
                let code = state.last_code.unwrap_or(OperationCode::Draw);
                debug!("{name}: coordinates without D-code, repeating D{:02}", code.code());
                let op = state.operation(&coords, code, false)?;
                layer.add(GerberCommand::Operation(op))?;
            }
        }
    }

    info!(
        "Read drawing {name}: {} commands, {} apertures",
        layer.commands().len(),
        layer.apertures().count()
    );
    Ok(layer)
}

#[derive(Debug, Default)]
struct ReaderState {
    format: Option<CoordinateFormat>,
    current: Point,
    last_code: Option<OperationCode>,
}

impl ReaderState {
    /// Resolve an operation to absolute coordinates. A missing axis keeps its current
    /// value; at least one of X and Y is required unless `bare` is set.
    fn operation(
        &mut self,
        coords: &str,
        code: OperationCode,
        bare: bool,
    ) -> Result<Operation, PanelError> {
        let format = self.format.ok_or_else(|| {
            PanelError::Format("coordinates before format specification".into())
        })?;
        let fields = parse_coordinate_fields(coords)?;
        if fields.x.is_none() && fields.y.is_none() && !bare {
            return Err(PanelError::Format(format!(
                "operation D{:02} without X or Y: {coords}",
                code.code()
            )));
        }

        let x = resolve(&format, fields.x.as_deref(), Axis::X, self.current.x)?;
        let y = resolve(&format, fields.y.as_deref(), Axis::Y, self.current.y)?;

        let offset = if fields.i.is_some() || fields.j.is_some() {
            let i = match fields.i.as_deref() {
                Some(f) => format.decode(f, Axis::X)?,
                None => Coord::ZERO,
            };
            let j = match fields.j.as_deref() {
                Some(f) => format.decode(f, Axis::Y)?,
                None => Coord::ZERO,
            };
            Some((i, j))
        } else {
            None
        };

        let point = Point::new(x, y);
        self.current = point;
        self.last_code = Some(code);
        Ok(Operation {
            code,
            point,
            offset,
        })
    }
}

fn resolve(
    format: &CoordinateFormat,
    field: Option<&str>,
    axis: Axis,
    current: Coord,
) -> Result<Coord, PanelError> {
    match field {
        None => Ok(current),
        Some(f) if format.incremental => Ok(current + format.decode(f, axis)?),
        Some(f) => format.decode(f, axis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Interpolation;
    use crate::gerber::commands::Aperture;
    use crate::layer::LayerFunction;

    fn operations(layer: &GerberLayer) -> Vec<Operation> {
        layer
            .commands()
            .iter()
            .filter_map(|c| match c {
                GerberCommand::Operation(op) => Some(*op),
                _ => None,
            })
            .collect()
    }

    fn dec(s: &str) -> Coord {
        Coord::parse_decimal(s).unwrap()
    }

    #[test]
    fn test_format_spec_fidelity() {
        let layer = parse("t.gbr", "%FSLAX34Y34*%\n%MOMM*%\nX0012340Y0056780D02*\nM02*\n").unwrap();
        let ops = operations(&layer);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].point, Point::new(dec("1.2340"), dec("5.6780")));
        assert_eq!(ops[0].code, OperationCode::Move);
    }

    #[test]
    fn test_full_file() {
        let input = "\
%TF.FileFunction,Copper,L1,Top*%
%FSLAX26Y26*%
%MOMM*%
%ADD10C,0.200000*%
G04 outline*
G01*
D10*
X0Y0D02*
X10000000D01*
Y5000000D01*
G03*
X0Y5000000I-5000000J0D01*
M02*
";
        let layer = parse("top.gbr", input).unwrap();
        assert_eq!(layer.function(), Some(LayerFunction::FrontCopper));
        assert_eq!(
            layer.apertures().collect::<Vec<_>>(),
            vec![&Aperture {
                code: 10,
                template: "C".into(),
                value: "0.200000".into(),
            }]
        );
        let ops = operations(&layer);
        assert_eq!(ops.len(), 4);
        // Y-only inherits X from the previous point.
        assert_eq!(ops[2].point, Point::new(dec("10"), dec("5")));
        assert_eq!(ops[3].offset, Some((dec("-5"), Coord::ZERO)));
        assert!(layer
            .commands()
            .contains(&GerberCommand::Interpolation(Interpolation::CounterClockwise)));
        assert_eq!(layer.bbox().maxx, dec("10"));
        assert_eq!(layer.bbox().maxy, dec("5"));
    }

    #[test]
    fn test_incremental_coordinates() {
        let layer = parse("t.gbr", "%FSLIX24Y24*%X10000Y10000D02*X5000D01*").unwrap();
        let ops = operations(&layer);
        assert_eq!(ops[1].point, Point::new(dec("1.5"), dec("1")));
    }

    #[test]
    fn test_coordinates_before_format_fail() {
        assert!(parse("t.gbr", "X100Y100D02*").is_err());
    }

    #[test]
    fn test_operation_without_x_or_y_fails() {
        assert!(parse("t.gbr", "%FSLAX24Y24*%I100J100D01*").is_err());
    }

    #[test]
    fn test_operation_code_out_of_range_fails() {
        assert!(parse("t.gbr", "%FSLAX24Y24*%X100Y100D04*").is_err());
    }

    #[test]
    fn test_duplicate_units_fail() {
        assert!(parse("t.gbr", "%MOMM*%%MOIN*%").is_err());
    }

    #[test]
    fn test_modal_coordinates_repeat_last_code() {
        let layer = parse("t.gbr", "%FSLAX24Y24*%X0Y0D02*X10000D01*Y10000*").unwrap();
        let ops = operations(&layer);
        assert_eq!(ops[2].code, OperationCode::Draw);
        assert_eq!(ops[2].point, Point::new(dec("1"), dec("1")));
    }

    #[test]
    fn test_read_from_stream() {
        let data: &[u8] = b"%FSLAX24Y24*%%MOMM*%D10*M02*";
        let layer = read("s.gbr", data).unwrap();
        assert!(layer
            .commands()
            .contains(&GerberCommand::SelectAperture(10)));
        assert!(layer.commands().contains(&GerberCommand::EndOfFile));
    }
}
