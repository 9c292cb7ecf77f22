use std::io::Write;

use log::debug;

use crate::error::PanelError;
use crate::geometry::Point;
use crate::layer::GerberLayer;

use super::commands::{GerberCommand, Operation, Polarity};
use super::coord::{Axis, CoordinateFormat};

/// Serialize a drawing layer to a byte stream.
pub fn write<W: Write>(layer: &GerberLayer, mut writer: W) -> Result<(), PanelError> {
    writer.write_all(to_string(layer)?.as_bytes())?;
    Ok(())
}

/// Serialize a drawing layer: header, macros, apertures, then the drawing body.
///
/// Coordinates are written with the layer's own format spec, so reading the output
/// back yields the same decimal values.
pub fn to_string(layer: &GerberLayer) -> Result<String, PanelError> {
    let format = *layer.format().ok_or_else(|| {
        PanelError::Format(format!("{}: missing format specification", layer.name()))
    })?;

    let mut encoder = Encoder {
        format,
        current: Point::default(),
        out: String::new(),
    };
    for cmd in layer.header() {
        encoder.emit(cmd);
    }
    for m in layer.macros() {
        encoder.line(&m.to_string());
    }
    for a in layer.apertures() {
        encoder.line(&a.to_string());
    }
    for cmd in layer.contents() {
        encoder.emit(cmd);
    }
    encoder.line("M02*");

    debug!("Wrote drawing {}: {} bytes", layer.name(), encoder.out.len());
    Ok(encoder.out)
}

struct Encoder {
    format: CoordinateFormat,
    current: Point,
    out: String,
}

impl Encoder {
    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn emit(&mut self, cmd: &GerberCommand) {
        let text = match cmd {
            GerberCommand::FormatSpec(f) => format!("%{f}*%"),
            GerberCommand::Units(u) => format!("%{u}*%"),
            GerberCommand::ApertureDefine(a) => a.to_string(),
            GerberCommand::MacroDefine(m) => m.to_string(),
            GerberCommand::Attribute(a) => a.to_string(),
            GerberCommand::Polarity(Polarity::Dark) => "%LPD*%".to_string(),
            GerberCommand::Polarity(Polarity::Clear) => "%LPC*%".to_string(),
            GerberCommand::Mirroring(m) => format!("%LM{m}*%"),
            GerberCommand::Rotation(r) => format!("%LR{r}*%"),
            GerberCommand::Scale(s) => format!("%LS{s}*%"),
            GerberCommand::Interpolation(i) => format!("G{:02}*", i.g_code()),
            GerberCommand::QuadrantMode(q) => format!("G{:02}*", q.g_code()),
            GerberCommand::RegionBegin => "G36*".to_string(),
            GerberCommand::RegionEnd => "G37*".to_string(),
            GerberCommand::Comment(c) => format!("G04 {c}*"),
            GerberCommand::SelectAperture(code) => format!("D{code}*"),
            GerberCommand::Operation(op) => self.operation(op),
            GerberCommand::EndOfFile => "M02*".to_string(),
        };
        self.line(&text);
    }

    fn operation(&mut self, op: &Operation) -> String {
        let (x, y) = if self.format.incremental {
            (op.point.x - self.current.x, op.point.y - self.current.y)
        } else {
            (op.point.x, op.point.y)
        };
        self.current = op.point;

        let mut text = format!(
            "X{}Y{}",
            self.format.encode(x, Axis::X),
            self.format.encode(y, Axis::Y)
        );
        if let Some((i, j)) = op.offset {
            text.push_str(&format!(
                "I{}J{}",
                self.format.encode(i, Axis::X),
                self.format.encode(j, Axis::Y)
            ));
        }
        text.push_str(&format!("D{:02}*", op.code.code()));
        text
    }
}
