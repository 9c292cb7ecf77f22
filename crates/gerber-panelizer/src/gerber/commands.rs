use std::fmt;

use log::debug;

use crate::error::PanelError;
use crate::geometry::{Coord, Interpolation, Point, QuadrantMode};

use super::coord::{CoordinateFormat, Units, ZeroOmission};

/// An %AD aperture definition. `template` is `C`, `R`, `O`, `P` or a macro name;
/// `value` is the raw parameter text after the comma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aperture {
    pub code: u32,
    pub template: String,
    pub value: String,
}

impl Aperture {
    /// Same shape regardless of code.
    pub fn is_equivalent(&self, other: &Aperture) -> bool {
        self.template == other.template && self.value == other.value
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.template.as_str(), "C" | "R" | "O" | "P")
    }

    /// The same aperture with its sizes multiplied by `factor`. Polygon vertex count
    /// and rotation are left alone. Macro apertures cannot be rescaled because their
    /// constants live in the macro body.
    pub fn scaled(&self, factor: f64) -> Result<Aperture, PanelError> {
        if !self.is_builtin() {
            return Err(PanelError::Format(format!(
                "D{}: macro aperture {} cannot be converted to millimetres",
                self.code, self.template
            )));
        }
        let value = self
            .params()?
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let unitless = self.template == "P" && (i == 1 || i == 2);
                if unitless {
                    format!("{v}")
                } else {
                    format!("{:.6}", v * factor)
                }
            })
            .collect::<Vec<_>>()
            .join("X");
        Ok(Aperture {
            value,
            ..self.clone()
        })
    }

    /// Numeric parameters, `X`-separated in the file.
    pub fn params(&self) -> Result<Vec<f64>, PanelError> {
        if self.value.is_empty() {
            return Ok(Vec::new());
        }
        self.value
            .split('X')
            .map(|p| {
                p.trim()
                    .parse::<f64>()
                    .map_err(|_| PanelError::Format(format!("AD: bad param: {p}")))
            })
            .collect()
    }
}

impl fmt::Display for Aperture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "%ADD{}{}*%", self.code, self.template)
        } else {
            write!(f, "%ADD{}{},{}*%", self.code, self.template, self.value)
        }
    }
}

/// An %AM aperture macro: a name and its primitive statements, unevaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    pub blocks: Vec<String>,
}

impl fmt::Display for MacroDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%AM{}*", self.name)?;
        for block in &self.blocks {
            write!(f, "\n{block}*")?;
        }
        write!(f, "%")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// `TF`
    File,
    /// `TA`
    Aperture,
    /// `TO`
    Object,
    /// `TD`
    Delete,
}

impl AttributeKind {
    fn prefix(self) -> &'static str {
        match self {
            AttributeKind::File => "TF",
            AttributeKind::Aperture => "TA",
            AttributeKind::Object => "TO",
            AttributeKind::Delete => "TD",
        }
    }
}

/// An X2 attribute such as `%TF.FileFunction,Copper,L1,Top*%`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub kind: AttributeKind,
    pub name: String,
    pub params: Vec<String>,
}

impl Attribute {
    pub fn file(name: &str, params: &[&str]) -> Self {
        Self {
            kind: AttributeKind::File,
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}{}", self.kind.prefix(), self.name)?;
        for p in &self.params {
            write!(f, ",{p}")?;
        }
        write!(f, "*%")
    }
}

pub const FILE_FUNCTION: &str = ".FileFunction";

/// Layer polarity from %LP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Dark,
    Clear,
}

/// D01, D02 or D03.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCode {
    Draw,
    Move,
    Flash,
}

impl OperationCode {
    pub fn from_code(code: u32) -> Result<Self, PanelError> {
        match code {
            1 => Ok(OperationCode::Draw),
            2 => Ok(OperationCode::Move),
            3 => Ok(OperationCode::Flash),
            other => Err(PanelError::Format(format!(
                "operation code D{other:02} is outside D01-D03"
            ))),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            OperationCode::Draw => 1,
            OperationCode::Move => 2,
            OperationCode::Flash => 3,
        }
    }
}

/// A draw/move/flash with its absolute end point and, for arcs, the centre offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub code: OperationCode,
    pub point: Point,
    pub offset: Option<(Coord, Coord)>,
}

impl Operation {
    /// The same operation shifted by (dx, dy). Centre offsets are relative and stay.
    pub fn translated(&self, dx: Coord, dy: Coord) -> Operation {
        Operation {
            point: self.point.offset(dx, dy),
            ..*self
        }
    }

    /// The same operation with every coordinate multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Operation {
        let scale = |c: Coord| Coord::from_f64(c.to_f64() * factor);
        Operation {
            point: Point::new(scale(self.point.x), scale(self.point.y)),
            offset: self.offset.map(|(i, j)| (scale(i), scale(j))),
            ..*self
        }
    }
}

/// A fully parsed Gerber command.
#[derive(Debug, Clone, PartialEq)]
pub enum GerberCommand {
    /// %FS
    FormatSpec(CoordinateFormat),
    /// %MO
    Units(Units),
    /// %AD
    ApertureDefine(Aperture),
    /// %AM
    MacroDefine(MacroDefinition),
    /// %TF, %TA, %TO, %TD
    Attribute(Attribute),
    /// %LP
    Polarity(Polarity),
    /// %LM, kept verbatim (`N`, `X`, `Y`, `XY`)
    Mirroring(String),
    /// %LR, kept verbatim
    Rotation(String),
    /// %LS, kept verbatim
    Scale(String),
    /// G01 / G02 / G03
    Interpolation(Interpolation),
    /// G74 / G75
    QuadrantMode(QuadrantMode),
    /// G36
    RegionBegin,
    /// G37
    RegionEnd,
    /// G04
    Comment(String),
    /// Dnn, n >= 10
    SelectAperture(u32),
    /// D01 / D02 / D03
    Operation(Operation),
    /// M02
    EndOfFile,
}

/// Raw X/Y/I/J fields of an operation, not yet scaled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinateFields {
    pub x: Option<String>,
    pub y: Option<String>,
    pub i: Option<String>,
    pub j: Option<String>,
}

/// Split `X100Y-200I5J0` into its fields.
pub fn parse_coordinate_fields(text: &str) -> Result<CoordinateFields, PanelError> {
    let mut fields = CoordinateFields::default();
    let bytes = text.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let key = bytes[pos] as char;
        pos += 1;
        let start = pos;
        if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
            pos += 1;
        }
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        let value = text[start..pos].to_string();
        let slot = match key {
            'X' => &mut fields.x,
            'Y' => &mut fields.y,
            'I' => &mut fields.i,
            'J' => &mut fields.j,
            other => {
                return Err(PanelError::Format(format!(
                    "unexpected '{other}' in coordinates: {text}"
                )))
            }
        };
        if slot.replace(value).is_some() {
            return Err(PanelError::Format(format!(
                "repeated {key} in coordinates: {text}"
            )));
        }
    }

    Ok(fields)
}

/// Parse one `%...%` block. Macro definitions span the whole block; every other
/// statement stands alone. Unknown statements yield nothing.
pub fn parse_extended(blocks: &[String]) -> Result<Vec<GerberCommand>, PanelError> {
    let Some(first) = blocks.first() else {
        return Ok(Vec::new());
    };

    if let Some(name) = first.strip_prefix("AM") {
        if name.is_empty() {
            return Err(PanelError::Format("AM: missing macro name".into()));
        }
        return Ok(vec![GerberCommand::MacroDefine(MacroDefinition {
            name: name.to_string(),
            blocks: blocks[1..].to_vec(),
        })]);
    }

    let mut commands = Vec::new();
    for statement in blocks {
        if let Some(cmd) = parse_statement(statement)? {
            commands.push(cmd);
        }
    }
    Ok(commands)
}

fn parse_statement(content: &str) -> Result<Option<GerberCommand>, PanelError> {
    let prefix = content.get(..2).unwrap_or(content);
    let rest = content.get(2..).unwrap_or_default();
    let cmd = match prefix {
        "FS" => GerberCommand::FormatSpec(parse_format_spec(rest)?),
        "MO" => match rest {
            "MM" => GerberCommand::Units(Units::Millimeters),
            "IN" => GerberCommand::Units(Units::Inches),
            other => return Err(PanelError::Format(format!("MO: unknown unit: {other}"))),
        },
        "AD" => GerberCommand::ApertureDefine(parse_aperture_define(rest)?),
        "LP" => match rest {
            "D" => GerberCommand::Polarity(Polarity::Dark),
            "C" => GerberCommand::Polarity(Polarity::Clear),
            other => return Err(PanelError::Format(format!("LP: unknown polarity: {other}"))),
        },
        "LM" => GerberCommand::Mirroring(rest.to_string()),
        "LR" => GerberCommand::Rotation(rest.to_string()),
        "LS" => GerberCommand::Scale(rest.to_string()),
        "TF" => GerberCommand::Attribute(parse_attribute(AttributeKind::File, rest)),
        "TA" => GerberCommand::Attribute(parse_attribute(AttributeKind::Aperture, rest)),
        "TO" => GerberCommand::Attribute(parse_attribute(AttributeKind::Object, rest)),
        "TD" => GerberCommand::Attribute(parse_attribute(AttributeKind::Delete, rest)),
        _ => {
            debug!("Ignoring extended command {content}");
            return Ok(None);
        }
    };
    Ok(Some(cmd))
}

/// Parse the body of %FS. Example: `LAX24Y24`
fn parse_format_spec(s: &str) -> Result<CoordinateFormat, PanelError> {
    let mut zeros = ZeroOmission::Leading;
    let mut incremental = false;
    let mut chars = s.char_indices();
    let x_pos = loop {
        match chars.next() {
            Some((_, 'L')) => zeros = ZeroOmission::Leading,
            Some((_, 'T')) => zeros = ZeroOmission::Trailing,
            Some((_, 'A')) => incremental = false,
            Some((_, 'I')) => incremental = true,
            Some((pos, 'X')) => break pos,
            _ => return Err(PanelError::Format(format!("FS: missing X in: {s}"))),
        }
    };
    let y_pos = s
        .find('Y')
        .ok_or_else(|| PanelError::Format(format!("FS: missing Y in: {s}")))?;
    if y_pos < x_pos {
        return Err(PanelError::Format(format!("FS: Y before X in: {s}")));
    }

    let (x_integer, x_decimal) = parse_digit_pair(&s[x_pos + 1..y_pos], 'X')?;
    let (y_integer, y_decimal) = parse_digit_pair(&s[y_pos + 1..], 'Y')?;

    let format = CoordinateFormat {
        zeros,
        incremental,
        x_integer,
        x_decimal,
        y_integer,
        y_decimal,
    };
    format.validate()?;
    Ok(format)
}

fn parse_digit_pair(part: &str, axis: char) -> Result<(u8, u8), PanelError> {
    let mut digits = part.chars().map(|c| c.to_digit(10));
    match (digits.next(), digits.next(), digits.next()) {
        (Some(Some(i)), Some(Some(d)), None) => Ok((i as u8, d as u8)),
        _ => Err(PanelError::Format(format!(
            "FS: invalid {axis} format digits: {part}"
        ))),
    }
}

/// Parse the body of %AD. Example: `D10C,0.020` or `D12RoundRect,0.2X0.1`
fn parse_aperture_define(s: &str) -> Result<Aperture, PanelError> {
    let s = s
        .strip_prefix('D')
        .ok_or_else(|| PanelError::Format(format!("AD: expected D, got: {s}")))?;

    let type_pos = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| PanelError::Format(format!("AD: no template in: {s}")))?;

    let code: u32 = s[..type_pos]
        .parse()
        .map_err(|_| PanelError::Format(format!("AD: bad aperture code: {s}")))?;
    if code < 10 {
        return Err(PanelError::Format(format!(
            "AD: aperture code D{code} is reserved"
        )));
    }

    let (template, value) = match s[type_pos..].split_once(',') {
        Some((t, v)) => (t, v),
        None => (&s[type_pos..], ""),
    };

    Ok(Aperture {
        code,
        template: template.to_string(),
        value: value.to_string(),
    })
}

fn parse_attribute(kind: AttributeKind, s: &str) -> Attribute {
    let mut parts = s.split(',');
    let name = parts.next().unwrap_or_default().to_string();
    Attribute {
        kind,
        name,
        params: parts.map(str::to_string).collect(),
    }
}

/// Parse a G-code word. Deprecated codes that carry no drawing state yield nothing.
pub fn parse_g_code(word: &str) -> Result<Option<GerberCommand>, PanelError> {
    let body = &word[1..];
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let code: u32 = body[..digits_end]
        .parse()
        .map_err(|_| PanelError::Format(format!("bad G-code: {word}")))?;

    let cmd = match code {
        4 => GerberCommand::Comment(body[digits_end..].trim().to_string()),
        1 => GerberCommand::Interpolation(Interpolation::Linear),
        2 => GerberCommand::Interpolation(Interpolation::Clockwise),
        3 => GerberCommand::Interpolation(Interpolation::CounterClockwise),
        36 => GerberCommand::RegionBegin,
        37 => GerberCommand::RegionEnd,
        74 => GerberCommand::QuadrantMode(QuadrantMode::Single),
        75 => GerberCommand::QuadrantMode(QuadrantMode::Multi),
        other => {
            debug!("Ignoring G{other:02}");
            return Ok(None);
        }
    };
    Ok(Some(cmd))
}

/// Parse an M-code word. Only the end-of-file codes matter.
pub fn parse_m_code(word: &str) -> Result<Option<GerberCommand>, PanelError> {
    let code: u32 = word[1..]
        .trim()
        .parse()
        .map_err(|_| PanelError::Format(format!("bad M-code: {word}")))?;
    match code {
        0 | 2 | 30 => Ok(Some(GerberCommand::EndOfFile)),
        other => {
            debug!("Ignoring M{other:02}");
            Ok(None)
        }
    }
}
