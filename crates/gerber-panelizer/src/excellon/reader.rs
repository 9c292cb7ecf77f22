use std::collections::HashMap;
use std::io::Read;

use log::{debug, info, warn};

use crate::error::PanelError;
use crate::geometry::{Coord, Hole, Point, COORD_DECIMALS};
use crate::layer::{ExcellonLayer, LayerFunction};

/// Units used in the drill file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExcellonUnits {
    Metric,
    Inches,
}

/// Coordinate format for values written without a decimal point.
#[derive(Debug, Clone, Copy)]
struct CoordFormat {
    integer: u8,
    decimal: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Body,
}

/// Read a drill file from a byte stream.
pub fn read<R: Read>(name: &str, mut reader: R) -> Result<ExcellonLayer, PanelError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    parse(name, &content)
}

/// Parse drill file text.
///
/// The layer is a bottom (non-plated) drill when the file name or a `TF.FileFunction`
/// header comment says so, a top drill otherwise.
pub fn parse(name: &str, content: &str) -> Result<ExcellonLayer, PanelError> {
    let mut parser = Parser {
        name,
        state: State::Header,
        units: ExcellonUnits::Metric,
        format: CoordFormat {
            integer: 3,
            decimal: 3,
        },
        tools: HashMap::new(),
        current_tool: None,
        position: Point::default(),
        routing: None,
        function: None,
        holes: Vec::new(),
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if parser.parse_line(line)? {
            break;
        }
    }

    let function = parser
        .function
        .or_else(|| LayerFunction::from_filename(name).filter(|f| f.is_drill()))
        .unwrap_or(LayerFunction::TopDrill);
    let mut layer = ExcellonLayer::new(name, function);
    for hole in parser.holes {
        layer.add_hole(hole);
    }
    info!(
        "Read drill {name}: {} holes, function {function}",
        layer.holes().len()
    );
    Ok(layer)
}

struct Parser<'a> {
    name: &'a str,
    state: State,
    units: ExcellonUnits,
    format: CoordFormat,
    tools: HashMap<u32, Coord>,
    current_tool: Option<u32>,
    position: Point,
    /// Routed hole in progress, between M15 and M16.
    routing: Option<Hole>,
    function: Option<LayerFunction>,
    holes: Vec<Hole>,
}

impl Parser<'_> {
    /// Returns `true` at end of program.
    fn parse_line(&mut self, line: &str) -> Result<bool, PanelError> {
        if let Some(comment) = line.strip_prefix(';') {
            self.parse_comment(comment);
            return Ok(false);
        }
        let upper = line.to_uppercase();
        match self.state {
            State::Header => {
                if upper == "%" || upper == "M95" {
                    self.state = State::Body;
                } else if upper.starts_with('X') || upper.starts_with('Y') {
                    // Files without a header terminator start the body directly.
                    self.state = State::Body;
                    return self.parse_body_line(&upper);
                } else {
                    self.parse_header_line(&upper)?;
                }
                Ok(false)
            }
            State::Body => self.parse_body_line(&upper),
        }
    }

    fn parse_comment(&mut self, comment: &str) {
        if let Some(pos) = comment.find("TF.FileFunction,") {
            let value = &comment[pos + "TF.FileFunction,".len()..];
            self.function = LayerFunction::from_file_function(value.trim())
                .filter(|f| f.is_drill());
            debug!("{}: file function {value:?}", self.name);
        }
    }

    fn parse_header_line(&mut self, line: &str) -> Result<(), PanelError> {
        if line == "M48" || line.starts_with("FMAT") || line.starts_with("VER") {
            return Ok(());
        }
        // Units and format: "METRIC,TZ,000.000" or "INCH,LZ" or "M71" / "M72"
        if line.starts_with("METRIC") || line == "M71" {
            self.units = ExcellonUnits::Metric;
            self.parse_format_options(line);
            return Ok(());
        }
        if line.starts_with("INCH") || line == "M72" {
            self.units = ExcellonUnits::Inches;
            self.parse_format_options(line);
            return Ok(());
        }

        // Tool definitions: T01C0.300, T1C0.3 or T1F00S00C0.3
        if let Some(rest) = line.strip_prefix('T') {
            if rest.contains('C') {
                let digits_end = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                let number = parse_tool_number(&rest[..digits_end]).ok_or_else(|| {
                    PanelError::Format(format!("{}: bad tool definition: {line}", self.name))
                })?;
                let diameter_text = letter_fields(rest)
                    .into_iter()
                    .find(|(key, _)| *key == 'C')
                    .map_or("", |(_, value)| value);
                let diameter = self.to_mm(Coord::parse_decimal(diameter_text)?);
                debug!("{}: tool T{number} diameter {diameter}", self.name);
                self.tools.insert(number, diameter);
                return Ok(());
            }
        }

        debug!("{}: ignoring header line {line}", self.name);
        Ok(())
    }

    fn parse_format_options(&mut self, line: &str) {
        for part in line.split(',').map(str::trim) {
            // Format like "000.000" or "00.0000"
            if let Some((int, dec)) = part.split_once('.') {
                if !int.is_empty()
                    && !dec.is_empty()
                    && part.chars().all(|c| c == '0' || c == '.')
                {
                    self.format = CoordFormat {
                        integer: int.len() as u8,
                        decimal: dec.len() as u8,
                    };
                }
            }
        }
    }

    fn parse_body_line(&mut self, line: &str) -> Result<bool, PanelError> {
        match line {
            "M30" | "M00" => {
                self.finish_routing();
                return Ok(true);
            }
            "M15" => {
                self.start_routing();
                return Ok(false);
            }
            "M16" | "M17" => {
                self.finish_routing();
                return Ok(false);
            }
            "G05" => {
                self.finish_routing();
                return Ok(false);
            }
            "G90" | "G01" | "M95" | "%" => return Ok(false),
            _ => {}
        }

        // Tool selection: T01 or T1 (a C parameter here is an inline definition)
        if let Some(rest) = line.strip_prefix('T') {
            if rest.contains('C') {
                self.parse_header_line(line)?;
            }
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let number = parse_tool_number(&rest[..digits_end]).ok_or_else(|| {
                PanelError::Format(format!("{}: bad tool select: {line}", self.name))
            })?;
            self.current_tool = (number != 0).then_some(number);
            return Ok(false);
        }

        // Rout position: G00X..Y..
        if let Some(rest) = line.strip_prefix("G00") {
            if let Some(p) = self.parse_point(rest)? {
                self.position = p;
            }
            return Ok(false);
        }
        let line = line.strip_prefix("G01").unwrap_or(line);

        if line.starts_with('X') || line.starts_with('Y') {
            // Slot: X..Y..G85X..Y..
            if let Some((from, to)) = line.split_once("G85") {
                if let (Some(start), Some(end)) = (self.parse_point(from)?, self.parse_point(to)?) {
                    if let Some(diameter) = self.diameter() {
                        self.holes.push(Hole::Routed {
                            start,
                            diameter,
                            path: vec![end],
                        });
                    }
                    self.position = end;
                }
                return Ok(false);
            }

            let Some(p) = self.parse_point(line)? else {
                return Ok(false);
            };
            self.position = p;
            match &mut self.routing {
                Some(Hole::Routed { path, .. }) => path.push(p),
                _ => {
                    if let Some(diameter) = self.diameter() {
                        self.holes.push(Hole::round(p, diameter));
                    }
                }
            }
            return Ok(false);
        }

        debug!("{}: ignoring body line {line}", self.name);
        Ok(false)
    }

    fn diameter(&self) -> Option<Coord> {
        let diameter = self.current_tool.and_then(|t| self.tools.get(&t)).copied();
        if diameter.is_none() {
            warn!("{}: hole without a defined tool, skipped", self.name);
        }
        diameter
    }

    fn start_routing(&mut self) {
        self.finish_routing();
        if let Some(diameter) = self.diameter() {
            self.routing = Some(Hole::Routed {
                start: self.position,
                diameter,
                path: Vec::new(),
            });
        }
    }

    fn finish_routing(&mut self) {
        if let Some(hole) = self.routing.take() {
            self.holes.push(hole);
        }
    }

    /// Both X and Y are required; a line missing either is skipped with a warning.
    fn parse_point(&self, text: &str) -> Result<Option<Point>, PanelError> {
        let mut x = None;
        let mut y = None;
        for (key, value) in letter_fields(text) {
            match key {
                'X' => x = Some(self.parse_coord_value(value)?),
                'Y' => y = Some(self.parse_coord_value(value)?),
                _ => {}
            }
        }
        match (x, y) {
            (Some(x), Some(y)) => Ok(Some(Point::new(x, y))),
            _ => {
                warn!("{}: coordinate line without X or Y: {text}", self.name);
                Ok(None)
            }
        }
    }

    fn parse_coord_value(&self, s: &str) -> Result<Coord, PanelError> {
        let value = if s.contains('.') {
            Coord::parse_decimal(s)?
        } else {
            // Digits are right-aligned against the implied decimal point.
            let raw: i64 = s
                .parse()
                .map_err(|_| PanelError::Format(format!("{}: bad coordinate: {s}", self.name)))?;
            Coord::from_fixed(raw, self.format.decimal.min(COORD_DECIMALS))?
        };
        Ok(self.to_mm(value))
    }

    fn to_mm(&self, value: Coord) -> Coord {
        match self.units {
            ExcellonUnits::Metric => value,
            ExcellonUnits::Inches => Coord::from_f64(value.to_f64() * 25.4),
        }
    }
}

fn parse_tool_number(s: &str) -> Option<u32> {
    s.parse().ok()
}

/// Split `X1.0Y2.0` into `('X', "1.0")`, `('Y', "2.0")`. Text before the first
/// letter is dropped.
fn letter_fields(s: &str) -> Vec<(char, &str)> {
    let starts: Vec<(usize, char)> = s
        .char_indices()
        .filter(|(_, c)| c.is_ascii_alphabetic())
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(n, &(i, key))| {
            let end = starts.get(n + 1).map_or(s.len(), |&(next, _)| next);
            (key, s.get(i + key.len_utf8()..end).unwrap_or_default())
        })
        .collect()
}
