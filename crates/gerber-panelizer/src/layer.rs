use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PanelError;
use crate::geometry::{Coord, Hole, Point};
use crate::gerber::commands::{
    Aperture, AttributeKind, GerberCommand, MacroDefinition, FILE_FUNCTION,
};
use crate::gerber::coord::{CoordinateFormat, Units};
use crate::gerber::macros::{EvaluatedPrimitive, Macro};

/// What a fabrication file is for. Declaration order is merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LayerFunction {
    FrontCopper,
    FrontMask,
    FrontPaste,
    FrontSilk,
    BackCopper,
    BackMask,
    BackPaste,
    BackSilk,
    EdgeCuts,
    TopDrill,
    BottomDrill,
}

impl LayerFunction {
    pub const ALL: [LayerFunction; 11] = [
        LayerFunction::FrontCopper,
        LayerFunction::FrontMask,
        LayerFunction::FrontPaste,
        LayerFunction::FrontSilk,
        LayerFunction::BackCopper,
        LayerFunction::BackMask,
        LayerFunction::BackPaste,
        LayerFunction::BackSilk,
        LayerFunction::EdgeCuts,
        LayerFunction::TopDrill,
        LayerFunction::BottomDrill,
    ];

    pub fn is_drill(self) -> bool {
        matches!(self, LayerFunction::TopDrill | LayerFunction::BottomDrill)
    }

    /// Canonical X2 `.FileFunction` value.
    pub fn file_function(self) -> &'static str {
        match self {
            LayerFunction::FrontCopper => "Copper,L1,Top",
            LayerFunction::FrontMask => "Soldermask,Top",
            LayerFunction::FrontPaste => "Paste,Top",
            LayerFunction::FrontSilk => "Legend,Top",
            LayerFunction::BackCopper => "Copper,L2,Bot",
            LayerFunction::BackMask => "Soldermask,Bot",
            LayerFunction::BackPaste => "Paste,Bot",
            LayerFunction::BackSilk => "Legend,Bot",
            LayerFunction::EdgeCuts => "Profile,NP",
            LayerFunction::TopDrill => "Drill,Top",
            LayerFunction::BottomDrill => "Drill,Bot",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            LayerFunction::FrontCopper => "Front Copper",
            LayerFunction::FrontMask => "Front Mask",
            LayerFunction::FrontPaste => "Front Solder Paste",
            LayerFunction::FrontSilk => "Front Silkscreen",
            LayerFunction::BackCopper => "Back Copper",
            LayerFunction::BackMask => "Back Mask",
            LayerFunction::BackPaste => "Back Solder Paste",
            LayerFunction::BackSilk => "Back Silkscreen",
            LayerFunction::EdgeCuts => "Outline",
            LayerFunction::TopDrill => "Top Drill",
            LayerFunction::BottomDrill => "Bottom Drill",
        }
    }

    pub fn from_display_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.display_name() == name)
    }

    /// Interpret an X2 `.FileFunction` value such as `Copper,L1,Top`.
    pub fn from_file_function(value: &str) -> Option<Self> {
        let top = value.contains("Top");
        let bottom = value.contains("Bot");
        let side = |front: LayerFunction, back: LayerFunction| match (top, bottom) {
            (true, _) => Some(front),
            (false, true) => Some(back),
            (false, false) => None,
        };

        if value.starts_with("Copper") {
            side(LayerFunction::FrontCopper, LayerFunction::BackCopper)
        } else if value.starts_with("Soldermask") {
            side(LayerFunction::FrontMask, LayerFunction::BackMask)
        } else if value.starts_with("Paste") {
            side(LayerFunction::FrontPaste, LayerFunction::BackPaste)
        } else if value.starts_with("Legend") {
            side(LayerFunction::FrontSilk, LayerFunction::BackSilk)
        } else if value.starts_with("Profile") {
            Some(LayerFunction::EdgeCuts)
        } else if value.contains("NonPlated")
            || value.contains("NPTH")
            || (value.starts_with("Drill") && bottom)
        {
            Some(LayerFunction::BottomDrill)
        } else if value.starts_with("Plated") || value.starts_with("Drill") {
            Some(LayerFunction::TopDrill)
        } else {
            None
        }
    }

    /// Guess the function from a file name, following KiCad, Protel and Eagle naming.
    /// All comparisons are case-insensitive.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        let lower = name.to_lowercase();

        if let Some((_, ext)) = lower.rsplit_once('.') {
            let by_ext = match ext {
                "gtl" | "cmp" => Some(LayerFunction::FrontCopper),
                "gbl" | "sol" => Some(LayerFunction::BackCopper),
                "gts" | "stc" => Some(LayerFunction::FrontMask),
                "gbs" | "sts" => Some(LayerFunction::BackMask),
                "gtp" | "crc" => Some(LayerFunction::FrontPaste),
                "gbp" | "crs" => Some(LayerFunction::BackPaste),
                "gto" | "plc" => Some(LayerFunction::FrontSilk),
                "gbo" | "pls" => Some(LayerFunction::BackSilk),
                "gko" | "gm1" | "dim" => Some(LayerFunction::EdgeCuts),
                "drl" | "xln" | "exc" | "txt" => Some(if lower.contains("npth") {
                    LayerFunction::BottomDrill
                } else {
                    LayerFunction::TopDrill
                }),
                _ => None,
            };
            if by_ext.is_some() {
                return by_ext;
            }
        }

        let any = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));
        if any(&["f_cu", "f.cu", "front_cu"]) {
            Some(LayerFunction::FrontCopper)
        } else if any(&["b_cu", "b.cu", "back_cu"]) {
            Some(LayerFunction::BackCopper)
        } else if any(&["f_mask", "f.mask", "front_mask"]) {
            Some(LayerFunction::FrontMask)
        } else if any(&["b_mask", "b.mask", "back_mask"]) {
            Some(LayerFunction::BackMask)
        } else if any(&["f_paste", "f.paste", "front_paste"]) {
            Some(LayerFunction::FrontPaste)
        } else if any(&["b_paste", "b.paste", "back_paste"]) {
            Some(LayerFunction::BackPaste)
        } else if any(&["f_silks", "f.silks", "front_silk"]) {
            Some(LayerFunction::FrontSilk)
        } else if any(&["b_silks", "b.silks", "back_silk"]) {
            Some(LayerFunction::BackSilk)
        } else if any(&["edge_cuts", "edge.cuts", "boardoutline", "outline", "profile"]) {
            Some(LayerFunction::EdgeCuts)
        } else {
            None
        }
    }
}

impl fmt::Display for LayerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Axis-aligned bounds of everything a layer touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BBox {
    pub minx: Coord,
    pub miny: Coord,
    pub maxx: Coord,
    pub maxy: Coord,
}

impl BBox {
    pub fn empty() -> Self {
        Self {
            minx: Coord::MAX,
            miny: Coord::MAX,
            maxx: Coord::MIN,
            maxy: Coord::MIN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.minx > self.maxx || self.miny > self.maxy
    }

    pub fn expand_point(&mut self, p: Point) {
        self.minx = self.minx.min(p.x);
        self.miny = self.miny.min(p.y);
        self.maxx = self.maxx.max(p.x);
        self.maxy = self.maxy.max(p.y);
    }

    pub fn width(&self) -> Coord {
        if self.is_empty() {
            Coord::ZERO
        } else {
            self.maxx - self.minx
        }
    }

    pub fn height(&self) -> Coord {
        if self.is_empty() {
            Coord::ZERO
        } else {
            self.maxy - self.miny
        }
    }
}

impl Default for BBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// A drawing file as an ordered command list.
#[derive(Debug, Clone)]
pub struct GerberLayer {
    name: String,
    commands: Vec<GerberCommand>,
    bbox: BBox,
    format_index: Option<usize>,
    units_index: Option<usize>,
    fallback_function: Option<LayerFunction>,
}

impl GerberLayer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            commands: Vec::new(),
            bbox: BBox::empty(),
            format_index: None,
            units_index: None,
            fallback_function: LayerFunction::from_filename(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a command. A second format spec or unit mode is rejected.
    pub fn add(&mut self, cmd: GerberCommand) -> Result<(), PanelError> {
        match &cmd {
            GerberCommand::FormatSpec(_) => {
                if self.format_index.is_some() {
                    return Err(PanelError::Format(format!(
                        "{}: duplicate format specification",
                        self.name
                    )));
                }
                self.format_index = Some(self.commands.len());
            }
            GerberCommand::Units(_) => {
                if self.units_index.is_some() {
                    return Err(PanelError::Format(format!(
                        "{}: duplicate unit mode",
                        self.name
                    )));
                }
                self.units_index = Some(self.commands.len());
            }
            GerberCommand::Operation(op) => self.bbox.expand_point(op.point),
            _ => {}
        }
        self.commands.push(cmd);
        Ok(())
    }

    pub fn commands(&self) -> &[GerberCommand] {
        &self.commands
    }

    pub fn format(&self) -> Option<&CoordinateFormat> {
        match self.format_index.map(|i| &self.commands[i]) {
            Some(GerberCommand::FormatSpec(f)) => Some(f),
            _ => None,
        }
    }

    pub fn units(&self) -> Option<Units> {
        match self.units_index.map(|i| &self.commands[i]) {
            Some(GerberCommand::Units(u)) => Some(*u),
            _ => None,
        }
    }

    pub fn apertures(&self) -> impl Iterator<Item = &Aperture> {
        self.commands.iter().filter_map(|c| match c {
            GerberCommand::ApertureDefine(a) => Some(a),
            _ => None,
        })
    }

    pub fn aperture(&self, code: u32) -> Option<&Aperture> {
        self.apertures().find(|a| a.code == code)
    }

    pub fn macros(&self) -> impl Iterator<Item = &MacroDefinition> {
        self.commands.iter().filter_map(|c| match c {
            GerberCommand::MacroDefine(m) => Some(m),
            _ => None,
        })
    }

    pub fn has_macro(&self, name: &str) -> bool {
        self.macros().any(|m| m.name == name)
    }

    /// File attributes, format spec and unit mode, in file order.
    pub fn header(&self) -> impl Iterator<Item = &GerberCommand> {
        self.commands.iter().filter(|c| {
            matches!(
                c,
                GerberCommand::FormatSpec(_) | GerberCommand::Units(_)
            ) || matches!(c, GerberCommand::Attribute(a) if a.kind == AttributeKind::File)
        })
    }

    /// The drawing body: modes, aperture selects, operations, layer modifiers and
    /// object attributes. Comments, aperture attributes and the end marker are left out.
    pub fn contents(&self) -> impl Iterator<Item = &GerberCommand> {
        self.commands.iter().filter(|c| match c {
            GerberCommand::Interpolation(_)
            | GerberCommand::QuadrantMode(_)
            | GerberCommand::RegionBegin
            | GerberCommand::RegionEnd
            | GerberCommand::SelectAperture(_)
            | GerberCommand::Operation(_)
            | GerberCommand::Polarity(_)
            | GerberCommand::Mirroring(_)
            | GerberCommand::Rotation(_)
            | GerberCommand::Scale(_) => true,
            GerberCommand::Attribute(a) => {
                matches!(a.kind, AttributeKind::Object | AttributeKind::Delete)
            }
            _ => false,
        })
    }

    /// Comma-joined parameters of the named file attribute.
    pub fn file_attribute(&self, name: &str) -> Option<String> {
        self.commands.iter().find_map(|c| match c {
            GerberCommand::Attribute(a) if a.kind == AttributeKind::File && a.name == name => {
                Some(a.params.join(","))
            }
            _ => None,
        })
    }

    /// From `.FileFunction` when present, otherwise from the file name.
    pub fn function(&self) -> Option<LayerFunction> {
        match self.file_attribute(FILE_FUNCTION) {
            Some(value) => LayerFunction::from_file_function(&value),
            None => self.fallback_function,
        }
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Drop every command and reset the bounds. The name is kept.
    pub fn clean(&mut self) {
        self.commands.clear();
        self.bbox = BBox::empty();
        self.format_index = None;
        self.units_index = None;
    }

    /// The code the next added aperture should take: D10 on an empty table,
    /// one above the highest code otherwise.
    pub fn next_aperture_code(&self) -> u32 {
        self.apertures()
            .map(|a| a.code + 1)
            .max()
            .unwrap_or(10)
            .max(10)
    }

    /// Evaluate the macro behind a macro-based aperture with the aperture's parameters.
    /// Built-in apertures yield `None`.
    pub fn evaluate_aperture(
        &self,
        code: u32,
    ) -> Result<Option<Vec<EvaluatedPrimitive>>, PanelError> {
        let aperture = self
            .aperture(code)
            .ok_or_else(|| PanelError::Format(format!("{}: D{code} is not defined", self.name)))?;
        if aperture.is_builtin() {
            return Ok(None);
        }
        let definition = self
            .macros()
            .find(|m| m.name == aperture.template)
            .ok_or_else(|| {
                PanelError::Format(format!(
                    "{}: D{code} uses undefined macro {}",
                    self.name, aperture.template
                ))
            })?;
        let params = aperture.params()?;
        Macro::parse(definition)?.eval(&params).map(Some)
    }
}

/// A drill file as a hole list.
#[derive(Debug, Clone)]
pub struct ExcellonLayer {
    name: String,
    function: LayerFunction,
    holes: Vec<Hole>,
    bbox: BBox,
}

impl ExcellonLayer {
    pub fn new(name: &str, function: LayerFunction) -> Self {
        Self {
            name: name.to_string(),
            function,
            holes: Vec::new(),
            bbox: BBox::empty(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> LayerFunction {
        self.function
    }

    pub fn add_hole(&mut self, hole: Hole) {
        for p in hole.points() {
            self.bbox.expand_point(p);
        }
        self.holes.push(hole);
    }

    pub fn holes(&self) -> &[Hole] {
        &self.holes
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn clean(&mut self) {
        self.holes.clear();
        self.bbox = BBox::empty();
    }
}

/// One fabrication file of either format.
#[derive(Debug, Clone)]
pub enum Layer {
    Gerber(GerberLayer),
    Excellon(ExcellonLayer),
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Gerber(g) => g.name(),
            Layer::Excellon(e) => e.name(),
        }
    }

    pub fn function(&self) -> Option<LayerFunction> {
        match self {
            Layer::Gerber(g) => g.function(),
            Layer::Excellon(e) => Some(e.function()),
        }
    }

    pub fn bbox(&self) -> BBox {
        match self {
            Layer::Gerber(g) => g.bbox(),
            Layer::Excellon(e) => e.bbox(),
        }
    }

    pub fn clean(&mut self) {
        match self {
            Layer::Gerber(g) => g.clean(),
            Layer::Excellon(e) => e.clean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gerber::commands::{Attribute, Operation, OperationCode};

    fn op(x: f64, y: f64) -> GerberCommand {
        GerberCommand::Operation(Operation {
            code: OperationCode::Draw,
            point: Point::from_f64(x, y),
            offset: None,
        })
    }

    fn aperture(code: u32, template: &str, value: &str) -> GerberCommand {
        GerberCommand::ApertureDefine(Aperture {
            code,
            template: template.into(),
            value: value.into(),
        })
    }

    #[test]
    fn test_function_names_round_trip() {
        for f in LayerFunction::ALL {
            assert_eq!(LayerFunction::from_display_name(f.display_name()), Some(f));
            assert_eq!(LayerFunction::from_file_function(f.file_function()), Some(f));
        }
        assert_eq!(LayerFunction::from_display_name("Inner Copper"), None);
    }

    #[test]
    fn test_from_file_function_variants() {
        assert_eq!(
            LayerFunction::from_file_function("Copper,L4,Bot,Signal"),
            Some(LayerFunction::BackCopper)
        );
        assert_eq!(LayerFunction::from_file_function("Copper,L2,Inr"), None);
        assert_eq!(
            LayerFunction::from_file_function("NonPlated,1,2,NPTH"),
            Some(LayerFunction::BottomDrill)
        );
        assert_eq!(
            LayerFunction::from_file_function("Plated,1,2,PTH"),
            Some(LayerFunction::TopDrill)
        );
        assert_eq!(LayerFunction::from_file_function("Other,Comment"), None);
    }

    #[test]
    fn test_from_filename() {
        let cases = [
            ("board-F_Cu.gbr", Some(LayerFunction::FrontCopper)),
            ("out/board-B_Mask.gbr", Some(LayerFunction::BackMask)),
            ("board-Edge_Cuts.gbr", Some(LayerFunction::EdgeCuts)),
            ("BOARD.GTO", Some(LayerFunction::FrontSilk)),
            ("board.gbp", Some(LayerFunction::BackPaste)),
            ("board-PTH.drl", Some(LayerFunction::TopDrill)),
            ("board-NPTH.drl", Some(LayerFunction::BottomDrill)),
            ("readme.md", None),
        ];
        for (name, expected) in cases {
            assert_eq!(LayerFunction::from_filename(name), expected, "{name}");
        }
    }

    #[test]
    fn test_function_prefers_attribute_over_filename() {
        let mut layer = GerberLayer::new("board-F_Cu.gbr");
        assert_eq!(layer.function(), Some(LayerFunction::FrontCopper));
        layer
            .add(GerberCommand::Attribute(Attribute::file(
                FILE_FUNCTION,
                &["Legend", "Bot"],
            )))
            .unwrap();
        assert_eq!(layer.function(), Some(LayerFunction::BackSilk));
        assert_eq!(layer.file_attribute(FILE_FUNCTION).as_deref(), Some("Legend,Bot"));
    }

    #[test]
    fn test_duplicate_format_spec_rejected() {
        let mut layer = GerberLayer::new("x.gbr");
        layer
            .add(GerberCommand::FormatSpec(CoordinateFormat::MERGED))
            .unwrap();
        assert!(layer
            .add(GerberCommand::FormatSpec(CoordinateFormat::MERGED))
            .is_err());
        layer.add(GerberCommand::Units(Units::Millimeters)).unwrap();
        assert!(layer.add(GerberCommand::Units(Units::Inches)).is_err());
        assert_eq!(layer.units(), Some(Units::Millimeters));
    }

    #[test]
    fn test_bbox_tracks_operations_and_resets() {
        let mut layer = GerberLayer::new("x.gbr");
        layer.add(op(1.0, 5.0)).unwrap();
        layer.add(op(-2.0, 3.0)).unwrap();
        let bbox = layer.bbox();
        assert_eq!(bbox.minx, Coord::from_f64(-2.0));
        assert_eq!(bbox.maxy, Coord::from_f64(5.0));
        assert_eq!(bbox.width(), Coord::from_f64(3.0));
        layer.clean();
        assert!(layer.bbox().is_empty());
        assert!(layer.commands().is_empty());
        assert!(layer.format().is_none());
    }

    #[test]
    fn test_next_aperture_code() {
        let mut layer = GerberLayer::new("x.gbr");
        assert_eq!(layer.next_aperture_code(), 10);
        layer.add(aperture(10, "C", "0.1")).unwrap();
        layer.add(aperture(14, "C", "0.2")).unwrap();
        assert_eq!(layer.next_aperture_code(), 15);
    }

    #[test]
    fn test_header_and_contents_split() {
        let mut layer = GerberLayer::new("x.gbr");
        layer
            .add(GerberCommand::Attribute(Attribute::file(FILE_FUNCTION, &["Profile", "NP"])))
            .unwrap();
        layer.add(GerberCommand::FormatSpec(CoordinateFormat::MERGED)).unwrap();
        layer.add(GerberCommand::Comment("hi".into())).unwrap();
        layer.add(aperture(10, "C", "0.1")).unwrap();
        layer.add(GerberCommand::SelectAperture(10)).unwrap();
        layer.add(op(1.0, 1.0)).unwrap();
        layer.add(GerberCommand::EndOfFile).unwrap();
        assert_eq!(layer.header().count(), 2);
        assert_eq!(layer.contents().count(), 2);
    }

    #[test]
    fn test_evaluate_aperture() {
        let mut layer = GerberLayer::new("x.gbr");
        layer
            .add(GerberCommand::MacroDefine(MacroDefinition {
                name: "PAD".into(),
                blocks: vec!["21,1,$1,$2,0,0,0".into()],
            }))
            .unwrap();
        layer.add(aperture(10, "PAD", "1.5X0.5")).unwrap();
        layer.add(aperture(11, "C", "0.3")).unwrap();
        let prims = layer.evaluate_aperture(10).unwrap().unwrap();
        assert_eq!(prims[0].values[..2], [1.5, 0.5]);
        assert!(layer.evaluate_aperture(11).unwrap().is_none());
        assert!(layer.evaluate_aperture(12).is_err());
    }

    #[test]
    fn test_excellon_layer_tracks_bbox() {
        let mut layer = ExcellonLayer::new("d.drl", LayerFunction::TopDrill);
        let d6 = Coord::parse_decimal("0.6").unwrap();
        layer.add_hole(Hole::round(Point::from_f64(0.0, 0.0), d6));
        layer.add_hole(Hole::round(Point::from_f64(3.0, 1.0), Coord::from_f64(0.8)));
        layer.add_hole(Hole::round(Point::from_f64(5.0, 2.0), d6));
        assert_eq!(layer.holes().len(), 3);
        assert_eq!(layer.bbox().maxx, Coord::from_f64(5.0));
    }
}
