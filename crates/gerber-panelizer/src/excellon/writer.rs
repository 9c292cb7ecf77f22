use std::io::Write;

use log::debug;

use crate::error::PanelError;
use crate::geometry::{Coord, Hole, Point};
use crate::layer::{ExcellonLayer, LayerFunction};

const DRILL_DECIMALS: u8 = 3;

/// Serialize a drill layer to a byte stream.
pub fn write<W: Write>(layer: &ExcellonLayer, mut writer: W) -> Result<(), PanelError> {
    writer.write_all(to_string(layer).as_bytes())?;
    Ok(())
}

/// Serialize a drill layer in metric, three-decimal Excellon.
///
/// Tools are numbered from T1 in the order their diameter first appears; holes are
/// grouped by tool. Diameters equal at the written precision share a tool.
pub fn to_string(layer: &ExcellonLayer) -> String {
    let tool_key = |hole: &Hole| hole.diameter().to_fixed(DRILL_DECIMALS);
    let mut tools: Vec<(i64, Coord)> = Vec::new();
    for hole in layer.holes() {
        if !tools.iter().any(|(key, _)| *key == tool_key(hole)) {
            tools.push((tool_key(hole), hole.diameter()));
        }
    }

    let mut out = String::new();
    let mut line = |text: &str| {
        out.push_str(text);
        out.push('\n');
    };

    line("M48");
    let file_function = match layer.function() {
        LayerFunction::BottomDrill => "NonPlated,1,2,NPTH",
        _ => "Plated,1,2,PTH",
    };
    line(&format!("; #@! TF.FileFunction,{file_function}"));
    line("FMAT,2");
    line("METRIC");
    for (index, (_, diameter)) in tools.iter().enumerate() {
        line(&format!("T{}C{}", index + 1, diameter.format_fixed(DRILL_DECIMALS)));
    }
    line("%");
    line("G90");
    line("G05");

    for (index, (key, _)) in tools.iter().enumerate() {
        line(&format!("T{}", index + 1));
        for hole in layer.holes().iter().filter(|h| tool_key(*h) == *key) {
            match hole {
                Hole::Round { center, .. } => line(&position(center)),
                Hole::Routed { start, path, .. } => {
                    line(&format!("G00{}", position(start)));
                    line("M15");
                    line("G01");
                    for p in path {
                        line(&position(p));
                    }
                    line("M16");
                    line("G05");
                }
            }
        }
    }
    line("T0");
    line("M30");

    debug!(
        "Wrote drill {}: {} tools, {} holes",
        layer.name(),
        tools.len(),
        layer.holes().len()
    );
    out
}

fn position(p: &Point) -> String {
    format!(
        "X{}Y{}",
        p.x.format_fixed(DRILL_DECIMALS),
        p.y.format_fixed(DRILL_DECIMALS)
    )
}
