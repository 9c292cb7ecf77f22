pub mod excellon;
pub mod gerber;

use log::warn;

use crate::canvas::Canvas;
use crate::error::PanelError;
use crate::features::Feature;
use crate::geometry::Coord;
use crate::layer::{Layer, LayerFunction};

pub use excellon::ExcellonMerger;
pub use gerber::GerberMerger;

/// The merge strategy for one layer function: drill functions collect holes, all
/// others merge drawings.
#[derive(Debug, Clone)]
pub enum Merger {
    Gerber(GerberMerger),
    Excellon(ExcellonMerger),
}

impl Merger {
    pub fn new(panel_name: &str, function: LayerFunction) -> Self {
        if function.is_drill() {
            Merger::Excellon(ExcellonMerger::new(panel_name, function))
        } else {
            Merger::Gerber(GerberMerger::new(panel_name, function))
        }
    }

    pub fn function(&self) -> LayerFunction {
        match self {
            Merger::Gerber(m) => m.function(),
            Merger::Excellon(m) => m.function(),
        }
    }

    pub fn clean(&mut self) {
        match self {
            Merger::Gerber(m) => m.clean(),
            Merger::Excellon(m) => m.clean(),
        }
    }

    /// Merge `source` translated by (dx, dy). A source of the wrong format or
    /// function is skipped with a warning.
    pub fn add(&mut self, source: &Layer, dx: Coord, dy: Coord) -> Result<(), PanelError> {
        match (self, source) {
            (Merger::Gerber(m), Layer::Gerber(g)) => m.add(g, dx, dy),
            (Merger::Excellon(m), Layer::Excellon(e)) => {
                m.add(e, dx, dy);
                Ok(())
            }
            (m, _) => {
                warn!(
                    "Not merging {} into {}: file format does not match",
                    source.name(),
                    m.function()
                );
                Ok(())
            }
        }
    }

    /// Replay the merged layer onto `canvas`.
    pub fn draw(&self, canvas: &mut Canvas) {
        match self {
            Merger::Gerber(m) => canvas.draw_gerber(m.layer()),
            Merger::Excellon(m) => canvas.draw_excellon(m.layer()),
        }
    }

    /// Rewrite the merged layer with the edits of `features`.
    pub fn apply_features(
        &mut self,
        canvas: &Canvas,
        features: &[Feature],
    ) -> Result<(), PanelError> {
        match self {
            Merger::Gerber(m) => canvas.write_to_gerber(m.layer_mut(), features),
            Merger::Excellon(m) => {
                canvas.write_to_excellon(m.layer_mut(), features);
                Ok(())
            }
        }
    }

    pub fn layer(&self) -> Layer {
        match self {
            Merger::Gerber(m) => Layer::Gerber(m.layer().clone()),
            Merger::Excellon(m) => Layer::Excellon(m.layer().clone()),
        }
    }
}
