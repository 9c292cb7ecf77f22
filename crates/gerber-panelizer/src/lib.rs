pub mod batch;
pub mod canvas;
pub mod error;
pub mod excellon;
pub mod features;
pub mod geometry;
pub mod gerber;
pub mod layer;
pub mod merge;

use std::path::Path;

pub use batch::{Batch, BatchMerger, BatchSettings};
pub use features::{Feature, MouseBites, MouseBitesSettings};
pub use layer::LayerFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerFormat {
    Gerber,
    Excellon,
}

/// Detect format from file extension.
pub fn detect_format(path: &Path) -> Option<LayerFormat> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("gbr" | "gtl" | "gbl" | "gts" | "gbs" | "gtp" | "gbp" | "gto" | "gbo" | "gko"
        | "gm1") => Some(LayerFormat::Gerber),
        Some("drl" | "xln" | "exc") => Some(LayerFormat::Excellon),
        _ => None,
    }
}
