use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PanelError;
use crate::layer::LayerFunction;

pub const PROJECT_PLACEHOLDER: &str = "%project%";

/// Output file naming per layer function.
///
/// Patterns contain `%project%`, replaced by the batch name. Functions missing from
/// a loaded file use the default pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub filenames: BTreeMap<LayerFunction, String>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            filenames: LayerFunction::ALL
                .into_iter()
                .map(|f| (f, default_pattern(f).to_string()))
                .collect(),
        }
    }
}

fn default_pattern(function: LayerFunction) -> &'static str {
    match function {
        LayerFunction::FrontCopper => "%project%-F_Cu",
        LayerFunction::FrontMask => "%project%-F_Mask",
        LayerFunction::FrontPaste => "%project%-F_Paste",
        LayerFunction::FrontSilk => "%project%-F_Silkscreen",
        LayerFunction::BackCopper => "%project%-B_Cu",
        LayerFunction::BackMask => "%project%-B_Mask",
        LayerFunction::BackPaste => "%project%-B_Paste",
        LayerFunction::BackSilk => "%project%-B_Silkscreen",
        LayerFunction::EdgeCuts => "%project%-Edge_Cuts",
        LayerFunction::TopDrill => "%project%-PTH",
        LayerFunction::BottomDrill => "%project%-NPTH",
    }
}

impl BatchSettings {
    pub fn load(path: &Path) -> Result<Self, PanelError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn pattern(&self, function: LayerFunction) -> &str {
        self.filenames
            .get(&function)
            .map(String::as_str)
            .unwrap_or_else(|| default_pattern(function))
    }

    /// File name for a layer of `function` in the batch `batch_name`.
    pub fn filename(&self, function: LayerFunction, batch_name: &str) -> String {
        let extension = if function.is_drill() { "drl" } else { "gbr" };
        format!(
            "{}.{extension}",
            self.pattern(function).replace(PROJECT_PLACEHOLDER, batch_name)
        )
    }
}
