//! Named evaluation presets.
//!
//! The preset table is embedded at compile time from `contrib/presets.toml`
//! and parsed once on first use.

use crate::classifier::ClassifierKind;
use crate::extractor::{ExtractorKind, ExtractorParams};
use crate::filter::FilterKind;
use crate::selector::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const PRESET_TABLE: &str = include_str!("../../../contrib/presets.toml");

static PRESETS: OnceLock<Vec<Preset>> = OnceLock::new();

#[derive(Debug, Deserialize)]
struct PresetFile {
    #[serde(default)]
    preset: Vec<Preset>,
}

/// One named extractor / filter / classifier combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub extractor: ExtractorKind,
    #[serde(default)]
    pub filter: FilterKind,
    pub classifier: ClassifierKind,
    /// Histogram grid override, `[columns, rows]`.
    #[serde(default)]
    pub grid: Option<[u32; 2]>,
    /// Pixel extractor output size override, `[width, height]`.
    #[serde(default)]
    pub pixel_size: Option<[u32; 2]>,
}

impl Preset {
    /// Extractor parameters with this preset's overrides applied on `base`.
    pub fn extractor_params(&self, base: &ExtractorParams) -> ExtractorParams {
        let mut params = *base;
        if let Some([x, y]) = self.grid {
            params.grid = (x, y);
        }
        if let Some([w, h]) = self.pixel_size {
            params.pixel_size = (w, h);
        }
        params
    }
}

/// Parse a preset table. Names must be unique.
pub fn parse_presets(src: &str) -> Result<Vec<Preset>, String> {
    let file: PresetFile = toml::from_str(src).map_err(|e| e.to_string())?;
    for (i, preset) in file.preset.iter().enumerate() {
        if file.preset[..i].iter().any(|p| p.name == preset.name) {
            return Err(format!("duplicate preset name: {}", preset.name));
        }
    }
    Ok(file.preset)
}

/// All built-in presets, in table order.
pub fn presets() -> &'static [Preset] {
    PRESETS.get_or_init(|| match parse_presets(PRESET_TABLE) {
        Ok(presets) => presets,
        Err(e) => {
            tracing::error!(error = %e, "bad embedded preset table");
            Vec::new()
        }
    })
}

/// Look up a built-in preset by name (case-insensitive).
pub fn find_preset(name: &str) -> Result<&'static Preset, ConfigError> {
    presets()
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_table_parses() {
        let all = parse_presets(PRESET_TABLE).unwrap();
        assert!(!all.is_empty());
        assert_eq!(all.len(), presets().len());
        assert_eq!(all[0].name, "pixels");
    }

    #[test]
    fn test_find_preset() {
        let p = find_preset("LBP_HELL").unwrap();
        assert_eq!(p.extractor, ExtractorKind::Lbp);
        assert_eq!(p.classifier, ClassifierKind::HistHellinger);
        assert_eq!(p.filter, FilterKind::None);
        assert_eq!(
            find_preset("wld_hell"),
            Err(ConfigError::UnknownPreset("wld_hell".into()))
        );
    }

    #[test]
    fn test_overrides_applied() {
        let p = find_preset("pixels").unwrap();
        let params = p.extractor_params(&ExtractorParams {
            pixel_size: (32, 32),
            grid: (4, 4),
        });
        assert_eq!(params.pixel_size, (120, 120));
        assert_eq!(params.grid, (4, 4));
    }

    #[test]
    fn test_unknown_selector_in_table_rejected() {
        let src = r#"
            [[preset]]
            name = "bad"
            extractor = "Wld"
            classifier = "NORM_L2"
        "#;
        assert!(parse_presets(src).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let src = r#"
            [[preset]]
            name = "a"
            extractor = "Lbp"
            classifier = "NORM_L2"

            [[preset]]
            name = "a"
            extractor = "0"
            classifier = "1"
        "#;
        assert!(parse_presets(src).unwrap_err().contains("duplicate"));
    }
}
