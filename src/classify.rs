//! Pure mappings from traffic load and chain membership to visual categories.

use std::collections::BTreeMap;

use eframe::egui::Color32;

use crate::config::{ConfigError, RenderConfig};
use crate::topology::ChainMap;
use crate::util::parse_hex_color;

pub const MEDIUM_LOAD_THRESHOLD: f64 = 100.0;
pub const HIGH_LOAD_THRESHOLD: f64 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadLevel {
    Low,
    Medium,
    High,
}

impl LoadLevel {
    pub const ALL: [LoadLevel; 3] = [LoadLevel::Low, LoadLevel::Medium, LoadLevel::High];

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low load",
            Self::Medium => "Medium load (> 100)",
            Self::High => "High load (> 1000)",
        }
    }

    pub fn color(self) -> Color32 {
        match self {
            Self::Low => Color32::from_rgb(0xcb, 0xd5, 0xe1),
            Self::Medium => Color32::from_rgb(0xf5, 0x9e, 0x0b),
            Self::High => Color32::from_rgb(0xef, 0x44, 0x44),
        }
    }

    pub fn stroke_width(self) -> f32 {
        match self {
            Self::High => 3.0,
            Self::Low | Self::Medium => 1.5,
        }
    }
}

/// Negative and NaN loads fall through to `Low`.
pub fn classify_load(load: f64) -> LoadLevel {
    if load > HIGH_LOAD_THRESHOLD {
        LoadLevel::High
    } else if load > MEDIUM_LOAD_THRESHOLD {
        LoadLevel::Medium
    } else {
        LoadLevel::Low
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainCategory {
    /// Index into [`ColorClassifier::swatches`].
    Known(usize),
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainSwatch {
    pub name: String,
    pub color: Color32,
}

#[derive(Clone, Debug)]
pub struct ColorClassifier {
    swatches: Vec<ChainSwatch>,
    other_color: Color32,
    fallback_chains: BTreeMap<String, String>,
}

impl ColorClassifier {
    pub fn from_config(render: &RenderConfig) -> Result<Self, ConfigError> {
        let swatches = render
            .chain_colors
            .iter()
            .map(|(name, color)| {
                parse_hex_color(color)
                    .map(|color| ChainSwatch {
                        name: name.clone(),
                        color,
                    })
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!("colour `{color}` for chain `{name}` is not #rrggbb"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let other_color = parse_hex_color(&render.other_color).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "other colour `{}` is not #rrggbb",
                render.other_color
            ))
        })?;

        Ok(Self {
            swatches,
            other_color,
            fallback_chains: render.fallback_chains.clone(),
        })
    }

    /// The snapshot's chain wins; the fallback table only covers containers
    /// the snapshot says nothing about.
    pub fn chain_category(&self, container_id: &str, chains: &ChainMap) -> ChainCategory {
        let chain = chains
            .get(container_id)
            .or_else(|| self.fallback_chains.get(container_id));

        chain
            .and_then(|chain| self.swatches.iter().position(|swatch| &swatch.name == chain))
            .map_or(ChainCategory::Other, ChainCategory::Known)
    }

    pub fn chain_color(&self, category: ChainCategory) -> Color32 {
        match category {
            ChainCategory::Known(index) => self
                .swatches
                .get(index)
                .map_or(self.other_color, |swatch| swatch.color),
            ChainCategory::Other => self.other_color,
        }
    }

    pub fn chain_label(&self, category: ChainCategory) -> &str {
        match category {
            ChainCategory::Known(index) => self
                .swatches
                .get(index)
                .map_or("Other", |swatch| swatch.name.as_str()),
            ChainCategory::Other => "Other",
        }
    }

    pub fn swatches(&self) -> &[ChainSwatch] {
        &self.swatches
    }

    pub fn other_color(&self) -> Color32 {
        self.other_color
    }
}

impl Default for ColorClassifier {
    fn default() -> Self {
        let render = RenderConfig::default();
        Self {
            swatches: render
                .chain_colors
                .iter()
                .filter_map(|(name, color)| {
                    Some(ChainSwatch {
                        name: name.clone(),
                        color: parse_hex_color(color)?,
                    })
                })
                .collect(),
            other_color: Color32::from_rgb(0xea, 0xb3, 0x08),
            fallback_chains: render.fallback_chains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_boundaries_are_exclusive_below() {
        assert_eq!(classify_load(100.0), LoadLevel::Low);
        assert_eq!(classify_load(101.0), LoadLevel::Medium);
        assert_eq!(classify_load(1000.0), LoadLevel::Medium);
        assert_eq!(classify_load(1001.0), LoadLevel::High);
    }

    #[test]
    fn out_of_range_loads_are_low() {
        assert_eq!(classify_load(-5.0), LoadLevel::Low);
        assert_eq!(classify_load(f64::NAN), LoadLevel::Low);
        assert_eq!(classify_load(0.0), LoadLevel::Low);
        assert_eq!(classify_load(f64::INFINITY), LoadLevel::High);
    }

    #[test]
    fn snapshot_chain_takes_precedence_over_fallback() {
        let classifier = ColorClassifier::default();
        let mut chains = ChainMap::new();
        chains.insert("Container_0".to_owned(), "Data Pipeline".to_owned());

        let category = classifier.chain_category("Container_0", &chains);
        assert_eq!(classifier.chain_label(category), "Data Pipeline");
        assert_eq!(
            classifier.chain_color(category),
            Color32::from_rgb(0x10, 0xb9, 0x81)
        );
    }

    #[test]
    fn fallback_table_covers_missing_entries() {
        let classifier = ColorClassifier::default();
        let chains = ChainMap::new();

        let login = classifier.chain_category("Container_2", &chains);
        assert_eq!(classifier.chain_label(login), "Login Flow");
        let pipeline = classifier.chain_category("Container_3", &chains);
        assert_eq!(classifier.chain_label(pipeline), "Data Pipeline");
    }

    #[test]
    fn unmapped_chains_fall_back_to_other() {
        let classifier = ColorClassifier::default();
        let mut chains = ChainMap::new();
        chains.insert("Container_9".to_owned(), "Batch Jobs".to_owned());

        assert_eq!(
            classifier.chain_category("Container_9", &chains),
            ChainCategory::Other
        );
        assert_eq!(
            classifier.chain_category("Container_17", &chains),
            ChainCategory::Other
        );
        assert_eq!(
            classifier.chain_color(ChainCategory::Other),
            classifier.other_color()
        );
    }

    #[test]
    fn from_config_matches_default() {
        let classifier = ColorClassifier::from_config(&RenderConfig::default()).unwrap();
        assert_eq!(classifier.swatches(), ColorClassifier::default().swatches());
    }
}
