use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Title shown when a driver is built directly with default options.
pub const DEFAULT_MAIN_TITLE: &str = "blue ink";
/// Title used for elements mounted through data-attribute discovery.
pub const DISCOVERED_MAIN_TITLE: &str = "gold ink";
pub const DEFAULT_SUB_TITLE: &str = "threejs | fluid sim";

/// Tunables for one fluid driver. Supplied once at construction and never re-read.
///
/// Every field has a default, so partial TOML tables and unknown keys both load cleanly.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// Damping applied to every height update, in (0, 1].
    pub viscosity_constant: f32,
    /// Radius of the pointer influence bump, in container pixels.
    pub mouse_size: f32,
    /// Height injected at the centre of the bump (scaled by the falloff peak of 2).
    pub mouse_amp: f32,
    /// Carried for parity with the shader uniforms; the update rule does not read it.
    pub height_compensation: f32,
    /// Weight applied to the sum of the four neighbour heights.
    pub neighbor_weight: f32,
    pub show_titles: bool,
    pub main_title: String,
    pub sub_title: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            viscosity_constant: 0.98,
            mouse_size: 15.0,
            mouse_amp: 0.03,
            height_compensation: 0.1,
            neighbor_weight: 0.49,
            show_titles: true,
            main_title: DEFAULT_MAIN_TITLE.to_string(),
            sub_title: DEFAULT_SUB_TITLE.to_string(),
        }
    }
}

impl DriverConfig {
    /// Checks the numeric ranges the update rule relies on.
    pub fn validate(&self) -> Result<()> {
        if !(self.viscosity_constant > 0.0 && self.viscosity_constant <= 1.0) {
            anyhow::bail!(
                "viscosity_constant must be in (0, 1], got {}",
                self.viscosity_constant
            );
        }
        if !(self.mouse_size > 0.0) || !self.mouse_size.is_finite() {
            anyhow::bail!("mouse_size must be positive, got {}", self.mouse_size);
        }
        if !self.mouse_amp.is_finite() {
            anyhow::bail!("mouse_amp must be finite, got {}", self.mouse_amp);
        }
        if !self.height_compensation.is_finite() {
            anyhow::bail!(
                "height_compensation must be finite, got {}",
                self.height_compensation
            );
        }
        if !self.neighbor_weight.is_finite() || self.neighbor_weight < 0.0 {
            anyhow::bail!(
                "neighbor_weight must be a non-negative number, got {}",
                self.neighbor_weight
            );
        }
        Ok(())
    }

    /// Builds a config from element data attributes (`viscosity`, `mouse-size`,
    /// `mouse-amp`, `show-titles`, `main-title`, `sub-title`).
    ///
    /// Each attribute falls back to its default on its own when missing,
    /// unparsable or out of range, so the result always validates.
    pub fn from_dataset(data: &BTreeMap<String, String>) -> Self {
        let defaults = DriverConfig::default();

        let viscosity_constant = read_f32(data, "viscosity", defaults.viscosity_constant, |v| {
            v > 0.0 && v <= 1.0
        });
        let mouse_size = read_f32(data, "mouse-size", defaults.mouse_size, |v| v > 0.0);
        let mouse_amp = read_f32(data, "mouse-amp", defaults.mouse_amp, |_| true);

        // Only the literal "false" hides titles.
        let show_titles = data.get("show-titles").map_or(true, |v| v.trim() != "false");

        let main_title = non_empty(data.get("main-title"))
            .unwrap_or_else(|| DISCOVERED_MAIN_TITLE.to_string());
        let sub_title = non_empty(data.get("sub-title")).unwrap_or(defaults.sub_title);

        DriverConfig {
            viscosity_constant,
            mouse_size,
            mouse_amp,
            show_titles,
            main_title,
            sub_title,
            ..defaults
        }
    }
}

fn read_f32(
    data: &BTreeMap<String, String>,
    key: &str,
    default: f32,
    in_range: impl Fn(f32) -> bool,
) -> f32 {
    let Some(raw) = data.get(key) else {
        return default;
    };
    match raw.trim().parse::<f32>() {
        Ok(value) if value.is_finite() && in_range(value) => value,
        Ok(value) => {
            warn!("data-{} value {} is out of range, using {}", key, value, default);
            default
        }
        Err(_) => {
            warn!("data-{} value '{}' is not a number, using {}", key, raw, default);
            default
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_validate() {
        let config = DriverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.viscosity_constant, 0.98);
        assert_eq!(config.mouse_size, 15.0);
        assert_eq!(config.mouse_amp, 0.03);
        assert_eq!(config.main_title, "blue ink");
    }

    #[test]
    fn rejects_out_of_range_viscosity() {
        let mut config = DriverConfig::default();
        config.viscosity_constant = 0.0;
        assert!(config.validate().is_err());
        config.viscosity_constant = 1.5;
        assert!(config.validate().is_err());
        config.viscosity_constant = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_mouse_size() {
        let mut config = DriverConfig::default();
        config.mouse_size = 0.0;
        assert!(config.validate().is_err());
        config.mouse_size = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_dataset_uses_discovery_defaults() {
        let config = DriverConfig::from_dataset(&BTreeMap::new());
        assert_eq!(config.viscosity_constant, 0.98);
        assert_eq!(config.mouse_size, 15.0);
        assert!(config.show_titles);
        assert_eq!(config.main_title, DISCOVERED_MAIN_TITLE);
        assert_eq!(config.sub_title, DEFAULT_SUB_TITLE);
    }

    #[test]
    fn attributes_default_independently() {
        let config = DriverConfig::from_dataset(&dataset(&[
            ("viscosity", "not-a-number"),
            ("mouse-size", "42"),
            ("mouse-amp", "-0.5"),
            ("show-titles", "false"),
            ("main-title", "ink"),
        ]));
        assert_eq!(config.viscosity_constant, 0.98);
        assert_eq!(config.mouse_size, 42.0);
        assert_eq!(config.mouse_amp, -0.5);
        assert!(!config.show_titles);
        assert_eq!(config.main_title, "ink");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_attribute_falls_back() {
        let config = DriverConfig::from_dataset(&dataset(&[("viscosity", "3"), ("mouse-size", "-1")]));
        assert_eq!(config.viscosity_constant, 0.98);
        assert_eq!(config.mouse_size, 15.0);
    }

    #[test]
    fn partial_toml_table_fills_defaults() {
        let config: DriverConfig = toml::from_str("mouse_size = 30.0\nunknown_key = 1").unwrap();
        assert_eq!(config.mouse_size, 30.0);
        assert_eq!(config.viscosity_constant, 0.98);
    }
}
