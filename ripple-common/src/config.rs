use crate::shading::ShadingConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// Configuration for the frame loop of a headless run
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub total_frames: u64,
    pub record_interval_frames: u64,
    /// Seeds the idle orbit jitter. Unset means a fresh OS seed per driver.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// A page element that may host an effect. `data` holds its data attributes
/// without the `data-` prefix.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ElementConfig {
    pub id: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub left: f32,
    #[serde(default)]
    pub top: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// A scripted host event, fired before the frame with the same number runs.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputAction {
    /// Pointer position in page (client) coordinates.
    PointerMove { x: f32, y: f32 },
    PointerLeave,
    /// New container size in pixels.
    Resize { width: f32, height: f32 },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct InputEventConfig {
    pub frame: u64,
    pub element: String,
    #[serde(flatten)]
    pub action: InputAction,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_snapshots: bool,
    pub save_heights: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

/// Main run configuration, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RippleConfig {
    pub timing: TimingConfig,
    #[serde(default)]
    pub shading: ShadingConfig,
    #[serde(default)]
    pub elements: Vec<ElementConfig>,
    #[serde(default)]
    pub input: Vec<InputEventConfig>,
    pub output: OutputConfig,
}

impl RippleConfig {
    /// Loads the run configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let mut config: RippleConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        // Inputs fire in frame order; keep the file order for events sharing a frame.
        config.input.sort_by_key(|e| e.frame);
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.timing.total_frames == 0 {
            anyhow::bail!("total_frames must be greater than 0.");
        }

        let mut ids = HashSet::new();
        for element in &self.elements {
            if !ids.insert(element.id.as_str()) {
                anyhow::bail!("Duplicate element id '{}'.", element.id);
            }
            if !(element.width >= 0.0 && element.height >= 0.0) {
                anyhow::bail!("Element '{}' has a negative or invalid size.", element.id);
            }
        }

        for event in &self.input {
            if !ids.contains(event.element.as_str()) {
                anyhow::bail!(
                    "Input at frame {} targets unknown element '{}'.",
                    event.frame,
                    event.element
                );
            }
            if let InputAction::Resize { width, height } = event.action {
                if !(width >= 0.0 && height >= 0.0) {
                    anyhow::bail!("Resize at frame {} has a negative or invalid size.", event.frame);
                }
            }
        }
        Ok(())
    }

    pub fn element(&self, id: &str) -> Option<&ElementConfig> {
        self.elements.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[timing]
total_frames = 120
record_interval_frames = 10
seed = 7

[[elements]]
id = "hero"
classes = ["effect", "banner"]
left = 10.0
top = 20.0
width = 400.0
height = 300.0
data = { viscosity = "0.95", main-title = "ink" }

[[input]]
frame = 30
element = "hero"
kind = "pointer_leave"

[[input]]
frame = 5
element = "hero"
kind = "pointer_move"
x = 100.0
y = 120.0

[[input]]
frame = 60
element = "hero"
kind = "resize"
width = 200.0
height = 150.0

[output]
base_filename = "ripple"
save_snapshots = true
save_heights = false
format = "bincode"
"#;

    #[test]
    fn parses_full_config() {
        let config = RippleConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.timing.total_frames, 120);
        assert_eq!(config.timing.seed, Some(7));
        assert_eq!(config.shading, ShadingConfig::default());

        let hero = config.element("hero").unwrap();
        assert!(hero.classes.iter().any(|c| c == "effect"));
        assert_eq!(hero.data.get("main-title").map(String::as_str), Some("ink"));

        // Sorted by frame.
        let frames: Vec<u64> = config.input.iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![5, 30, 60]);
        assert_eq!(config.input[0].action, InputAction::PointerMove { x: 100.0, y: 120.0 });
        assert_eq!(config.input[1].action, InputAction::PointerLeave);
    }

    #[test]
    fn rejects_input_for_unknown_element() {
        let broken = SAMPLE.replace("element = \"hero\"\nkind = \"pointer_leave\"", "element = \"nope\"\nkind = \"pointer_leave\"");
        assert!(RippleConfig::from_toml_str(&broken).is_err());
    }

    #[test]
    fn rejects_zero_frames() {
        let broken = SAMPLE.replace("total_frames = 120", "total_frames = 0");
        assert!(RippleConfig::from_toml_str(&broken).is_err());
    }
}
