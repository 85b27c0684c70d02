pub mod config;
pub mod options;
pub mod shading;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{ElementConfig, InputAction, InputEventConfig, OutputConfig, RippleConfig, TimingConfig};
pub use options::DriverConfig;
pub use shading::ShadingConfig;
pub use snapshot::FieldSnapshot;
pub use vecmath::{clamp, Vec2};
