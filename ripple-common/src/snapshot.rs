use crate::vecmath::Vec2;
use serde::{Deserialize, Serialize};

/// The field of one driver captured at a given frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSnapshot {
    /// Frames ticked by the driver when the snapshot was taken.
    pub frame: u64,
    /// Id of the page element the driver is mounted on.
    pub element_id: String,
    /// Container size in pixels.
    pub surface_width: f32,
    pub surface_height: f32,
    /// Grid dimensions (half the container size, at least 1).
    pub field_width: u32,
    pub field_height: u32,
    /// True while the idle orbit drives the influence point.
    pub idle: bool,
    /// Influence point in container units, centre-relative, y down.
    pub influence: Vec2,
    /// Row-major channels, row 0 at the bottom edge.
    pub height: Vec<f32>,
    pub previous_height: Vec<f32>,
    pub activity: Vec<f32>,
}

impl FieldSnapshot {
    /// Number of cells whose activity flag is still above zero.
    pub fn active_cells(&self) -> usize {
        self.activity.iter().filter(|&&a| a > 0.0).count()
    }

    /// Largest absolute height in the field.
    pub fn peak_height(&self) -> f32 {
        self.height.iter().fold(0.0f32, |acc, h| acc.max(h.abs()))
    }
}
