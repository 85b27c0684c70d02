use serde::{Deserialize, Serialize};

/// Colour coefficients of the ripple overlay.
///
/// Red and green follow the texel's previous-height channel, blue follows the
/// current height, alpha is constant.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ShadingConfig {
    pub red_gain: f32,
    pub green_gain: f32,
    pub blue_gain: f32,
    pub alpha: f32,
}

impl Default for ShadingConfig {
    fn default() -> Self {
        ShadingConfig {
            red_gain: 1.65,
            green_gain: 1.5,
            blue_gain: 1.0,
            alpha: 0.1,
        }
    }
}

impl ShadingConfig {
    /// Maps one texel to an unclamped RGBA colour.
    #[inline]
    pub fn shade(&self, height: f32, previous_height: f32) -> [f32; 4] {
        let h = previous_height.abs();
        [
            self.red_gain * h,
            self.green_gain * h,
            self.blue_gain * height.abs(),
            self.alpha,
        ]
    }

    /// Blends a shaded texel over an opaque background, both in 0..1 sRGB.
    pub fn composite(&self, color: [f32; 4], background: [f32; 3]) -> [f32; 3] {
        let a = color[3].clamp(0.0, 1.0);
        let mut out = [0.0; 3];
        for c in 0..3 {
            out[c] = color[c].clamp(0.0, 1.0) * a + background[c] * (1.0 - a);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn still_water_is_transparent_black() {
        let shading = ShadingConfig::default();
        assert_eq!(shading.shade(0.0, 0.0), [0.0, 0.0, 0.0, 0.1]);
    }

    #[test]
    fn channels_follow_fixed_coefficients() {
        let shading = ShadingConfig::default();
        let [r, g, b, a] = shading.shade(-0.5, -0.2);
        assert!((r - 0.33).abs() < 1e-6);
        assert!((g - 0.3).abs() < 1e-6);
        assert!((b - 0.5).abs() < 1e-6);
        assert_eq!(a, 0.1);
    }

    #[test]
    fn composite_keeps_background_mostly() {
        let shading = ShadingConfig::default();
        let out = shading.composite([1.0, 1.0, 1.0, 0.1], [0.0, 0.0, 0.0]);
        for c in out {
            assert!((c - 0.1).abs() < 1e-6);
        }
        // Over-bright channels clamp before blending.
        let out = shading.composite([5.0, 0.0, 0.0, 0.1], [1.0, 1.0, 1.0]);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] - 0.9).abs() < 1e-6);
    }
}
