use crate::field::FieldTexture;
use ripple_common::ShadingConfig;
use rayon::prelude::*;

/// World units per container pixel along the camera's vertical axis.
const PIXELS_PER_UNIT: f32 = 200.0;

/// Orthographic projection framing the container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthoCamera {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
    pub z: f32,
}

impl OrthoCamera {
    /// Sizes the view from the container's aspect ratio. Degenerate sizes count as 1 pixel.
    pub fn for_container(width: f32, height: f32) -> Self {
        let width = if width.is_finite() && width > 0.0 { width } else { 1.0 };
        let height = if height.is_finite() && height > 0.0 { height } else { 1.0 };
        let aspect_ratio = width / height;
        let cam_height = height / PIXELS_PER_UNIT;
        let cam_width = cam_height * aspect_ratio;
        OrthoCamera {
            left: -cam_width / 2.0,
            right: cam_width / 2.0,
            top: cam_height / 2.0,
            bottom: -cam_height / 2.0,
            near: 0.1,
            far: 100.0,
            z: 5.0,
        }
    }

    pub fn view_width(&self) -> f32 {
        self.right - self.left
    }

    pub fn view_height(&self) -> f32 {
        self.top - self.bottom
    }
}

/// Where the shaded field ends up each frame.
pub trait RenderSurface {
    fn size(&self) -> (u32, u32);

    /// Resizes the target and reframes the camera.
    fn set_size(&mut self, width: u32, height: u32);

    fn camera(&self) -> &OrthoCamera;

    /// Composites a full-surface quad shaded by `field`.
    fn draw(&mut self, field: &FieldTexture);

    /// Wipes the target to transparent.
    fn clear(&mut self);

    /// Number of frames composited so far.
    fn frames_drawn(&self) -> u64;

    /// Number of times the target was wiped.
    fn clears(&self) -> u64;

    /// Releases the target. Safe to call more than once.
    fn dispose(&mut self);
}

/// CPU render target holding the last shaded overlay as RGBA floats.
pub struct OverlaySurface {
    width: u32,
    height: u32,
    camera: OrthoCamera,
    shading: ShadingConfig,
    pixels: Vec<[f32; 4]>,
    frames_drawn: u64,
    clears: u64,
    disposed: bool,
}

impl OverlaySurface {
    pub fn new(width: u32, height: u32, shading: ShadingConfig) -> Self {
        OverlaySurface {
            width,
            height,
            camera: OrthoCamera::for_container(width as f32, height as f32),
            shading,
            pixels: vec![[0.0; 4]; (width as usize) * (height as usize)],
            frames_drawn: 0,
            clears: 0,
            disposed: false,
        }
    }

    /// Row-major pixels, row 0 at the top of the container.
    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl RenderSurface for OverlaySurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.camera = OrthoCamera::for_container(width as f32, height as f32);
        self.pixels = vec![[0.0; 4]; (width as usize) * (height as usize)];
    }

    fn camera(&self) -> &OrthoCamera {
        &self.camera
    }

    fn draw(&mut self, field: &FieldTexture) {
        if self.disposed || self.width == 0 || self.height == 0 {
            return;
        }
        let width = self.width as usize;
        let inv_w = 1.0 / self.width as f32;
        let inv_h = 1.0 / self.height as f32;
        let surface_h = self.height as usize;
        let shading = self.shading;

        self.pixels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, out)| {
                // Fragment coordinates count rows from the bottom.
                let v = ((surface_h - 1 - row) as f32 + 0.5) * inv_h;
                for (col, pixel) in out.iter_mut().enumerate() {
                    let u = (col as f32 + 0.5) * inv_w;
                    let texel = field.sample(u, v);
                    *pixel = shading.shade(texel.height, texel.previous_height);
                }
            });
        self.frames_drawn += 1;
    }

    fn clear(&mut self) {
        self.pixels.iter_mut().for_each(|p| *p = [0.0; 4]);
        self.clears += 1;
    }

    fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    fn clears(&self) -> u64 {
        self.clears
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.pixels = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Texel;

    #[test]
    fn camera_follows_aspect_ratio() {
        let camera = OrthoCamera::for_container(800.0, 400.0);
        assert!((camera.view_height() - 2.0).abs() < 1e-6);
        assert!((camera.view_width() - 4.0).abs() < 1e-6);
        assert_eq!(camera.left, -camera.right);
        assert_eq!(camera.z, 5.0);
    }

    #[test]
    fn camera_survives_zero_size() {
        let camera = OrthoCamera::for_container(0.0, 0.0);
        assert!(camera.view_width().is_finite());
        assert!(camera.view_height() > 0.0);
    }

    #[test]
    fn draw_shades_every_pixel() {
        let mut field = FieldTexture::new(2, 2);
        // Bottom-left texel.
        field.set_texel(0, 0, Texel { height: 0.5, previous_height: 0.2, ..Texel::default() });
        let mut surface = OverlaySurface::new(4, 4, ShadingConfig::default());
        surface.draw(&field);

        assert_eq!(surface.frames_drawn(), 1);
        // Bottom-left pixel is in the last row of the top-down buffer.
        let bottom_left = surface.pixels()[3 * 4];
        assert!((bottom_left[0] - 0.33).abs() < 1e-6);
        assert!((bottom_left[2] - 0.5).abs() < 1e-6);
        let top_right = surface.pixels()[3];
        assert_eq!(top_right, [0.0, 0.0, 0.0, 0.1]);
    }

    #[test]
    fn resize_reallocates_target() {
        let mut surface = OverlaySurface::new(4, 4, ShadingConfig::default());
        surface.set_size(10, 6);
        assert_eq!(surface.size(), (10, 6));
        assert_eq!(surface.pixels().len(), 60);
        surface.set_size(0, 0);
        surface.draw(&FieldTexture::new(1, 1));
        assert_eq!(surface.frames_drawn(), 0);
    }

    #[test]
    fn clear_wipes_to_transparent() {
        let mut field = FieldTexture::new(1, 1);
        field.set_texel(0, 0, Texel { height: 0.5, ..Texel::default() });
        let mut surface = OverlaySurface::new(2, 2, ShadingConfig::default());
        surface.draw(&field);
        surface.clear();
        assert_eq!(surface.clears(), 1);
        assert_eq!(surface.frames_drawn(), 1);
        assert!(surface.pixels().iter().all(|p| *p == [0.0; 4]));
    }

    #[test]
    fn dispose_stops_drawing() {
        let mut surface = OverlaySurface::new(4, 4, ShadingConfig::default());
        surface.dispose();
        surface.dispose();
        surface.draw(&FieldTexture::new(2, 2));
        assert!(surface.is_disposed());
        assert_eq!(surface.frames_drawn(), 0);
    }
}
