use ripple_common::{clamp, Vec2};
use rayon::prelude::*;
use std::f32::consts::PI;
use zerocopy::{Immutable, IntoBytes};

/// Heights above this magnitude re-arm a cell's activity flag.
pub const ACTIVITY_THRESHOLD: f32 = 0.1;
/// Activity lost per frame by a quiet cell.
pub const ACTIVITY_DECAY: f32 = 0.001;
const ACTIVITY_MAX: f32 = 100.0;

/// One cell of the height field, laid out like an RGBA32F texel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, IntoBytes, Immutable)]
pub struct Texel {
    pub height: f32,
    pub previous_height: f32,
    pub activity: f32,
    pub unused: f32,
}

/// A row-major grid of texels. Row 0 is the bottom edge.
#[derive(Debug, Clone)]
pub struct FieldTexture {
    width: u32,
    height: u32,
    texels: Vec<Texel>,
}

impl FieldTexture {
    /// Allocates a still field. Zero dimensions are clamped to 1.
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        FieldTexture {
            width,
            height,
            texels: vec![Texel::default(); (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[Texel] {
        &self.texels
    }

    #[inline(always)]
    fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    pub fn texel(&self, x: u32, y: u32) -> Texel {
        self.texels[self.idx(x, y)]
    }

    pub fn set_texel(&mut self, x: u32, y: u32, texel: Texel) {
        let idx = self.idx(x, y);
        self.texels[idx] = texel;
    }

    /// Height at a signed coordinate; anything outside the grid reads as still water.
    #[inline(always)]
    pub fn height_or_zero(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0.0;
        }
        self.texels[(y as usize) * (self.width as usize) + x as usize].height
    }

    /// Nearest texel for a texture coordinate in [0, 1].
    pub fn sample(&self, u: f32, v: f32) -> Texel {
        let x = ((u * self.width as f32) as i64).clamp(0, self.width as i64 - 1);
        let y = ((v * self.height as f32) as i64).clamp(0, self.height as i64 - 1);
        self.texels[self.idx(x as u32, y as u32)]
    }

    /// Raw RGBA32F bytes of the texture, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        self.texels.as_bytes()
    }
}

/// Smooth bump around the influence point: 2 at the centre, 0 at `radius` and beyond.
#[inline]
pub fn falloff(distance: f32, radius: f32) -> f32 {
    if distance >= radius {
        return 0.0;
    }
    clamp(distance * PI / radius, 0.0, PI).cos() + 1.0
}

/// Per-frame inputs of the height update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightmapUniforms {
    /// Influence point in container units, centre-relative, y down.
    pub mouse_pos: Vec2,
    pub mouse_size: f32,
    pub mouse_amp: f32,
    pub viscosity_constant: f32,
    pub neighbor_weight: f32,
    pub height_compensation: f32,
    /// Container size the field covers, in pixels.
    pub window_size: Vec2,
}

/// Parks the influence far outside any container.
pub const PARKED_INFLUENCE: Vec2 = Vec2 { x: 10000.0, y: 10000.0 };

/// Writes the next frame of `src` into `dst` (same dimensions).
///
/// Each output row is computed from `src` alone, so rows are written in parallel.
pub fn step_field(src: &FieldTexture, dst: &mut FieldTexture, uniforms: &HeightmapUniforms) {
    debug_assert_eq!(src.width, dst.width);
    debug_assert_eq!(src.height, dst.height);

    let width = src.width as usize;
    let grid_w = src.width as f32;
    let grid_h = src.height as f32;
    // The field's y axis points up, the pointer's points down.
    let influence = uniforms.mouse_pos.flip_y();

    dst.texels
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let yi = y as i64;
            let cell_y = ((y as f32 + 0.5) / grid_h - 0.5) * uniforms.window_size.y;
            for (x, out) in row.iter_mut().enumerate() {
                let xi = x as i64;
                let current = src.texels[y * width + x];

                let neighbours = src.height_or_zero(xi, yi + 1)
                    + src.height_or_zero(xi, yi - 1)
                    + src.height_or_zero(xi + 1, yi)
                    + src.height_or_zero(xi - 1, yi);
                let mut new_height = (neighbours * uniforms.neighbor_weight - current.previous_height)
                    * uniforms.viscosity_constant;

                let cell_x = ((x as f32 + 0.5) / grid_w - 0.5) * uniforms.window_size.x;
                let dist = Vec2::new(cell_x, cell_y).distance(influence);
                new_height += falloff(dist, uniforms.mouse_size) * uniforms.mouse_amp;

                let mut activity = current.activity;
                if new_height.abs() > ACTIVITY_THRESHOLD {
                    activity = 1.0;
                } else {
                    activity = clamp(activity - ACTIVITY_DECAY, 0.0, ACTIVITY_MAX);
                }

                *out = Texel {
                    height: new_height,
                    previous_height: current.height,
                    activity,
                    unused: current.unused,
                };
            }
        });
}

/// Grid dimensions for a container: half resolution, at least one cell per axis.
pub fn field_dimensions(width: f32, height: f32) -> (u32, u32) {
    let half = |v: f32| {
        if v.is_finite() && v > 0.0 {
            ((v / 2.0).floor() as u32).max(1)
        } else {
            1
        }
    };
    (half(width), half(height))
}
