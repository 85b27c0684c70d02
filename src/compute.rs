use crate::field::{step_field, FieldTexture, HeightmapUniforms};
use anyhow::Result;
use log::{debug, warn};

/// The per-cell program a compute target runs every step.
#[derive(Debug, Clone)]
pub struct HeightmapProgram {
    pub uniforms: HeightmapUniforms,
    /// The program samples its own previous output.
    pub depends_on_self: bool,
}

/// Double-buffered grid computation: one variable, one program, stepped once per frame.
pub trait GridCompute {
    /// Grid dimensions (columns, rows).
    fn resolution(&self) -> (u32, u32);

    /// Registers the update program. Replaces any earlier registration.
    fn set_program(&mut self, program: HeightmapProgram);

    /// Checks the registration and allocates the buffers.
    fn init(&mut self) -> Result<()>;

    /// True once `init` has succeeded and until `dispose`.
    fn is_ready(&self) -> bool;

    /// Mutable access to the program inputs for the next step.
    fn uniforms_mut(&mut self) -> Option<&mut HeightmapUniforms>;

    /// Advances one frame. Does nothing when not ready.
    fn compute(&mut self);

    /// The field written by the last step, valid until the next `compute`.
    fn current(&self) -> &FieldTexture;

    /// Releases the buffers. Safe to call more than once.
    fn dispose(&mut self);
}

/// Runs the height update on the CPU, fanning rows out over rayon.
pub struct CpuGridCompute {
    width: u32,
    height: u32,
    program: Option<HeightmapProgram>,
    // Ping-pong buffers: `front` is the last output, `back` receives the next one.
    front: FieldTexture,
    back: FieldTexture,
    ready: bool,
    steps: u64,
}

impl CpuGridCompute {
    pub fn new(width: u32, height: u32) -> Self {
        CpuGridCompute {
            width,
            height,
            program: None,
            front: FieldTexture::new(width, height),
            back: FieldTexture::new(width, height),
            ready: false,
            steps: 0,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Swaps the input and output buffers.
    fn swap_buffers(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }
}

impl GridCompute for CpuGridCompute {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_program(&mut self, program: HeightmapProgram) {
        self.program = Some(program);
        self.ready = false;
    }

    fn init(&mut self) -> Result<()> {
        let Some(program) = &self.program else {
            anyhow::bail!("no heightmap program registered");
        };
        if !program.depends_on_self {
            anyhow::bail!("heightmap program must declare a dependency on its own output");
        }
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("compute target {}x{} has no cells", self.width, self.height);
        }
        self.front = FieldTexture::new(self.width, self.height);
        self.back = FieldTexture::new(self.width, self.height);
        self.ready = true;
        debug!("Grid compute ready at {}x{}", self.width, self.height);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn uniforms_mut(&mut self) -> Option<&mut HeightmapUniforms> {
        self.program.as_mut().map(|p| &mut p.uniforms)
    }

    fn compute(&mut self) {
        if !self.ready {
            return;
        }
        let Some(program) = &self.program else {
            warn!("compute called without a program");
            return;
        };
        step_field(&self.front, &mut self.back, &program.uniforms);
        self.swap_buffers();
        self.steps += 1;
    }

    fn current(&self) -> &FieldTexture {
        &self.front
    }

    fn dispose(&mut self) {
        if !self.ready && self.program.is_none() {
            return;
        }
        self.ready = false;
        self.program = None;
        self.front = FieldTexture::new(1, 1);
        self.back = FieldTexture::new(1, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::PARKED_INFLUENCE;
    use ripple_common::Vec2;

    fn program(depends_on_self: bool) -> HeightmapProgram {
        HeightmapProgram {
            uniforms: HeightmapUniforms {
                mouse_pos: PARKED_INFLUENCE,
                mouse_size: 15.0,
                mouse_amp: 0.03,
                viscosity_constant: 0.98,
                neighbor_weight: 0.49,
                height_compensation: 0.1,
                window_size: Vec2::new(40.0, 40.0),
            },
            depends_on_self,
        }
    }

    #[test]
    fn init_requires_self_dependency() {
        let mut compute = CpuGridCompute::new(20, 20);
        assert!(compute.init().is_err());

        compute.set_program(program(false));
        assert!(compute.init().is_err());
        assert!(!compute.is_ready());

        compute.set_program(program(true));
        assert!(compute.init().is_ok());
        assert!(compute.is_ready());
    }

    #[test]
    fn compute_is_skipped_until_ready() {
        let mut compute = CpuGridCompute::new(20, 20);
        compute.set_program(program(true));
        compute.compute();
        assert_eq!(compute.steps(), 0);

        compute.init().unwrap();
        compute.uniforms_mut().unwrap().mouse_pos = Vec2::zero();
        compute.compute();
        assert_eq!(compute.steps(), 1);
        assert!(compute.current().texel(10, 10).height > 0.0);
    }

    #[test]
    fn steps_alternate_buffers() {
        let mut compute = CpuGridCompute::new(20, 20);
        compute.set_program(program(true));
        compute.init().unwrap();
        compute.uniforms_mut().unwrap().mouse_pos = Vec2::zero();
        compute.compute();
        let first = compute.current().texel(10, 10);
        compute.compute();
        let second = compute.current().texel(10, 10);
        assert_eq!(second.previous_height, first.height);
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut compute = CpuGridCompute::new(8, 8);
        compute.set_program(program(true));
        compute.init().unwrap();
        compute.dispose();
        compute.dispose();
        assert!(!compute.is_ready());
        assert!(compute.uniforms_mut().is_none());
    }
}
