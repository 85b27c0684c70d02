use crate::compute::{CpuGridCompute, GridCompute};
use crate::surface::{OverlaySurface, RenderSurface};
use anyhow::Result;
use ripple_common::ShadingConfig;

/// What a backend can provide. The effect needs both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub render_surface: bool,
    pub grid_compute: bool,
}

impl Capabilities {
    /// Name of the first missing capability, if any.
    pub fn missing(&self) -> Option<&'static str> {
        if !self.render_surface {
            Some("render surface")
        } else if !self.grid_compute {
            Some("grid compute")
        } else {
            None
        }
    }
}

/// Factory for the rendering and compute resources a driver owns.
pub trait Backend {
    fn capabilities(&self) -> Capabilities;

    fn create_surface(&self, width: u32, height: u32) -> Result<Box<dyn RenderSurface>>;

    fn create_compute(&self, width: u32, height: u32) -> Result<Box<dyn GridCompute>>;
}

/// Backend running everything on the CPU.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend {
    pub shading: ShadingConfig,
}

impl CpuBackend {
    pub fn new(shading: ShadingConfig) -> Self {
        CpuBackend { shading }
    }
}

impl Backend for CpuBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            render_surface: true,
            grid_compute: true,
        }
    }

    fn create_surface(&self, width: u32, height: u32) -> Result<Box<dyn RenderSurface>> {
        Ok(Box::new(OverlaySurface::new(width, height, self.shading)))
    }

    fn create_compute(&self, width: u32, height: u32) -> Result<Box<dyn GridCompute>> {
        Ok(Box::new(CpuGridCompute::new(width, height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_backend_is_complete() {
        let backend = CpuBackend::default();
        assert_eq!(backend.capabilities().missing(), None);
        let surface = backend.create_surface(8, 6).unwrap();
        assert_eq!(surface.size(), (8, 6));
        let compute = backend.create_compute(4, 3).unwrap();
        assert_eq!(compute.resolution(), (4, 3));
    }

    #[test]
    fn reports_first_missing_capability() {
        let caps = Capabilities { render_surface: true, grid_compute: false };
        assert_eq!(caps.missing(), Some("grid compute"));
        let caps = Capabilities { render_surface: false, grid_compute: false };
        assert_eq!(caps.missing(), Some("render surface"));
    }
}
