//! The fluid driver: owns one effect instance and everything it simulates.
//!
//! A driver measures its container, keeps a half-resolution height field
//! stepping once per frame, steers the influence point from pointer input or
//! an idle orbit, and hands each new field to its render surface.

use crate::backend::Backend;
use crate::compute::{GridCompute, HeightmapProgram};
use crate::field::{field_dimensions, HeightmapUniforms, PARKED_INFLUENCE};
use crate::frame_clock::{DriverId, FrameClock, FrameHandle};
use crate::host::Container;
use crate::surface::RenderSurface;
use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use rand::prelude::*;
use ripple_common::{DriverConfig, FieldSnapshot, Vec2};
use std::rc::Rc;

/// Upper bound of the random phase step of the idle orbit, per frame.
const IDLE_PHASE_STEP: f32 = 0.02;

/// Last known pointer influence, container-local and centre-relative (y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    pub position: Vec2,
    pub idle: bool,
}

impl Default for PointerState {
    fn default() -> Self {
        PointerState {
            position: PARKED_INFLUENCE,
            idle: true,
        }
    }
}

/// Synthesizes an elliptical influence path while nobody is pointing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IdleDriver {
    phase: f32,
}

impl IdleDriver {
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Moves the phase forward by a random amount in [0, 0.02).
    pub fn advance<R: Rng>(&mut self, rng: &mut R) {
        self.phase += IDLE_PHASE_STEP * rng.random::<f32>();
    }

    /// Orbit position for a container; its magnitude stays within a quarter of the smaller side.
    pub fn position(&self, width: f32, height: f32) -> Vec2 {
        let max_dimension = (width.min(height) / 2.0).max(0.0);
        Vec2::new(
            max_dimension * 0.5 * self.phase.cos(),
            max_dimension * 0.25 * self.phase.sin(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built but no frame requested yet, or stopped.
    Stopped,
    Running,
    Destroyed,
}

pub struct FluidDriver {
    id: DriverId,
    config: DriverConfig,
    container: Rc<dyn Container>,
    backend: Rc<dyn Backend>,
    width: f32,
    height: f32,
    surface: Box<dyn RenderSurface>,
    compute: Box<dyn GridCompute>,
    pointer: PointerState,
    idle: IdleDriver,
    influence: Vec2,
    rng: StdRng,
    lifecycle: Lifecycle,
    pending_frame: Option<FrameHandle>,
    frames: u64,
}

impl FluidDriver {
    /// Builds the surface and field for `container`. The driver starts idle and stopped.
    ///
    /// Fails on an invalid config or when the backend cannot create a resource.
    /// A compute target that fails to initialize is logged and leaves the driver degraded.
    pub fn new(
        id: DriverId,
        container: Rc<dyn Container>,
        config: DriverConfig,
        backend: Rc<dyn Backend>,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate().context("invalid fluid driver config")?;

        let rect = container.bounding_rect();
        let (width, height) = (rect.width, rect.height);

        let surface = backend
            .create_surface(pixel_size(width), pixel_size(height))
            .context("failed to create render surface")?;
        let pointer = PointerState::default();
        let compute = build_compute(backend.as_ref(), &config, width, height, pointer.position)?;

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_os_rng(),
        };

        container.attach_overlay(id);
        let (grid_w, grid_h) = compute.resolution();
        info!(
            "Driver {} mounted on {:.0}x{:.0} container ({}x{} field)",
            id, width, height, grid_w, grid_h
        );
        debug!("Driver {} config: {:#?}", id, config);

        Ok(FluidDriver {
            id,
            config,
            container,
            backend,
            width,
            height,
            surface,
            compute,
            pointer,
            idle: IdleDriver::default(),
            influence: pointer.position,
            rng,
            lifecycle: Lifecycle::Stopped,
            pending_frame: None,
            frames: 0,
        })
    }

    /// Requests the first frame. Each frame then requests the next until `stop` or `destroy`.
    pub fn start(&mut self, clock: &mut FrameClock) {
        match self.lifecycle {
            Lifecycle::Destroyed => warn!("Driver {} is destroyed and cannot start", self.id),
            Lifecycle::Running => {}
            Lifecycle::Stopped => {
                self.lifecycle = Lifecycle::Running;
                self.pending_frame = Some(clock.request_frame(self.id));
            }
        }
    }

    /// Cancels the pending frame; no tick runs until `start` is called again.
    pub fn stop(&mut self, clock: &mut FrameClock) {
        if let Some(handle) = self.pending_frame.take() {
            clock.cancel_frame(handle);
        }
        if self.lifecycle == Lifecycle::Running {
            self.lifecycle = Lifecycle::Stopped;
        }
    }

    /// Frame callback. Runs one tick and requests the next frame.
    ///
    /// Returns false, without ticking or scheduling, for any handle other than
    /// the one this driver is waiting on.
    pub fn on_frame(&mut self, handle: FrameHandle, clock: &mut FrameClock) -> bool {
        if self.lifecycle != Lifecycle::Running || self.pending_frame != Some(handle) {
            trace!("Driver {} ignored stale frame {:?}", self.id, handle);
            return false;
        }
        self.pending_frame = None;
        self.tick();
        self.pending_frame = Some(clock.request_frame(self.id));
        true
    }

    /// Advances the simulation by one frame and redraws.
    pub fn tick(&mut self) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        self.influence = if self.pointer.idle {
            self.idle.advance(&mut self.rng);
            self.idle.position(self.width, self.height)
        } else {
            self.pointer.position
        };

        if let Some(uniforms) = self.compute.uniforms_mut() {
            uniforms.mouse_pos = self.influence;
        }

        if self.compute.is_ready() {
            self.compute.compute();
            self.surface.draw(self.compute.current());
        } else {
            self.surface.clear();
        }
        self.frames += 1;
    }

    /// Pointer moved over the container, in page coordinates.
    pub fn on_pointer_move(&mut self, client_x: f32, client_y: f32) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        let rect = self.container.bounding_rect();
        self.pointer = PointerState {
            position: Vec2::new(
                client_x - rect.left - self.width / 2.0,
                client_y - rect.top - self.height / 2.0,
            ),
            idle: false,
        };
    }

    /// Pointer left the container; the idle orbit takes over on the next tick.
    pub fn on_pointer_leave(&mut self) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        self.pointer.idle = true;
    }

    /// Re-measures the container and rebuilds surface and field at the new size.
    ///
    /// Field content is discarded; pointer and idle state carry over.
    pub fn resize(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Destroyed {
            return Ok(());
        }
        let rect = self.container.bounding_rect();
        let (width, height) = (rect.width, rect.height);

        let surface = self
            .backend
            .create_surface(pixel_size(width), pixel_size(height))
            .context("failed to recreate render surface")?;
        let compute = build_compute(self.backend.as_ref(), &self.config, width, height, self.influence)?;

        self.surface.dispose();
        self.compute.dispose();
        self.surface = surface;
        self.compute = compute;
        self.width = width;
        self.height = height;

        let (grid_w, grid_h) = self.compute.resolution();
        info!(
            "Driver {} resized to {:.0}x{:.0} ({}x{} field)",
            self.id, width, height, grid_w, grid_h
        );
        Ok(())
    }

    /// Stops the loop, releases resources and removes the overlay. Repeated calls do nothing.
    pub fn destroy(&mut self, clock: &mut FrameClock) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        self.stop(clock);
        self.compute.dispose();
        self.surface.dispose();
        if !self.container.detach_overlay(self.id) {
            warn!("Driver {} overlay was already detached", self.id);
        }
        self.lifecycle = Lifecycle::Destroyed;
        info!("Driver {} destroyed after {} frames", self.id, self.frames);
    }

    /// Copies the current field out for recording.
    pub fn snapshot(&self, element_id: &str) -> FieldSnapshot {
        let field = self.compute.current();
        let texels = field.texels();
        FieldSnapshot {
            frame: self.frames,
            element_id: element_id.to_string(),
            surface_width: self.width,
            surface_height: self.height,
            field_width: field.width(),
            field_height: field.height(),
            idle: self.pointer.idle,
            influence: self.influence,
            height: texels.iter().map(|t| t.height).collect(),
            previous_height: texels.iter().map(|t| t.previous_height).collect(),
            activity: texels.iter().map(|t| t.activity).collect(),
        }
    }

    pub fn id(&self) -> DriverId {
        self.id
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_idle(&self) -> bool {
        self.pointer.idle
    }

    pub fn pointer(&self) -> PointerState {
        self.pointer
    }

    pub fn idle_driver(&self) -> IdleDriver {
        self.idle
    }

    /// Influence point used by the last tick.
    pub fn influence(&self) -> Vec2 {
        self.influence
    }

    pub fn field_dimensions(&self) -> (u32, u32) {
        self.compute.resolution()
    }

    pub fn surface(&self) -> &dyn RenderSurface {
        self.surface.as_ref()
    }

    pub fn compute(&self) -> &dyn GridCompute {
        self.compute.as_ref()
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending_frame.is_some()
    }

    /// True when the compute target failed to initialize and frames are skipped.
    pub fn is_degraded(&self) -> bool {
        !self.compute.is_ready()
    }
}

/// Creates and initializes the half-resolution compute target for a container.
fn build_compute(
    backend: &dyn Backend,
    config: &DriverConfig,
    width: f32,
    height: f32,
    influence: Vec2,
) -> Result<Box<dyn GridCompute>> {
    let (grid_w, grid_h) = field_dimensions(width, height);
    let mut compute = backend
        .create_compute(grid_w, grid_h)
        .context("failed to create grid compute")?;

    compute.set_program(HeightmapProgram {
        uniforms: HeightmapUniforms {
            mouse_pos: influence,
            mouse_size: config.mouse_size,
            mouse_amp: config.mouse_amp,
            viscosity_constant: config.viscosity_constant,
            neighbor_weight: config.neighbor_weight,
            height_compensation: config.height_compensation,
            window_size: Vec2::new(width.max(0.0), height.max(0.0)),
        },
        depends_on_self: true,
    });

    if let Err(e) = compute.init() {
        error!("compute init error: {:#}", e);
    }
    Ok(compute)
}

fn pixel_size(v: f32) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.round() as u32
    } else {
        0
    }
}
