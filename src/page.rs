//! Page assembly: finds the elements tagged for the effect, mounts one driver
//! per element, routes host events to them and pumps the frame clock.

use crate::backend::Backend;
use crate::driver::FluidDriver;
use crate::frame_clock::{DriverId, FrameClock};
use crate::host::PageElement;
use log::{error, info, warn};
use ripple_common::{DriverConfig, InputAction};
use std::rc::Rc;

/// Class marking an element for the fluid effect.
pub const EFFECT_CLASS: &str = "effect";

struct Mounted {
    element: Rc<PageElement>,
    driver: FluidDriver,
}

pub struct EffectPage {
    backend: Rc<dyn Backend>,
    elements: Vec<Rc<PageElement>>,
    mounted: Vec<Mounted>,
    clock: FrameClock,
    seed: Option<u64>,
    loaded: bool,
}

impl EffectPage {
    pub fn new(backend: Rc<dyn Backend>, elements: Vec<PageElement>, seed: Option<u64>) -> Self {
        EffectPage {
            backend,
            elements: elements.into_iter().map(Rc::new).collect(),
            mounted: Vec::new(),
            clock: FrameClock::new(),
            seed,
            loaded: false,
        }
    }

    /// Mounts and starts a driver on every element carrying the effect class.
    ///
    /// Returns the number of drivers mounted. Runs once; later calls are no-ops.
    /// A backend missing a capability mounts nothing; a failing element is skipped.
    pub fn mount(&mut self) -> usize {
        if self.loaded {
            warn!("Effects already mounted; ignoring repeated mount");
            return 0;
        }
        self.loaded = true;

        if let Some(missing) = self.backend.capabilities().missing() {
            error!("{} is not available; fluid effects disabled", missing);
            return 0;
        }

        let candidates: Vec<Rc<PageElement>> = self
            .elements
            .iter()
            .filter(|e| e.has_class(EFFECT_CLASS))
            .cloned()
            .collect();

        for element in candidates {
            let id: DriverId = self.mounted.len();
            let config = DriverConfig::from_dataset(element.data());
            match FluidDriver::new(id, element.clone(), config, self.backend.clone(), self.seed) {
                Ok(mut driver) => {
                    driver.start(&mut self.clock);
                    self.mounted.push(Mounted { element, driver });
                }
                Err(e) => error!("Failed to mount fluid effect on '{}': {:#}", element.id(), e),
            }
        }

        info!(
            "Mounted {} fluid effect(s) across {} element(s)",
            self.mounted.len(),
            self.elements.len()
        );
        self.mounted.len()
    }

    /// Applies a host event to the driver mounted on `element_id`.
    ///
    /// Resizes also update the element's layout size first. Returns false when
    /// no driver is mounted there.
    pub fn dispatch(&mut self, element_id: &str, action: &InputAction) -> bool {
        let Some(mounted) = self.mounted.iter_mut().find(|m| m.element.id() == element_id) else {
            return false;
        };
        match *action {
            InputAction::PointerMove { x, y } => mounted.driver.on_pointer_move(x, y),
            InputAction::PointerLeave => mounted.driver.on_pointer_leave(),
            InputAction::Resize { width, height } => {
                mounted.element.set_size(width, height);
                if let Err(e) = mounted.driver.resize() {
                    error!("Resize of '{}' failed: {:#}", element_id, e);
                }
            }
        }
        true
    }

    /// Runs every frame callback that is due. Returns how many drivers ticked.
    pub fn run_frame(&mut self) -> usize {
        let mut ticked = 0;
        for (handle, owner) in self.clock.begin_frame() {
            if let Some(mounted) = self.mounted.get_mut(owner) {
                if mounted.driver.on_frame(handle, &mut self.clock) {
                    ticked += 1;
                }
            }
        }
        ticked
    }

    /// Destroys every mounted driver.
    pub fn teardown(&mut self) {
        for mounted in &mut self.mounted {
            mounted.driver.destroy(&mut self.clock);
        }
    }

    /// Mounted drivers with the id of their element.
    pub fn drivers(&self) -> impl Iterator<Item = (&str, &FluidDriver)> {
        self.mounted.iter().map(|m| (m.element.id(), &m.driver))
    }

    pub fn driver(&self, element_id: &str) -> Option<&FluidDriver> {
        self.mounted
            .iter()
            .find(|m| m.element.id() == element_id)
            .map(|m| &m.driver)
    }

    pub fn driver_mut(&mut self, element_id: &str) -> Option<&mut FluidDriver> {
        self.mounted
            .iter_mut()
            .find(|m| m.element.id() == element_id)
            .map(|m| &mut m.driver)
    }

    pub fn element(&self, element_id: &str) -> Option<&Rc<PageElement>> {
        self.elements.iter().find(|e| e.id() == element_id)
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }
}
