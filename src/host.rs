use crate::frame_clock::DriverId;
use ripple_common::ElementConfig;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// Bounding rectangle of a container in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// The element a driver draws into. Drivers only reference it.
pub trait Container {
    fn bounding_rect(&self) -> Rect;

    /// Inserts the overlay owned by `owner`.
    fn attach_overlay(&self, owner: DriverId);

    /// Removes the overlay owned by `owner`. Returns false if it was not attached.
    fn detach_overlay(&self, owner: DriverId) -> bool;
}

/// A page element loaded from the run configuration.
#[derive(Debug)]
pub struct PageElement {
    id: String,
    classes: Vec<String>,
    data: BTreeMap<String, String>,
    rect: Cell<Rect>,
    overlays: RefCell<Vec<DriverId>>,
}

impl PageElement {
    pub fn new(id: impl Into<String>, rect: Rect) -> Self {
        PageElement {
            id: id.into(),
            classes: Vec::new(),
            data: BTreeMap::new(),
            rect: Cell::new(rect),
            overlays: RefCell::new(Vec::new()),
        }
    }

    pub fn from_config(config: &ElementConfig) -> Self {
        PageElement {
            id: config.id.clone(),
            classes: config.classes.clone(),
            data: config.data.clone(),
            rect: Cell::new(Rect {
                left: config.left,
                top: config.top,
                width: config.width,
                height: config.height,
            }),
            overlays: RefCell::new(Vec::new()),
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_data(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Data attributes, keyed without the `data-` prefix.
    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    /// Changes the layout size, keeping the position.
    pub fn set_size(&self, width: f32, height: f32) {
        let mut rect = self.rect.get();
        rect.width = width;
        rect.height = height;
        self.rect.set(rect);
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.borrow().len()
    }
}

impl Container for PageElement {
    fn bounding_rect(&self) -> Rect {
        self.rect.get()
    }

    fn attach_overlay(&self, owner: DriverId) {
        self.overlays.borrow_mut().push(owner);
    }

    fn detach_overlay(&self, owner: DriverId) -> bool {
        let mut overlays = self.overlays.borrow_mut();
        match overlays.iter().position(|&o| o == owner) {
            Some(pos) => {
                overlays.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlays_attach_and_detach() {
        let element = PageElement::new("hero", Rect { width: 10.0, height: 10.0, ..Rect::default() });
        element.attach_overlay(4);
        assert_eq!(element.overlay_count(), 1);
        assert!(element.detach_overlay(4));
        assert!(!element.detach_overlay(4));
        assert_eq!(element.overlay_count(), 0);
    }

    #[test]
    fn resize_keeps_position() {
        let element = PageElement::new("hero", Rect { left: 5.0, top: 6.0, width: 10.0, height: 10.0 });
        element.set_size(30.0, 20.0);
        assert_eq!(element.bounding_rect(), Rect { left: 5.0, top: 6.0, width: 30.0, height: 20.0 });
    }
}
