use std::collections::BTreeMap;

/// Identifies a driver on the page.
pub type DriverId = usize;

/// A pending frame request. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameHandle(u64);

/// Host-side stand-in for the display's animation-frame queue.
///
/// Callbacks requested during a frame run on the next one, never the current.
#[derive(Debug, Default)]
pub struct FrameClock {
    next_handle: u64,
    pending: BTreeMap<FrameHandle, DriverId>,
    frame: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a callback for `owner` on the next frame.
    pub fn request_frame(&mut self, owner: DriverId) -> FrameHandle {
        let handle = FrameHandle(self.next_handle);
        self.next_handle += 1;
        self.pending.insert(handle, owner);
        handle
    }

    /// Drops a queued callback. Returns false if it already ran or was cancelled.
    pub fn cancel_frame(&mut self, handle: FrameHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    /// Takes every callback due this frame, in request order.
    pub fn begin_frame(&mut self) -> Vec<(FrameHandle, DriverId)> {
        self.frame += 1;
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, handle: FrameHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Frames begun so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_run_once_in_order() {
        let mut clock = FrameClock::new();
        let a = clock.request_frame(3);
        let b = clock.request_frame(1);
        assert_eq!(clock.begin_frame(), vec![(a, 3), (b, 1)]);
        assert!(clock.begin_frame().is_empty());
        assert_eq!(clock.frame(), 2);
    }

    #[test]
    fn cancelled_requests_never_run() {
        let mut clock = FrameClock::new();
        let a = clock.request_frame(0);
        assert!(clock.cancel_frame(a));
        assert!(!clock.cancel_frame(a));
        assert_eq!(clock.pending_count(), 0);
        assert!(clock.begin_frame().is_empty());
    }

    #[test]
    fn handles_are_unique() {
        let mut clock = FrameClock::new();
        let a = clock.request_frame(0);
        clock.begin_frame();
        let b = clock.request_frame(0);
        assert_ne!(a, b);
        assert!(clock.is_pending(b));
        assert!(!clock.is_pending(a));
    }
}
