//! When to clear the bus after a step.
//!
//! Architecturally the bus is cleared as soon as a step finishes. Visual
//! front ends want the last transaction to linger briefly, so the clear is
//! routed through a [`ClearScheduler`] that can postpone it.

use crate::bus::Bus;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Decides when the post-step bus clear happens.
pub trait ClearScheduler {
    /// Called once at the end of every executed step.
    fn schedule(&mut self, bus: &Bus);

    /// Drop any clear that has not happened yet.
    fn cancel(&mut self) {}
}

/// Clears the bus right away.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateClear;

impl ClearScheduler for ImmediateClear {
    fn schedule(&mut self, bus: &Bus) {
        bus.clear();
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingClear {
    due: Instant,
    generation: u64,
}

/// Clears the bus after a delay, when polled.
///
/// A pending clear is dropped if anything else touched the bus in the
/// meantime: a newer transaction always wins over a stale clear.
#[derive(Debug, Clone)]
pub struct DeferredClear {
    delay: Duration,
    pending: Option<PendingClear>,
}

impl DeferredClear {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Arm a clear relative to `now`.
    pub fn schedule_at(&mut self, bus: &Bus, now: Instant) {
        self.pending = Some(PendingClear {
            due: now + self.delay,
            generation: bus.generation(),
        });
    }

    /// Fire the pending clear if it is due. Returns true if the bus was cleared.
    pub fn poll(&mut self, bus: &Bus, now: Instant) -> bool {
        match self.pending {
            Some(pending) if now >= pending.due => {
                self.pending = None;
                if bus.generation() == pending.generation {
                    bus.clear();
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

impl ClearScheduler for DeferredClear {
    fn schedule(&mut self, bus: &Bus) {
        self.schedule_at(bus, Instant::now());
    }

    fn cancel(&mut self) {
        self.pending = None;
    }
}

impl<T: ClearScheduler> ClearScheduler for Rc<RefCell<T>> {
    fn schedule(&mut self, bus: &Bus) {
        self.borrow_mut().schedule(bus);
    }

    fn cancel(&mut self) {
        self.borrow_mut().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusState, Control};

    #[test]
    fn test_immediate_clear() {
        let bus = Bus::new();
        bus.send(BusState::transaction(Control::Read, 1, 1));
        ImmediateClear.schedule(&bus);
        assert!(bus.state().is_idle());
    }

    #[test]
    fn test_deferred_clear_waits_for_delay() {
        let bus = Bus::new();
        let mut clear = DeferredClear::new(Duration::from_millis(100));
        let t0 = Instant::now();

        bus.send(BusState::transaction(Control::Read, 1, 1));
        clear.schedule_at(&bus, t0);

        assert!(!clear.poll(&bus, t0 + Duration::from_millis(50)));
        assert!(!bus.state().is_idle());
        assert!(clear.poll(&bus, t0 + Duration::from_millis(100)));
        assert!(bus.state().is_idle());
        assert!(!clear.is_pending());
    }

    #[test]
    fn test_deferred_clear_superseded_by_new_send() {
        let bus = Bus::new();
        let mut clear = DeferredClear::new(Duration::from_millis(10));
        let t0 = Instant::now();

        bus.send(BusState::transaction(Control::Read, 1, 1));
        clear.schedule_at(&bus, t0);
        bus.send(BusState::transaction(Control::Fetch, 2, 0));

        assert!(!clear.poll(&bus, t0 + Duration::from_secs(1)));
        assert_eq!(bus.state(), BusState::transaction(Control::Fetch, 2, 0));
    }

    #[test]
    fn test_cancel_through_shared_handle() {
        let bus = Bus::new();
        let shared = Rc::new(RefCell::new(DeferredClear::new(Duration::ZERO)));
        let mut handle = Rc::clone(&shared);

        bus.send(BusState::transaction(Control::Write, 0, 0));
        handle.schedule(&bus);
        assert!(shared.borrow().is_pending());

        handle.cancel();
        assert!(!shared.borrow_mut().poll(&bus, Instant::now()));
        assert!(!bus.state().is_idle());
    }
}
