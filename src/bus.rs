//! The shared bus between the CPU and memory.
//!
//! The bus only remembers the most recent transaction. Every change is
//! pushed synchronously to subscribers, in the order they subscribed.

use serde::{Serialize, Deserialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Control signal carried by a bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Control {
    /// Instruction or operand fetch.
    Fetch,
    /// Data read for LOAD/ADD/SUB.
    Read,
    /// Data write for STORE.
    Write,
    /// ACC presented by OUT.
    Out,
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Control::Fetch => "FETCH",
            Control::Read => "READ",
            Control::Write => "WRITE",
            Control::Out => "OUT",
        })
    }
}

/// Address/data/control triple. `None` means the line is idle.
///
/// Also used as the partial update passed to [`Bus::send`], where `None`
/// means "leave this field alone".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusState {
    pub address: Option<usize>,
    pub data: Option<u8>,
    pub control: Option<Control>,
}

impl BusState {
    /// A complete transaction.
    pub fn transaction(control: Control, address: usize, data: u8) -> Self {
        Self {
            address: Some(address),
            data: Some(data),
            control: Some(control),
        }
    }

    /// True when no line carries a value.
    pub fn is_idle(&self) -> bool {
        self.address.is_none() && self.data.is_none() && self.control.is_none()
    }
}

impl std::fmt::Display for BusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "{} addr={} data={}",
            opt(self.control),
            opt(self.address),
            opt(self.data)
        )
    }
}

/// Handle returned by [`Bus::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Observer = Rc<dyn Fn(&BusState)>;

/// The bus.
///
/// Interior mutability lets the CPU and any front end share one bus through
/// an `Rc` on a single thread.
#[derive(Default)]
pub struct Bus {
    state: Cell<BusState>,
    generation: Cell<u64>,
    next_id: Cell<u64>,
    observers: RefCell<Vec<(Subscription, Observer)>>,
}

impl Bus {
    /// Create an idle bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bus contents.
    pub fn state(&self) -> BusState {
        self.state.get()
    }

    /// Number of mutations so far. Changes on every `send` and `clear`.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Merge the fields present in `update` into the bus and notify.
    pub fn send(&self, update: BusState) {
        let mut state = self.state.get();
        if update.address.is_some() {
            state.address = update.address;
        }
        if update.data.is_some() {
            state.data = update.data;
        }
        if update.control.is_some() {
            state.control = update.control;
        }
        self.publish(state);
    }

    /// Reset every line to idle and notify.
    pub fn clear(&self) {
        self.publish(BusState::default());
    }

    /// Register an observer. It is called on every change, after all
    /// previously registered observers.
    pub fn subscribe(&self, observer: impl Fn(&BusState) + 'static) -> Subscription {
        let id = Subscription(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.observers.borrow_mut().push((id, Rc::new(observer)));
        id
    }

    /// Remove an observer. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(id, _)| *id != subscription);
        observers.len() != before
    }

    /// Number of registered observers.
    pub fn subscriber_count(&self) -> usize {
        self.observers.borrow().len()
    }

    fn publish(&self, state: BusState) {
        self.state.set(state);
        self.generation.set(self.generation.get() + 1);

        // Snapshot the list so observers may (un)subscribe while being notified.
        let observers: Vec<Observer> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();
        for observer in observers {
            observer(&state);
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("state", &self.state.get())
            .field("generation", &self.generation.get())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &Bus) -> (Subscription, Rc<RefCell<Vec<BusState>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = bus.subscribe(move |s| sink.borrow_mut().push(*s));
        (sub, seen)
    }

    #[test]
    fn test_send_notifies_with_full_state() {
        let bus = Bus::new();
        let (_, seen) = recorder(&bus);

        bus.send(BusState::transaction(Control::Fetch, 3, 1));

        assert_eq!(seen.borrow().as_slice(), &[BusState::transaction(Control::Fetch, 3, 1)]);
        assert_eq!(bus.state(), BusState::transaction(Control::Fetch, 3, 1));
    }

    #[test]
    fn test_partial_send_keeps_other_fields() {
        let bus = Bus::new();
        bus.send(BusState::transaction(Control::Read, 10, 7));
        bus.send(BusState { data: Some(9), ..BusState::default() });

        assert_eq!(bus.state(), BusState::transaction(Control::Read, 10, 9));
    }

    #[test]
    fn test_clear_resets_and_notifies() {
        let bus = Bus::new();
        let (_, seen) = recorder(&bus);
        bus.send(BusState::transaction(Control::Write, 1, 2));
        bus.clear();

        assert!(bus.state().is_idle());
        assert_eq!(seen.borrow().len(), 2);
        assert!(seen.borrow()[1].is_idle());
    }

    #[test]
    fn test_observers_called_in_registration_order() {
        let bus = Bus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in 0..3 {
            let order = Rc::clone(&order);
            bus.subscribe(move |_| order.borrow_mut().push(tag));
        }

        bus.clear();
        bus.clear();

        assert_eq!(*order.borrow(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = Bus::new();
        let (sub, seen) = recorder(&bus);
        bus.clear();

        assert!(bus.unsubscribe(sub));
        assert!(!bus.unsubscribe(sub));
        bus.clear();

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_generation_counts_mutations() {
        let bus = Bus::new();
        assert_eq!(bus.generation(), 0);
        bus.send(BusState::transaction(Control::Out, 0, 1));
        bus.clear();
        assert_eq!(bus.generation(), 2);
    }

    #[test]
    fn test_display() {
        let state = BusState::transaction(Control::Write, 12, 10);
        assert_eq!(state.to_string(), "WRITE addr=12 data=10");
        assert_eq!(BusState::default().to_string(), "- addr=- data=-");
    }
}
