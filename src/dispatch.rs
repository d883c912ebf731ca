//! Observer lists with a cached last value.
//!
//! Listeners live on the frame thread. A late subscriber is immediately
//! replayed the most recent value, so it never has to wait a frame to learn
//! the current state.

use crate::headset::{RecenterEvent, SafetyRegionEvent};
use crate::sample::{AccelSample, ButtonSample, GyroSample, MotionSample, OrientationSample, RawSample};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;

/// Handle returned by [`Listeners::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Box<dyn FnMut(&T)>;

/// Subscribers for one category of value.
///
/// Subscribing or unsubscribing from inside a callback is allowed; the change
/// takes effect from the next notification.
pub struct Listeners<T> {
    current: RefCell<Option<T>>,
    subscribers: RefCell<Vec<(SubscriptionId, Callback<T>)>>,
    pending: RefCell<Vec<(SubscriptionId, Callback<T>)>>,
    /// Ids of `subscribers` still live; removals during a dispatch land here first.
    registered: RefCell<HashSet<SubscriptionId>>,
    next_id: Cell<u64>,
    dispatch_depth: Cell<u32>,
}

impl<T: Clone> Listeners<T> {
    pub fn new() -> Self {
        Listeners {
            current: RefCell::new(None),
            subscribers: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            registered: RefCell::new(HashSet::new()),
            next_id: Cell::new(0),
            dispatch_depth: Cell::new(0),
        }
    }

    /// Register `callback`. If a value has been published, it is replayed
    /// synchronously before this returns.
    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> SubscriptionId {
        let mut callback: Callback<T> = Box::new(callback);
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let replay = self.current.borrow().clone();
        if let Some(value) = replay {
            callback(&value);
        }

        if self.dispatch_depth.get() > 0 {
            self.pending.borrow_mut().push((id, callback));
        } else {
            self.subscribers.borrow_mut().push((id, callback));
            self.registered.borrow_mut().insert(id);
        }
        id
    }

    /// Remove a subscriber. Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut pending = self.pending.borrow_mut();
        if let Some(pos) = pending.iter().position(|(sid, _)| *sid == id) {
            pending.remove(pos);
            return true;
        }
        drop(pending);

        if !self.registered.borrow_mut().remove(&id) {
            return false;
        }
        // Mid-dispatch the list is checked out; it is pruned when the dispatch ends.
        if self.dispatch_depth.get() == 0 {
            self.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
        }
        true
    }

    /// Cache `value`, then hand it to every subscriber in subscription order.
    pub fn notify(&self, value: T) {
        *self.current.borrow_mut() = Some(value.clone());

        let mut active = std::mem::take(&mut *self.subscribers.borrow_mut());
        self.dispatch_depth.set(self.dispatch_depth.get() + 1);
        for (id, callback) in active.iter_mut() {
            if !self.registered.borrow().contains(id) {
                continue;
            }
            callback(&value);
        }
        let depth = self.dispatch_depth.get() - 1;
        self.dispatch_depth.set(depth);

        active.append(&mut self.subscribers.borrow_mut());
        if depth == 0 {
            let mut registered = self.registered.borrow_mut();
            active.retain(|(id, _)| registered.contains(id));
            let mut pending = std::mem::take(&mut *self.pending.borrow_mut());
            registered.extend(pending.iter().map(|(id, _)| *id));
            active.append(&mut pending);
        }
        *self.subscribers.borrow_mut() = active;
    }

    /// The most recently published value.
    pub fn current(&self) -> Option<T> {
        self.current.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.registered.borrow().len() + self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every subscriber and the cached value.
    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
        self.pending.borrow_mut().clear();
        self.registered.borrow_mut().clear();
        *self.current.borrow_mut() = None;
    }
}

impl<T: Clone> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("subscribers", &self.subscribers.borrow().len())
            .field("has_value", &self.current.borrow().is_some())
            .finish()
    }
}

/// One listener list per event category.
#[derive(Debug, Default)]
pub struct Dispatcher {
    pub gyro: Listeners<GyroSample>,
    pub accel: Listeners<AccelSample>,
    pub touch: Listeners<MotionSample>,
    pub orientation: Listeners<OrientationSample>,
    pub button: Listeners<ButtonSample>,
    pub recenter: Listeners<RecenterEvent>,
    pub safety_region: Listeners<SafetyRegionEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame's worth of samples.
    ///
    /// Categories go out in a fixed order (gyro, accel, touch, orientation,
    /// button). Within a category, samples keep their arrival order.
    pub fn dispatch_samples(&self, samples: &[RawSample]) {
        for s in samples {
            if let RawSample::Gyro(g) = s {
                self.gyro.notify(*g);
            }
        }
        for s in samples {
            if let RawSample::Accel(a) = s {
                self.accel.notify(*a);
            }
        }
        for s in samples {
            if let RawSample::Motion(m) = s {
                self.touch.notify(m.clone());
            }
        }
        for s in samples {
            if let RawSample::Orientation(o) = s {
                self.orientation.notify(*o);
            }
        }
        for s in samples {
            if let RawSample::Button(b) = s {
                self.button.notify(*b);
            }
        }
    }

    pub fn clear(&self) {
        self.gyro.clear();
        self.accel.clear();
        self.touch.clear();
        self.orientation.clear();
        self.button.clear();
        self.recenter.clear();
        self.safety_region.clear();
    }
}
