//! Subscription options, updates and handles.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tree_state_path::{Path, Resolution};
use tree_state_util::{deep_copy, NodeId, StateValue};

use crate::registry::SubscriptionRegistry;
use crate::StoreError;

/// Per-subscription behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscribeOptions {
    /// Invoke the callback once at subscribe time with the current value.
    pub get_initial_value: bool,
    /// Also notify when the value kept its identity but its content changed.
    pub push_nested_changes: bool,
    /// Hand callbacks fresh deep copies instead of clones sharing node identity.
    pub get_deep_copy: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            get_initial_value: true,
            push_nested_changes: false,
            get_deep_copy: false,
        }
    }
}

impl SubscribeOptions {
    pub fn initial_value(mut self, on: bool) -> Self {
        self.get_initial_value = on;
        self
    }

    pub fn nested_changes(mut self, on: bool) -> Self {
        self.push_nested_changes = on;
        self
    }

    pub fn deep_copy(mut self, on: bool) -> Self {
        self.get_deep_copy = on;
        self
    }
}

/// The value delivered to a subscription callback.
///
/// Absent values (path not found, explicit null) are both `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub previous: StateValue,
    pub current: StateValue,
}

pub type Callback = Rc<dyn Fn(StateUpdate)>;

// ── Retained state ────────────────────────────────────────────────────────

/// What a resolved value "is", for the reference comparison.
#[derive(Debug, Clone, PartialEq)]
enum Identity {
    Missing,
    Null,
    Node(NodeId),
    Leaf(StateValue),
}

impl Identity {
    fn of(resolution: &Resolution<'_>) -> Self {
        match resolution {
            Resolution::NotFound => Identity::Missing,
            Resolution::Null => Identity::Null,
            Resolution::Found(value) => match value.node_id() {
                Some(id) => Identity::Node(id),
                None => Identity::Leaf((*value).clone()),
            },
        }
    }
}

struct Retained {
    identity: Identity,
    copy: StateValue,
}

/// A registered subscription as the registry sees it.
pub(crate) struct Entry {
    path: Path,
    options: SubscribeOptions,
    callback: Callback,
    retained: RefCell<Retained>,
    closed: Cell<bool>,
}

impl Entry {
    /// Build an entry from the value its path resolves to right now. Returns
    /// the initial update when the options ask for one.
    pub(crate) fn new(
        path: Path,
        options: SubscribeOptions,
        callback: Callback,
        resolution: Resolution<'_>,
    ) -> (Rc<Entry>, Option<StateUpdate>) {
        let current = resolution.cloned_or_null();
        let entry = Rc::new(Entry {
            path,
            options,
            callback,
            retained: RefCell::new(Retained {
                identity: Identity::of(&resolution),
                copy: deep_copy(&current),
            }),
            closed: Cell::new(false),
        });
        let initial = options.get_initial_value.then(|| StateUpdate {
            previous: StateValue::Null,
            current: entry.deliverable(current),
        });
        (entry, initial)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Compare a fresh resolution with the retained value and, when it
    /// counts as a change, record it and return the update to deliver.
    ///
    /// A change is a new identity (another node, another leaf value, or a
    /// move between missing, null and present) or, with `push_nested_changes`,
    /// a present value that is no longer deep-equal to the retained copy.
    pub(crate) fn observe(&self, resolution: Resolution<'_>) -> Option<StateUpdate> {
        let identity = Identity::of(&resolution);
        let current = resolution.cloned_or_null();
        let mut retained = self.retained.borrow_mut();

        let moved = identity != retained.identity;
        let nested =
            self.options.push_nested_changes && resolution.is_found() && current != retained.copy;
        if !moved && !nested {
            return None;
        }

        let previous = std::mem::replace(&mut retained.copy, deep_copy(&current));
        retained.identity = identity;
        Some(StateUpdate {
            previous,
            current: self.deliverable(current),
        })
    }

    pub(crate) fn notify(&self, update: StateUpdate) {
        (self.callback)(update)
    }

    fn deliverable(&self, value: StateValue) -> StateValue {
        if self.options.get_deep_copy {
            deep_copy(&value)
        } else {
            value
        }
    }
}

// ── Handle ────────────────────────────────────────────────────────────────

/// Handle returned by `Store::subscribe`.
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription {
    entry: Rc<Entry>,
    registry: Weak<SubscriptionRegistry>,
}

impl Subscription {
    pub(crate) fn new(entry: Rc<Entry>, registry: Weak<SubscriptionRegistry>) -> Self {
        Subscription { entry, registry }
    }

    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    pub fn options(&self) -> SubscribeOptions {
        self.entry.options
    }

    pub fn is_closed(&self) -> bool {
        self.entry.is_closed()
    }

    /// Stop receiving updates. Takes effect immediately, even in the middle
    /// of a notification pass.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DoubleUnsubscribe` if this subscription was
    /// already removed.
    pub fn unsubscribe(&self) -> Result<(), StoreError> {
        if self.entry.closed.replace(true) {
            return Err(StoreError::DoubleUnsubscribe {
                path: self.entry.path.to_string(),
            });
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.entry);
        }
        Ok(())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.entry.path.to_string())
            .field("options", &self.entry.options)
            .field("closed", &self.entry.is_closed())
            .finish()
    }
}
