//! The list of live subscriptions and the per-mutation notification pass.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, error};
use tree_state_path::resolve;
use tree_state_util::StateValue;

use crate::change::StateChange;
use crate::subscription::Entry;
use crate::StoreError;

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: RefCell<Vec<Rc<Entry>>>,
}

impl SubscriptionRegistry {
    pub(crate) fn register(&self, entry: Rc<Entry>) {
        self.entries.borrow_mut().push(entry);
    }

    pub(crate) fn remove(&self, entry: &Rc<Entry>) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|e| Rc::ptr_eq(e, entry)) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn snapshot(&self) -> Vec<Rc<Entry>> {
        self.entries.borrow().clone()
    }

    /// Re-evaluate every live subscription after `change` was reduced into
    /// `state`, invoking callbacks whose value changed.
    ///
    /// Iterates a snapshot taken on entry: subscriptions added by a callback
    /// are not visited in this pass, subscriptions removed by a callback are
    /// skipped. No borrow of `state` or of the registry is held while a
    /// callback runs.
    ///
    /// A path that no longer matches the shape of the tree does not stop the
    /// pass; the first such error is returned once every other subscription
    /// has been notified.
    pub(crate) fn on_mutation(
        &self,
        state: &RefCell<StateValue>,
        change: &StateChange,
    ) -> Result<(), StoreError> {
        let mut first_err = None;

        for entry in self.snapshot() {
            if entry.is_closed() || !change.touches(entry.path()) {
                continue;
            }
            let update = {
                let state = state.borrow();
                match resolve(&state, entry.path()) {
                    Ok(resolution) => entry.observe(resolution),
                    Err(e) => {
                        error!(path = %entry.path(), error = %e, "subscription path no longer resolves");
                        first_err.get_or_insert(StoreError::from(e));
                        None
                    }
                }
            };
            if let Some(update) = update {
                debug!(path = %entry.path(), "notifying subscriber");
                entry.notify(update);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}
