//! [`BindingScheduler`] over the Leptos timer and task helpers.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
    time::Duration,
};

use futures::future::LocalBoxFuture;
use leptos::{leptos_dom::helpers::TimeoutHandle, logging, set_timeout_with_handle};
use query_state::{BindingScheduler, TimerId, TimerTask};

#[derive(Debug, Default)]
/// Browser scheduler: `setTimeout` for debounce timers and `spawn_local` for writes.
pub struct LeptosScheduler {
    next_id: Cell<u64>,
    handles: Rc<RefCell<HashMap<TimerId, TimeoutHandle>>>,
}

impl LeptosScheduler {
    /// Creates a scheduler with no pending timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have not fired or been cleared.
    pub fn pending_timers(&self) -> usize {
        self.handles.borrow().len()
    }
}

impl BindingScheduler for LeptosScheduler {
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let handles = Rc::downgrade(&self.handles);
        let fired = move || {
            if let Some(handles) = handles.upgrade() {
                handles.borrow_mut().remove(&id);
            }
            task();
        };
        match set_timeout_with_handle(fired, delay) {
            Ok(handle) => {
                self.handles.borrow_mut().insert(id, handle);
            }
            Err(err) => logging::warn!("query state timer could not be scheduled: {err:?}"),
        }
        id
    }

    fn clear_timeout(&self, timer: TimerId) {
        if let Some(handle) = self.handles.borrow_mut().remove(&timer) {
            handle.clear();
        }
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        leptos::spawn_local(task);
    }
}

impl Drop for LeptosScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.handles.borrow_mut().drain() {
            handle.clear();
        }
    }
}
