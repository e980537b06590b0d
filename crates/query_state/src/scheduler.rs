//! Timer and task seam used by bindings, plus a virtual-clock implementation for headless hosts.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    rc::Rc,
    time::Duration,
};

use futures::{
    executor::{LocalPool, LocalSpawner},
    future::LocalBoxFuture,
    task::LocalSpawnExt,
};
use leptos::logging;

/// Deferred callback handed to [`BindingScheduler::set_timeout`].
pub type TimerTask = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Opaque handle for a scheduled timer.
pub struct TimerId(pub u64);

/// Timers and local task spawning for one UI host.
pub trait BindingScheduler {
    /// Runs `task` once after `delay`.
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerId;

    /// Cancels a timer; unknown or already-fired timers are ignored.
    fn clear_timeout(&self, timer: TimerId);

    /// Drives `task` to completion on the current thread.
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}

struct ScheduledTimer {
    due: Duration,
    task: TimerTask,
}

/// Virtual-clock scheduler: timers fire only from [`ManualScheduler::advance`] and tasks run only
/// from [`ManualScheduler::run_until_stalled`].
#[derive(Clone)]
pub struct ManualScheduler {
    now: Rc<Cell<Duration>>,
    next_id: Rc<Cell<u64>>,
    timers: Rc<RefCell<BTreeMap<TimerId, ScheduledTimer>>>,
    pool: Rc<RefCell<LocalPool>>,
    spawner: LocalSpawner,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            now: Rc::new(Cell::new(Duration::ZERO)),
            next_id: Rc::new(Cell::new(0)),
            timers: Rc::new(RefCell::new(BTreeMap::new())),
            pool: Rc::new(RefCell::new(pool)),
            spawner,
        }
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now.get())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

impl ManualScheduler {
    /// Creates a scheduler at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of timers that have not fired or been cleared.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Polls spawned tasks until none can make progress.
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Moves the clock forward, firing due timers in deadline order and running tasks after each.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        self.run_until_stalled();

        loop {
            let next = {
                let timers = self.timers.borrow();
                timers
                    .iter()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(id, timer)| (timer.due, **id))
                    .map(|(id, _)| *id)
            };
            let Some(id) = next else {
                break;
            };
            let Some(timer) = self.timers.borrow_mut().remove(&id) else {
                break;
            };
            self.now.set(self.now.get().max(timer.due));
            (timer.task)();
            self.run_until_stalled();
        }

        self.now.set(target);
    }
}

impl BindingScheduler for ManualScheduler {
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.timers.borrow_mut().insert(
            id,
            ScheduledTimer {
                due: self.now.get() + delay,
                task,
            },
        );
        id
    }

    fn clear_timeout(&self, timer: TimerId) {
        self.timers.borrow_mut().remove(&timer);
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(err) = self.spawner.spawn_local(task) {
            logging::warn!("manual scheduler spawn failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timers_fire_in_deadline_order_once_due() {
        let scheduler = ManualScheduler::new();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for (label, ms) in [("late", 30), ("early", 10)] {
            let fired = fired.clone();
            scheduler.set_timeout(
                Duration::from_millis(ms),
                Box::new(move || fired.borrow_mut().push(label)),
            );
        }

        scheduler.advance(Duration::from_millis(20));
        assert_eq!(*fired.borrow(), vec!["early"]);
        scheduler.advance(Duration::from_millis(10));
        assert_eq!(*fired.borrow(), vec!["early", "late"]);
        assert_eq!(scheduler.now(), Duration::from_millis(30));
    }

    #[test]
    fn cleared_timers_never_fire() {
        let scheduler = ManualScheduler::new();
        let fired = Rc::new(Cell::new(false));
        let timer = scheduler.set_timeout(Duration::from_millis(5), {
            let fired = fired.clone();
            Box::new(move || fired.set(true))
        });
        scheduler.clear_timeout(timer);
        scheduler.advance(Duration::from_millis(50));
        assert!(!fired.get());
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn spawned_tasks_run_when_polled() {
        let scheduler = ManualScheduler::new();
        let done = Rc::new(Cell::new(false));
        scheduler.spawn_local(Box::pin({
            let done = done.clone();
            async move { done.set(true) }
        }));
        assert!(!done.get());
        scheduler.run_until_stalled();
        assert!(done.get());
    }
}
