//! Named, ordered task queues with suspend/resume (spec.md §4.C).
//!
//! Grounded on the teacher's [`FrameScheduler`][sched] idiom of tracking "has
//! enough time elapsed" with an `Instant`, generalized from one fixed
//! budget window to a named collection of queues, each carrying its own
//! readiness clock and a suspend counter so a task can defer part of its
//! work (e.g. a script load) and resume the queue once that completes.
//!
//! [sched]: ../../../page_handler/src/utilities/scheduler.rs (not vendored; see DESIGN.md)

use std::collections::{HashMap, VecDeque};

use web_time::{Duration, Instant};

/// A deferred unit of work scheduled on a named queue.
type Action = Box<dyn FnOnce()>;

struct QueuedTask {
    id: u64,
    ready_at: Instant,
    action: Action,
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<QueuedTask>,
    suspend_depth: u32,
}

/// The process-wide collection of named task queues.
#[derive(Default)]
pub struct TaskQueues {
    queues: HashMap<String, Queue>,
    next_id: u64,
}

impl TaskQueues {
    /// Creates an empty set of queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task to `queue_name`, becoming ready after `delay` has
    /// elapsed. Returns a monotonic id (unique across all queues).
    pub fn add(
        &mut self,
        queue_name: impl Into<String>,
        delay: Duration,
        action: impl FnOnce() + 'static,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.queues
            .entry(queue_name.into())
            .or_default()
            .pending
            .push_back(QueuedTask {
                id,
                ready_at: Instant::now() + delay,
                action: Box::new(action),
            });
        id
    }

    /// Runs tasks on `queue_name` in order.
    ///
    /// If the queue is suspended, this is a no-op. Otherwise the next ready
    /// task (its delay elapsed) runs; if `synchronous` is `true`, this
    /// repeats for every consecutive zero-delay task that is immediately
    /// ready, stopping only once a task is not yet due, the queue becomes
    /// suspended (the task itself called [`TaskQueues::suspend`]), or the
    /// queue empties. When `synchronous` is `false`, at most one task runs
    /// per call — the caller is expected to call `run` again to continue
    /// draining, the same way the browser event loop yields between tasks.
    pub fn run(&mut self, queue_name: &str, synchronous: bool) {
        loop {
            if !self.run_one(queue_name) || !synchronous {
                break;
            }
        }
    }

    /// Runs at most one ready task on `queue_name`. Returns whether a task
    /// ran.
    fn run_one(&mut self, queue_name: &str) -> bool {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return false;
        };
        if queue.suspend_depth > 0 {
            return false;
        }
        let is_ready = matches!(queue.pending.front(), Some(front) if front.ready_at <= Instant::now());
        if !is_ready {
            return false;
        }
        let Some(task) = queue.pending.pop_front() else {
            return false;
        };
        (task.action)();
        true
    }

    /// Suspends `queue_name`. Nested suspends stack: the queue only resumes
    /// once every `suspend` has a matching `resume`.
    pub fn suspend(&mut self, queue_name: impl Into<String>) {
        self.queues.entry(queue_name.into()).or_default().suspend_depth += 1;
    }

    /// Balances one [`TaskQueues::suspend`] call. Once the suspend count
    /// reaches zero, the queue drains again via [`TaskQueues::run`] with
    /// the given `synchronous` flag.
    pub fn resume(&mut self, queue_name: &str, synchronous: bool) {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };
        queue.suspend_depth = queue.suspend_depth.saturating_sub(1);
        if queue.suspend_depth == 0 {
            self.run(queue_name, synchronous);
        }
    }

    /// Removes `queue_name` entirely, discarding any pending tasks.
    pub fn cancel(&mut self, queue_name: &str) {
        self.queues.remove(queue_name);
    }

    /// Removes every queue whose name starts with `prefix`, except
    /// `keep_name`.
    pub fn cancel_all_except(&mut self, prefix: &str, keep_name: &str) {
        self.queues.retain(|name, _| !name.starts_with(prefix) || name == keep_name);
    }

    /// Number of tasks still pending on `queue_name` (0 if the queue
    /// doesn't exist).
    #[must_use]
    pub fn pending_len(&self, queue_name: &str) -> usize {
        self.queues.get(queue_name).map_or(0, |queue| queue.pending.len())
    }

    /// Whether `queue_name` is currently suspended.
    #[must_use]
    pub fn is_suspended(&self, queue_name: &str) -> bool {
        self.queues.get(queue_name).is_some_and(|queue| queue.suspend_depth > 0)
    }
}

/// Derives the deterministic animation sub-queue name for a body fragment
/// element (spec.md §4.C `key(element)`, used by `spf::process`'s
/// per-element animation sub-queue).
#[must_use]
pub fn key(element_id: &str) -> String {
    format!("animate {element_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn tasks_on_one_queue_run_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queues = TaskQueues::new();
        for value in 0..3 {
            let log = Rc::clone(&log);
            queues.add("q", Duration::ZERO, move || log.borrow_mut().push(value));
        }
        queues.run("q", true);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn non_synchronous_run_executes_one_task_per_call() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queues = TaskQueues::new();
        for value in 0..3 {
            let log = Rc::clone(&log);
            queues.add("q", Duration::ZERO, move || log.borrow_mut().push(value));
        }
        queues.run("q", false);
        assert_eq!(*log.borrow(), vec![0]);
        queues.run("q", false);
        assert_eq!(*log.borrow(), vec![0, 1]);
    }

    #[test]
    fn suspended_queue_does_not_run() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queues = TaskQueues::new();
        let log_clone = Rc::clone(&log);
        queues.add("q", Duration::ZERO, move || log_clone.borrow_mut().push(1));
        queues.suspend("q");
        queues.run("q", true);
        assert!(log.borrow().is_empty());
        queues.resume("q", true);
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn nested_suspend_requires_matching_resumes() {
        let mut queues = TaskQueues::new();
        queues.add("q", Duration::ZERO, || {});
        queues.suspend("q");
        queues.suspend("q");
        queues.resume("q", true);
        assert!(queues.is_suspended("q"));
        queues.resume("q", true);
        assert!(!queues.is_suspended("q"));
    }

    #[test]
    fn a_task_can_suspend_its_own_queue_to_defer_the_rest() {
        let queues = Rc::new(RefCell::new(TaskQueues::new()));
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let queues_for_first = Rc::clone(&queues);
            let log_for_first = Rc::clone(&log);
            queues.borrow_mut().add("q", Duration::ZERO, move || {
                log_for_first.borrow_mut().push("start-async");
                queues_for_first.borrow_mut().suspend("q");
            });
        }
        {
            let log_for_second = Rc::clone(&log);
            queues
                .borrow_mut()
                .add("q", Duration::ZERO, move || log_for_second.borrow_mut().push("second"));
        }

        queues.borrow_mut().run("q", true);
        assert_eq!(*log.borrow(), vec!["start-async"]);

        queues.borrow_mut().resume("q", true);
        assert_eq!(*log.borrow(), vec!["start-async", "second"]);
    }

    #[test]
    fn cancel_drops_pending_tasks() {
        let mut queues = TaskQueues::new();
        queues.add("q", Duration::ZERO, || panic!("must not run"));
        queues.cancel("q");
        queues.run("q", true);
        assert_eq!(queues.pending_len("q"), 0);
    }

    #[test]
    fn cancel_all_except_only_touches_matching_prefix() {
        let mut queues = TaskQueues::new();
        queues.add("process /a", Duration::ZERO, || {});
        queues.add("process /b", Duration::ZERO, || {});
        queues.add("animate x", Duration::ZERO, || {});
        queues.cancel_all_except("process ", "process /b");
        assert_eq!(queues.pending_len("process /a"), 0);
        assert_eq!(queues.pending_len("process /b"), 1);
        assert_eq!(queues.pending_len("animate x"), 1);
    }

    #[test]
    fn key_is_deterministic_for_the_same_element() {
        assert_eq!(key("body-1"), key("body-1"));
        assert_ne!(key("body-1"), key("body-2"));
    }
}
