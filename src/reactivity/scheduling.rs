// ============================================================================
// spark-weave - Job Scheduling
// Microtask queue plus the pre / main / post job queues
// ============================================================================
//
// There is no event loop underneath the reactive core, so the microtask
// queue is explicit: `queue_microtask` appends, `tick()` drains it. The first
// job queued after a flush schedules one flush microtask; every job queued
// before the next `tick()` is coalesced into that flush.
//
// A flush runs, in order:
// - pre-flush callbacks, drained until no new ones appear
// - main jobs in ascending id order (binary insertion keeps them sorted)
// - post-flush callbacks, deduplicated and sorted by id
// and repeats while any queue is non-empty. A job that runs more than the
// configured recursion limit within one flush is skipped with a warning.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::config::recursion_limit;
use crate::core::error_handling::{call_with_error_handling, warn, ErrorCode};

// =============================================================================
// MICROTASKS
// =============================================================================

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Box<dyn FnOnce()>>> = RefCell::new(VecDeque::new());
}

/// Append a task to the microtask queue.
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    MICROTASKS.with(|q| q.borrow_mut().push_back(Box::new(task)));
}

/// Drain the microtask queue, including tasks queued while draining.
/// Returns the number of tasks run.
///
/// This is the "yield to the microtask queue" point of the host.
pub fn tick() -> usize {
    let mut ran = 0;
    loop {
        let task = MICROTASKS.with(|q| q.borrow_mut().pop_front());
        match task {
            Some(task) => {
                task();
                ran += 1;
            }
            None => return ran,
        }
    }
}

/// Whether any microtask is waiting for `tick()`.
pub fn has_pending_microtasks() -> bool {
    MICROTASKS.with(|q| !q.borrow().is_empty())
}

/// Run `f` after the pending flush (if any) completes.
pub fn next_tick(f: impl FnOnce() + 'static) {
    queue_microtask(f);
}

// =============================================================================
// SCHEDULER JOB
// =============================================================================

struct JobInner {
    id: Cell<Option<u64>>,
    func: Box<dyn Fn()>,
    active: Cell<bool>,
    allow_recurse: Cell<bool>,
    owner: RefCell<Option<Rc<str>>>,
}

/// A unit of deferred work. Identity is the handle, so queueing the same job
/// twice in one flush window runs it once.
#[derive(Clone)]
pub struct SchedulerJob(Rc<JobInner>);

impl SchedulerJob {
    pub fn new(f: impl Fn() + 'static) -> Self {
        SchedulerJob(Rc::new(JobInner {
            id: Cell::new(None),
            func: Box::new(f),
            active: Cell::new(true),
            allow_recurse: Cell::new(false),
            owner: RefCell::new(None),
        }))
    }

    /// Main-queue position: lower ids run first. Jobs without an id run last.
    pub fn with_id(self, id: u64) -> Self {
        self.0.id.set(Some(id));
        self
    }

    /// Diagnostic label reported by the recursion guard.
    pub fn with_owner(self, owner: impl Into<Rc<str>>) -> Self {
        *self.0.owner.borrow_mut() = Some(owner.into());
        self
    }

    pub fn id(&self) -> Option<u64> {
        self.0.id.get()
    }

    fn sort_id(&self) -> u64 {
        self.0.id.get().unwrap_or(u64::MAX)
    }

    pub fn owner(&self) -> Option<Rc<str>> {
        self.0.owner.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    /// Inactive jobs stay queued but are skipped by the flush.
    pub fn set_active(&self, active: bool) {
        self.0.active.set(active);
    }

    pub fn allow_recurse(&self) -> bool {
        self.0.allow_recurse.get()
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.0.allow_recurse.set(allow);
    }

    /// Call the job function directly.
    pub fn run(&self) {
        (self.0.func)();
    }

    pub fn ptr_eq(&self, other: &SchedulerJob) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for SchedulerJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerJob")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("allow_recurse", &self.allow_recurse())
            .field("owner", &self.owner())
            .finish()
    }
}

// =============================================================================
// SCHEDULER STATE
// =============================================================================

#[derive(Default)]
struct Scheduler {
    is_flushing: Cell<bool>,
    is_flush_pending: Cell<bool>,

    queue: RefCell<Vec<SchedulerJob>>,
    flush_index: Cell<usize>,

    pending_pre: RefCell<Vec<SchedulerJob>>,
    active_pre: RefCell<Option<Vec<SchedulerJob>>>,
    pre_index: Cell<usize>,

    pending_post: RefCell<Vec<SchedulerJob>>,
    active_post: RefCell<Option<Vec<SchedulerJob>>>,
    post_index: Cell<usize>,

    /// Job whose pre-flush pass is running; it may not queue itself
    current_pre_flush_parent: RefCell<Option<SchedulerJob>>,
}

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::default();
}

fn with_scheduler<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    SCHEDULER.with(f)
}

/// Runs per job within one flush
type Seen = FxHashMap<usize, u32>;

fn contains_from(list: &[SchedulerJob], job: &SchedulerJob, start: usize) -> bool {
    list.iter().skip(start).any(|j| j.ptr_eq(job))
}

fn dedupe(jobs: Vec<SchedulerJob>) -> Vec<SchedulerJob> {
    let mut seen = FxHashSet::default();
    jobs.into_iter().filter(|job| seen.insert(job.key())).collect()
}

/// True when `job` already ran `recursion_limit` times in this flush.
fn check_recursive_updates(seen: &mut Seen, job: &SchedulerJob) -> bool {
    let count = seen.entry(job.key()).or_insert(0);
    if *count >= recursion_limit() {
        let owner = job.owner();
        warn(format!(
            "Maximum recursive updates exceeded{}. This means you have a reactive effect that is \
             mutating its own dependencies and thus recursively triggering itself.",
            owner.map_or(String::new(), |o| format!(" in component <{o}>"))
        ));
        return true;
    }
    *count += 1;
    false
}

fn call_job(job: &SchedulerJob) {
    call_with_error_handling(ErrorCode::Scheduler, || job.run());
}

// =============================================================================
// QUEUEING
// =============================================================================

/// Position after the running job where `id` keeps the queue sorted.
fn find_insertion_index(queue: &[SchedulerJob], flush_index: usize, id: u64) -> usize {
    let mut start = (flush_index + 1).min(queue.len());
    let mut end = queue.len();
    while start < end {
        let middle = (start + end) / 2;
        if queue[middle].sort_id() < id {
            start = middle + 1;
        } else {
            end = middle;
        }
    }
    start
}

/// Queue a main job for the next flush.
///
/// Skipped when the job is already queued at or after the running position
/// (after it, if the job allows recursion), or when it is the job whose
/// pre-flush pass is running.
pub fn queue_job(job: &SchedulerJob) {
    with_scheduler(|s| {
        let mut queue = s.queue.borrow_mut();
        let start = if s.is_flushing.get() && job.allow_recurse() {
            s.flush_index.get() + 1
        } else {
            s.flush_index.get()
        };
        let is_parent = s
            .current_pre_flush_parent
            .borrow()
            .as_ref()
            .is_some_and(|p| p.ptr_eq(job));

        if (queue.is_empty() || !contains_from(&queue, job, start)) && !is_parent {
            match job.id() {
                None => queue.push(job.clone()),
                Some(id) => {
                    let index = find_insertion_index(&queue, s.flush_index.get(), id);
                    queue.insert(index, job.clone());
                }
            }
            drop(queue);
            queue_flush(s);
        }
    });
}

/// Remove a queued job that has not run yet.
pub fn invalidate_job(job: &SchedulerJob) {
    with_scheduler(|s| {
        let mut queue = s.queue.borrow_mut();
        if let Some(i) = queue.iter().position(|j| j.ptr_eq(job)) {
            if i > s.flush_index.get() {
                queue.remove(i);
            }
        }
    });
}

fn queue_cb(
    s: &Scheduler,
    cb: &SchedulerJob,
    active: &RefCell<Option<Vec<SchedulerJob>>>,
    pending: &RefCell<Vec<SchedulerJob>>,
    index: usize,
) {
    let start = if cb.allow_recurse() { index + 1 } else { index };
    let already_active = active
        .borrow()
        .as_ref()
        .is_some_and(|list| contains_from(list, cb, start));
    if !already_active {
        pending.borrow_mut().push(cb.clone());
    }
    queue_flush(s);
}

/// Queue a callback that runs before the main jobs of the next flush.
pub fn queue_pre_flush_cb(cb: &SchedulerJob) {
    with_scheduler(|s| queue_cb(s, cb, &s.active_pre, &s.pending_pre, s.pre_index.get()));
}

/// Queue a callback that runs after the main jobs of the next flush.
pub fn queue_post_flush_cb(cb: &SchedulerJob) {
    with_scheduler(|s| queue_cb(s, cb, &s.active_post, &s.pending_post, s.post_index.get()));
}

/// Queue several post-flush callbacks without the in-flight check.
pub fn queue_post_flush_cbs(cbs: impl IntoIterator<Item = SchedulerJob>) {
    with_scheduler(|s| {
        s.pending_post.borrow_mut().extend(cbs);
        queue_flush(s);
    });
}

fn queue_flush(s: &Scheduler) {
    if !s.is_flushing.get() && !s.is_flush_pending.get() {
        s.is_flush_pending.set(true);
        queue_microtask(|| flush_jobs(&mut Seen::default()));
    }
}

/// Whether a flush is running right now.
pub fn is_flushing() -> bool {
    with_scheduler(|s| s.is_flushing.get())
}

/// Whether a flush is scheduled but has not started.
pub fn is_flush_pending() -> bool {
    with_scheduler(|s| s.is_flush_pending.get())
}

// =============================================================================
// FLUSHING
// =============================================================================

/// Drain the pre-flush queue, including callbacks queued while draining.
/// `parent_job` (a component update about to run) may not queue itself.
pub fn flush_pre_flush_cbs(parent_job: Option<&SchedulerJob>) {
    flush_pre_flush_cbs_with(&mut Seen::default(), parent_job);
}

fn flush_pre_flush_cbs_with(seen: &mut Seen, parent_job: Option<&SchedulerJob>) {
    loop {
        let batch = with_scheduler(|s| {
            let pending = std::mem::take(&mut *s.pending_pre.borrow_mut());
            if pending.is_empty() {
                return None;
            }
            *s.current_pre_flush_parent.borrow_mut() = parent_job.cloned();
            let batch = dedupe(pending);
            *s.active_pre.borrow_mut() = Some(batch.clone());
            Some(batch)
        });
        let Some(batch) = batch else {
            return;
        };

        for (i, cb) in batch.iter().enumerate() {
            with_scheduler(|s| s.pre_index.set(i));
            if check_recursive_updates(seen, cb) {
                continue;
            }
            call_job(cb);
        }

        with_scheduler(|s| {
            *s.active_pre.borrow_mut() = None;
            s.pre_index.set(0);
            *s.current_pre_flush_parent.borrow_mut() = None;
        });
    }
}

/// Run queued post-flush callbacks in id order. Called while post-flush
/// callbacks are already running, the new ones join the running pass.
pub fn flush_post_flush_cbs() {
    flush_post_flush_cbs_with(&mut Seen::default());
}

fn flush_post_flush_cbs_with(seen: &mut Seen) {
    let pending = with_scheduler(|s| std::mem::take(&mut *s.pending_post.borrow_mut()));
    if pending.is_empty() {
        return;
    }
    let mut deduped = dedupe(pending);

    let joined = with_scheduler(|s| {
        let mut active = s.active_post.borrow_mut();
        match active.as_mut() {
            Some(list) => {
                list.append(&mut deduped);
                true
            }
            None => false,
        }
    });
    if joined {
        return;
    }

    deduped.sort_by_key(SchedulerJob::sort_id);
    with_scheduler(|s| *s.active_post.borrow_mut() = Some(deduped));

    let mut index = 0;
    loop {
        let cb = with_scheduler(|s| {
            s.post_index.set(index);
            s.active_post.borrow().as_ref().and_then(|list| list.get(index).cloned())
        });
        let Some(cb) = cb else {
            break;
        };
        if !check_recursive_updates(seen, &cb) {
            call_job(&cb);
        }
        index += 1;
    }

    with_scheduler(|s| {
        *s.active_post.borrow_mut() = None;
        s.post_index.set(0);
    });
}

fn flush_jobs(seen: &mut Seen) {
    loop {
        with_scheduler(|s| {
            s.is_flush_pending.set(false);
            s.is_flushing.set(true);
        });

        flush_pre_flush_cbs_with(seen, None);

        let queued = with_scheduler(|s| {
            let mut queue = s.queue.borrow_mut();
            queue.sort_by_key(SchedulerJob::sort_id);
            queue.len()
        });
        tracing::debug!(target: "spark_weave::scheduler", jobs = queued, "flushing jobs");

        loop {
            let job = with_scheduler(|s| s.queue.borrow().get(s.flush_index.get()).cloned());
            let Some(job) = job else {
                break;
            };
            if job.is_active() && !check_recursive_updates(seen, &job) {
                call_job(&job);
            }
            with_scheduler(|s| s.flush_index.set(s.flush_index.get() + 1));
        }

        with_scheduler(|s| {
            s.flush_index.set(0);
            s.queue.borrow_mut().clear();
        });

        flush_post_flush_cbs_with(seen);

        let again = with_scheduler(|s| {
            s.is_flushing.set(false);
            !s.queue.borrow().is_empty()
                || !s.pending_pre.borrow().is_empty()
                || !s.pending_post.borrow().is_empty()
        });
        if !again {
            return;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{configure, ReactivityConfig};
    use crate::core::error_handling::set_warn_handler;

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push(log: &Rc<RefCell<Vec<String>>>, name: &'static str) -> SchedulerJob {
        let log = log.clone();
        SchedulerJob::new(move || log.borrow_mut().push(name.to_string()))
    }

    // =========================================================================
    // Queue ordering and dedupe
    // =========================================================================

    #[test]
    fn jobs_run_after_tick_in_id_order() {
        let calls = log();
        queue_job(&push(&calls, "job3").with_id(3));
        queue_job(&push(&calls, "job1").with_id(1));
        queue_job(&push(&calls, "job2").with_id(2));
        assert!(calls.borrow().is_empty());
        assert!(is_flush_pending());

        tick();
        assert_eq!(*calls.borrow(), ["job1", "job2", "job3"]);
        assert!(!is_flushing());
    }

    #[test]
    fn duplicate_jobs_are_deduped() {
        let calls = log();
        let job = push(&calls, "job");
        queue_job(&job);
        queue_job(&job);
        tick();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn job_queued_during_flush_is_inserted_by_id() {
        let calls = log();
        let job3 = push(&calls, "job3").with_id(3);
        let job1 = SchedulerJob::new({
            let (calls, job3) = (calls.clone(), job3.clone());
            move || {
                calls.borrow_mut().push("job1".into());
                queue_job(&job3);
            }
        })
        .with_id(1);
        queue_job(&job1);
        queue_job(&push(&calls, "job2").with_id(2));
        tick();
        assert_eq!(*calls.borrow(), ["job1", "job2", "job3"]);
    }

    #[test]
    fn invalidated_job_does_not_run() {
        let calls = log();
        let job = push(&calls, "job");
        queue_job(&job);
        invalidate_job(&job);
        tick();
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn inactive_job_is_skipped() {
        let calls = log();
        let job = push(&calls, "job");
        queue_job(&job);
        job.set_active(false);
        tick();
        assert!(calls.borrow().is_empty());
    }

    // =========================================================================
    // Pre / post callbacks
    // =========================================================================

    #[test]
    fn pre_flush_runs_before_jobs_and_post_after() {
        let calls = log();
        queue_post_flush_cb(&push(&calls, "post"));
        queue_job(&push(&calls, "job"));
        queue_pre_flush_cb(&push(&calls, "pre"));
        tick();
        assert_eq!(*calls.borrow(), ["pre", "job", "post"]);
    }

    #[test]
    fn pre_flush_cb_queued_by_pre_flush_cb_runs_in_same_pass() {
        let calls = log();
        let second = push(&calls, "cb2");
        let first = SchedulerJob::new({
            let (calls, second) = (calls.clone(), second.clone());
            move || {
                calls.borrow_mut().push("cb1".into());
                queue_pre_flush_cb(&second);
            }
        });
        let job = SchedulerJob::new({
            let (calls, first) = (calls.clone(), first.clone());
            move || {
                calls.borrow_mut().push("job".into());
                queue_pre_flush_cb(&first);
                flush_pre_flush_cbs(None);
            }
        });
        queue_job(&job);
        tick();
        assert_eq!(*calls.borrow(), ["job", "cb1", "cb2"]);
    }

    #[test]
    fn post_flush_cbs_sorted_and_deduped() {
        let calls = log();
        let b = push(&calls, "b").with_id(2);
        queue_post_flush_cb(&b);
        queue_post_flush_cb(&push(&calls, "a").with_id(1));
        queue_post_flush_cb(&b);
        tick();
        assert_eq!(*calls.borrow(), ["a", "b"]);
    }

    #[test]
    fn post_cb_queueing_job_triggers_another_round() {
        let calls = log();
        let job = push(&calls, "job");
        let post = SchedulerJob::new({
            let (calls, job) = (calls.clone(), job.clone());
            move || {
                calls.borrow_mut().push("post".into());
                queue_job(&job);
            }
        });
        queue_post_flush_cb(&post);
        tick();
        assert_eq!(*calls.borrow(), ["post", "job"]);
    }

    #[test]
    fn next_tick_runs_after_flush() {
        let calls = log();
        queue_job(&push(&calls, "job"));
        next_tick({
            let calls = calls.clone();
            move || calls.borrow_mut().push("tick".into())
        });
        tick();
        assert_eq!(*calls.borrow(), ["job", "tick"]);
    }

    // =========================================================================
    // Recursion guard
    // =========================================================================

    fn self_queueing_job(runs: &Rc<Cell<u32>>, allow_recurse: bool) -> SchedulerJob {
        let slot: Rc<RefCell<Option<std::rc::Weak<JobInner>>>> = Rc::new(RefCell::new(None));
        let job = SchedulerJob::new({
            let (runs, slot) = (runs.clone(), slot.clone());
            move || {
                runs.set(runs.get() + 1);
                let me = slot.borrow().as_ref().and_then(std::rc::Weak::upgrade);
                if let Some(me) = me {
                    queue_job(&SchedulerJob(me));
                }
            }
        });
        job.set_allow_recurse(allow_recurse);
        *slot.borrow_mut() = Some(Rc::downgrade(&job.0));
        job
    }

    #[test]
    fn self_queueing_job_is_deduped_without_allow_recurse() {
        let runs = Rc::new(Cell::new(0));
        let job = self_queueing_job(&runs, false);
        queue_job(&job);
        tick();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn recursion_limit_bounds_self_queueing_job() {
        let warnings = Rc::new(RefCell::new(Vec::<String>::new()));
        let prev = set_warn_handler(Some(Rc::new({
            let warnings = warnings.clone();
            move |m: &str| warnings.borrow_mut().push(m.to_string())
        })));

        let runs = Rc::new(Cell::new(0));
        let job = self_queueing_job(&runs, true).with_owner("Looper");
        queue_job(&job);
        tick();

        assert_eq!(runs.get(), recursion_limit());
        assert_eq!(warnings.borrow().len(), 1);
        assert!(warnings.borrow()[0].contains("<Looper>"));
        set_warn_handler(prev);
    }

    #[test]
    fn recursion_limit_is_configurable() {
        configure(|c| c.recursion_limit = 5);
        let prev = set_warn_handler(Some(Rc::new(|_: &str| {})));
        let runs = Rc::new(Cell::new(0));
        queue_job(&self_queueing_job(&runs, true));
        tick();
        assert_eq!(runs.get(), 5);
        set_warn_handler(prev);
        configure(|c| *c = ReactivityConfig::default());
    }

    #[test]
    fn panicking_job_does_not_stop_flush() {
        let prev = crate::core::error_handling::set_error_handler(Some(Rc::new(|_: &_| {})));
        let calls = log();
        queue_job(&SchedulerJob::new(|| panic!("job failed")).with_id(1));
        queue_job(&push(&calls, "after").with_id(2));
        tick();
        assert_eq!(*calls.borrow(), ["after"]);
        assert!(!is_flushing());
        crate::core::error_handling::set_error_handler(prev);
    }
}
