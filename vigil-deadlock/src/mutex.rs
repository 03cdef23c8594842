#![forbid(unsafe_code)]

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::graph::LockGraphState;
use crate::report::{Hazard, LockEvent, LockId};

/// Shared lock-graph bookkeeping for one monitored execution.
///
/// All instrumented locks report here. The state sits behind its own mutex,
/// held only while an event is recorded and the graph is checked, never while
/// a monitored lock is being waited on.
pub struct Detector {
    state: Mutex<LockGraphState>,
    next_lock: AtomicU32,
    stopped: AtomicBool,
    started: Instant,
}

impl Detector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LockGraphState::default()),
            next_lock: AtomicU32::new(1),
            stopped: AtomicBool::new(false),
            started: Instant::now(),
        })
    }

    /// Wrap `value` in an instrumented mutex reporting to this detector.
    pub fn mutex<T>(self: &Arc<Self>, name: impl Into<String>, value: T) -> TrackedMutex<T> {
        let id = LockId(self.next_lock.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        let name = if name.is_empty() { id.to_string() } else { name };
        self.with_state(|s| s.register_lock(id, name.clone()));
        TrackedMutex {
            id,
            name,
            detector: Arc::clone(self),
            inner: Mutex::new(value),
        }
    }

    /// Stop recording. Events arriving afterwards are dropped.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        self.lock_state().hazards().to_vec()
    }

    pub fn events(&self) -> Vec<LockEvent> {
        self.lock_state().events().to_vec()
    }

    /// Locks currently held by `thread`, as the detector has observed them.
    pub fn held_by(&self, thread: ThreadId) -> Vec<LockId> {
        self.lock_state().holds(thread)
    }

    pub fn holder_of(&self, lock: LockId) -> Option<ThreadId> {
        self.lock_state().holder(lock)
    }

    fn lock_state(&self) -> MutexGuard<'_, LockGraphState> {
        // Bookkeeping never panics while holding the lock; recover regardless.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LockGraphState) -> R) -> Option<R> {
        if self.is_stopped() {
            return None;
        }
        let mut state = self.lock_state();
        Some(f(&mut state))
    }

    fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn current() -> (ThreadId, String) {
        let t = thread::current();
        let name = t
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", t.id()));
        (t.id(), name)
    }

    /// Speculative circular-wait check, run before the real acquire is issued.
    fn on_request(&self, lock: LockId) {
        let (thread, name) = Self::current();
        let at = self.now_ms();
        let hazard = self.with_state(|s| {
            s.register_thread(thread, &name);
            s.request(at, thread, lock)
        });
        if let Some(Some(h)) = hazard {
            warn!(thread = %name, "{}", h.message);
        }
    }

    fn on_grant(&self, lock: LockId, waited: Duration) {
        let (thread, name) = Self::current();
        let at = self.now_ms();
        let hazard = self.with_state(|s| s.grant(at, thread, lock, waited));
        match hazard {
            Some(Some(h)) => warn!(thread = %name, "{}", h.message),
            _ => trace!(thread = %name, %lock, "lock granted"),
        }
    }

    fn on_denied(&self, lock: LockId) {
        let (thread, _) = Self::current();
        let at = self.now_ms();
        self.with_state(|s| s.deny(at, thread, lock));
    }

    fn on_release(&self, lock: LockId) {
        let (thread, _) = Self::current();
        let at = self.now_ms();
        self.with_state(|s| s.release(at, thread, lock));
    }
}

/// A `std::sync::Mutex` whose acquisitions and releases are reported to a [`Detector`].
pub struct TrackedMutex<T> {
    id: LockId,
    name: String,
    detector: Arc<Detector>,
    inner: Mutex<T>,
}

impl<T> TrackedMutex<T> {
    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocking acquire. The circular-wait check runs before blocking and the
    /// ordering check runs before the guard is handed out.
    pub fn lock(&self) -> TrackedGuard<'_, T> {
        self.detector.on_request(self.id);
        let started = Instant::now();
        // A panic in another monitored thread must not hide the lock graph.
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.detector.on_grant(self.id, started.elapsed());
        TrackedGuard { mutex: self, guard }
    }

    /// Non-blocking acquire; `None` is the denied path.
    pub fn try_lock(&self) -> Option<TrackedGuard<'_, T>> {
        self.detector.on_request(self.id);
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.detector.on_denied(self.id);
                return None;
            }
        };
        self.detector.on_grant(self.id, Duration::ZERO);
        Some(TrackedGuard { mutex: self, guard })
    }
}

/// Records the release before the underlying lock is unlocked.
pub struct TrackedGuard<'a, T> {
    mutex: &'a TrackedMutex<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for TrackedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for TrackedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for TrackedGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.detector.on_release(self.mutex.id);
    }
}
