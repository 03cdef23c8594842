#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::thread::ThreadId;
use std::time::Duration;

use crate::report::{EventKind, Hazard, HazardKind, LockEvent, LockId};

/// One edge of a wait-for chain: `waiter` wants `lock`, which `holder` owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WaitEdge {
    pub waiter: ThreadId,
    pub lock: LockId,
    pub holder: ThreadId,
}

/// Bookkeeping for one monitored execution.
///
/// Only observes the real locks: a lock is in at most one `holds` set because
/// the underlying mutex guarantees it, not because this state enforces it.
#[derive(Default)]
pub(crate) struct LockGraphState {
    thread_names: HashMap<ThreadId, String>,
    lock_names: HashMap<LockId, String>,
    holds: HashMap<ThreadId, BTreeSet<LockId>>,
    waits: HashMap<ThreadId, BTreeSet<LockId>>,
    holder: HashMap<LockId, ThreadId>,
    order: HashMap<ThreadId, Vec<LockId>>,
    /// Every adjacent `(earlier, later)` acquisition pair a thread ever made.
    pair_history: HashMap<ThreadId, HashSet<(LockId, LockId)>>,
    reported: HashSet<(HazardKind, Vec<LockId>)>,
    events: Vec<LockEvent>,
    hazards: Vec<Hazard>,
}

impl LockGraphState {
    pub(crate) fn register_lock(&mut self, lock: LockId, name: String) {
        self.lock_names.insert(lock, name);
    }

    pub(crate) fn register_thread(&mut self, thread: ThreadId, name: &str) {
        if !self.thread_names.contains_key(&thread) {
            self.thread_names.insert(thread, name.to_string());
        }
    }

    pub(crate) fn events(&self) -> &[LockEvent] {
        &self.events
    }

    pub(crate) fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub(crate) fn holds(&self, thread: ThreadId) -> Vec<LockId> {
        self.holds
            .get(&thread)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn holder(&self, lock: LockId) -> Option<ThreadId> {
        self.holder.get(&lock).copied()
    }

    fn thread_name(&self, thread: ThreadId) -> String {
        self.thread_names
            .get(&thread)
            .cloned()
            .unwrap_or_else(|| format!("{thread:?}"))
    }

    fn lock_name(&self, lock: LockId) -> String {
        self.lock_names
            .get(&lock)
            .cloned()
            .unwrap_or_else(|| lock.to_string())
    }

    fn log(&mut self, at_ms: f64, thread: ThreadId, lock: LockId, kind: EventKind) {
        let event = LockEvent {
            at_ms,
            thread: self.thread_name(thread),
            lock: self.lock_name(lock),
            kind,
        };
        self.events.push(event);
    }

    /// Mark `thread` as waiting for `lock` and run the circular-wait check
    /// against the graph as it stands right now.
    pub(crate) fn request(&mut self, at_ms: f64, thread: ThreadId, lock: LockId) -> Option<Hazard> {
        self.log(at_ms, thread, lock, EventKind::Attempt);
        self.waits.entry(thread).or_default().insert(lock);

        let chain = self.find_cycle(thread)?;
        let mut key: Vec<LockId> = chain.iter().map(|e| e.lock).collect();
        key.sort();
        if !self.reported.insert((HazardKind::CircularWait, key)) {
            return None;
        }

        let links: Vec<String> = chain
            .iter()
            .map(|e| {
                format!(
                    "{} waits for {} held by {}",
                    self.thread_name(e.waiter),
                    self.lock_name(e.lock),
                    self.thread_name(e.holder)
                )
            })
            .collect();
        let hazard = Hazard {
            kind: HazardKind::CircularWait,
            threads: chain.iter().map(|e| self.thread_name(e.waiter)).collect(),
            locks: chain.iter().map(|e| self.lock_name(e.lock)).collect(),
            message: format!("circular wait: {}", links.join(" -> ")),
        };
        self.log(at_ms, thread, lock, EventKind::CircularWait);
        self.hazards.push(hazard.clone());
        Some(hazard)
    }

    /// Record a granted acquire, then check it for lock-ordering inversion.
    pub(crate) fn grant(
        &mut self,
        at_ms: f64,
        thread: ThreadId,
        lock: LockId,
        waited: Duration,
    ) -> Option<Hazard> {
        if let Some(w) = self.waits.get_mut(&thread) {
            w.remove(&lock);
        }
        self.holds.entry(thread).or_default().insert(lock);
        self.holder.insert(lock, thread);
        self.order.entry(thread).or_default().push(lock);
        self.log(
            at_ms,
            thread,
            lock,
            EventKind::Acquired {
                waited_ms: waited.as_secs_f64() * 1000.0,
            },
        );
        self.check_inversion(at_ms, thread)
    }

    pub(crate) fn deny(&mut self, at_ms: f64, thread: ThreadId, lock: LockId) {
        if let Some(w) = self.waits.get_mut(&thread) {
            w.remove(&lock);
        }
        self.log(at_ms, thread, lock, EventKind::Denied);
    }

    pub(crate) fn release(&mut self, at_ms: f64, thread: ThreadId, lock: LockId) {
        if let Some(h) = self.holds.get_mut(&thread) {
            h.remove(&lock);
        }
        if let Some(order) = self.order.get_mut(&thread) {
            if let Some(pos) = order.iter().position(|l| *l == lock) {
                order.remove(pos);
            }
        }
        if self.holder.get(&lock) == Some(&thread) {
            self.holder.remove(&lock);
        }
        self.log(at_ms, thread, lock, EventKind::Released);
    }

    /// Depth-first walk of "waits for lock, held by" edges starting at `start`.
    pub(crate) fn find_cycle(&self, start: ThreadId) -> Option<Vec<WaitEdge>> {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        let mut path = Vec::new();
        self.walk(start, start, &mut visited, &mut on_path, &mut path)
            .then_some(path)
    }

    fn walk(
        &self,
        start: ThreadId,
        thread: ThreadId,
        visited: &mut HashSet<ThreadId>,
        on_path: &mut HashSet<ThreadId>,
        path: &mut Vec<WaitEdge>,
    ) -> bool {
        visited.insert(thread);
        on_path.insert(thread);
        if let Some(waiting) = self.waits.get(&thread) {
            for &lock in waiting {
                let Some(&holder) = self.holder.get(&lock) else {
                    continue;
                };
                path.push(WaitEdge {
                    waiter: thread,
                    lock,
                    holder,
                });
                if holder == start || on_path.contains(&holder) {
                    return true;
                }
                if !visited.contains(&holder) && self.walk(start, holder, visited, on_path, path) {
                    return true;
                }
                path.pop();
            }
        }
        on_path.remove(&thread);
        false
    }

    /// Every adjacent pair of the thread's current acquisition order is
    /// recorded; releasing a middle lock makes new pairs adjacent.
    fn check_inversion(&mut self, at_ms: f64, thread: ThreadId) -> Option<Hazard> {
        let pairs: Vec<(LockId, LockId)> = self
            .order
            .get(&thread)?
            .windows(2)
            .map(|w| (w[0], w[1]))
            .collect();
        self.pair_history
            .entry(thread)
            .or_default()
            .extend(pairs.iter().copied());

        let mut found = None;
        for &(first, second) in pairs.iter().rev() {
            if let Some(hazard) = self.report_inversion(at_ms, thread, first, second) {
                found.get_or_insert(hazard);
            }
        }
        found
    }

    fn report_inversion(
        &mut self,
        at_ms: f64,
        thread: ThreadId,
        first: LockId,
        second: LockId,
    ) -> Option<Hazard> {
        let other = self
            .pair_history
            .iter()
            .find(|(t, pairs)| **t != thread && pairs.contains(&(second, first)))
            .map(|(t, _)| *t)?;

        let key = if first < second {
            vec![first, second]
        } else {
            vec![second, first]
        };
        if !self.reported.insert((HazardKind::OrderingInversion, key)) {
            return None;
        }

        let (me, them) = (self.thread_name(thread), self.thread_name(other));
        let (a, b) = (self.lock_name(first), self.lock_name(second));
        let hazard = Hazard {
            kind: HazardKind::OrderingInversion,
            threads: vec![me.clone(), them.clone()],
            locks: vec![a.clone(), b.clone()],
            message: format!(
                "inconsistent lock ordering: {me} acquires {a} then {b}, but {them} acquires them in reverse order"
            ),
        };
        self.log(at_ms, thread, second, EventKind::OrderingInversion);
        self.hazards.push(hazard.clone());
        Some(hazard)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn two_threads() -> (ThreadId, ThreadId) {
        let a = thread::spawn(|| thread::current().id()).join().unwrap();
        let b = thread::spawn(|| thread::current().id()).join().unwrap();
        (a, b)
    }

    fn state(a: ThreadId, b: ThreadId) -> LockGraphState {
        let mut s = LockGraphState::default();
        s.register_thread(a, "A");
        s.register_thread(b, "B");
        s.register_lock(LockId(1), "L1".to_string());
        s.register_lock(LockId(2), "L2".to_string());
        s
    }

    #[test]
    fn crossed_waits_form_a_cycle() {
        let (a, b) = two_threads();
        let mut s = state(a, b);
        let (l1, l2) = (LockId(1), LockId(2));
        s.request(0.0, a, l1);
        s.grant(0.0, a, l1, Duration::ZERO);
        s.request(0.0, b, l2);
        s.grant(0.0, b, l2, Duration::ZERO);

        assert!(s.request(0.0, a, l2).is_none());
        let hazard = s.request(0.0, b, l1).expect("cycle must be reported");
        assert_eq!(hazard.kind, HazardKind::CircularWait);
        assert_eq!(hazard.threads, vec!["B", "A"]);
        assert_eq!(hazard.locks, vec!["L1", "L2"]);
        assert_eq!(
            hazard.message,
            "circular wait: B waits for L1 held by A -> A waits for L2 held by B"
        );
    }

    #[test]
    fn release_clears_holder_and_order() {
        let (a, b) = two_threads();
        let mut s = state(a, b);
        let l1 = LockId(1);
        s.request(0.0, a, l1);
        s.grant(0.0, a, l1, Duration::ZERO);
        assert_eq!(s.holder(l1), Some(a));
        s.release(0.0, a, l1);
        assert_eq!(s.holder(l1), None);
        assert!(s.holds(a).is_empty());
        assert!(s.order.get(&a).is_some_and(Vec::is_empty));
    }

    #[test]
    fn denied_request_leaves_no_wait_edge() {
        let (a, b) = two_threads();
        let mut s = state(a, b);
        let l1 = LockId(1);
        s.request(0.0, a, l1);
        s.grant(0.0, a, l1, Duration::ZERO);
        s.request(0.0, b, l1);
        s.deny(0.0, b, l1);
        assert!(s.find_cycle(b).is_none());
        assert!(matches!(s.events().last().map(|e| &e.kind), Some(EventKind::Denied)));
    }

    #[test]
    fn pairs_made_adjacent_by_a_middle_release_are_tracked() {
        let (a, b) = two_threads();
        let mut s = state(a, b);
        s.register_lock(LockId(3), "L3".to_string());
        s.register_lock(LockId(4), "L4".to_string());
        let (l1, l2, l3, l4) = (LockId(1), LockId(2), LockId(3), LockId(4));

        s.grant(0.0, a, l1, Duration::ZERO);
        s.grant(0.0, a, l2, Duration::ZERO);
        s.grant(0.0, a, l3, Duration::ZERO);
        s.release(0.0, a, l2);
        s.grant(0.0, a, l4, Duration::ZERO);
        for lock in [l4, l3, l1] {
            s.release(0.0, a, lock);
        }

        s.grant(0.0, b, l3, Duration::ZERO);
        let hazard = s.grant(0.0, b, l1, Duration::ZERO).expect("inversion");
        assert_eq!(hazard.kind, HazardKind::OrderingInversion);
        assert_eq!(hazard.threads, vec!["B", "A"]);
        assert_eq!(hazard.locks, vec!["L3", "L1"]);
    }

    #[test]
    fn reversed_pairs_are_reported_once() {
        let (a, b) = two_threads();
        let mut s = state(a, b);
        let (l1, l2) = (LockId(1), LockId(2));
        for _ in 0..2 {
            s.grant(0.0, a, l1, Duration::ZERO);
            s.grant(0.0, a, l2, Duration::ZERO);
            s.release(0.0, a, l2);
            s.release(0.0, a, l1);
        }
        s.grant(0.0, b, l2, Duration::ZERO);
        let hazard = s.grant(0.0, b, l1, Duration::ZERO).expect("inversion");
        assert_eq!(hazard.threads, vec!["B", "A"]);
        assert_eq!(hazard.locks, vec!["L2", "L1"]);
        s.release(0.0, b, l1);
        s.release(0.0, b, l2);
        s.grant(0.0, b, l2, Duration::ZERO);
        assert!(s.grant(0.0, b, l1, Duration::ZERO).is_none());
        assert_eq!(s.hazards().len(), 1);
    }
}
