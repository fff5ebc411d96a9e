use crate::model::{
    DisplayEntry, DisplaySnapshot, DumpView, HistoryEntry, LiveThread, PoolDump, PoolIntrospect,
    PoolRecord, ThreadId, ThreadKind, ThreadRecord, ThreadState,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Owns the thread registry, the pool registry, the lifecycle history and
/// the last-known views behind one mutex. Every mutating and reconciling
/// operation runs under that single critical section so a reconciliation
/// pass never observes torn registry state.
///
/// Nothing here returns an error or panics across the public contract: the
/// tracker must never destabilize the application it observes. Races with
/// the event source are logged at warning level and tolerated.
pub struct ThreadTracker {
    inner: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    threads: BTreeMap<ThreadId, ThreadRecord>,
    pools: BTreeMap<String, PoolRecord>,
    introspectors: BTreeMap<String, Arc<dyn PoolIntrospect>>,
    history: Vec<HistoryEntry>,
    last_threads: BTreeMap<ThreadId, ThreadRecord>,
    last_pools: BTreeMap<String, PoolRecord>,
    next_generation: u64,
}

impl ThreadTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TrackerState::default()),
        }
    }

    // A poisoned lock is recovered, never propagated; every critical
    // section leaves the maps structurally valid.
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a start-type event: thread start, handler/timer creation,
    /// pool-worker creation or pool-task begin. Creates or refreshes the
    /// registry record and appends a history entry.
    pub fn on_thread_start(
        &self,
        thread: &LiveThread,
        kind: ThreadKind,
        call_stack: &str,
        caller_id: ThreadId,
        pool_name: Option<&str>,
    ) -> ThreadRecord {
        let mut state = self.lock();
        if !call_stack.is_empty() {
            if let Some(existing) = state.threads.get(&thread.id) {
                if !existing.call_stack.is_empty() {
                    // Task add stacks must not be clobbered silently by a
                    // late start stack; latest write still wins.
                    warn!(
                        event = "call_stack_overwrite",
                        thread_id = thread.id,
                        name = %thread.name,
                        kind = %kind,
                        "record already holds a non-empty call stack"
                    );
                }
            }
        }
        let record = state.upsert_thread(thread, kind, call_stack, caller_id, pool_name);
        let entry = HistoryEntry::from_record(&record);
        state.history.push(entry);
        record
    }

    /// Record an end-type event. Closes the newest open history entry for
    /// `(thread_id, kind)`. Plain and handler threads are removed from the
    /// registry; a finished pool task only clears the worker's add stack
    /// (the worker thread itself stays tracked until a reconciliation miss).
    pub fn on_thread_end(&self, thread_id: ThreadId, kind: ThreadKind) {
        let mut state = self.lock();
        state.mark_history_end(thread_id, kind);
        match kind {
            ThreadKind::Plain | ThreadKind::Handler => {
                state.threads.remove(&thread_id);
            }
            ThreadKind::PoolTask => {
                if let Some(record) = state.threads.get_mut(&thread_id) {
                    record.call_stack.clear();
                }
            }
            ThreadKind::PoolWorker | ThreadKind::Timer => {}
        }
    }

    /// Register a pool. `introspect` is the optional counters capability;
    /// passing `None` drops any previously attached one.
    pub fn on_pool_created(
        &self,
        pool_name: &str,
        create_stack: &str,
        caller_id: ThreadId,
        introspect: Option<Arc<dyn PoolIntrospect>>,
    ) {
        let mut state = self.lock();
        state.pools.insert(
            pool_name.to_string(),
            PoolRecord {
                pool_name: pool_name.to_string(),
                create_stack: create_stack.to_string(),
                create_caller_id: caller_id,
                member_ids: Default::default(),
                shutdown: false,
            },
        );
        match introspect {
            Some(handle) => {
                state.introspectors.insert(pool_name.to_string(), handle);
            }
            None => {
                state.introspectors.remove(pool_name);
            }
        }
    }

    /// Sticky, idempotent shutdown mark. The pool record is only pruned once
    /// a reconciliation pass finds its membership empty.
    pub fn on_pool_shutdown(&self, pool_name: &str) {
        let mut state = self.lock();
        match state.pools.get_mut(pool_name) {
            Some(pool) => pool.shutdown = true,
            None => debug!(event = "pool_shutdown_unknown", pool = pool_name),
        }
    }

    pub fn remove_pool(&self, pool_name: &str) {
        let mut state = self.lock();
        state.pools.remove(pool_name);
        state.introspectors.remove(pool_name);
    }

    pub fn get_thread(&self, thread_id: ThreadId) -> Option<ThreadRecord> {
        self.lock().threads.get(&thread_id).cloned()
    }

    pub fn remove_thread(&self, thread_id: ThreadId) {
        self.lock().threads.remove(&thread_id);
    }

    /// One reconciliation pass: merge the live enumeration into the
    /// registries, infer liveness by hit/miss, prune dead records, rebuild
    /// the last-known views and emit the display snapshot.
    ///
    /// `caller_id` is the identity of the sampling thread and is excluded
    /// from consideration. The pass is idempotent with respect to
    /// classification when no events intervene.
    pub fn reconcile(&self, live: &[LiveThread], caller_id: ThreadId) -> DisplaySnapshot {
        let mut state = self.lock();

        // Step 1: reset transient flags and rebuild pool membership fresh.
        for record in state.threads.values_mut() {
            record.hit = false;
            record.running_stack.clear();
        }
        for pool in state.pools.values_mut() {
            pool.member_ids.clear();
        }

        // Step 2: merge the live enumeration. Membership only attaches to
        // pools already known via explicit creation events.
        for observed in live {
            if observed.id == caller_id {
                continue;
            }
            let generation = state.generation_for(observed.id);
            let pool_name = {
                let record = state
                    .threads
                    .entry(observed.id)
                    .or_insert_with(|| blank_record(observed.id, generation));
                record.hit = true;
                record.name = observed.name.clone();
                record.state = observed.state;
                record.running_stack = observed.running_stack.clone();
                record.pool_name.clone()
            };
            if let Some(pool) = pool_name.and_then(|name| state.pools.get_mut(&name)) {
                pool.member_ids.insert(observed.id);
            }
        }

        // Steps 3 and 4: prune misses and dead pools, keep read-only copies
        // of the survivors. Membership sets are cloned so later passes
        // cannot alias the last-known view.
        state.last_threads.clear();
        state.last_pools.clear();
        state.threads.retain(|_, record| record.hit);
        let survivors: Vec<ThreadRecord> = state.threads.values().cloned().collect();
        for record in survivors {
            state.last_threads.insert(record.id, record);
        }
        state
            .pools
            .retain(|_, pool| !(pool.member_ids.is_empty() && pool.shutdown));
        {
            let TrackerState {
                pools,
                introspectors,
                ..
            } = &mut *state;
            introspectors.retain(|name, _| pools.contains_key(name));
        }
        let kept: Vec<PoolRecord> = state.pools.values().cloned().collect();
        for pool in kept {
            state.last_pools.insert(pool.pool_name.clone(), pool);
        }

        // Step 5: fixed display order so snapshots stay diffable between
        // runs: standalone threads, pool groups, then unknown threads.
        let mut entries = Vec::new();
        for record in state.last_threads.values() {
            let no_pool = record.pool_name.as_deref().map_or(true, str::is_empty);
            if no_pool && !record.call_stack.is_empty() {
                entries.push(DisplayEntry::Thread {
                    id: record.id,
                    name: record.name.clone(),
                    state: record.state,
                });
            }
        }
        for pool in state.last_pools.values() {
            if pool.member_ids.is_empty() {
                continue;
            }
            entries.push(DisplayEntry::PoolHeader {
                pool_name: pool.pool_name.clone(),
            });
            for member_id in &pool.member_ids {
                match state.last_threads.get(member_id) {
                    Some(member) => entries.push(DisplayEntry::PoolMember {
                        id: member.id,
                        name: member.name.clone(),
                        state: member.state,
                        pool_name: pool.pool_name.clone(),
                    }),
                    None => warn!(
                        event = "pool_member_missing",
                        pool = %pool.pool_name,
                        thread_id = *member_id,
                    ),
                }
            }
        }
        let mut unknown_count = 0;
        for record in state.last_threads.values() {
            if record.pool_name.is_none() && record.call_stack.is_empty() {
                entries.push(DisplayEntry::Thread {
                    id: record.id,
                    name: record.name.clone(),
                    state: record.state,
                });
                unknown_count += 1;
            }
        }

        // Step 6: the caller is part of the enumeration but not the count.
        DisplaySnapshot {
            entries,
            total_threads: live.len().saturating_sub(1),
            unknown_count,
        }
    }

    /// Thread detail as of the most recent reconciliation pass.
    pub fn lookup_last_thread(&self, thread_id: ThreadId) -> Option<ThreadRecord> {
        self.lock().last_threads.get(&thread_id).cloned()
    }

    /// Pool detail as of the most recent reconciliation pass.
    pub fn lookup_last_pool(&self, pool_name: &str) -> Option<PoolRecord> {
        self.lock().last_pools.get(pool_name).cloned()
    }

    /// Full append-only lifecycle log, oldest first.
    pub fn export_history(&self) -> Vec<HistoryEntry> {
        self.lock().history.clone()
    }

    /// Everything the dump exporter needs, captured atomically. Pool
    /// counters are resolved here; an introspector that cannot answer
    /// degrades to omitted counters.
    pub fn dump_view(&self) -> DumpView {
        let state = self.lock();
        DumpView {
            threads: state.threads.values().cloned().collect(),
            pools: state
                .pools
                .values()
                .map(|pool| PoolDump {
                    counters: state
                        .introspectors
                        .get(&pool.pool_name)
                        .and_then(|handle| handle.counters()),
                    record: pool.clone(),
                })
                .collect(),
            history: state.history.clone(),
        }
    }
}

impl Default for ThreadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerState {
    fn generation_for(&mut self, thread_id: ThreadId) -> u64 {
        match self.threads.get(&thread_id) {
            Some(record) => record.generation,
            None => {
                self.next_generation += 1;
                self.next_generation
            }
        }
    }

    fn upsert_thread(
        &mut self,
        thread: &LiveThread,
        kind: ThreadKind,
        call_stack: &str,
        caller_id: ThreadId,
        pool_name: Option<&str>,
    ) -> ThreadRecord {
        let generation = self.generation_for(thread.id);
        let record = self
            .threads
            .entry(thread.id)
            .or_insert_with(|| blank_record(thread.id, generation));
        record.name = thread.name.clone();
        record.state = thread.state;
        record.kind = kind;
        record.call_stack = call_stack.to_string();
        record.caller_thread_id = caller_id;
        if let Some(name) = pool_name {
            record.pool_name = Some(name.to_string());
        }
        // A start event arriving through a pool keeps the pool association;
        // only an explicit pool name replaces it.
        record.created_at = Utc::now();
        record.clone()
    }

    fn mark_history_end(&mut self, thread_id: ThreadId, kind: ThreadKind) {
        // Newest first, stopping at the first still-open entry so a recycled
        // identity never closes an entry from an older generation.
        for entry in self.history.iter_mut().rev() {
            if entry.id == thread_id && entry.kind == kind && entry.end_time.is_none() {
                entry.end_time = Some(Utc::now());
                return;
            }
        }
        warn!(
            event = "history_end_unmatched",
            thread_id = thread_id,
            kind = %kind,
        );
    }
}

fn blank_record(id: ThreadId, generation: u64) -> ThreadRecord {
    ThreadRecord {
        id,
        name: String::new(),
        state: ThreadState::Unknown,
        kind: ThreadKind::Plain,
        call_stack: String::new(),
        caller_thread_id: 0,
        pool_name: None,
        created_at: Utc::now(),
        generation,
        running_stack: String::new(),
        hit: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PoolCounters;

    const CALLER: ThreadId = 999;

    fn live(id: ThreadId, name: &str) -> LiveThread {
        LiveThread::new(id, name, ThreadState::Runnable)
    }

    fn start_plain(tracker: &ThreadTracker, id: ThreadId, name: &str, stack: &str) {
        tracker.on_thread_start(&live(id, name), ThreadKind::Plain, stack, 1, None);
    }

    fn start_worker(tracker: &ThreadTracker, id: ThreadId, name: &str, pool: &str) {
        tracker.on_thread_start(&live(id, name), ThreadKind::PoolWorker, "", 1, Some(pool));
    }

    struct FixedCounters(PoolCounters);

    impl PoolIntrospect for FixedCounters {
        fn counters(&self) -> Option<PoolCounters> {
            Some(self.0)
        }
    }

    #[test]
    fn standalone_thread_snapshot() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 10, "worker-a", "main.start");

        let snapshot = tracker.reconcile(&[live(10, "worker-a"), live(CALLER, "refresh")], CALLER);

        assert_eq!(snapshot.total_threads, 1);
        assert_eq!(snapshot.unknown_count, 0);
        assert_eq!(snapshot.entries.len(), 1);
        match &snapshot.entries[0] {
            DisplayEntry::Thread { id, name, state } => {
                assert_eq!(*id, 10);
                assert_eq!(name, "worker-a");
                assert_eq!(*state, ThreadState::Runnable);
            }
            other => panic!("expected standalone row, got {other:?}"),
        }
    }

    #[test]
    fn pool_membership_is_rebuilt_from_live_set() {
        let tracker = ThreadTracker::new();
        tracker.on_pool_created("io-pool", "pool.create", 1, None);
        for id in [20, 21, 22] {
            start_worker(&tracker, id, &format!("io-{id}"), "io-pool");
        }

        let live_set = vec![
            live(20, "io-20"),
            live(21, "io-21"),
            live(22, "io-22"),
            live(CALLER, "refresh"),
        ];
        let snapshot = tracker.reconcile(&live_set, CALLER);

        let pool = tracker.lookup_last_pool("io-pool").expect("pool retained");
        assert_eq!(
            pool.member_ids.iter().copied().collect::<Vec<_>>(),
            vec![20, 21, 22]
        );

        let headers: Vec<_> = snapshot
            .entries
            .iter()
            .filter(|e| matches!(e, DisplayEntry::PoolHeader { .. }))
            .collect();
        let members: Vec<_> = snapshot
            .entries
            .iter()
            .filter(|e| matches!(e, DisplayEntry::PoolMember { .. }))
            .collect();
        assert_eq!(headers.len(), 1);
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn shutdown_pool_with_no_members_is_pruned() {
        let tracker = ThreadTracker::new();
        tracker.on_pool_created("io-pool", "pool.create", 1, None);
        for id in [20, 21, 22] {
            start_worker(&tracker, id, &format!("io-{id}"), "io-pool");
        }
        tracker.reconcile(
            &[live(20, "io-20"), live(21, "io-21"), live(22, "io-22")],
            CALLER,
        );

        tracker.on_pool_shutdown("io-pool");
        tracker.reconcile(&[live(CALLER, "refresh")], CALLER);

        assert!(tracker.lookup_last_pool("io-pool").is_none());
        assert!(tracker.dump_view().pools.is_empty());
    }

    #[test]
    fn empty_pool_without_shutdown_is_retained() {
        let tracker = ThreadTracker::new();
        tracker.on_pool_created("idle-pool", "pool.create", 1, None);

        tracker.reconcile(&[live(CALLER, "refresh")], CALLER);

        let pool = tracker.lookup_last_pool("idle-pool").expect("retained");
        assert!(pool.member_ids.is_empty());
        assert!(!pool.shutdown);
    }

    #[test]
    fn start_then_end_yields_one_closed_history_entry() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 5, "short-lived", "main.start");
        tracker.on_thread_end(5, ThreadKind::Plain);

        let history = tracker.export_history();
        assert_eq!(history.len(), 1);
        let entry = &history[0];
        assert_eq!(entry.id, 5);
        assert!(entry.end_time.is_some());
        assert!(entry.duration_ms().expect("closed entry") >= 0);
        assert!(tracker.get_thread(5).is_none());
    }

    #[test]
    fn missed_record_is_pruned_after_one_pass() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 30, "survivor", "a.start");
        start_plain(&tracker, 31, "vanished", "b.start");

        tracker.reconcile(&[live(30, "survivor"), live(CALLER, "refresh")], CALLER);

        assert!(tracker.get_thread(30).is_some());
        assert!(tracker.get_thread(31).is_none());
        assert!(tracker.lookup_last_thread(31).is_none());
    }

    #[test]
    fn membership_never_creates_a_pool() {
        let tracker = ThreadTracker::new();
        start_worker(&tracker, 40, "orphan", "ghost-pool");

        tracker.reconcile(&[live(40, "orphan"), live(CALLER, "refresh")], CALLER);

        assert!(tracker.lookup_last_pool("ghost-pool").is_none());
    }

    #[test]
    fn end_event_matches_newest_open_entry() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 7, "gen-1", "first.start");
        tracker.on_thread_end(7, ThreadKind::Plain);
        start_plain(&tracker, 7, "gen-2", "second.start");
        tracker.on_thread_end(7, ThreadKind::Plain);

        let history = tracker.export_history();
        assert_eq!(history.len(), 2);
        assert!(history[0].end_time.is_some());
        assert!(history[1].end_time.is_some());
        assert!(history[0].end_time <= history[1].end_time);
        assert_ne!(history[0].generation, history[1].generation);
    }

    #[test]
    fn handler_end_removes_the_record() {
        let tracker = ThreadTracker::new();
        tracker.on_thread_start(
            &live(15, "msg-loop"),
            ThreadKind::Handler,
            "handler.start",
            1,
            None,
        );
        tracker.on_thread_end(15, ThreadKind::Handler);

        assert!(tracker.get_thread(15).is_none());
        let history = tracker.export_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].end_time.is_some());
    }

    #[test]
    fn unmatched_end_is_a_no_op() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 8, "only-plain", "x.start");
        tracker.on_thread_end(8, ThreadKind::Timer);

        let history = tracker.export_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].end_time.is_none());
    }

    #[test]
    fn history_is_append_only_and_frozen() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 50, "one", "one.start");
        let before = tracker.export_history();

        start_plain(&tracker, 51, "two", "two.start");
        tracker.reconcile(&[live(CALLER, "refresh")], CALLER);
        tracker.on_thread_start(&live(50, "one-renamed"), ThreadKind::Plain, "restart", 2, None);

        let after = tracker.export_history();
        assert!(after.len() >= before.len());
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].name, before[0].name);
        assert_eq!(after[0].kind, before[0].kind);
        assert_eq!(after[0].start_time, before[0].start_time);
    }

    #[test]
    fn display_rows_are_ordered_standalone_pools_unknown() {
        let tracker = ThreadTracker::new();
        tracker.on_pool_created("io-pool", "pool.create", 1, None);
        start_plain(&tracker, 10, "standalone", "main.start");
        start_worker(&tracker, 20, "io-20", "io-pool");

        // id 60 was never registered: an unknown/system thread.
        let snapshot = tracker.reconcile(
            &[
                live(60, "gc"),
                live(20, "io-20"),
                live(10, "standalone"),
                live(CALLER, "refresh"),
            ],
            CALLER,
        );

        let kinds: Vec<u8> = snapshot
            .entries
            .iter()
            .map(|e| match e {
                DisplayEntry::Thread { id, .. } => {
                    if *id == 10 {
                        0
                    } else {
                        2
                    }
                }
                DisplayEntry::PoolHeader { .. } | DisplayEntry::PoolMember { .. } => 1,
            })
            .collect();
        let mut sorted = kinds.clone();
        sorted.sort_unstable();
        assert_eq!(kinds, sorted, "rows out of order: {:?}", snapshot.entries);
        assert_eq!(snapshot.unknown_count, 1);
        assert_eq!(snapshot.total_threads, 3);
    }

    #[test]
    fn unknown_threads_are_counted_not_detailed() {
        let tracker = ThreadTracker::new();
        let snapshot = tracker.reconcile(&[live(70, "binder"), live(CALLER, "refresh")], CALLER);

        assert_eq!(snapshot.unknown_count, 1);
        let record = tracker.lookup_last_thread(70).expect("tracked");
        assert!(record.call_stack.is_empty());
        assert!(record.pool_name.is_none());
    }

    #[test]
    fn caller_is_excluded_from_merge_and_count() {
        let tracker = ThreadTracker::new();
        let snapshot = tracker.reconcile(&[live(CALLER, "refresh")], CALLER);

        assert_eq!(snapshot.total_threads, 0);
        assert!(snapshot.entries.is_empty());
        assert!(tracker.lookup_last_thread(CALLER).is_none());
    }

    #[test]
    fn reconcile_refreshes_name_and_state() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 11, "before", "main.start");

        let mut observed = live(11, "after");
        observed.state = ThreadState::Sleeping;
        observed.running_stack = "park\n".to_string();
        tracker.reconcile(&[observed, live(CALLER, "refresh")], CALLER);

        let record = tracker.lookup_last_thread(11).expect("tracked");
        assert_eq!(record.name, "after");
        assert_eq!(record.state, ThreadState::Sleeping);
        assert_eq!(record.running_stack, "park\n");
    }

    #[test]
    fn last_known_views_reflect_latest_pass_only() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 12, "a", "a.start");
        tracker.reconcile(&[live(12, "a"), live(CALLER, "refresh")], CALLER);
        assert!(tracker.lookup_last_thread(12).is_some());

        tracker.reconcile(&[live(CALLER, "refresh")], CALLER);
        assert!(tracker.lookup_last_thread(12).is_none());
    }

    #[test]
    fn pool_task_end_clears_stack_but_keeps_worker() {
        let tracker = ThreadTracker::new();
        tracker.on_pool_created("io-pool", "pool.create", 1, None);
        start_worker(&tracker, 20, "io-20", "io-pool");
        tracker.on_thread_start(
            &live(20, "io-20"),
            ThreadKind::PoolTask,
            "submit.site",
            3,
            Some("io-pool"),
        );
        tracker.on_thread_end(20, ThreadKind::PoolTask);

        let record = tracker.get_thread(20).expect("worker still tracked");
        assert!(record.call_stack.is_empty());

        let history = tracker.export_history();
        assert_eq!(history.len(), 2);
        let task = history
            .iter()
            .find(|e| e.kind == ThreadKind::PoolTask)
            .expect("task entry");
        assert!(task.end_time.is_some());
        assert_eq!(task.call_stack, "submit.site");
    }

    #[test]
    fn start_without_pool_keeps_existing_association() {
        let tracker = ThreadTracker::new();
        tracker.on_pool_created("io-pool", "pool.create", 1, None);
        start_worker(&tracker, 25, "io-25", "io-pool");
        // A plain start observed for a pool-owned thread must not detach it.
        tracker.on_thread_start(&live(25, "io-25"), ThreadKind::Plain, "start.site", 4, None);

        let record = tracker.get_thread(25).expect("tracked");
        assert_eq!(record.pool_name.as_deref(), Some("io-pool"));
    }

    #[test]
    fn call_stack_overwrite_favors_latest_write() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 33, "t", "first.site");
        start_plain(&tracker, 33, "t", "second.site");

        let record = tracker.get_thread(33).expect("tracked");
        assert_eq!(record.call_stack, "second.site");
    }

    #[test]
    fn repeated_reconcile_converges() {
        let tracker = ThreadTracker::new();
        tracker.on_pool_created("io-pool", "pool.create", 1, None);
        start_plain(&tracker, 10, "standalone", "main.start");
        start_worker(&tracker, 20, "io-20", "io-pool");

        let live_set = vec![live(10, "standalone"), live(20, "io-20"), live(CALLER, "r")];
        let first = tracker.reconcile(&live_set, CALLER);
        let second = tracker.reconcile(&live_set, CALLER);

        assert_eq!(first.entries.len(), second.entries.len());
        assert_eq!(first.total_threads, second.total_threads);
        assert_eq!(first.unknown_count, second.unknown_count);
    }

    #[test]
    fn dump_view_resolves_pool_counters() {
        let tracker = ThreadTracker::new();
        let counters = PoolCounters {
            active_count: 2,
            completed_task_count: 17,
            queue_depth: 3,
        };
        tracker.on_pool_created(
            "io-pool",
            "pool.create",
            1,
            Some(Arc::new(FixedCounters(counters))),
        );
        tracker.on_pool_created("opaque-pool", "pool.create", 1, None);

        let view = tracker.dump_view();
        assert_eq!(view.pools.len(), 2);
        let io = view
            .pools
            .iter()
            .find(|p| p.record.pool_name == "io-pool")
            .expect("io-pool");
        assert_eq!(io.counters, Some(counters));
        let opaque = view
            .pools
            .iter()
            .find(|p| p.record.pool_name == "opaque-pool")
            .expect("opaque-pool");
        assert_eq!(opaque.counters, None);
    }

    #[test]
    fn dump_view_threads_are_sorted_by_id() {
        let tracker = ThreadTracker::new();
        start_plain(&tracker, 90, "z", "z.start");
        start_plain(&tracker, 12, "a", "a.start");
        start_plain(&tracker, 45, "m", "m.start");

        let ids: Vec<ThreadId> = tracker.dump_view().threads.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![12, 45, 90]);
    }
}
