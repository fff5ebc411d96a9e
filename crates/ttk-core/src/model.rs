use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type ThreadId = u64;

/// How a tracked thread (or pool task) entered the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadKind {
    Plain,
    PoolWorker,
    PoolTask,
    Timer,
    Handler,
}

impl ThreadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadKind::Plain => "plain",
            ThreadKind::PoolWorker => "pool-worker",
            ThreadKind::PoolTask => "pool-task",
            ThreadKind::Timer => "timer",
            ThreadKind::Handler => "handler",
        }
    }
}

impl fmt::Display for ThreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state as last observed. Refreshed on every reconciliation
/// pass; `Unknown` when the live source cannot tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadState {
    Runnable,
    Sleeping,
    Blocked,
    Stopped,
    Terminated,
    Unknown,
}

impl ThreadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadState::Runnable => "runnable",
            ThreadState::Sleeping => "sleeping",
            ThreadState::Blocked => "blocked",
            ThreadState::Stopped => "stopped",
            ThreadState::Terminated => "terminated",
            ThreadState::Unknown => "unknown",
        }
    }

    /// Map a procfs `stat` state character.
    pub fn from_proc_char(c: char) -> Self {
        match c {
            'R' => ThreadState::Runnable,
            'S' | 'I' => ThreadState::Sleeping,
            'D' => ThreadState::Blocked,
            'T' | 't' => ThreadState::Stopped,
            'Z' | 'X' | 'x' => ThreadState::Terminated,
            _ => ThreadState::Unknown,
        }
    }
}

impl Default for ThreadState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live thread as observed by the enumeration source. `running_stack`
/// is best-effort; sources that cannot capture it leave it empty.
#[derive(Debug, Clone, Serialize)]
pub struct LiveThread {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub running_stack: String,
}

impl LiveThread {
    pub fn new(id: ThreadId, name: impl Into<String>, state: ThreadState) -> Self {
        Self {
            id,
            name: name.into(),
            state,
            running_stack: String::new(),
        }
    }
}

/// Registry entry for one tracked thread identity.
///
/// `call_stack` is the start-site stack for plain/handler/timer threads and
/// the task add-site stack for pool tasks; empty means no task is currently
/// attributable. `running_stack` and `hit` are transient reconciliation
/// scratch and never persist across passes.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadRecord {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub kind: ThreadKind,
    pub call_stack: String,
    pub caller_thread_id: ThreadId,
    pub pool_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub generation: u64,
    #[serde(skip)]
    pub running_stack: String,
    #[serde(skip)]
    pub(crate) hit: bool,
}

/// Registry entry for one named pool. Membership is rebuilt from scratch on
/// every reconciliation pass and must not be mutated by callers.
#[derive(Debug, Clone, Serialize)]
pub struct PoolRecord {
    pub pool_name: String,
    pub create_stack: String,
    pub create_caller_id: ThreadId,
    pub member_ids: BTreeSet<ThreadId>,
    pub shutdown: bool,
}

/// Diagnostic counters a pool implementation may expose for dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolCounters {
    pub active_count: usize,
    pub completed_task_count: u64,
    pub queue_depth: usize,
}

/// Optional introspection capability attached at pool creation. Returning
/// `None` degrades the dump to omitted counters, never to a failure.
pub trait PoolIntrospect: Send + Sync {
    fn counters(&self) -> Option<PoolCounters>;
}

/// Append-only lifecycle log entry. Everything but `end_time` is frozen at
/// append; `end_time` transitions once from unset to set.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: ThreadId,
    pub name: String,
    pub kind: ThreadKind,
    pub call_stack: String,
    pub caller_thread_id: ThreadId,
    pub pool_name: Option<String>,
    pub generation: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn from_record(record: &ThreadRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            kind: record.kind,
            call_stack: record.call_stack.clone(),
            caller_thread_id: record.caller_thread_id,
            pool_name: record.pool_name.clone(),
            generation: record.generation,
            start_time: record.created_at,
            end_time: None,
        }
    }

    /// Milliseconds between start and end, `None` while the end is unset.
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// One presentation row. Standalone and unknown threads both render as
/// `Thread`; unknown ones are counted in `DisplaySnapshot::unknown_count`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "row", rename_all = "kebab-case")]
pub enum DisplayEntry {
    Thread {
        id: ThreadId,
        name: String,
        state: ThreadState,
    },
    PoolHeader {
        pool_name: String,
    },
    PoolMember {
        id: ThreadId,
        name: String,
        state: ThreadState,
        pool_name: String,
    },
}

/// Point-in-time display snapshot produced by a reconciliation pass.
/// Row order is fixed: standalone threads, then pool groups, then unknown
/// threads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisplaySnapshot {
    pub entries: Vec<DisplayEntry>,
    pub total_threads: usize,
    pub unknown_count: usize,
}

/// Read-only view of tracker state handed to the dump exporter. Threads are
/// sorted by id; pool counters are resolved once, under the tracker lock.
#[derive(Clone, Serialize)]
pub struct DumpView {
    pub threads: Vec<ThreadRecord>,
    pub pools: Vec<PoolDump>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Clone, Serialize)]
pub struct PoolDump {
    pub record: PoolRecord,
    pub counters: Option<PoolCounters>,
}
