pub mod model;
pub mod procfs;
pub mod tracker;

pub use model::{
    DisplayEntry, DisplaySnapshot, DumpView, HistoryEntry, LiveThread, PoolCounters, PoolDump,
    PoolIntrospect, PoolRecord, ThreadId, ThreadKind, ThreadRecord, ThreadState,
};
pub use tracker::ThreadTracker;
