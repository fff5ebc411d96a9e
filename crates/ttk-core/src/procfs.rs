use crate::model::{LiveThread, ThreadId, ThreadState};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed stat line: {0}")]
    Malformed(String),
}

/// Enumerate the calling process's live threads from `/proc/self/task`.
///
/// Individual tasks that disappear mid-scan are skipped; running call
/// stacks are not readable here and stay empty. Only failure to list the
/// task directory itself is an error.
#[cfg(target_os = "linux")]
pub fn sample_live_threads() -> Result<Vec<LiveThread>, SampleError> {
    let task_dir = Path::new("/proc/self/task");
    let entries = fs::read_dir(task_dir).map_err(|source| SampleError::Io {
        path: task_dir.display().to_string(),
        source,
    })?;

    let mut threads = Vec::new();
    for entry in entries.flatten() {
        let Some(tid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<ThreadId>().ok())
        else {
            continue;
        };
        let stat_path = entry.path().join("stat");
        let Ok(stat) = fs::read_to_string(&stat_path) else {
            continue; // thread exited between readdir and read
        };
        if let Ok((name, state)) = parse_stat_line(&stat) {
            threads.push(LiveThread {
                id: tid,
                name,
                state,
                running_stack: String::new(),
            });
        }
    }
    Ok(threads)
}

/// Kernel thread id of the calling thread, for caller exclusion during
/// reconciliation.
#[cfg(target_os = "linux")]
pub fn current_tid() -> Result<ThreadId, SampleError> {
    let path = "/proc/thread-self/stat";
    let stat = fs::read_to_string(path).map_err(|source| SampleError::Io {
        path: path.to_string(),
        source,
    })?;
    stat.split_whitespace()
        .next()
        .and_then(|field| field.parse::<ThreadId>().ok())
        .ok_or_else(|| SampleError::Malformed(stat.trim_end().to_string()))
}

/// Extract `(comm, state)` from a procfs stat line. The comm field is
/// parenthesized and may itself contain spaces or parentheses, so the name
/// spans the first `(` to the last `)`.
fn parse_stat_line(stat: &str) -> Result<(String, ThreadState), SampleError> {
    let open = stat
        .find('(')
        .ok_or_else(|| SampleError::Malformed(stat.trim_end().to_string()))?;
    let close = stat
        .rfind(')')
        .ok_or_else(|| SampleError::Malformed(stat.trim_end().to_string()))?;
    if close < open {
        return Err(SampleError::Malformed(stat.trim_end().to_string()));
    }
    let name = stat[open + 1..close].to_string();
    let state = stat[close + 1..]
        .split_whitespace()
        .next()
        .and_then(|field| field.chars().next())
        .map(ThreadState::from_proc_char)
        .unwrap_or_default();
    Ok((name, state))
}
