use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use ttk_core::{DumpView, HistoryEntry, PoolDump, ThreadId, ThreadRecord};

const MARKDOWN_INDENT: &str = "    ";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPaths {
    pub text: PathBuf,
    pub markdown: PathBuf,
}

/// Render the view and write a numbered `thread_dump_N.txt` plus its
/// `thread_dump_N.md` sibling into `dir`.
pub fn write_dump(dir: &Path, view: &DumpView) -> Result<DumpPaths, ExportError> {
    let text_path = next_dump_path(dir);
    let markdown_path = markdown_sibling(&text_path);
    write_file(&text_path, &render_text_dump(view))?;
    write_file(&markdown_path, &render_markdown_dump(view))?;
    Ok(DumpPaths {
        text: text_path,
        markdown: markdown_path,
    })
}

fn write_file(path: &Path, content: &str) -> Result<(), ExportError> {
    fs::write(path, content).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// First unused `thread_dump_N.txt` in `dir`, starting at 1.
pub fn next_dump_path(dir: &Path) -> PathBuf {
    let mut index = 1;
    loop {
        let candidate = dir.join(format!("thread_dump_{index}.txt"));
        if !candidate.exists() {
            return candidate;
        }
        index += 1;
    }
}

pub fn markdown_sibling(text_path: &Path) -> PathBuf {
    text_path.with_extension("md")
}

/// Sectioned plain-text dump: history (brief, then with stacks), current
/// threads sorted by id (brief, then with stacks), pools with members,
/// pools without.
pub fn render_text_dump(view: &DumpView) -> String {
    let mut out = String::new();
    section(&mut out, "thread history", view.history.len());
    for entry in &view.history {
        let _ = writeln!(out, "# {}", history_line(entry));
    }
    section(&mut out, "thread history (with stack)", view.history.len());
    for entry in &view.history {
        let _ = writeln!(out, "# {}", history_full(entry));
    }

    section(&mut out, "current threads", view.threads.len());
    for record in &view.threads {
        let _ = writeln!(out, "# {}", thread_line(record));
    }
    section(&mut out, "current threads (with stack)", view.threads.len());
    for record in &view.threads {
        let _ = writeln!(out, "# {}", thread_full(record));
    }

    section(&mut out, "pool", view.pools.len());
    for pool in view.pools.iter().filter(|p| !p.record.member_ids.is_empty()) {
        let _ = writeln!(out, "# {}", pool_full(pool));
    }
    section(&mut out, "pool (no threads)", view.pools.len());
    for pool in view.pools.iter().filter(|p| p.record.member_ids.is_empty()) {
        let _ = writeln!(out, "# {}", pool_full(pool));
    }
    out
}

/// Pool-centric Markdown dump: each populated pool as a list item with its
/// counters and fenced create stack, member thread history nested one level
/// deeper, then the memberless pools.
pub fn render_markdown_dump(view: &DumpView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "## ————————————————— thread pool ———————————————  total number: {}",
        view.pools.len()
    );
    for pool in view.pools.iter().filter(|p| !p.record.member_ids.is_empty()) {
        out.push_str(&markdown_list_item(&pool_markdown(pool), 1));
        for member_id in &pool.record.member_ids {
            out.push_str(&member_history_markdown(&view.history, *member_id));
        }
    }
    let _ = writeln!(
        out,
        "## ————————————————— thread pool (no threads) —————————————————  total number: {}",
        view.pools.len()
    );
    for pool in view.pools.iter().filter(|p| p.record.member_ids.is_empty()) {
        out.push_str(&markdown_list_item(&pool_markdown(pool), 1));
    }
    out
}

fn section(out: &mut String, title: &str, total: usize) {
    let _ = writeln!(
        out,
        "\n————————————————— {title} —————————————————  total number: {total}"
    );
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%H:%M:%S%.3f").to_string()
}

pub fn duration_label(entry: &HistoryEntry) -> String {
    match entry.duration_ms() {
        Some(ms) => format!("{ms}ms"),
        None => "N/A".to_string(),
    }
}

fn pool_label(pool_name: Option<&str>) -> &str {
    pool_name.unwrap_or("-")
}

fn member_list(ids: impl IntoIterator<Item = ThreadId>) -> String {
    let rendered: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

pub fn history_line(entry: &HistoryEntry) -> String {
    format!(
        "id: {}, name: {}, kind: {}, caller: {}, pool: {}, generation: {}, started: {}, duration: {}",
        entry.id,
        entry.name,
        entry.kind,
        entry.caller_thread_id,
        pool_label(entry.pool_name.as_deref()),
        entry.generation,
        format_time(entry.start_time),
        duration_label(entry),
    )
}

pub fn history_full(entry: &HistoryEntry) -> String {
    format!(
        "{}\n  * callStack:\n{}",
        history_line(entry),
        indent_stack(&entry.call_stack)
    )
}

pub fn thread_line(record: &ThreadRecord) -> String {
    format!(
        "id: {}, name: {}, state: {}, kind: {}, caller: {}, pool: {}, generation: {}, started: {}",
        record.id,
        record.name,
        record.state,
        record.kind,
        record.caller_thread_id,
        pool_label(record.pool_name.as_deref()),
        record.generation,
        format_time(record.created_at),
    )
}

pub fn thread_full(record: &ThreadRecord) -> String {
    let mut out = format!(
        "{}\n  * callStack:\n{}",
        thread_line(record),
        indent_stack(&record.call_stack)
    );
    if !record.running_stack.is_empty() {
        let _ = write!(
            out,
            "  * runningStack:\n{}",
            indent_stack(&record.running_stack)
        );
    }
    out
}

pub fn pool_full(pool: &PoolDump) -> String {
    let mut out = format!(
        "pool: {}, caller: {}, members: {}, shutdown: {}",
        pool.record.pool_name,
        pool.record.create_caller_id,
        member_list(pool.record.member_ids.iter().copied()),
        pool.record.shutdown,
    );
    if let Some(counters) = pool.counters {
        let _ = write!(
            out,
            "\n  * active: {}, completed tasks: {}, queue depth: {}",
            counters.active_count, counters.completed_task_count, counters.queue_depth
        );
    }
    let _ = write!(
        out,
        "\n  * createStack:\n{}",
        indent_stack(&pool.record.create_stack)
    );
    out
}

fn pool_markdown(pool: &PoolDump) -> String {
    let mut out = format!(
        "\"{}\" - caller: {}, members: {}\n",
        pool.record.pool_name,
        pool.record.create_caller_id,
        member_list(pool.record.member_ids.iter().copied()),
    );
    if let Some(counters) = pool.counters {
        let _ = writeln!(
            out,
            "active: {}, completed tasks: {}, queue depth: {}",
            counters.active_count, counters.completed_task_count, counters.queue_depth
        );
    }
    let _ = write!(
        out,
        "createStack:\n```\n{}```\n",
        fenced(&pool.record.create_stack)
    );
    out
}

fn member_history_markdown(history: &[HistoryEntry], member_id: ThreadId) -> String {
    let mut out = String::new();
    for entry in history.iter().filter(|e| e.id == member_id) {
        let body = format!(
            "{}\ncallStack:\n```\n{}```\n",
            history_line(entry),
            fenced(&entry.call_stack)
        );
        out.push_str(&markdown_list_item(&body, 2));
    }
    out
}

fn fenced(stack: &str) -> String {
    if stack.is_empty() || stack.ends_with('\n') {
        stack.to_string()
    } else {
        format!("{stack}\n")
    }
}

/// Indent every stack line four spaces; empty stacks render as nothing.
pub fn indent_stack(stack: &str) -> String {
    if stack.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    for line in stack.split('\n') {
        let _ = writeln!(out, "    {line}");
    }
    out
}

/// Turn a multi-line block into a Markdown list item: `- ` on the first
/// line (styled), continuation lines indented one level deeper. `level`
/// starts at 1.
pub fn markdown_list_item(text: &str, level: usize) -> String {
    let mut out = String::new();
    for (i, line) in text.split('\n').enumerate() {
        if i == 0 {
            out.push_str(&MARKDOWN_INDENT.repeat(level - 1));
            out.push_str("- ");
            out.push_str(&apply_styles(line));
        } else {
            out.push_str(&MARKDOWN_INDENT.repeat(level));
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Bold + color the interesting tokens of a summary line (ids and member
/// lists red, timestamps and durations blue). Only the first match per rule
/// is styled.
pub fn apply_styles(line: &str) -> String {
    let rules = [
        (
            Regex::new(r"\w+@(\w+)").expect("valid regex"),
            "<span style=\"color:red\">",
        ),
        (
            Regex::new(r"members: (\[.+\])").expect("valid regex"),
            "<span style=\"color:red\">",
        ),
        (
            Regex::new(r"id: (\d+)").expect("valid regex"),
            "<span style=\"color:red\">",
        ),
        (
            Regex::new(r"started: (\d+:\d+:\d+\.\d+)").expect("valid regex"),
            "<span style=\"color:blue\">",
        ),
        (
            Regex::new(r"duration: (\d+ms)").expect("valid regex"),
            "<span style=\"color:blue\">",
        ),
    ];

    let mut styled = line.to_string();
    for (pattern, open_tag) in rules {
        if let Some(captures) = pattern.captures(&styled) {
            if let Some(group) = captures.get(1) {
                let replacement = format!("**{open_tag}{}</span>**", group.as_str());
                styled.replace_range(group.range(), &replacement);
            }
        }
    }
    styled
}
