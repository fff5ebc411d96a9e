use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ttk_core::{
    procfs, DisplayEntry, DisplaySnapshot, LiveThread, PoolCounters, PoolIntrospect, ThreadKind,
    ThreadState, ThreadTracker,
};

#[derive(Parser)]
#[command(name = "ttk")]
#[command(about = "Runtime thread-activity tracker demo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn the demo workload, reconcile, print the display snapshot
    Snapshot {
        #[arg(long)]
        json: bool,
        #[arg(long, default_value_t = 3)]
        workers: usize,
        #[arg(long, default_value_t = 5)]
        tasks: usize,
    },
    /// Spawn the demo workload, reconcile, write text + Markdown dump files
    Dump {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long, default_value_t = 3)]
        workers: usize,
        #[arg(long, default_value_t = 5)]
        tasks: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let tracker = Arc::new(ThreadTracker::new());

    match cli.command {
        Commands::Snapshot {
            json,
            workers,
            tasks,
        } => {
            let workload = DemoWorkload::start(Arc::clone(&tracker), workers, tasks)?;
            let snapshot = reconcile_live(&tracker)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
            workload.stop();
        }
        Commands::Dump {
            dir,
            workers,
            tasks,
        } => {
            let workload = DemoWorkload::start(Arc::clone(&tracker), workers, tasks)?;
            reconcile_live(&tracker)?;
            let view = tracker.dump_view();
            let paths = ttk_export::write_dump(&dir, &view)
                .with_context(|| format!("writing dump files under {}", dir.display()))?;
            println!("wrote {}", paths.text.display());
            println!("wrote {}", paths.markdown.display());
            workload.stop();
        }
    }

    Ok(())
}

fn reconcile_live(tracker: &ThreadTracker) -> Result<DisplaySnapshot> {
    let caller = procfs::current_tid().context("resolving caller tid")?;
    let live = procfs::sample_live_threads().context("sampling /proc/self/task")?;
    Ok(tracker.reconcile(&live, caller))
}

fn print_snapshot(snapshot: &DisplaySnapshot) {
    for entry in &snapshot.entries {
        match entry {
            DisplayEntry::Thread { id, name, state } => {
                println!("thread {id}  {name}  [{state}]");
            }
            DisplayEntry::PoolHeader { pool_name } => {
                println!("pool {pool_name}:");
            }
            DisplayEntry::PoolMember {
                id, name, state, ..
            } => {
                println!("  worker {id}  {name}  [{state}]");
            }
        }
    }
    println!(
        "total: {} threads ({} unknown)",
        snapshot.total_threads, snapshot.unknown_count
    );
}

fn capture_stack() -> String {
    Backtrace::force_capture().to_string()
}

fn own_tid() -> u64 {
    procfs::current_tid().unwrap_or_default()
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolCounterHandles {
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
}

impl PoolIntrospect for PoolCounterHandles {
    fn counters(&self) -> Option<PoolCounters> {
        Some(PoolCounters {
            active_count: self.active.load(Ordering::Relaxed),
            completed_task_count: self.completed.load(Ordering::Relaxed),
            queue_depth: self.queued.load(Ordering::Relaxed),
        })
    }
}

/// Channel-fed worker pool whose workers and tasks report into the
/// tracker, standing in for the interception glue the tracker normally
/// sits behind.
struct DemoPool {
    name: String,
    tracker: Arc<ThreadTracker>,
    tx: Option<mpsc::Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    queued: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
}

impl DemoPool {
    fn start(tracker: Arc<ThreadTracker>, name: &str, workers: usize) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let queued = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicU64::new(0));

        tracker.on_pool_created(
            name,
            &capture_stack(),
            own_tid(),
            Some(Arc::new(PoolCounterHandles {
                queued: Arc::clone(&queued),
                active: Arc::clone(&active),
                completed: Arc::clone(&completed),
            })),
        );

        let (ready_tx, ready_rx) = mpsc::channel();
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let worker_name = format!("{name}-{i}");
            let tracker = Arc::clone(&tracker);
            let rx = Arc::clone(&rx);
            let active = Arc::clone(&active);
            let completed = Arc::clone(&completed);
            let ready_tx = ready_tx.clone();
            let pool_name = name.to_string();
            let creator = own_tid();
            let handle = thread::Builder::new()
                .name(worker_name.clone())
                .spawn(move || {
                    let tid = own_tid();
                    tracker.on_thread_start(
                        &LiveThread::new(tid, worker_name, ThreadState::Runnable),
                        ThreadKind::PoolWorker,
                        "",
                        creator,
                        Some(&pool_name),
                    );
                    let _ = ready_tx.send(());
                    loop {
                        let job = {
                            let guard = rx.lock().unwrap_or_else(|e| e.into_inner());
                            guard.recv()
                        };
                        match job {
                            Ok(job) => {
                                active.fetch_add(1, Ordering::Relaxed);
                                job();
                                active.fetch_sub(1, Ordering::Relaxed);
                                completed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(_) => break,
                        }
                    }
                })
                .with_context(|| format!("spawning worker {i}"))?;
            handles.push(handle);
        }
        for _ in 0..workers {
            ready_rx.recv().context("waiting for worker startup")?;
        }

        Ok(Self {
            name: name.to_string(),
            tracker,
            tx: Some(tx),
            handles,
            queued,
            completed,
        })
    }

    fn submit(&self, job: Job) -> Result<()> {
        let add_stack = capture_stack();
        let adder = own_tid();
        let tracker = Arc::clone(&self.tracker);
        let pool_name = self.name.clone();
        let queued = Arc::clone(&self.queued);
        queued.fetch_add(1, Ordering::Relaxed);
        let wrapped: Job = Box::new(move || {
            queued.fetch_sub(1, Ordering::Relaxed);
            let tid = own_tid();
            let name = thread::current().name().unwrap_or("worker").to_string();
            tracker.on_thread_start(
                &LiveThread::new(tid, name, ThreadState::Runnable),
                ThreadKind::PoolTask,
                &add_stack,
                adder,
                Some(&pool_name),
            );
            job();
            tracker.on_thread_end(tid, ThreadKind::PoolTask);
        });
        self.tx
            .as_ref()
            .context("pool already stopped")?
            .send(wrapped)
            .map_err(|e| anyhow::anyhow!("submitting job: {e}"))
    }

    fn completed_tasks(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    fn stop(mut self) {
        self.tracker.on_pool_shutdown(&self.name);
        self.tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

struct DemoWorkload {
    pool: DemoPool,
    standalone_stop: Option<mpsc::Sender<()>>,
    standalone: Option<thread::JoinHandle<()>>,
}

impl DemoWorkload {
    fn start(tracker: Arc<ThreadTracker>, workers: usize, tasks: usize) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let standalone_tracker = Arc::clone(&tracker);
        let spawner = own_tid();
        let standalone = thread::Builder::new()
            .name("demo-standalone".to_string())
            .spawn(move || {
                let tid = own_tid();
                standalone_tracker.on_thread_start(
                    &LiveThread::new(tid, "demo-standalone", ThreadState::Runnable),
                    ThreadKind::Plain,
                    &capture_stack(),
                    spawner,
                    None,
                );
                let _ = ready_tx.send(());
                // Parked until the workload is torn down.
                let _ = stop_rx.recv();
                standalone_tracker.on_thread_end(tid, ThreadKind::Plain);
            })
            .context("spawning standalone demo thread")?;
        ready_rx.recv().context("waiting for standalone startup")?;

        let pool = DemoPool::start(Arc::clone(&tracker), "demo-pool", workers)?;
        for _ in 0..tasks {
            pool.submit(Box::new(|| thread::sleep(Duration::from_millis(5))))?;
        }
        while (pool.completed_tasks() as usize) < tasks {
            thread::sleep(Duration::from_millis(2));
        }

        Ok(Self {
            pool,
            standalone_stop: Some(stop_tx),
            standalone: Some(standalone),
        })
    }

    fn stop(mut self) {
        self.standalone_stop.take();
        if let Some(handle) = self.standalone.take() {
            let _ = handle.join();
        }
        self.pool.stop();
    }
}
