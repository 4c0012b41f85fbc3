//! In-process reference device used for tests/benchmarks.
//!
//! One worker thread per command queue, fed over an mpsc channel. The worker
//! runs the three stages of every submission in order (materialize
//! device-side copies of the input buffers, evaluate the kernel, copy the
//! result bitmap back) and flips one completion signal per stage.
//! Per-unit stage latencies can be configured so tests can overlap chunks
//! and force out-of-order completion across queues.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use arrow::buffer::BooleanBuffer;
use lode_result::{Error, Result};

use crate::kernel::KernelProgram;
use crate::{CommandQueue, Device, KernelInput, KernelOutput, StageProgress, Submission};

pub struct HostDevice {
    shared: Arc<HostShared>,
}

#[derive(Debug)]
struct HostShared {
    units: usize,
    latencies: Vec<Duration>,
    /// Failure injection: `create_queue` fails once this many queues exist.
    queue_limit: Option<usize>,
    active_queues: AtomicI64,
    in_flight: AtomicI64,
    peak_in_flight: AtomicI64,
}

impl HostDevice {
    pub fn new(units: usize) -> Self {
        Self::with_latencies(vec![Duration::ZERO; units])
    }

    /// One unit per entry, each running its stages with the given latency.
    pub fn with_latencies(latencies: Vec<Duration>) -> Self {
        Self {
            shared: Arc::new(HostShared {
                units: latencies.len(),
                latencies,
                queue_limit: None,
                active_queues: AtomicI64::new(0),
                in_flight: AtomicI64::new(0),
                peak_in_flight: AtomicI64::new(0),
            }),
        }
    }

    /// Device that refuses to create more than `limit` queues, for exercising
    /// the mid-initialization failure path.
    pub fn with_queue_limit(units: usize, limit: usize) -> Self {
        Self {
            shared: Arc::new(HostShared {
                units,
                latencies: vec![Duration::ZERO; units],
                queue_limit: Some(limit),
                active_queues: AtomicI64::new(0),
                in_flight: AtomicI64::new(0),
                peak_in_flight: AtomicI64::new(0),
            }),
        }
    }

    /// Queues currently alive. Returns to zero when a session tears down.
    pub fn active_queues(&self) -> i64 {
        self.shared.active_queues.load(Ordering::SeqCst)
    }

    /// High-water mark of submissions simultaneously in flight.
    pub fn peak_in_flight(&self) -> i64 {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Device for HostDevice {
    type Program = KernelProgram;
    type Queue = HostQueue;

    fn unit_count(&self) -> usize {
        self.shared.units
    }

    fn compile(&self, source: &[u8]) -> Result<KernelProgram> {
        KernelProgram::parse(source).map_err(|log| {
            let mut full = String::new();
            for unit in 0..self.shared.units {
                for line in log.lines() {
                    full.push_str("unit ");
                    full.push_str(&unit.to_string());
                    full.push_str(": ");
                    full.push_str(line);
                    full.push('\n');
                }
            }
            Error::DeviceBuild {
                log: full.trim_end().to_string(),
            }
        })
    }

    fn create_queue(&self, unit: usize) -> Result<HostQueue> {
        if unit >= self.shared.units {
            return Err(Error::DeviceResource(format!(
                "device has {} units, requested queue on unit {}",
                self.shared.units, unit
            )));
        }
        if let Some(limit) = self.shared.queue_limit {
            if self.shared.active_queues.load(Ordering::SeqCst) >= limit as i64 {
                return Err(Error::DeviceResource(format!(
                    "unit {unit}: queue creation refused (limit {limit})"
                )));
            }
        }
        let (tx, rx) = channel::<Job>();
        let shared = Arc::clone(&self.shared);
        let latency = self.shared.latencies[unit];
        let worker = std::thread::Builder::new()
            .name(format!("lode-host-queue-{unit}"))
            .spawn(move || worker_loop(rx, shared, latency))
            .map_err(|e| Error::DeviceResource(format!("unit {unit}: {e}")))?;
        self.shared.active_queues.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(unit, "host device queue created");
        Ok(HostQueue {
            tx: Some(tx),
            worker: Some(worker),
            shared: Arc::clone(&self.shared),
        })
    }
}

#[derive(Debug)]
pub struct HostQueue {
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    shared: Arc<HostShared>,
}

impl CommandQueue for HostQueue {
    type Program = KernelProgram;
    type Submission = HostSubmission;

    fn submit(&mut self, program: &KernelProgram, input: KernelInput) -> Result<HostSubmission> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Internal("submit on a released queue".to_string()))?;
        let cell = Arc::new(CompletionCell::default());
        let in_flight = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .peak_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        tx.send(Job {
            program: program.clone(),
            input,
            cell: Arc::clone(&cell),
        })
        .map_err(|_| Error::DeviceResource("device worker is gone".to_string()))?;
        Ok(HostSubmission { cell, taken: false })
    }
}

impl Drop for HostQueue {
    fn drop(&mut self) {
        // Hang up, then let the worker drain whatever was already submitted.
        // In-flight work is not cancelled, only unobservable afterwards.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.shared.active_queues.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("host device queue released");
    }
}

struct Job {
    program: KernelProgram,
    input: KernelInput,
    cell: Arc<CompletionCell>,
}

#[derive(Default)]
struct CompletionCell {
    state: Mutex<CellState>,
    cond: Condvar,
}

#[derive(Default)]
struct CellState {
    progress: StageProgress,
    output: Option<BooleanBuffer>,
    failed: Option<String>,
}

impl CompletionCell {
    fn update(&self, f: impl FnOnce(&mut CellState)) {
        let mut state = self.state.lock().expect("completion cell poisoned");
        f(&mut state);
        self.cond.notify_all();
    }
}

fn worker_loop(rx: Receiver<Job>, shared: Arc<HostShared>, latency: Duration) {
    while let Ok(job) = rx.recv() {
        run_job(&job, latency);
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::trace!("host device worker exiting");
}

fn run_job(job: &Job, latency: Duration) {
    let pause = || {
        if latency > Duration::ZERO {
            std::thread::sleep(latency);
        }
    };

    // Stage 1: copy-in. Materialize device-side copies of every buffer.
    pause();
    let device_input = KernelInput {
        rows: job.input.rows,
        work_group: job.input.work_group,
        rowmap: job.input.rowmap.clone(),
        columns: job
            .input
            .columns
            .iter()
            .map(|c| crate::KernelColumn {
                ordinal: c.ordinal,
                data_type: c.data_type.clone(),
                values: Arc::new(c.values.as_ref().clone()),
                validity: c.validity.as_ref().map(|v| Arc::new(v.as_ref().clone())),
            })
            .collect(),
    };
    job.cell.update(|s| s.progress.copy_in = true);

    // Stage 2: execute.
    pause();
    tracing::trace!(
        rows = device_input.rows,
        work_group = device_input.work_group,
        "host kernel dispatch"
    );
    let result = job.program.evaluate(&device_input);
    job.cell.update(|s| s.progress.execute = true);

    // Stage 3: copy-out.
    pause();
    job.cell.update(|s| match result {
        Ok(rowmap) => {
            s.output = Some(rowmap);
            s.progress.copy_out = true;
        }
        Err(e) => s.failed = Some(e.to_string()),
    });
}

pub struct HostSubmission {
    cell: Arc<CompletionCell>,
    taken: bool,
}

fn take_output(state: &mut CellState, taken: &mut bool) -> Result<KernelOutput> {
    if let Some(log) = state.failed.take() {
        *taken = true;
        return Err(Error::Internal(log));
    }
    match state.output.take() {
        Some(rowmap) => {
            *taken = true;
            Ok(KernelOutput { rowmap })
        }
        None => Err(Error::Internal("kernel output already taken".to_string())),
    }
}

impl Submission for HostSubmission {
    fn progress(&self) -> StageProgress {
        self.cell
            .state
            .lock()
            .expect("completion cell poisoned")
            .progress
    }

    fn poll(&mut self) -> Result<Option<KernelOutput>> {
        if self.taken {
            return Err(Error::Internal("kernel output already taken".to_string()));
        }
        let mut state = self.cell.state.lock().expect("completion cell poisoned");
        if state.output.is_none() && state.failed.is_none() {
            return Ok(None);
        }
        take_output(&mut state, &mut self.taken).map(Some)
    }

    fn wait(&mut self) -> Result<KernelOutput> {
        if self.taken {
            return Err(Error::Internal("kernel output already taken".to_string()));
        }
        let mut state = self.cell.state.lock().expect("completion cell poisoned");
        while state.output.is_none() && state.failed.is_none() {
            state = self
                .cell
                .cond
                .wait(state)
                .expect("completion cell poisoned");
        }
        take_output(&mut state, &mut self.taken)
    }
}
