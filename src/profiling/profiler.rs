//! Kernel profiler trait and the Chrome Trace recorder.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Sink for per-task device timings.
pub trait KernelProfiler: Send {
    /// Records that the task `name` ran on the device for `elapsed_ms`.
    fn insert_record(&mut self, name: &str, elapsed_ms: f64);
}

/// One collected timing.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelRecord {
    /// Task name.
    pub name: String,
    /// Device time in milliseconds.
    pub elapsed_ms: f64,
    /// Microseconds since the profiler was created, when the record arrived.
    pub recorded_at_us: u64,
}

/// Summary of all records sharing a name.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelStats {
    /// Task name.
    pub name: String,
    /// Number of records.
    pub count: usize,
    /// Sum of elapsed times.
    pub total_ms: f64,
    /// Fastest run.
    pub min_ms: f64,
    /// Slowest run.
    pub max_ms: f64,
}

impl KernelStats {
    /// Mean elapsed time.
    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

struct TraceState {
    start: Instant,
    records: Vec<KernelRecord>,
}

/// Collects records in memory; clones share the same record list, so one
/// clone can be handed to the runtime and another kept for reporting.
#[derive(Clone)]
pub struct TraceProfiler {
    state: Arc<Mutex<TraceState>>,
}

impl Default for TraceProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TraceProfiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceProfiler")
            .field("records", &self.records().len())
            .finish()
    }
}

impl TraceProfiler {
    /// Empty profiler; its clock starts now.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TraceState {
                start: Instant::now(),
                records: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, TraceState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// All records, in arrival order.
    pub fn records(&self) -> Vec<KernelRecord> {
        self.state().records.clone()
    }

    /// Drops all records.
    pub fn clear(&self) {
        self.state().records.clear();
    }

    /// Per-name summaries, slowest total first.
    pub fn statistics(&self) -> Vec<KernelStats> {
        let state = self.state();
        let mut by_name: HashMap<&str, KernelStats> = HashMap::new();
        for record in &state.records {
            let stats = by_name.entry(record.name.as_str()).or_insert_with(|| KernelStats {
                name: record.name.clone(),
                count: 0,
                total_ms: 0.0,
                min_ms: f64::INFINITY,
                max_ms: 0.0,
            });
            stats.count += 1;
            stats.total_ms += record.elapsed_ms;
            stats.min_ms = stats.min_ms.min(record.elapsed_ms);
            stats.max_ms = stats.max_ms.max(record.elapsed_ms);
        }
        let mut out: Vec<KernelStats> = by_name.into_values().collect();
        out.sort_by(|a, b| b.total_ms.total_cmp(&a.total_ms).then_with(|| a.name.cmp(&b.name)));
        out
    }

    /// Writes all records as Chrome Trace complete events (`ph:"X"`).
    ///
    /// Each event ends when its record arrived and lasts `elapsed_ms`.
    pub fn write_chrome_trace<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let records = self.records();
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut w = BufWriter::new(File::create(path)?);

        write!(w, "{{\"traceEvents\":[")?;
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                write!(w, ",")?;
            }
            let dur_us = (record.elapsed_ms * 1e3).max(0.0) as u64;
            let ts_us = record.recorded_at_us.saturating_sub(dur_us);
            write!(w, "{{\"name\":")?;
            write_json_string(&mut w, &record.name)?;
            write!(
                w,
                ",\"cat\":\"kernel\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":1",
                ts_us, dur_us
            )?;
            write!(w, "}}")?;
        }
        write!(w, "]}}")?;
        w.flush()
    }
}

impl KernelProfiler for TraceProfiler {
    fn insert_record(&mut self, name: &str, elapsed_ms: f64) {
        let mut state = self.state();
        let recorded_at_us = state.start.elapsed().as_micros() as u64;
        state.records.push(KernelRecord {
            name: name.to_owned(),
            elapsed_ms,
            recorded_at_us,
        });
    }
}

fn write_json_string<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    write!(w, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(w, "\\\"")?,
            '\\' => write!(w, "\\\\")?,
            '\n' => write!(w, "\\n")?,
            '\r' => write!(w, "\\r")?,
            '\t' => write!(w, "\\t")?,
            c if c.is_control() => write!(w, "\\u{:04x}", c as u32)?,
            c => write!(w, "{c}")?,
        }
    }
    write!(w, "\"")
}
