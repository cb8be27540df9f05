//! Inference trace: what was derived, from which source, by which rule.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::warn;

use crate::fact::FactId;
use crate::rule::Rule;

/// One applied inference step.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRecord {
    pub iteration: u64,
    pub source: FactId,
    pub rule: Rule,
    pub products: BTreeSet<FactId>,
}

/// Receives every inference record as it is appended.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: &InferenceRecord);
}

/// Collects records in memory until drained (thread-safe).
#[derive(Debug, Default)]
pub struct MemorySink {
    pending: Mutex<Vec<InferenceRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all pending records.
    pub fn drain(&self) -> Vec<InferenceRecord> {
        let mut pending = self.pending.lock().expect("memory sink lock poisoned");
        std::mem::take(&mut *pending)
    }
}

impl TraceSink for MemorySink {
    fn record(&self, record: &InferenceRecord) {
        self.pending
            .lock()
            .expect("memory sink lock poisoned")
            .push(record.clone());
    }
}

/// Writes each record as one line of JSON.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().expect("json sink lock poisoned")
    }

    /// Flush buffered records to the underlying writer.
    pub fn flush(&self) -> std::io::Result<()> {
        self.out.lock().expect("json sink lock poisoned").flush()
    }
}

impl<W: Write + Send> TraceSink for JsonLinesSink<W> {
    fn record(&self, record: &InferenceRecord) {
        let mut out = self.out.lock().expect("json sink lock poisoned");
        let written = serde_json::to_writer(&mut *out, record)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out));
        if let Err(e) = written {
            warn!(iteration = record.iteration, error = %e, "failed to write trace record");
        }
    }
}

/// Append-only log of a run's inference steps.
#[derive(Default)]
pub struct InferenceTrace {
    records: Mutex<Vec<InferenceRecord>>,
    sink: Option<Arc<dyn TraceSink>>,
}

impl InferenceTrace {
    pub fn new(sink: Option<Arc<dyn TraceSink>>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            sink,
        }
    }

    pub fn add_record(&self, record: InferenceRecord) {
        if let Some(sink) = &self.sink {
            sink.record(&record);
        }
        self.records
            .lock()
            .expect("trace lock poisoned")
            .push(record);
    }

    /// All records, in iteration order.
    pub fn records(&self) -> Vec<InferenceRecord> {
        let mut records = self.records.lock().expect("trace lock poisoned").clone();
        records.sort_by_key(|r| r.iteration);
        records
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("trace lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The union of every record's products.
    pub fn all_products(&self) -> BTreeSet<FactId> {
        self.records
            .lock()
            .expect("trace lock poisoned")
            .iter()
            .flat_map(|r| r.products.iter().copied())
            .collect()
    }
}

impl std::fmt::Debug for InferenceTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceTrace")
            .field("records", &self.len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Term;

    fn record(iteration: u64, products: &[u64]) -> InferenceRecord {
        InferenceRecord {
            iteration,
            source: FactId::new(1).unwrap(),
            rule: Rule::new("r", vec![Term::var("X")], Term::var("X")),
            products: products.iter().map(|&p| FactId::new(p).unwrap()).collect(),
        }
    }

    #[test]
    fn records_sort_by_iteration_and_products_union() {
        let trace = InferenceTrace::default();
        trace.add_record(record(2, &[5, 6]));
        trace.add_record(record(0, &[6, 7]));
        let iterations: Vec<u64> = trace.records().iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![0, 2]);
        assert_eq!(trace.all_products().len(), 3);
    }

    #[test]
    fn sinks_see_every_record() {
        let sink = Arc::new(MemorySink::new());
        let trace = InferenceTrace::new(Some(sink.clone()));
        trace.add_record(record(0, &[2]));
        trace.add_record(record(1, &[]));
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.drain().is_empty());
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn json_lines_sink_writes_one_object_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.record(&record(0, &[2, 3]));
        sink.record(&record(1, &[]));
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["iteration"], 0);
        assert_eq!(first["products"].as_array().map(Vec::len), Some(2));
        assert_eq!(first["rule"]["name"], "r");
    }

    #[test]
    fn flush_drains_a_buffered_writer() {
        let sink = JsonLinesSink::new(std::io::BufWriter::with_capacity(1 << 16, Vec::new()));
        sink.record(&record(4, &[2]));
        sink.flush().unwrap();

        let out = sink.into_inner();
        assert!(out.buffer().is_empty());
        let text = String::from_utf8(out.get_ref().clone()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with('\n'));
    }
}
