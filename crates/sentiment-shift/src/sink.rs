//! Destinations for detected anomalies.
//!
//! A [`StreamMonitor`](crate::StreamMonitor) hands every record to exactly one
//! sink; compose sinks with a tuple to fan out.

use std::io::Write;

use crate::error::{ShiftError, ShiftResult};
use crate::types::AnomalyRecord;

/// Receives anomaly records as they are detected.
pub trait AnomalySink {
    fn emit(&mut self, record: &AnomalyRecord) -> ShiftResult<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> ShiftResult<()> {
        Ok(())
    }
}

impl<S: AnomalySink + ?Sized> AnomalySink for Box<S> {
    fn emit(&mut self, record: &AnomalyRecord) -> ShiftResult<()> {
        (**self).emit(record)
    }

    fn flush(&mut self) -> ShiftResult<()> {
        (**self).flush()
    }
}

/// Emits to both sinks; the second still runs when the first fails.
impl<A: AnomalySink, B: AnomalySink> AnomalySink for (A, B) {
    fn emit(&mut self, record: &AnomalyRecord) -> ShiftResult<()> {
        let first = self.0.emit(record);
        let second = self.1.emit(record);
        first.and(second)
    }

    fn flush(&mut self) -> ShiftResult<()> {
        let first = self.0.flush();
        let second = self.1.flush();
        first.and(second)
    }
}

// ── Memory ──────────────────────────────────────────────────────────────

/// Collects records in memory, in emission order.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    records: Vec<AnomalyRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AnomalyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<AnomalyRecord> {
        self.records
    }

    /// The anomaly document: a pretty-printed JSON array of every record.
    pub fn to_json(&self) -> ShiftResult<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }
}

impl AnomalySink for MemorySink {
    fn emit(&mut self, record: &AnomalyRecord) -> ShiftResult<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

// ── Tracing ─────────────────────────────────────────────────────────────

/// Logs one `info` event per anomaly.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl AnomalySink for TracingSink {
    fn emit(&mut self, record: &AnomalyRecord) -> ShiftResult<()> {
        let methods: Vec<&str> = record.detected_by.fired().map(|m| m.key()).collect();
        tracing::info!(
            user = %record.user_id,
            timestamp = %record.timestamp,
            delta = format_args!("{:.2}", record.delta),
            new_sentiment = format_args!("{:.2}", record.new_sentiment),
            message = %record.current_message,
            detected_by = %methods.join(", "),
            "sentiment shift detected"
        );
        Ok(())
    }
}

// ── JSON lines ──────────────────────────────────────────────────────────

/// Writes each record as one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> AnomalySink for JsonLinesSink<W> {
    fn emit(&mut self, record: &AnomalyRecord) -> ShiftResult<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| ShiftError::Sink(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> ShiftResult<()> {
        self.writer
            .flush()
            .map_err(|e| ShiftError::Sink(e.to_string()))
    }
}
