//! Replay scored messages through a stream monitor

use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};
use sentiment_shift::{
    AnomalyRecord, MemorySink, MessageMetadata, MonitorConfig, MonitorStats, RetrainCadence,
    ScoreBundle, StreamMonitor, Timestamp, TracingSink, UserId,
};
use tabled::Tabled;

use crate::error::CliResult;
use crate::output::{self, status, OutputFormat, Status};

/// Arguments for `replay`
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Scored messages, one JSON object per line (or a single JSON array)
    pub input: PathBuf,

    /// Write the anomaly document (JSON array) here
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Rule-based jump threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Number of recent scores kept per user
    #[arg(long)]
    pub window: Option<usize>,

    /// Training-buffer length that triggers the first model fit
    #[arg(long)]
    pub retrain_threshold: Option<usize>,

    /// Retrain cadence: every-update, every:K or doubling
    #[arg(long)]
    pub cadence: Option<RetrainCadence>,
}

impl ReplayArgs {
    /// Apply flag overrides on top of the configured engine settings.
    pub fn monitor_config(&self, base: &MonitorConfig) -> MonitorConfig {
        let mut config = base.clone();
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(capacity) = self.window {
            config.window.capacity = capacity;
        }
        if let Some(retrain_threshold) = self.retrain_threshold {
            config.window.retrain_threshold = retrain_threshold;
        }
        if let Some(cadence) = self.cadence {
            config.window.cadence = cadence;
        }
        config
    }
}

/// One line of replay input. Field aliases follow the upstream export.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredMessage {
    #[serde(default, alias = "ref_user_id")]
    pub user_id: Option<UserId>,
    #[serde(default, alias = "transaction_datetime_utc")]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "sentiment", alias = "polarity")]
    pub raw: Option<f64>,
    #[serde(default, alias = "combined_sentiment")]
    pub combined: Option<f64>,
}

/// Parsed replay input.
#[derive(Debug, Default)]
pub struct ReplayInput {
    pub messages: Vec<ScoredMessage>,
    /// Entries that were not valid messages.
    pub malformed: usize,
}

impl ReplayInput {
    fn push(&mut self, entry: Result<ScoredMessage, serde_json::Error>, position: usize) {
        match entry {
            Ok(message) => self.messages.push(message),
            Err(e) => {
                self.malformed += 1;
                tracing::warn!(entry = position, error = %e, "skipping malformed entry");
            }
        }
    }
}

/// Result of a replay run.
#[derive(Debug, Serialize)]
pub struct ReplayOutcome {
    pub records: Vec<AnomalyRecord>,
    pub stats: MonitorStats,
    /// Entries that were not valid messages.
    pub malformed: usize,
    /// Messages lacking a user id, a timestamp or scores.
    pub incomplete: usize,
}

#[derive(Debug, Serialize, Tabled)]
struct AnomalyRow {
    user: String,
    timestamp: String,
    delta: String,
    #[tabled(rename = "new sentiment")]
    new_sentiment: String,
    method: String,
    message: String,
}

impl From<&AnomalyRecord> for AnomalyRow {
    fn from(r: &AnomalyRecord) -> Self {
        Self {
            user: r.user_id.to_string(),
            timestamp: r.timestamp.to_string(),
            delta: format!("{:.2}", r.delta),
            new_sentiment: format!("{:.2}", r.new_sentiment),
            method: r.label().to_string(),
            message: r.current_message.clone(),
        }
    }
}

/// Parse JSON lines or a JSON array, counting entries that are not messages.
///
/// Entries are numbered from 1 in both layouts.
pub fn read_messages(contents: &str) -> CliResult<ReplayInput> {
    let mut input = ReplayInput::default();

    if contents.trim_start().starts_with('[') {
        let entries: Vec<serde_json::Value> = serde_json::from_str(contents)?;
        for (index, entry) in entries.into_iter().enumerate() {
            input.push(serde_json::from_value(entry), index + 1);
        }
        return Ok(input);
    }

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        input.push(serde_json::from_str(line), index + 1);
    }
    Ok(input)
}

/// Stream every message through a fresh monitor.
pub fn replay(input: ReplayInput, config: MonitorConfig) -> CliResult<ReplayOutcome> {
    let mut monitor = StreamMonitor::new(config, (MemorySink::new(), TracingSink))?;
    let mut incomplete = 0;

    for message in input.messages {
        let (Some(user_id), Some(timestamp), Some(raw), Some(combined)) = (
            message.user_id,
            message.timestamp,
            message.raw,
            message.combined,
        ) else {
            incomplete += 1;
            tracing::warn!(message = %message.message, "skipping message without user id, timestamp or scores");
            continue;
        };
        let metadata = MessageMetadata { user_id, timestamp };
        monitor.process(&message.message, ScoreBundle::new(raw, combined), &metadata);
    }

    let stats = monitor.stats();
    let (memory, _) = monitor.into_sink();
    Ok(ReplayOutcome {
        records: memory.into_records(),
        stats,
        malformed: input.malformed,
        incomplete,
    })
}

fn write_document(path: &Path, records: &[AnomalyRecord]) -> CliResult<()> {
    std::fs::write(path, serde_json::to_string_pretty(records)?)?;
    Ok(())
}

/// Execute `replay`
pub fn execute(args: ReplayArgs, base: &MonitorConfig, format: OutputFormat) -> CliResult<()> {
    let config = args.monitor_config(base);
    let contents = std::fs::read_to_string(&args.input)?;
    let input = read_messages(&contents)?;
    tracing::debug!(
        input = %args.input.display(),
        messages = input.messages.len(),
        malformed = input.malformed,
        "replaying messages"
    );

    let outcome = replay(input, config)?;

    if let Some(out) = &args.out {
        write_document(out, &outcome.records)?;
    }

    match format {
        OutputFormat::Table => {
            let rows: Vec<AnomalyRow> = outcome.records.iter().map(AnomalyRow::from).collect();
            output::print_rows(rows, format, "No anomalies detected")?;
            status(
                Status::Note,
                format_args!(
                    "{} messages from {} users, {} anomalies ({} skipped, {} malformed entries)",
                    outcome.stats.processed,
                    outcome.stats.users,
                    outcome.stats.anomalies,
                    outcome.stats.skipped + outcome.incomplete as u64,
                    outcome.malformed
                ),
            );
            if let Some(out) = &args.out {
                status(Status::Done, format_args!("Anomalies saved to {}", out.display()));
            }
        }
        _ => output::print_document(&outcome.records, format)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = r#"
{"user_id": 1, "timestamp": "2023-10-01 09:00:00", "message": "hi", "raw": 0.0, "combined": 0.0}
{"user_id": 1, "timestamp": "2023-10-01 09:01:00", "message": "ok", "sentiment": 0.1, "combined_sentiment": 0.1}
not json
{"user_id": 2, "timestamp": "2023-10-01 09:01:30", "message": "other", "raw": 0.9, "combined": 0.9}
{"timestamp": "2023-10-01 09:01:45", "message": "anonymous", "raw": 0.9, "combined": 0.9}
{"user_id": 1, "timestamp": "2023-10-01 09:02:00", "message": "wonderful", "raw": 0.9, "combined": 0.9}
"#;

    #[test]
    fn reads_lines_and_counts_malformed() {
        let ReplayInput {
            messages,
            malformed,
        } = read_messages(INPUT).unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(malformed, 1);
        assert_eq!(messages[1].raw, Some(0.1));
        assert_eq!(messages[1].combined, Some(0.1));
        assert!(messages[3].user_id.is_none());
    }

    #[test]
    fn reads_json_arrays() {
        let input = read_messages(
            r#"[{"ref_user_id": "7", "transaction_datetime_utc": "2023-10-01", "message": "x", "raw": 0.1, "combined": 0.2}]"#,
        )
        .unwrap();
        assert_eq!(input.malformed, 0);
        assert_eq!(input.messages[0].user_id, Some(UserId::from("7")));
    }

    #[test]
    fn bad_array_element_is_counted_not_fatal() {
        let input = read_messages(
            r#"[
                {"user_id": 1, "timestamp": "t1", "message": "a", "raw": 0.0, "combined": 0.0},
                {"user_id": 1, "timestamp": "t2", "message": "b", "raw": "high", "combined": 0.9},
                "not a message",
                {"user_id": 1, "timestamp": "t3", "message": "c", "raw": 0.9, "combined": 0.9}
            ]"#,
        )
        .unwrap();
        assert_eq!(input.messages.len(), 2);
        assert_eq!(input.malformed, 2);

        let outcome = replay(input, MonitorConfig::default()).unwrap();
        assert_eq!(outcome.malformed, 2);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].previous_message.as_deref(), Some("a"));
    }

    #[test]
    fn replay_flags_jump_and_skips_incomplete() {
        let outcome = replay(read_messages(INPUT).unwrap(), MonitorConfig::default()).unwrap();

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.user_id, UserId::from(1u64));
        assert_eq!(record.current_message, "wonderful");
        assert_eq!(record.previous_message.as_deref(), Some("ok"));
        assert_eq!(outcome.incomplete, 1);
        assert_eq!(outcome.malformed, 1);
        assert_eq!(outcome.stats.processed, 4);
        assert_eq!(outcome.stats.users, 2);
    }

    #[test]
    fn flags_override_config() {
        let args = ReplayArgs {
            input: PathBuf::from("in.jsonl"),
            out: None,
            threshold: Some(0.2),
            window: Some(4),
            retrain_threshold: None,
            cadence: Some(RetrainCadence::Doubling),
        };
        let config = args.monitor_config(&MonitorConfig::default());
        assert!((config.threshold - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.window.capacity, 4);
        assert_eq!(config.window.retrain_threshold, 15);
        assert_eq!(config.window.cadence, RetrainCadence::Doubling);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let config = MonitorConfig {
            threshold: -1.0,
            ..MonitorConfig::default()
        };
        assert!(replay(read_messages(INPUT).unwrap(), config).is_err());
    }
}
