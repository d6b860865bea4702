//! Per-user routing of scored messages.
//!
//! The monitor owns one [`SentimentWindow`] per user, created on first sight,
//! and the text of each user's previous message. Anomalies go to the sink and
//! are also returned to the caller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::error::ShiftResult;
use crate::sink::{AnomalySink, MemorySink};
use crate::types::{AnomalyRecord, MessageMetadata, ScoreBundle, UserId};
use crate::window::SentimentWindow;

/// Stream-level counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub processed: u64,
    pub skipped: u64,
    pub anomalies: u64,
    pub sink_errors: u64,
    pub users: usize,
}

/// Routes scored messages to per-user windows and reports anomalies.
pub struct StreamMonitor<S: AnomalySink = MemorySink> {
    config: MonitorConfig,
    windows: HashMap<UserId, SentimentWindow>,
    last_message: HashMap<UserId, String>,
    sink: S,
    stats: MonitorStats,
}

impl StreamMonitor<MemorySink> {
    /// Monitor that collects anomalies in memory.
    pub fn in_memory(config: MonitorConfig) -> ShiftResult<Self> {
        Self::new(config, MemorySink::new())
    }
}

impl<S: AnomalySink> StreamMonitor<S> {
    /// Validates `config` before accepting it.
    pub fn new(config: MonitorConfig, sink: S) -> ShiftResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            windows: HashMap::new(),
            last_message: HashMap::new(),
            sink,
            stats: MonitorStats::default(),
        })
    }

    /// Feed one scored message through its user's window.
    ///
    /// Returns the record when the message is flagged. Messages with
    /// non-finite scores are skipped and leave no trace in the user's state.
    pub fn process(
        &mut self,
        message: &str,
        scores: ScoreBundle,
        metadata: &MessageMetadata,
    ) -> Option<AnomalyRecord> {
        let user = &metadata.user_id;
        if !scores.is_finite() {
            self.stats.skipped += 1;
            tracing::warn!(
                user = %user,
                raw = scores.raw,
                combined = scores.combined,
                "skipping message with non-finite scores"
            );
            return None;
        }
        self.stats.processed += 1;

        let threshold = self.config.threshold;
        let window = self.window_for(user);
        window.update(scores.raw, scores.combined);
        let (anomalous, attribution) = window.is_anomalous(threshold);
        let shift = window.last_shift();

        let record = match (anomalous, shift) {
            (true, Some(shift)) => {
                let record = AnomalyRecord {
                    user_id: user.clone(),
                    timestamp: metadata.timestamp.clone(),
                    delta: shift.delta(),
                    new_sentiment: shift.current,
                    current_message: message.to_string(),
                    previous_message: self.last_message.get(user).cloned(),
                    detected_by: attribution,
                };
                self.stats.anomalies += 1;
                if let Err(e) = self.sink.emit(&record) {
                    self.stats.sink_errors += 1;
                    tracing::warn!(user = %user, error = %e, "anomaly sink rejected record");
                }
                Some(record)
            }
            _ => None,
        };

        self.last_message.insert(user.clone(), message.to_string());
        record
    }

    /// The user's window, created with the configured defaults on first use.
    pub fn window_for(&mut self, user: &UserId) -> &mut SentimentWindow {
        let config = &self.config.window;
        let stats = &mut self.stats;
        let known = self.windows.len();
        self.windows.entry(user.clone()).or_insert_with(|| {
            tracing::debug!(user = %user, "creating sentiment window");
            stats.users = known + 1;
            SentimentWindow::new(config.clone())
        })
    }

    pub fn window(&self, user: &UserId) -> Option<&SentimentWindow> {
        self.windows.get(user)
    }

    /// Install a pre-built window, e.g. one with substitute models.
    pub fn insert_window(&mut self, user: UserId, window: SentimentWindow) -> Option<SentimentWindow> {
        let previous = self.windows.insert(user, window);
        self.stats.users = self.windows.len();
        previous
    }

    pub fn previous_message(&self, user: &UserId) -> Option<&str> {
        self.last_message.get(user).map(String::as_str)
    }

    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.windows.keys()
    }

    pub fn user_count(&self) -> usize {
        self.windows.len()
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Flush the sink.
    pub fn flush(&mut self) -> ShiftResult<()> {
        self.sink.flush()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
