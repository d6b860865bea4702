//! Per-user sentiment shift detection.
//!
//! Each user gets a [`SentimentWindow`]: a bounded history of raw and combined
//! sentiment scores plus two outlier models (an isolation forest and a
//! one-class SVM) that are refit online on the first differences of the
//! user's combined scores. A step is flagged when the absolute jump exceeds a
//! threshold *or* either model labels the signed jump an outlier.
//!
//! [`StreamMonitor`] routes scored messages to windows and hands every flagged
//! message to an [`AnomalySink`].
//!
//! ```
//! use sentiment_shift::{MessageMetadata, MonitorConfig, ScoreBundle, StreamMonitor};
//!
//! let mut monitor = StreamMonitor::in_memory(MonitorConfig::default()).unwrap();
//! let meta = |ts: &str| MessageMetadata::new(7u64, ts);
//!
//! monitor.process("fine", ScoreBundle::new(0.0, 0.0), &meta("2023-10-01 09:00:00"));
//! monitor.process("ok", ScoreBundle::new(0.1, 0.1), &meta("2023-10-01 09:05:00"));
//! let record = monitor
//!     .process("best day ever", ScoreBundle::new(0.9, 0.9), &meta("2023-10-01 09:10:00"))
//!     .expect("0.8 jump exceeds the 0.5 threshold");
//!
//! assert!(record.detected_by.rule_based);
//! assert_eq!(record.previous_message.as_deref(), Some("ok"));
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod detector;
pub mod error;
pub mod models;
pub mod monitor;
pub mod sink;
pub mod types;
pub mod window;

pub use config::{
    BoundaryConfig, ForestConfig, KernelWidth, MonitorConfig, RetrainCadence, WindowConfig,
};
pub use detector::{DetectionContext, DetectionMethod, Shift};
pub use error::{ShiftError, ShiftResult};
pub use models::{IsolationForest, OneClassSvm, OutlierModel, Verdict};
pub use monitor::{MonitorStats, StreamMonitor};
pub use sink::{AnomalySink, JsonLinesSink, MemorySink, TracingSink};
pub use types::{
    AnomalyRecord, Attribution, Averages, DetectionLabel, MessageMetadata, ScoreBundle,
    Timestamp, UserId,
};
pub use window::{SentimentWindow, WindowState, WindowStats};
