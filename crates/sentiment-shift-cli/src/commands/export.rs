//! Export anomalies for one user and date range to CSV

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use sentiment_shift::{AnomalyRecord, DetectionLabel};
use tabled::Tabled;

use crate::config::ExportDefaults;
use crate::error::{CliError, CliResult};
use crate::output::{self, status, OutputFormat, Status};

const CSV_HEADER: [&str; 5] = [
    "Timestamp",
    "New Sentiment",
    "Detection Method",
    "current_message",
    "previous_message",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Arguments for `export`
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Anomaly document written by `replay --out`
    pub input: PathBuf,

    /// Only export this user's anomalies
    #[arg(short, long)]
    pub user: Option<String>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<String>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<String>,

    /// CSV destination (defaults to anomaly_table_user_<user>_<from>_to_<to>.csv)
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

/// Resolved export filter.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub user: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ExportFilter {
    /// Combine flags with configured defaults; flags win.
    pub fn resolve(args: &ExportArgs, defaults: &ExportDefaults) -> CliResult<Self> {
        let user = args.user.clone().or_else(|| defaults.user.clone());
        let from = args.from.as_deref().or(defaults.from.as_deref());
        let to = args.to.as_deref().or(defaults.to.as_deref());

        let filter = Self {
            user,
            from: from.map(parse_date).transpose()?,
            to: to.map(parse_date).transpose()?,
        };
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(CliError::InvalidArgument(format!(
                    "start date {} is after end date {}",
                    from, to
                )));
            }
        }
        Ok(filter)
    }

    fn has_range(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Whether `instant` falls in `[from 00:00, day after to 00:00)`.
    fn in_range(&self, instant: DateTime<Utc>) -> bool {
        let after_start = self
            .from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(true, |start| instant >= start.and_utc());
        let before_end = self
            .to
            .and_then(|d| d.checked_add_signed(Duration::days(1)))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(true, |end| instant < end.and_utc());
        after_start && before_end
    }

    pub fn matches(&self, record: &AnomalyRecord) -> bool {
        if let Some(user) = &self.user {
            if record.user_id.as_str() != user {
                return false;
            }
        }
        if !self.has_range() {
            return true;
        }
        match record.timestamp.to_datetime() {
            Some(instant) => self.in_range(instant),
            None => {
                tracing::warn!(
                    timestamp = %record.timestamp,
                    user = %record.user_id,
                    "dropping anomaly with unparseable timestamp"
                );
                false
            }
        }
    }

    /// `anomaly_table_user_<user>_<from>_to_<to>.csv`
    pub fn default_csv_name(&self) -> String {
        let day = |d: Option<NaiveDate>, fallback: &str| {
            d.map(|d| d.to_string()).unwrap_or_else(|| fallback.to_string())
        };
        format!(
            "anomaly_table_user_{}_{}_to_{}.csv",
            self.user.as_deref().unwrap_or("all"),
            day(self.from, "start"),
            day(self.to, "end")
        )
    }

    fn describe(&self) -> String {
        let day = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        format!(
            "user {} between {} and {}",
            self.user.as_deref().unwrap_or("(any)"),
            day(self.from),
            day(self.to)
        )
    }
}

fn parse_date(s: &str) -> CliResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("bad date '{}': {}", s, e)))
}

/// Round half away from zero to two decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write the filtered anomalies as CSV.
pub fn write_csv(path: &Path, records: &[&AnomalyRecord]) -> CliResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for record in records {
        let timestamp = match record.timestamp.to_datetime() {
            Some(instant) => instant.format(TIMESTAMP_FORMAT).to_string(),
            None => record.timestamp.to_string(),
        };
        writer.write_record([
            timestamp,
            round2(record.new_sentiment).to_string(),
            record.label().to_string(),
            record.current_message.clone(),
            record.previous_message.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Anomaly count per detection label, every label present.
pub fn label_counts<'a>(
    records: impl IntoIterator<Item = &'a AnomalyRecord>,
) -> BTreeMap<DetectionLabel, usize> {
    let mut counts: BTreeMap<DetectionLabel, usize> =
        DetectionLabel::ALL.iter().map(|label| (*label, 0)).collect();
    for record in records {
        *counts.entry(record.label()).or_default() += 1;
    }
    counts
}

#[derive(Debug, Serialize, Tabled)]
struct LabelRow {
    method: String,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ExportSummary {
    csv: String,
    exported: usize,
    total: usize,
    counts: BTreeMap<String, usize>,
}

/// Execute `export`
pub fn execute(args: ExportArgs, defaults: &ExportDefaults, format: OutputFormat) -> CliResult<()> {
    let filter = ExportFilter::resolve(&args, defaults)?;
    let contents = std::fs::read_to_string(&args.input)?;
    let records: Vec<AnomalyRecord> = serde_json::from_str(&contents)?;

    let selected: Vec<&AnomalyRecord> = records.iter().filter(|r| filter.matches(r)).collect();
    let csv_path = args
        .csv
        .clone()
        .unwrap_or_else(|| PathBuf::from(filter.default_csv_name()));
    write_csv(&csv_path, &selected)?;
    tracing::debug!(
        path = %csv_path.display(),
        exported = selected.len(),
        total = records.len(),
        "csv export written"
    );

    let counts = label_counts(selected.iter().copied());
    match format {
        OutputFormat::Table => {
            status(
                Status::Done,
                format_args!("CSV export completed: {}", csv_path.display()),
            );
            if selected.is_empty() {
                status(
                    Status::Empty,
                    format_args!("No anomalies for {}.", filter.describe()),
                );
            } else {
                let rows: Vec<LabelRow> = counts
                    .iter()
                    .map(|(label, count)| LabelRow {
                        method: label.to_string(),
                        count: *count,
                    })
                    .collect();
                output::print_rows(rows, format, "No anomalies")?;
            }
        }
        _ => {
            let summary = ExportSummary {
                csv: csv_path.display().to_string(),
                exported: selected.len(),
                total: records.len(),
                counts: counts
                    .iter()
                    .map(|(label, count)| (label.to_string(), *count))
                    .collect(),
            };
            output::print_document(&summary, format)?;
        }
    }

    Ok(())
}
