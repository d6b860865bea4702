//! Shared value types: identifiers, timestamps, scores, attribution and records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::detector::DetectionMethod;

// ── Identification ──────────────────────────────────────────────────────

/// Identifies the author of a message.
///
/// Upstream exports carry user ids as integers or strings; both deserialize
/// into the same textual form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Unsigned(u64),
            Signed(i64),
            Text(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Unsigned(n) => UserId(n.to_string()),
            Repr::Signed(n) => UserId(n.to_string()),
            Repr::Text(s) => UserId(s),
        })
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for UserId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Timestamps ──────────────────────────────────────────────────────────

/// Message timestamp, carried through to records unchanged.
///
/// The engine never interprets it; [`Timestamp::to_datetime`] exists for the
/// export layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Seconds since the Unix epoch.
    Epoch(f64),
    /// Free-form text, usually an ISO-8601 date-time.
    Text(String),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

impl Timestamp {
    /// Resolve to a UTC instant. Naive date-times are taken as UTC.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Epoch(secs) => epoch_to_datetime(*secs),
            Self::Text(text) => {
                let text = text.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    return Some(dt.with_timezone(&Utc));
                }
                for format in NAIVE_FORMATS {
                    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                        return Some(naive.and_utc());
                    }
                }
                if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                    return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
                }
                text.parse::<f64>().ok().and_then(epoch_to_datetime)
            }
        }
    }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
}

impl From<&str> for Timestamp {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for Timestamp {
    fn from(secs: f64) -> Self {
        Self::Epoch(secs)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Epoch(secs) => write!(f, "{}", secs),
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}

// ── Inputs ──────────────────────────────────────────────────────────────

/// The two per-message scores the engine tracks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreBundle {
    /// Pure polarity score.
    #[serde(alias = "sentiment", alias = "polarity")]
    pub raw: f64,
    /// Polarity blended with the lexicon signal.
    #[serde(alias = "combined_sentiment")]
    pub combined: f64,
}

impl ScoreBundle {
    pub fn new(raw: f64, combined: f64) -> Self {
        Self { raw, combined }
    }

    pub fn is_finite(&self) -> bool {
        self.raw.is_finite() && self.combined.is_finite()
    }
}

/// Per-message metadata supplied by the ingestion layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub user_id: UserId,
    pub timestamp: Timestamp,
}

impl MessageMetadata {
    pub fn new(user_id: impl Into<UserId>, timestamp: impl Into<Timestamp>) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: timestamp.into(),
        }
    }
}

// ── Attribution ─────────────────────────────────────────────────────────

/// Per-method verdicts behind one anomaly decision.
///
/// Always carries all three keys, whichever of them fired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribution {
    pub rule_based: bool,
    pub ml_based_iforest: bool,
    pub ml_based_svm: bool,
}

impl Attribution {
    /// Build an attribution by evaluating every method.
    pub fn from_fn(mut verdict: impl FnMut(DetectionMethod) -> bool) -> Self {
        let mut attribution = Self::default();
        for method in DetectionMethod::ALL {
            attribution.set(method, verdict(method));
        }
        attribution
    }

    pub fn get(&self, method: DetectionMethod) -> bool {
        match method {
            DetectionMethod::Rule => self.rule_based,
            DetectionMethod::IsolationForest => self.ml_based_iforest,
            DetectionMethod::OneClassSvm => self.ml_based_svm,
        }
    }

    pub fn set(&mut self, method: DetectionMethod, fired: bool) {
        match method {
            DetectionMethod::Rule => self.rule_based = fired,
            DetectionMethod::IsolationForest => self.ml_based_iforest = fired,
            DetectionMethod::OneClassSvm => self.ml_based_svm = fired,
        }
    }

    /// The combination policy: any single method is enough.
    pub fn any(&self) -> bool {
        self.rule_based || self.ml_based_iforest || self.ml_based_svm
    }

    /// Methods that fired, in declaration order.
    pub fn fired(&self) -> impl Iterator<Item = DetectionMethod> + '_ {
        DetectionMethod::ALL.into_iter().filter(|m| self.get(*m))
    }

    pub fn label(&self) -> DetectionLabel {
        DetectionLabel::from(self)
    }
}

/// Summary label used by the reporting layer.
///
/// Model verdicts take precedence: a rule hit is only labelled `Rule` when
/// neither model agreed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetectionLabel {
    Rule,
    #[serde(rename = "SVM+IForest")]
    SvmAndIForest,
    #[serde(rename = "SVM")]
    Svm,
    #[serde(rename = "IForest")]
    IForest,
    Unknown,
}

impl DetectionLabel {
    pub const ALL: [DetectionLabel; 5] = [
        DetectionLabel::Rule,
        DetectionLabel::Svm,
        DetectionLabel::IForest,
        DetectionLabel::SvmAndIForest,
        DetectionLabel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "Rule",
            Self::SvmAndIForest => "SVM+IForest",
            Self::Svm => "SVM",
            Self::IForest => "IForest",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<&Attribution> for DetectionLabel {
    fn from(a: &Attribution) -> Self {
        if a.rule_based && !(a.ml_based_svm || a.ml_based_iforest) {
            Self::Rule
        } else if a.ml_based_svm && a.ml_based_iforest {
            Self::SvmAndIForest
        } else if a.ml_based_svm {
            Self::Svm
        } else if a.ml_based_iforest {
            Self::IForest
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for DetectionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Outputs ─────────────────────────────────────────────────────────────

/// One detected sentiment shift, handed to an [`AnomalySink`](crate::AnomalySink).
///
/// Field names are the export contract and must not change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub user_id: UserId,
    pub timestamp: Timestamp,
    /// `|current − previous|` combined score.
    pub delta: f64,
    /// Current combined score.
    pub new_sentiment: f64,
    pub current_message: String,
    /// The user's message immediately before this one.
    pub previous_message: Option<String>,
    pub detected_by: Attribution,
}

impl AnomalyRecord {
    pub fn label(&self) -> DetectionLabel {
        self.detected_by.label()
    }
}

/// Window means, see [`SentimentWindow::averages`](crate::SentimentWindow::averages).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub raw_avg: f64,
    pub combined_avg: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn user_id_from_int_or_string() {
        let a: UserId = serde_json::from_str("17").unwrap();
        let b: UserId = serde_json::from_str("\"17\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"17\"");

        let big: UserId = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(big.as_str(), "18446744073709551615");
        let negative: UserId = serde_json::from_str("-4").unwrap();
        assert_eq!(negative.as_str(), "-4");
    }

    #[test]
    fn timestamp_parsing() {
        let cases = [
            Timestamp::from("2023-10-01T12:30:00Z"),
            Timestamp::from("2023-10-01T12:30:00+00:00"),
            Timestamp::from("2023-10-01 12:30:00"),
            Timestamp::from("2023-10-01 12:30:00.250"),
            Timestamp::from("2023-10-01T12:30:00"),
            Timestamp::Epoch(1_696_163_400.0),
        ];
        for ts in &cases {
            let dt = ts.to_datetime().unwrap_or_else(|| panic!("unparsed: {}", ts));
            assert_eq!((dt.year(), dt.month(), dt.day()), (2023, 10, 1));
            assert_eq!((dt.hour(), dt.minute()), (12, 30));
        }

        let date_only = Timestamp::from("2023-10-03").to_datetime().unwrap();
        assert_eq!(date_only.hour(), 0);
        assert!(Timestamp::from("yesterday").to_datetime().is_none());
        assert!(Timestamp::Epoch(f64::NAN).to_datetime().is_none());
    }

    #[test]
    fn timestamp_untagged_serde() {
        let t: Timestamp = serde_json::from_str("1696118400").unwrap();
        assert_eq!(t, Timestamp::Epoch(1_696_118_400.0));
        let t: Timestamp = serde_json::from_str("\"2023-10-01\"").unwrap();
        assert_eq!(t, Timestamp::Text("2023-10-01".into()));
    }

    #[test]
    fn score_bundle_accepts_extractor_field_names() {
        let b: ScoreBundle =
            serde_json::from_str(r#"{"sentiment": 0.4, "combined_sentiment": 0.58}"#).unwrap();
        assert_eq!(b, ScoreBundle::new(0.4, 0.58));
        assert!(!ScoreBundle::new(f64::INFINITY, 0.0).is_finite());
    }

    #[test]
    fn attribution_or_and_fired() {
        let a = Attribution {
            rule_based: false,
            ml_based_iforest: true,
            ml_based_svm: false,
        };
        assert!(a.any());
        assert_eq!(a.fired().collect::<Vec<_>>(), vec![DetectionMethod::IsolationForest]);
        assert!(!Attribution::default().any());
    }

    #[test]
    fn label_priority() {
        let mk = |rule_based, ml_based_iforest, ml_based_svm| Attribution {
            rule_based,
            ml_based_iforest,
            ml_based_svm,
        };
        assert_eq!(mk(true, false, false).label(), DetectionLabel::Rule);
        assert_eq!(mk(true, true, true).label(), DetectionLabel::SvmAndIForest);
        assert_eq!(mk(false, true, true).label(), DetectionLabel::SvmAndIForest);
        assert_eq!(mk(true, false, true).label(), DetectionLabel::Svm);
        assert_eq!(mk(true, true, false).label(), DetectionLabel::IForest);
        assert_eq!(mk(false, false, false).label(), DetectionLabel::Unknown);
        assert_eq!(DetectionLabel::SvmAndIForest.to_string(), "SVM+IForest");
    }

    #[test]
    fn record_serializes_with_export_field_names() {
        let record = AnomalyRecord {
            user_id: UserId::from(1u64),
            timestamp: Timestamp::from("2023-10-01 09:00:00"),
            delta: 0.8,
            new_sentiment: 0.9,
            current_message: "great news".into(),
            previous_message: None,
            detected_by: Attribution {
                rule_based: true,
                ..Attribution::default()
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "user_id",
            "timestamp",
            "delta",
            "new_sentiment",
            "current_message",
            "previous_message",
            "detected_by",
        ] {
            assert!(obj.contains_key(key), "missing {}", key);
        }
        assert!(obj["previous_message"].is_null());
        assert_eq!(obj["detected_by"]["rule_based"], true);
        assert_eq!(obj["detected_by"]["ml_based_svm"], false);
    }
}
