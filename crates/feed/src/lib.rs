use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

mod client;
pub mod mapping;

pub use client::{FeedClient, FeedError};

use mapping::{
    map_fields, AWAY_TEAM, ENTITY_FIELDS, HOME_TEAM, LEAGUE, SCORE_AWAY, SCORE_HOME, SCORE_TOTAL,
    SNAPSHOT_FIELDS,
};

pub const ID_KEY: &str = "id";
pub const CLOCK_KEY: &str = "tempo";

/// One flat object as delivered by the feed.
pub type RawRecord = Map<String, Value>;

/// Source of the records for every match currently live.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// An empty vector means no match is live, not an error.
    async fn fetch_live(&self) -> Result<Vec<RawRecord>, FeedError>;
}

#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("record has no `id` field")]
    MissingId,

    #[error("record id is not a string or integer: {0}")]
    InvalidId(String),

    #[error("match {entity_id} has no `tempo` field")]
    MissingClock { entity_id: String },

    #[error("match {entity_id} has an invalid clock: {value}")]
    InvalidClock { entity_id: String, value: String },
}

impl RecordError {
    /// The match id, when the record got far enough to carry one.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            RecordError::MissingClock { entity_id } | RecordError::InvalidClock { entity_id, .. } => {
                Some(entity_id)
            }
            RecordError::MissingId | RecordError::InvalidId(_) => None,
        }
    }
}

/// Pre-match data for a newly seen match.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityProfile {
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub details: Map<String, Value>,
}

/// Live data carried by one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveMetrics {
    pub score_home: i64,
    pub score_away: i64,
    pub score_total: i64,
    pub metrics: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub entity_id: String,
    pub clock: u32,
    pub record: RawRecord,
}

impl Observation {
    pub fn from_record(record: RawRecord) -> Result<Self, RecordError> {
        let entity_id = parse_id(record.get(ID_KEY))?;
        let clock = match record.get(CLOCK_KEY) {
            None | Some(Value::Null) => return Err(RecordError::MissingClock { entity_id }),
            Some(raw) => parse_clock(raw).ok_or_else(|| RecordError::InvalidClock {
                entity_id: entity_id.clone(),
                value: raw.to_string(),
            })?,
        };
        Ok(Self {
            entity_id,
            clock,
            record,
        })
    }

    pub fn profile(&self) -> EntityProfile {
        let mut details = map_fields(ENTITY_FIELDS, &self.record);
        EntityProfile {
            league: take_text(&mut details, LEAGUE),
            home_team: take_text(&mut details, HOME_TEAM),
            away_team: take_text(&mut details, AWAY_TEAM),
            details,
        }
    }

    pub fn live_metrics(&self) -> LiveMetrics {
        let mut metrics = map_fields(SNAPSHOT_FIELDS, &self.record);
        LiveMetrics {
            score_home: take_int(&mut metrics, SCORE_HOME),
            score_away: take_int(&mut metrics, SCORE_AWAY),
            score_total: take_int(&mut metrics, SCORE_TOTAL),
            metrics,
        }
    }

    /// `"home vs away"`, for log lines.
    pub fn fixture(&self) -> String {
        let side = |key: &str| {
            self.record
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string()
        };
        format!("{} vs {}", side("time-casa"), side("time-visitante"))
    }
}

fn take_text(fields: &mut Map<String, Value>, key: &str) -> String {
    match fields.remove(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

fn take_int(fields: &mut Map<String, Value>, key: &str) -> i64 {
    fields.remove(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

fn parse_id(raw: Option<&Value>) -> Result<String, RecordError> {
    match raw {
        None | Some(Value::Null) => Err(RecordError::MissingId),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        Some(other) => Err(RecordError::InvalidId(other.to_string())),
    }
}

fn parse_clock(raw: &Value) -> Option<u32> {
    let minutes = mapping::as_f64(raw)?;
    if !minutes.is_finite() || minutes < 0.0 || minutes > f64::from(u32::MAX) {
        return None;
    }
    Some(minutes.trunc() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn parses_numeric_and_string_ids() {
        let obs = Observation::from_record(record(json!({"id": 987, "tempo": 12}))).unwrap();
        assert_eq!(obs.entity_id, "987");
        assert_eq!(obs.clock, 12);

        let obs = Observation::from_record(record(json!({"id": " E1 ", "tempo": "45"}))).unwrap();
        assert_eq!(obs.entity_id, "E1");
        assert_eq!(obs.clock, 45);
    }

    #[test]
    fn fractional_clock_is_truncated() {
        let obs = Observation::from_record(record(json!({"id": "E1", "tempo": 44.9}))).unwrap();
        assert_eq!(obs.clock, 44);
    }

    #[test]
    fn rejects_missing_or_bad_fields() {
        assert_eq!(
            Observation::from_record(record(json!({"tempo": 3}))),
            Err(RecordError::MissingId)
        );
        assert!(matches!(
            Observation::from_record(record(json!({"id": 1.5, "tempo": 3}))),
            Err(RecordError::InvalidId(_))
        ));
        assert_eq!(
            Observation::from_record(record(json!({"id": "E1"}))),
            Err(RecordError::MissingClock {
                entity_id: "E1".into()
            })
        );
        assert!(matches!(
            Observation::from_record(record(json!({"id": "E1", "tempo": -1}))),
            Err(RecordError::InvalidClock { .. })
        ));
        assert!(matches!(
            Observation::from_record(record(json!({"id": "E1", "tempo": "HT"}))),
            Err(RecordError::InvalidClock { .. })
        ));
    }

    #[test]
    fn profile_pulls_named_columns_out_of_details() {
        let obs = Observation::from_record(record(json!({
            "id": "E1",
            "tempo": 3,
            "liga": "Serie A",
            "time-casa": "Palmeiras",
            "time-visitante": "Santos",
            "odds_casa-pre": 1.9,
        })))
        .unwrap();

        let profile = obs.profile();
        assert_eq!(profile.league, "Serie A");
        assert_eq!(profile.home_team, "Palmeiras");
        assert_eq!(profile.away_team, "Santos");
        assert!(!profile.details.contains_key(LEAGUE));
        assert_eq!(profile.details["odds_home_pre"], json!(1.9));
        assert_eq!(obs.fixture(), "Palmeiras vs Santos");
    }

    #[test]
    fn live_metrics_default_scores_to_zero() {
        let obs = Observation::from_record(record(json!({
            "id": "E1",
            "tempo": 50,
            "placar-casa": 2,
            "xg-casa": 1.1,
        })))
        .unwrap();

        let live = obs.live_metrics();
        assert_eq!(live.score_home, 2);
        assert_eq!(live.score_away, 0);
        assert_eq!(live.score_total, 0);
        assert!(!live.metrics.contains_key(SCORE_HOME));
        assert_eq!(live.metrics["xg_home"], json!(1.1));
    }
}
