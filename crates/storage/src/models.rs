use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Live,
    Finished,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Live => "LIVE",
            EntityStatus::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LIVE" => Ok(EntityStatus::Live),
            "FINISHED" => Ok(EntityStatus::Finished),
            other => Err(anyhow!("unknown entity status `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub entity_id: String,
    pub period: u32,
    pub clock: u32,
    pub score_home: i64,
    pub score_away: i64,
    pub score_total: i64,
    pub metrics: Value,
}

/// The two columns that define a match's position in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredClock {
    pub clock: u32,
    pub period: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub details: Value,
    pub status: EntityStatus,
    pub final_score_home: Option<i64>,
    pub final_score_away: Option<i64>,
    pub created_at_ms: i64,
    pub finished_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub entity_id: String,
    pub period: u32,
    pub clock: u32,
    pub score_home: i64,
    pub score_away: i64,
    pub score_total: i64,
    pub metrics: Value,
    pub captured_at_ms: i64,
}

pub(crate) fn entity_from_row(row: &SqliteRow) -> Result<EntityRecord> {
    let status: String = row.try_get("status")?;
    Ok(EntityRecord {
        id: row.try_get("id")?,
        league: row.try_get("league")?,
        home_team: row.try_get("home_team")?,
        away_team: row.try_get("away_team")?,
        details: json_column(row, "details_json")?,
        status: status.parse()?,
        final_score_home: row.try_get("final_score_home")?,
        final_score_away: row.try_get("final_score_away")?,
        created_at_ms: row.try_get("created_at_ms")?,
        finished_at_ms: row.try_get("finished_at_ms")?,
    })
}

pub(crate) fn snapshot_from_row(row: &SqliteRow) -> Result<SnapshotRecord> {
    Ok(SnapshotRecord {
        entity_id: row.try_get("entity_id")?,
        period: u32_column(row, "period")?,
        clock: u32_column(row, "clock")?,
        score_home: row.try_get("score_home")?,
        score_away: row.try_get("score_away")?,
        score_total: row.try_get("score_total")?,
        metrics: json_column(row, "metrics_json")?,
        captured_at_ms: row.try_get("captured_at_ms")?,
    })
}

pub(crate) fn clock_from_row(row: &SqliteRow) -> Result<StoredClock> {
    Ok(StoredClock {
        clock: u32_column(row, "clock")?,
        period: u32_column(row, "period")?,
    })
}

fn u32_column(row: &SqliteRow, column: &str) -> Result<u32> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).with_context(|| format!("column {column} out of range: {raw}"))
}

fn json_column(row: &SqliteRow, column: &str) -> Result<Value> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).with_context(|| format!("column {column} is not valid json"))
}
