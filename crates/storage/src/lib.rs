use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

mod models;

pub use models::{
    EntityRecord, EntityStatus, NewEntity, NewSnapshot, SnapshotRecord, StoredClock,
};

use models::{clock_from_row, entity_from_row, snapshot_from_row};

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

pub const REQUIRED_TABLES: &[&str] = &["runs", "incidents", "entities", "snapshots"];

const MEMORY_PREFIX: &str = "sqlite::memory:";

const SNAPSHOT_COLUMNS: &str = "entity_id, period, clock, score_home, score_away, score_total, \
                                metrics_json, captured_at_ms";

/// Persistence operations the collector depends on.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn entity_exists(&self, entity_id: &str) -> Result<bool>;

    /// Inserts the match unless it is already registered. Returns whether a row was created.
    async fn create_entity(&self, entity: &NewEntity) -> Result<bool>;

    /// Clock and period of the most recently captured snapshot.
    async fn latest_snapshot(&self, entity_id: &str) -> Result<Option<StoredClock>>;

    /// Inserts, or replaces the metrics of, the snapshot at `(entity, period, clock)`.
    async fn upsert_snapshot(&self, snapshot: &NewSnapshot) -> Result<()>;

    async fn mark_finished(&self, entity_id: &str) -> Result<()>;

    async fn get_entity(&self, entity_id: &str) -> Result<Option<EntityRecord>>;

    async fn list_entities(&self) -> Result<Vec<EntityRecord>>;

    /// Ordered by `(period, clock)` ascending.
    async fn list_snapshots(&self, entity_id: &str) -> Result<Vec<SnapshotRecord>>;

    async fn latest_snapshot_record(&self, entity_id: &str) -> Result<Option<SnapshotRecord>>;
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .foreign_keys(true);

        // every connection to `sqlite::memory:` is its own database
        let pool = if path.starts_with(MEMORY_PREFIX) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_run(&self, run_id: &str, git_sha: Option<&str>) -> Result<()> {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        sqlx::query(
            "INSERT OR REPLACE INTO runs (run_id, started_at_ms, git_sha, host) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(run_id)
        .bind(now_ms())
        .bind(git_sha)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_incident(
        &self,
        run_id: &str,
        severity: &str,
        kind: &str,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO incidents (run_id, ts_ms, severity, kind, message) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(now_ms())
        .bind(severity)
        .bind(kind)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Names from [`REQUIRED_TABLES`] that do not exist in the database.
    pub async fn validate_required_tables(&self) -> Result<Vec<String>> {
        let present: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&self.pool)
                .await?;
        Ok(REQUIRED_TABLES
            .iter()
            .filter(|table| !present.iter().any(|name| name == *table))
            .map(|table| table.to_string())
            .collect())
    }
}

#[async_trait]
impl Repository for Store {
    async fn entity_exists(&self, entity_id: &str) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM entities WHERE id = ?1")
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn create_entity(&self, entity: &NewEntity) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO entities (id, league, home_team, away_team, details_json, status, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.league)
        .bind(&entity.home_team)
        .bind(&entity.away_team)
        .bind(entity.details.to_string())
        .bind(EntityStatus::Live.as_str())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        let created = result.rows_affected() == 1;
        if created {
            debug!(entity_id = %entity.id, "entity inserted");
        }
        Ok(created)
    }

    async fn latest_snapshot(&self, entity_id: &str) -> Result<Option<StoredClock>> {
        let row = sqlx::query(
            r#"
            SELECT clock, period FROM snapshots
            WHERE entity_id = ?1
            ORDER BY captured_at_ms DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(clock_from_row).transpose()
    }

    async fn upsert_snapshot(&self, snapshot: &NewSnapshot) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO snapshots ({SNAPSHOT_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (entity_id, period, clock) DO UPDATE SET
                score_home = excluded.score_home,
                score_away = excluded.score_away,
                score_total = excluded.score_total,
                metrics_json = excluded.metrics_json,
                captured_at_ms = excluded.captured_at_ms
            "#
        ))
        .bind(&snapshot.entity_id)
        .bind(i64::from(snapshot.period))
        .bind(i64::from(snapshot.clock))
        .bind(snapshot.score_home)
        .bind(snapshot.score_away)
        .bind(snapshot.score_total)
        .bind(snapshot.metrics.to_string())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_finished(&self, entity_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE entities SET
                status = ?2,
                finished_at_ms = ?3,
                final_score_home = (
                    SELECT score_home FROM snapshots WHERE entity_id = ?1
                    ORDER BY captured_at_ms DESC, id DESC LIMIT 1
                ),
                final_score_away = (
                    SELECT score_away FROM snapshots WHERE entity_id = ?1
                    ORDER BY captured_at_ms DESC, id DESC LIMIT 1
                )
            WHERE id = ?1
            "#,
        )
        .bind(entity_id)
        .bind(EntityStatus::Finished.as_str())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("cannot finish unknown entity {entity_id}");
        }
        Ok(())
    }

    async fn get_entity(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        let row = sqlx::query("SELECT * FROM entities WHERE id = ?1")
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entity_from_row).transpose()
    }

    async fn list_entities(&self) -> Result<Vec<EntityRecord>> {
        let rows = sqlx::query("SELECT * FROM entities ORDER BY created_at_ms DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn list_snapshots(&self, entity_id: &str) -> Result<Vec<SnapshotRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE entity_id = ?1 ORDER BY period ASC, clock ASC"
        ))
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn latest_snapshot_record(&self, entity_id: &str) -> Result<Option<SnapshotRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE entity_id = ?1 \
             ORDER BY captured_at_ms DESC, id DESC LIMIT 1"
        ))
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }
}

pub async fn init_sqlite(path: &str) -> Result<Store> {
    let store = Store::connect(path).await?;
    info!(path = path, "sqlite initialized");
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<()> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
