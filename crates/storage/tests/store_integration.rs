use serde_json::json;
use storage::{
    init_sqlite, EntityStatus, NewEntity, NewSnapshot, Repository, Store, StoredClock,
};

async fn memory_store() -> Store {
    init_sqlite("sqlite::memory:")
        .await
        .expect("in-memory sqlite should open")
}

fn entity(id: &str) -> NewEntity {
    NewEntity {
        id: id.to_string(),
        league: "Serie A".into(),
        home_team: "Palmeiras".into(),
        away_team: "Santos".into(),
        details: json!({"odds_home_pre": 1.9}),
    }
}

fn snapshot(id: &str, period: u32, clock: u32, home: i64, away: i64) -> NewSnapshot {
    NewSnapshot {
        entity_id: id.to_string(),
        period,
        clock,
        score_home: home,
        score_away: away,
        score_total: home + away,
        metrics: json!({"xg_home": 0.4}),
    }
}

#[tokio::test]
async fn create_entity_is_idempotent() {
    let store = memory_store().await;
    assert!(!store.entity_exists("E1").await.unwrap());

    assert!(store.create_entity(&entity("E1")).await.unwrap());
    assert!(!store.create_entity(&entity("E1")).await.unwrap());
    assert!(store.entity_exists("E1").await.unwrap());

    let entities = store.list_entities().await.unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].status, EntityStatus::Live);
    assert_eq!(entities[0].details, json!({"odds_home_pre": 1.9}));
    assert_eq!(entities[0].final_score_home, None);
}

#[tokio::test]
async fn snapshots_list_in_period_clock_order() {
    let store = memory_store().await;
    store.create_entity(&entity("E1")).await.unwrap();

    for (period, clock) in [(2, 3), (1, 45), (1, 10), (2, 1), (1, 23)] {
        store
            .upsert_snapshot(&snapshot("E1", period, clock, 0, 0))
            .await
            .unwrap();
    }

    let order: Vec<(u32, u32)> = store
        .list_snapshots("E1")
        .await
        .unwrap()
        .iter()
        .map(|s| (s.period, s.clock))
        .collect();
    assert_eq!(order, vec![(1, 10), (1, 23), (1, 45), (2, 1), (2, 3)]);
}

#[tokio::test]
async fn upsert_replaces_same_period_and_clock() {
    let store = memory_store().await;
    store.create_entity(&entity("E1")).await.unwrap();

    store.upsert_snapshot(&snapshot("E1", 1, 30, 0, 0)).await.unwrap();
    store.upsert_snapshot(&snapshot("E1", 1, 30, 1, 0)).await.unwrap();

    let snapshots = store.list_snapshots("E1").await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].score_home, 1);
    assert_eq!(snapshots[0].score_total, 1);
}

#[tokio::test]
async fn latest_snapshot_follows_capture_order() {
    let store = memory_store().await;
    store.create_entity(&entity("E2")).await.unwrap();
    assert_eq!(store.latest_snapshot("E2").await.unwrap(), None);

    store.upsert_snapshot(&snapshot("E2", 1, 44, 0, 0)).await.unwrap();
    store.upsert_snapshot(&snapshot("E2", 2, 30, 1, 1)).await.unwrap();

    assert_eq!(
        store.latest_snapshot("E2").await.unwrap(),
        Some(StoredClock {
            clock: 30,
            period: 2
        })
    );
    let record = store
        .latest_snapshot_record("E2")
        .await
        .unwrap()
        .expect("latest record");
    assert_eq!((record.period, record.clock), (2, 30));
    assert_eq!(record.metrics, json!({"xg_home": 0.4}));
}

#[tokio::test]
async fn mark_finished_sets_status_and_final_score() {
    let store = memory_store().await;
    store.create_entity(&entity("E3")).await.unwrap();
    store.upsert_snapshot(&snapshot("E3", 1, 40, 1, 0)).await.unwrap();
    store.upsert_snapshot(&snapshot("E3", 2, 47, 2, 1)).await.unwrap();

    store.mark_finished("E3").await.unwrap();

    let entities = store.list_entities().await.unwrap();
    let finished = &entities[0];
    assert_eq!(finished.status, EntityStatus::Finished);
    assert_eq!(finished.final_score_home, Some(2));
    assert_eq!(finished.final_score_away, Some(1));
    assert!(finished.finished_at_ms.is_some());
}

#[tokio::test]
async fn get_entity_returns_single_match() {
    let store = memory_store().await;
    store.create_entity(&entity("E1")).await.unwrap();
    store.create_entity(&entity("E2")).await.unwrap();

    let found = store.get_entity("E2").await.unwrap().expect("E2 is stored");
    assert_eq!(found.id, "E2");
    assert_eq!(found.home_team, "Palmeiras");
    assert_eq!(found.status, EntityStatus::Live);
    assert!(store.get_entity("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn mark_finished_rejects_unknown_entity() {
    let store = memory_store().await;
    let err = store.mark_finished("ghost").await.expect_err("unknown id");
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn snapshot_requires_registered_entity() {
    let store = memory_store().await;
    store
        .upsert_snapshot(&snapshot("nobody", 1, 1, 0, 0))
        .await
        .expect_err("foreign key should reject orphan snapshot");
}

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("collector.db").display());

    {
        let store = init_sqlite(&url).await.expect("file db should open");
        store.create_entity(&entity("E2")).await.unwrap();
        store.upsert_snapshot(&snapshot("E2", 2, 30, 0, 0)).await.unwrap();
        store.pool().close().await;
    }

    let reopened = init_sqlite(&url).await.expect("file db should reopen");
    assert_eq!(
        reopened.latest_snapshot("E2").await.unwrap(),
        Some(StoredClock {
            clock: 30,
            period: 2
        })
    );
    assert!(reopened.validate_required_tables().await.unwrap().is_empty());
}

#[tokio::test]
async fn bookkeeping_rows_are_written() {
    let store = memory_store().await;
    store.insert_run("run-1", None).await.unwrap();
    store
        .log_incident("run-1", "info", "ready", "collector ready")
        .await
        .unwrap();

    let incidents: i64 = sqlx_count(&store, "incidents").await;
    assert_eq!(incidents, 1);
}

async fn sqlx_count(store: &Store, table: &str) -> i64 {
    use sqlx::Row;
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
        .fetch_one(store.pool())
        .await
        .expect("count query");
    row.get::<i64, _>("n")
}
