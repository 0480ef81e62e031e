use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use decision::{decide, Reason, Verdict};
use feed::{FeedSource, Observation, RawRecord};
use serde_json::Value;
use state::{EntityState, StateStore};
use storage::{NewEntity, NewSnapshot, Repository};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The feed answered and every record was attempted.
    Completed,
    /// The feed reported no live matches; in-memory state was cleared.
    Idle,
    /// The feed could not be read; in-memory state was left untouched.
    FetchFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub observed: usize,
    pub persisted: usize,
    pub failed: usize,
    pub finished: Vec<String>,
    /// Decision taken for each observed match, in feed order.
    pub decisions: Vec<(String, Reason)>,
}

impl CycleReport {
    fn new(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            observed: 0,
            persisted: 0,
            failed: 0,
            finished: Vec::new(),
            decisions: Vec::new(),
        }
    }
}

/// Polls the feed and turns observations into persisted snapshots.
///
/// Only the collector writes to its [`StateStore`]; cycles never overlap.
pub struct Collector<F, R> {
    feed: F,
    repo: R,
    states: StateStore,
}

impl<F, R> Collector<F, R>
where
    F: FeedSource,
    R: Repository,
{
    pub fn new(feed: F, repo: R, states: StateStore) -> Self {
        Self { feed, repo, states }
    }

    pub fn states(&self) -> &StateStore {
        &self.states
    }

    /// Runs a cycle on every tick of `period` until `shutdown` resolves.
    ///
    /// Ticks that fire while a cycle is still running are skipped.
    pub async fn run<S, C>(&self, period: Duration, shutdown: S, mut on_cycle: C)
    where
        S: Future<Output = ()>,
        C: FnMut(&CycleReport),
    {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("collector stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    on_cycle(&report);
                }
            }
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        debug!("starting live collection cycle");

        let records = match self.feed.fetch_live().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "live feed fetch failed");
                return CycleReport::new(CycleOutcome::FetchFailed);
            }
        };

        if records.is_empty() {
            // an empty answer may be transient, so stored statuses are left alone
            info!(tracked = self.states.len(), "no live matches right now");
            self.states.clear();
            return CycleReport::new(CycleOutcome::Idle);
        }

        let mut report = CycleReport::new(CycleOutcome::Completed);
        let mut seen = HashSet::new();
        for record in records {
            match self.process(record, &mut seen).await {
                Ok(Some((entity_id, verdict))) => {
                    report.observed += 1;
                    if verdict.persist {
                        report.persisted += 1;
                    }
                    report.decisions.push((entity_id, verdict.reason));
                }
                Ok(None) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(error = %format!("{err:#}"), "failed to process live record");
                }
            }
        }

        report.finished = self.reconcile(&seen).await;
        info!(
            active = seen.len(),
            persisted = report.persisted,
            failed = report.failed,
            finished = report.finished.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "collection cycle complete"
        );
        report
    }

    /// Handles one record. `Ok(None)` means it was a repeat of an id already handled this cycle.
    async fn process(
        &self,
        record: RawRecord,
        seen: &mut HashSet<String>,
    ) -> Result<Option<(String, Verdict)>> {
        let observation = match Observation::from_record(record) {
            Ok(observation) => observation,
            Err(err) => {
                // a match with a broken clock is still live
                if let Some(id) = err.entity_id() {
                    seen.insert(id.to_string());
                }
                return Err(err.into());
            }
        };
        let entity_id = observation.entity_id.clone();
        if !seen.insert(entity_id.clone()) {
            warn!(%entity_id, "match listed twice in one feed response; keeping the first");
            return Ok(None);
        }

        self.ensure_entity(&observation)
            .await
            .with_context(|| format!("registering match {entity_id}"))?;

        let previous = self.resolve_state(&entity_id).await;
        let verdict = decide(observation.clock, previous.as_ref());
        debug!(
            %entity_id,
            clock = observation.clock,
            reason = verdict.reason.as_str(),
            "observation classified"
        );
        if !verdict.persist {
            return Ok(Some((entity_id, verdict)));
        }

        let live = observation.live_metrics();
        let snapshot = NewSnapshot {
            entity_id: entity_id.clone(),
            period: verdict.period,
            clock: observation.clock,
            score_home: live.score_home,
            score_away: live.score_away,
            score_total: live.score_total,
            metrics: Value::Object(live.metrics),
        };
        self.repo
            .upsert_snapshot(&snapshot)
            .await
            .with_context(|| format!("saving snapshot for match {entity_id}"))?;
        self.states.set(&entity_id, verdict.next_state(observation.clock));

        let action = if verdict.reason == Reason::SameClockUpdate {
            "snapshot updated"
        } else {
            "snapshot saved"
        };
        info!(
            %entity_id,
            fixture = %observation.fixture(),
            score = %format!("{}x{}", snapshot.score_home, snapshot.score_away),
            period = verdict.period,
            clock = observation.clock,
            reason = verdict.reason.as_str(),
            "{action}"
        );
        Ok(Some((entity_id, verdict)))
    }

    async fn ensure_entity(&self, observation: &Observation) -> Result<()> {
        if self.repo.entity_exists(&observation.entity_id).await? {
            return Ok(());
        }
        let profile = observation.profile();
        let entity = NewEntity {
            id: observation.entity_id.clone(),
            league: profile.league,
            home_team: profile.home_team,
            away_team: profile.away_team,
            details: Value::Object(profile.details),
        };
        if self.repo.create_entity(&entity).await? {
            info!(
                entity_id = %entity.id,
                home = %entity.home_team,
                away = %entity.away_team,
                league = %entity.league,
                "new match detected"
            );
        }
        Ok(())
    }

    /// In-memory state, or the last persisted snapshot after a restart.
    ///
    /// A failed lookup is treated as a brand new match, which may persist one
    /// extra first-period snapshot for a match that already has history.
    async fn resolve_state(&self, entity_id: &str) -> Option<EntityState> {
        if let Some(state) = self.states.get(entity_id) {
            return Some(state);
        }
        match self.repo.latest_snapshot(entity_id).await {
            Ok(Some(stored)) => {
                let state = EntityState::new(stored.clock, stored.period);
                debug!(
                    %entity_id,
                    clock = state.last_clock,
                    period = state.last_period,
                    "state recovered from storage"
                );
                Some(state)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(%entity_id, error = %err, "state recovery failed; treating match as new");
                None
            }
        }
    }

    /// Drops matches that left the feed and marks them finished.
    async fn reconcile(&self, seen: &HashSet<String>) -> Vec<String> {
        let mut gone: Vec<String> = self
            .states
            .tracked_ids()
            .into_iter()
            .filter(|id| !seen.contains(id))
            .collect();
        gone.sort();

        for entity_id in &gone {
            self.states.remove(entity_id);
            match self.repo.mark_finished(entity_id).await {
                Ok(()) => info!(%entity_id, "match finished"),
                Err(err) => error!(%entity_id, error = %err, "failed to mark match finished"),
            }
        }
        gone
    }
}
