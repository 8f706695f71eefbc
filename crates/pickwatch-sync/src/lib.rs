//! Run orchestration: eager configuration, the per-champion fetch →
//! normalize → upsert loop, and the single end-of-run commit.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use pickwatch_core::normalize;
use pickwatch_report::{ErrorReporter, RollbarConfig, RollbarReporter};
use pickwatch_storage::{connect_pool, DbConfig, PgPickStore, PickStore};
use pickwatch_wiki::{MatchSource, WikiClient};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "pickwatch-sync";

/// Champions with a pick table. Adding one means provisioning a table and a
/// `pick_table` entry first.
pub const TRACKED_CHAMPIONS: [&str; 2] = ["Jhin", "Lucian"];

/// Full configuration surface of the job. Every key is required; there are
/// no optional knobs and no defaults.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db: DbConfig,
    pub rollbar: RollbarConfig,
}

impl SyncConfig {
    /// Read the environment eagerly, before any network or database work.
    /// Missing keys are collected so one failed run surfaces the whole
    /// problem instead of the first key only.
    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let database_host = require_env("DATABASE_HOST", &mut missing);
        let database_name = require_env("DATABASE_NAME", &mut missing);
        let database_user = require_env("DATABASE_USERNAME", &mut missing);
        let database_password = require_env("DATABASE_PASSWORD", &mut missing);
        let rollbar_token = require_env("ROLLBAR_ACCESS_TOKEN", &mut missing);
        let rollbar_environment = require_env("ROLLBAR_ENVIRONMENT", &mut missing);
        let rollbar_code_version = require_env("ROLLBAR_CODE_VERSION", &mut missing);

        if !missing.is_empty() {
            bail!("missing required environment variables: {}", missing.join(", "));
        }

        Ok(Self {
            db: DbConfig {
                host: database_host,
                name: database_name,
                user: database_user,
                password: database_password,
            },
            rollbar: RollbarConfig {
                access_token: rollbar_token,
                environment: rollbar_environment,
                code_version: rollbar_code_version,
            },
        })
    }
}

fn require_env(key: &'static str, missing: &mut Vec<&'static str>) -> String {
    match std::env::var(key) {
        Ok(value) => value,
        Err(_) => {
            missing.push(key);
            String::new()
        }
    }
}

/// Outcome counters for one run. Failure counters cover everything the run
/// skipped over; they never affect the exit status.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub champions: usize,
    pub fetched: usize,
    pub upserted: usize,
    pub rejected: usize,
    pub write_failures: usize,
    pub query_failures: usize,
}

/// The fetch → normalize → upsert pipeline over every tracked champion.
pub struct SyncPipeline {
    source: Box<dyn MatchSource>,
    reporter: Box<dyn ErrorReporter>,
}

impl SyncPipeline {
    pub fn new(source: Box<dyn MatchSource>, reporter: Box<dyn ErrorReporter>) -> Self {
        Self { source, reporter }
    }

    /// One full pass. Failures inside the loop are logged, reported, counted
    /// and skipped: a failed champion query does not block the next
    /// champion, and a rejected or unwritable record does not block the next
    /// record. Nothing in here aborts the run.
    pub async fn run(&self, store: &mut dyn PickStore) -> SyncRunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut fetched = 0usize;
        let mut upserted = 0usize;
        let mut rejected = 0usize;
        let mut write_failures = 0usize;
        let mut query_failures = 0usize;

        info!(%run_id, champions = TRACKED_CHAMPIONS.len(), "starting pick sync run");

        for champion in TRACKED_CHAMPIONS {
            let matches = match self.source.fetch_picks(champion).await {
                Ok(matches) => matches,
                Err(err) => {
                    warn!(champion, error = %err, "champion query failed, skipping champion");
                    self.reporter
                        .report(&format!("pick query failed for {champion}: {err}"))
                        .await;
                    query_failures += 1;
                    continue;
                }
            };
            fetched += matches.len();

            for raw in &matches {
                let pick = match normalize(raw) {
                    Ok(pick) => pick,
                    Err(err) => {
                        warn!(champion, error = %err, "rejected match record");
                        self.reporter
                            .report(&format!("rejected {champion} match record: {err}"))
                            .await;
                        rejected += 1;
                        continue;
                    }
                };

                match store.upsert_pick(champion, &pick).await {
                    Ok(()) => upserted += 1,
                    Err(err) => {
                        warn!(
                            champion,
                            game_id = %pick.game_id,
                            error = %err,
                            "upsert failed, skipping record"
                        );
                        self.reporter
                            .report(&format!(
                                "upsert failed for {champion} game {}: {err}",
                                pick.game_id
                            ))
                            .await;
                        write_failures += 1;
                    }
                }
            }
        }

        let finished_at = Utc::now();
        info!(
            %run_id,
            fetched,
            upserted,
            rejected,
            write_failures,
            query_failures,
            "pick sync run finished"
        );

        SyncRunSummary {
            run_id,
            started_at,
            finished_at,
            champions: TRACKED_CHAMPIONS.len(),
            fetched,
            upserted,
            rejected,
            write_failures,
            query_failures,
        }
    }
}

/// Composition root for one scheduled invocation: load config, open the pool
/// and one transaction, run the pipeline, commit once, close the pool. Only
/// the steps outside the pipeline can fail the run.
pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env()?;
    let pool = connect_pool(&config.db).await?;
    let source = WikiClient::new()?;
    let reporter = RollbarReporter::new(config.rollbar)?;
    let pipeline = SyncPipeline::new(Box::new(source), Box::new(reporter));

    let mut store = PgPickStore::begin(&pool)
        .await
        .context("opening sync transaction")?;
    let summary = pipeline.run(&mut store).await;
    store.commit().await.context("committing sync transaction")?;
    pool.close().await;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KEYS: [&str; 7] = [
        "DATABASE_HOST",
        "DATABASE_NAME",
        "DATABASE_USERNAME",
        "DATABASE_PASSWORD",
        "ROLLBAR_ACCESS_TOKEN",
        "ROLLBAR_ENVIRONMENT",
        "ROLLBAR_CODE_VERSION",
    ];

    // All environment manipulation stays in this one test; parallel tests
    // sharing these keys would race.
    #[test]
    fn config_collects_every_missing_key_before_failing() {
        for key in ALL_KEYS {
            std::env::set_var(key, "value");
        }
        let config = SyncConfig::from_env().expect("complete environment");
        assert_eq!(config.db.host, "value");
        assert_eq!(config.rollbar.environment, "value");

        std::env::remove_var("DATABASE_PASSWORD");
        std::env::remove_var("ROLLBAR_ACCESS_TOKEN");
        let err = SyncConfig::from_env().unwrap_err().to_string();
        assert!(err.contains("DATABASE_PASSWORD"));
        assert!(err.contains("ROLLBAR_ACCESS_TOKEN"));
        assert!(!err.contains("DATABASE_HOST"));

        for key in ALL_KEYS {
            std::env::remove_var(key);
        }
        let err = SyncConfig::from_env().unwrap_err().to_string();
        for key in ALL_KEYS {
            assert!(err.contains(key), "error should list {key}: {err}");
        }
    }
}
