//! Postgres sink for normalized picks: connection config, the champion →
//! table map, and the conditional upsert that recomputes `notified`.

use anyhow::Context;
use async_trait::async_trait;
use pickwatch_core::NormalizedPick;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::warn;

pub const CRATE_NAME: &str = "pickwatch-storage";

/// Connection settings for the pick database. Port and TLS stay on the
/// driver defaults.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    pub fn pg_connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
    }
}

/// One connection is enough: the run is sequential and writes through a
/// single transaction.
pub async fn connect_pool(config: &DbConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect_with(config.pg_connect_options())
        .await
        .context("connecting to postgres")
}

/// Champion → pick table. The tables are fixed and provisioned up front; an
/// unmapped champion is a write-path error, never a dynamically created
/// table.
pub fn pick_table(champion: &str) -> Option<&'static str> {
    match champion {
        "Jhin" => Some("jhin_picks"),
        "Lucian" => Some("lucian_picks"),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no pick table for champion {0:?}")]
    UnknownChampion(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Insert-or-update statement for one pick table.
///
/// `notified` is recomputed on every write with null-safe equality, so it
/// reads true exactly when the VOD link is unchanged (two NULLs compare
/// equal). On conflict `t.vod` still holds the stored value while EXCLUDED
/// carries the proposed row; on first insert the proposed VOD is compared
/// against the absent stored value, i.e. NULL.
pub fn upsert_sql(table: &str) -> String {
    format!(
        r#"INSERT INTO {table} AS t (game_id, player, tournament, won, "timestamp", vod, notified)
VALUES ($1, $2, $3, $4, $5, $6, $6 IS NULL)
ON CONFLICT (game_id) DO UPDATE SET
    player = EXCLUDED.player,
    tournament = EXCLUDED.tournament,
    won = EXCLUDED.won,
    "timestamp" = EXCLUDED."timestamp",
    notified = t.vod IS NOT DISTINCT FROM EXCLUDED.vod,
    vod = EXCLUDED.vod"#
    )
}

/// Write capability the pipeline consumes; kept narrow so runs can be driven
/// against an in-memory table in tests.
#[async_trait]
pub trait PickStore: Send {
    async fn upsert_pick(
        &mut self,
        champion: &str,
        pick: &NormalizedPick,
    ) -> Result<(), StoreError>;
}

/// Store bound to one open transaction. Each upsert runs inside a savepoint
/// so a failed statement does not poison the surrounding transaction; the
/// caller commits exactly once at the end of the run.
pub struct PgPickStore {
    tx: Transaction<'static, Postgres>,
}

impl PgPickStore {
    pub async fn begin(pool: &PgPool) -> Result<Self, StoreError> {
        let tx = pool.begin().await?;
        Ok(Self { tx })
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PickStore for PgPickStore {
    async fn upsert_pick(
        &mut self,
        champion: &str,
        pick: &NormalizedPick,
    ) -> Result<(), StoreError> {
        let table = pick_table(champion)
            .ok_or_else(|| StoreError::UnknownChampion(champion.to_owned()))?;
        let sql = upsert_sql(table);

        let mut savepoint = self.tx.begin().await?;
        let result = sqlx::query(&sql)
            .bind(&pick.game_id)
            .bind(&pick.player)
            .bind(&pick.tournament)
            .bind(pick.won)
            .bind(pick.timestamp)
            .bind(pick.vod.as_deref())
            .execute(&mut *savepoint)
            .await;

        match result {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = savepoint.rollback().await {
                    warn!(error = %rollback_err, "savepoint rollback failed");
                }
                Err(StoreError::Database(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn champion_table_map_is_closed_and_case_sensitive() {
        assert_eq!(pick_table("Jhin"), Some("jhin_picks"));
        assert_eq!(pick_table("Lucian"), Some("lucian_picks"));
        assert_eq!(pick_table("Teemo"), None);
        assert_eq!(pick_table("jhin"), None);
    }

    #[test]
    fn upsert_targets_the_given_table_and_conflicts_on_game_id() {
        let sql = upsert_sql("jhin_picks");
        assert!(sql.starts_with("INSERT INTO jhin_picks AS t"));
        assert!(sql.contains("ON CONFLICT (game_id) DO UPDATE SET"));
    }

    #[test]
    fn upsert_seeds_notified_from_the_proposed_vod_on_insert() {
        let sql = upsert_sql("lucian_picks");
        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5, $6, $6 IS NULL)"));
    }

    #[test]
    fn upsert_compares_stored_and_proposed_vod_null_safely() {
        let sql = upsert_sql("lucian_picks");
        assert!(sql.contains("notified = t.vod IS NOT DISTINCT FROM EXCLUDED.vod"));
        assert!(sql.contains("vod = EXCLUDED.vod"));
    }
}
