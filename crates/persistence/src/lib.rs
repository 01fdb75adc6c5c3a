#![deny(warnings)]

//! Persistence layer: SQLite saves with binary snapshots, plus JSON/YAML
//! scenario files.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sim_core::CountryState;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/main.db"
}

/// Connect (creating the database file if needed) and apply migrations.
pub async fn init_db(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid sqlite url {url}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    // Every connection to an in-memory database is a separate database.
    let max = if url.contains(":memory:") { 1 } else { 4 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!(%url, "database ready");
    Ok(pool)
}

/// Register a new save slot and return its id.
pub async fn create_save(pool: &SqlitePool, name: &str, description: Option<&str>) -> anyhow::Result<i64> {
    let id = sqlx::query("INSERT INTO saves (name, description) VALUES (?, ?)")
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?
        .last_insert_rowid();
    info!(id, name, "save created");
    Ok(id)
}

/// Encode a snapshot with bincode.
pub fn encode_snapshot(state: &CountryState) -> anyhow::Result<Vec<u8>> {
    bincode::serialize(state).context("encoding snapshot")
}

pub fn decode_snapshot(bytes: &[u8]) -> anyhow::Result<CountryState> {
    bincode::deserialize(bytes).context("decoding snapshot")
}

/// Append a snapshot to a save and return the snapshot id.
pub async fn save_snapshot(pool: &SqlitePool, save_id: i64, state: &CountryState) -> anyhow::Result<i64> {
    let blob = encode_snapshot(state)?;
    let id = sqlx::query(
        "INSERT INTO snapshots (save_id, country_code, sim_date, elapsed_days, state)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(save_id)
    .bind(&state.meta.country_code)
    .bind(state.meta.current_date.to_string())
    .bind(i64::try_from(state.meta.elapsed_days).unwrap_or(i64::MAX))
    .bind(blob.as_slice())
    .execute(pool)
    .await
    .with_context(|| format!("saving snapshot into save {save_id}"))?
    .last_insert_rowid();
    debug!(save_id, snapshot = id, bytes = blob.len(), "snapshot saved");
    Ok(id)
}

/// The most recent snapshot of a save, if any.
pub async fn load_latest_snapshot(pool: &SqlitePool, save_id: i64) -> anyhow::Result<Option<CountryState>> {
    let row: Option<(Vec<u8>,)> =
        sqlx::query_as("SELECT state FROM snapshots WHERE save_id = ? ORDER BY id DESC LIMIT 1")
            .bind(save_id)
            .fetch_optional(pool)
            .await?;
    row.map(|(blob,)| decode_snapshot(&blob)).transpose()
}

/// Listing entry for one stored snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: i64,
    pub country_code: String,
    pub sim_date: NaiveDate,
    pub elapsed_days: u64,
}

/// Snapshots of a save, oldest first.
pub async fn list_snapshots(pool: &SqlitePool, save_id: i64) -> anyhow::Result<Vec<SnapshotInfo>> {
    let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
        "SELECT id, country_code, sim_date, elapsed_days FROM snapshots WHERE save_id = ? ORDER BY id",
    )
    .bind(save_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(id, country_code, date, elapsed)| {
            Ok(SnapshotInfo {
                id,
                country_code,
                sim_date: date
                    .parse()
                    .with_context(|| format!("snapshot {id} has a bad date {date}"))?,
                elapsed_days: u64::try_from(elapsed).unwrap_or(0),
            })
        })
        .collect()
}

/// Write a snapshot as pretty JSON.
pub async fn save_json(path: &Path, state: &CountryState) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let text = serde_json::to_string_pretty(state)?;
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "snapshot written");
    Ok(())
}

pub async fn load_json(path: &Path) -> anyhow::Result<CountryState> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Load a scenario snapshot from `.json`, `.yaml` or `.yml`.
pub async fn load_scenario(path: &Path) -> anyhow::Result<CountryState> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_json(path).await,
        Some("yaml") | Some("yml") => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        other => bail!("unsupported scenario format {:?} for {}", other, path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_core::testing::sample_country;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("persistence-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn url_is_sqlite() {
        assert!(default_sqlite_url().starts_with("sqlite://"));
    }

    #[tokio::test]
    async fn latest_snapshot_wins() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let save = create_save(&pool, "campaign", Some("test")).await.unwrap();
        assert_eq!(load_latest_snapshot(&pool, save).await.unwrap(), None);

        let mut state = sample_country();
        save_snapshot(&pool, save, &state).await.unwrap();
        state.meta.current_date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        state.meta.elapsed_days = 31;
        state.economy.gdp_billions_usd = 1234.5;
        save_snapshot(&pool, save, &state).await.unwrap();

        let loaded = load_latest_snapshot(&pool, save).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        let listing = list_snapshots(&pool, save).await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[1].elapsed_days, 31);
        assert_eq!(listing[1].sim_date, state.meta.current_date);
        assert_eq!(listing[0].country_code, "TST");
    }

    #[tokio::test]
    async fn saves_are_isolated() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let a = create_save(&pool, "a", None).await.unwrap();
        let b = create_save(&pool, "b", None).await.unwrap();
        save_snapshot(&pool, a, &sample_country()).await.unwrap();
        assert!(load_latest_snapshot(&pool, b).await.unwrap().is_none());
        assert!(save_snapshot(&pool, 999, &sample_country()).await.is_err());
    }

    #[tokio::test]
    async fn json_and_yaml_scenarios() {
        let state = sample_country();
        let json = scratch("scenario.json");
        save_json(&json, &state).await.unwrap();
        assert_eq!(load_scenario(&json).await.unwrap(), state);

        let yaml = scratch("scenario.yaml");
        tokio::fs::write(&yaml, serde_yaml::to_string(&state).unwrap()).await.unwrap();
        assert_eq!(load_scenario(&yaml).await.unwrap(), state);

        assert!(load_scenario(&scratch("scenario.toml")).await.is_err());
        assert!(load_json(&scratch("missing.json")).await.is_err());
        let _ = tokio::fs::remove_file(&json).await;
        let _ = tokio::fs::remove_file(&yaml).await;
    }

    proptest! {
        #[test]
        fn truncated_blobs_are_errors(cut in 0usize..64) {
            let bytes = encode_snapshot(&sample_country()).unwrap();
            let end = bytes.len().saturating_sub(cut + 1);
            prop_assert!(decode_snapshot(&bytes[..end]).is_err());
        }
    }
}
