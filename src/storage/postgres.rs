//! PostgreSQL cache store
//!
//! Connections come from a `deadpool-postgres` pool. Every multi-row write
//! runs inside a transaction; a failure rolls the transaction back when it
//! is dropped.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime,
};
use std::time::Duration;
use tokio_postgres::{NoTls, Row};

use super::{DumpStore, UPSERT_CHUNK_SIZE};
use crate::config::DatabaseConfig;
use crate::models::{BgpDump, Collector, DumpKind, Project, SyncState};
use crate::query::Query;
use crate::utils::error::StoreError;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS collectors (
        name TEXT PRIMARY KEY,
        project_name TEXT NOT NULL,
        last_fetch_timestamp TIMESTAMPTZ NOT NULL
    );

    CREATE TABLE IF NOT EXISTS bgp_dumps (
        collector_name TEXT NOT NULL,
        url TEXT NOT NULL,
        dump_type SMALLINT NOT NULL,
        duration INTERVAL NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        first_fetch_timestamp TIMESTAMPTZ NOT NULL,
        last_fetch_timestamp TIMESTAMPTZ NOT NULL,
        UNIQUE (collector_name, url)
    );

    CREATE INDEX IF NOT EXISTS idx_bgp_dumps_timestamp
        ON bgp_dumps(timestamp);

    CREATE INDEX IF NOT EXISTS idx_bgp_dumps_collector_type
        ON bgp_dumps(collector_name, dump_type);

    CREATE TABLE IF NOT EXISTS collector_sync_state (
        collector_name TEXT NOT NULL,
        dump_type SMALLINT NOT NULL,
        last_completed_crawl_time TIMESTAMPTZ NOT NULL,
        most_recent_dump_timestamp TIMESTAMPTZ,
        PRIMARY KEY (collector_name, dump_type)
    );
"#;

const UPSERT_COLLECTOR: &str = r#"
    INSERT INTO collectors (name, project_name, last_fetch_timestamp)
    VALUES ($1, $2, $3)
    ON CONFLICT (name) DO UPDATE SET
        project_name = EXCLUDED.project_name,
        last_fetch_timestamp = EXCLUDED.last_fetch_timestamp
"#;

const UPSERT_DUMP: &str = r#"
    INSERT INTO bgp_dumps (
        collector_name, url, dump_type, duration, timestamp,
        first_fetch_timestamp, last_fetch_timestamp
    )
    VALUES ($1, $2, $3, make_interval(secs => $4), $5, $6, $6)
    ON CONFLICT (collector_name, url) DO UPDATE SET
        dump_type = EXCLUDED.dump_type,
        duration = EXCLUDED.duration,
        timestamp = EXCLUDED.timestamp,
        last_fetch_timestamp = EXCLUDED.last_fetch_timestamp
"#;

const SELECT_DUMPS: &str = r#"
    SELECT b.url, b.collector_name, COALESCE(c.project_name, ''), b.dump_type,
           EXTRACT(EPOCH FROM b.duration)::BIGINT,
           EXTRACT(EPOCH FROM b.timestamp)::BIGINT
    FROM bgp_dumps b
    LEFT JOIN collectors c ON c.name = b.collector_name
    WHERE (cardinality($1::TEXT[]) = 0 OR b.collector_name = ANY($1))
      AND b.timestamp >= $2
      AND b.timestamp < $3
      AND ($4::SMALLINT = 0 OR b.dump_type = $4)
    ORDER BY b.timestamp, b.url
"#;

const SELECT_SYNC_STATES: &str = r#"
    SELECT s.collector_name, c.project_name, s.dump_type,
           s.last_completed_crawl_time, s.most_recent_dump_timestamp
    FROM collector_sync_state s
    JOIN collectors c ON c.name = s.collector_name
    WHERE c.project_name = $1 AND s.dump_type = $2
"#;

const UPSERT_SYNC_STATE: &str = r#"
    INSERT INTO collector_sync_state (
        collector_name, dump_type, last_completed_crawl_time, most_recent_dump_timestamp
    )
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (collector_name, dump_type) DO UPDATE SET
        last_completed_crawl_time = EXCLUDED.last_completed_crawl_time,
        most_recent_dump_timestamp = GREATEST(
            collector_sync_state.most_recent_dump_timestamp,
            EXCLUDED.most_recent_dump_timestamp
        )
"#;

/// Cache store backed by PostgreSQL
pub struct PostgresStore {
    pool: Pool,
    max_size: usize,
}

impl PostgresStore {
    /// Build the pool without opening a connection
    pub fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut pg = PgConfig::new();
        pg.host = Some(config.host.clone());
        pg.port = Some(config.port);
        pg.user = config.user.clone();
        pg.password = config.password.clone();
        pg.dbname = config.dbname.clone();
        pg.pool = Some(PoolConfig::new(config.pool_size));
        pg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = pg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(format!("failed to create pool: {e}")))?;

        Ok(Self {
            pool,
            max_size: config.pool_size,
        })
    }

    /// Build the pool and check that the database answers
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let store = Self::new(config)?;
        let client = store.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| StoreError::transaction("connection check", e))?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            pool_size = config.pool_size,
            "Connected to PostgreSQL"
        );
        Ok(store)
    }

    /// Create tables and indexes if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| StoreError::transaction("ensure_schema", e))?;
        tracing::info!("Cache store schema initialized");
        Ok(())
    }

    /// Connections in use and the pool ceiling
    pub fn pool_usage(&self) -> (usize, usize) {
        let status = self.pool.status();
        (status.size.saturating_sub(status.available), self.max_size)
    }

    async fn client(&self) -> Result<Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn dump_from_row(row: &Row) -> Result<BgpDump, StoreError> {
    let get_err = |e| StoreError::transaction("fetch_by_query", e);

    let url: String = row.try_get(0).map_err(get_err)?;
    let collector_name: String = row.try_get(1).map_err(get_err)?;
    let project_name: String = row.try_get(2).map_err(get_err)?;
    let dump_type: i16 = row.try_get(3).map_err(get_err)?;
    let duration: i64 = row.try_get(4).map_err(get_err)?;
    let timestamp: i64 = row.try_get(5).map_err(get_err)?;

    let kind = DumpKind::from_db(dump_type)
        .ok_or_else(|| StoreError::CorruptRow(format!("dump_type {dump_type} for {url}")))?;
    let duration = u64::try_from(duration)
        .map(Duration::from_secs)
        .map_err(|_| StoreError::CorruptRow(format!("negative duration for {url}")))?;

    Ok(BgpDump {
        url,
        collector: Collector::new(&Project::new(project_name), collector_name),
        kind,
        duration,
        timestamp,
    })
}

fn state_from_row(row: &Row) -> Result<SyncState, StoreError> {
    let get_err = |e| StoreError::transaction("sync_states", e);

    let collector_name: String = row.try_get(0).map_err(get_err)?;
    let project_name: String = row.try_get(1).map_err(get_err)?;
    let dump_type: i16 = row.try_get(2).map_err(get_err)?;
    let last_completed_crawl: DateTime<Utc> = row.try_get(3).map_err(get_err)?;
    let latest: Option<DateTime<Utc>> = row.try_get(4).map_err(get_err)?;

    let kind = DumpKind::from_db(dump_type).ok_or_else(|| {
        StoreError::CorruptRow(format!("dump_type {dump_type} for {collector_name}"))
    })?;

    Ok(SyncState {
        collector: Collector::new(&Project::new(project_name), collector_name),
        kind,
        last_completed_crawl,
        latest_dump: latest.map(|t| t.timestamp()),
    })
}

#[async_trait]
impl DumpStore for PostgresStore {
    async fn upsert_collectors(
        &self,
        collectors: &[Collector],
        as_of: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        if collectors.is_empty() {
            return Ok(0);
        }
        let op = "upsert_collectors";
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| StoreError::transaction(op, e))?;
        let stmt = tx
            .prepare_cached(UPSERT_COLLECTOR)
            .await
            .map_err(|e| StoreError::transaction(op, e))?;

        for c in collectors {
            tx.execute(&stmt, &[&c.name, &c.project.name, &as_of])
                .await
                .map_err(|e| StoreError::transaction(op, e))?;
        }
        tx.commit().await.map_err(|e| StoreError::transaction(op, e))?;

        tracing::debug!(count = collectors.len(), "Upserted collectors");
        Ok(collectors.len())
    }

    async fn upsert_bgp_dumps(
        &self,
        dumps: &[BgpDump],
        as_of: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let op = "upsert_bgp_dumps";
        let mut written = 0usize;
        let mut client = self.client().await?;

        for chunk in dumps.chunks(UPSERT_CHUNK_SIZE) {
            let tx = client
                .transaction()
                .await
                .map_err(|e| StoreError::transaction(op, e))?;
            let stmt = tx
                .prepare_cached(UPSERT_DUMP)
                .await
                .map_err(|e| StoreError::transaction(op, e))?;

            for dump in chunk {
                let kind = dump.kind.to_db();
                let secs = dump.duration.as_secs_f64();
                let ts = dump.time();
                let rows = tx
                    .execute(
                        &stmt,
                        &[&dump.collector.name, &dump.url, &kind, &secs, &ts, &as_of],
                    )
                    .await
                    .map_err(|e| StoreError::transaction(op, e))?;
                written += rows as usize;
            }
            tx.commit().await.map_err(|e| StoreError::transaction(op, e))?;
        }

        tracing::debug!(count = written, "Upserted BGP dumps");
        Ok(written)
    }

    async fn fetch_by_query(&self, query: &Query) -> Result<Vec<BgpDump>, StoreError> {
        if query.is_empty_window() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = query.collectors.iter().map(|c| c.name.clone()).collect();
        let kind = query.kind.to_db();

        let client = self.client().await?;
        let rows = client
            .query(SELECT_DUMPS, &[&names, &query.from, &query.until, &kind])
            .await
            .map_err(|e| StoreError::transaction("fetch_by_query", e))?;

        rows.iter().map(dump_from_row).collect()
    }

    async fn sync_states(
        &self,
        project: &Project,
        kind: DumpKind,
    ) -> Result<Vec<SyncState>, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query(SELECT_SYNC_STATES, &[&project.name, &kind.to_db()])
            .await
            .map_err(|e| StoreError::transaction("sync_states", e))?;

        rows.iter().map(state_from_row).collect()
    }

    async fn upsert_sync_states(&self, states: &[SyncState]) -> Result<usize, StoreError> {
        if states.is_empty() {
            return Ok(0);
        }
        let op = "upsert_sync_states";
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| StoreError::transaction(op, e))?;
        let stmt = tx
            .prepare_cached(UPSERT_SYNC_STATE)
            .await
            .map_err(|e| StoreError::transaction(op, e))?;

        for state in states {
            let latest: Option<DateTime<Utc>> = state
                .latest_dump
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
            tx.execute(
                &stmt,
                &[
                    &state.collector.name,
                    &state.kind.to_db(),
                    &state.last_completed_crawl,
                    &latest,
                ],
            )
            .await
            .map_err(|e| StoreError::transaction(op, e))?;
        }
        tx.commit().await.map_err(|e| StoreError::transaction(op, e))?;
        Ok(states.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> DatabaseConfig {
        DatabaseConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 1,
            user: Some("bgpfinder".to_string()),
            password: Some("secret".to_string()),
            dbname: Some("bgpfinder".to_string()),
            pool_size: 2,
        }
    }

    #[test]
    fn test_pool_is_built_lazily() {
        let store = PostgresStore::new(&unreachable_config()).unwrap();
        assert_eq!(store.pool_usage(), (0, 2));
    }

    #[tokio::test]
    async fn test_connect_refused_is_pool_error() {
        let err = PostgresStore::connect(&unreachable_config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Pool(_)));
    }

    #[test]
    fn test_schema_declares_every_table() {
        for table in ["collectors", "bgp_dumps", "collector_sync_state"] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
        assert!(UPSERT_DUMP.contains("ON CONFLICT (collector_name, url)"));
        assert!(!UPSERT_DUMP.contains("first_fetch_timestamp = EXCLUDED"));
    }
}
