use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio::sync::watch;

use crate::journal::JournalFilter;
use crate::{
    EventStoreError, PersistedEvent, Result, Sequence, StreamId, Version,
    store::{EventStore, validate_append},
};

/// Advisory lock key taken by every append transaction.
///
/// BIGSERIAL values are handed out before commit, so two concurrent appends
/// could commit out of sequence order and a journal reader positioned past
/// the later sequence would never see the earlier one. Serializing appends
/// makes commit order equal sequence order.
const APPEND_LOCK_KEY: i64 = 0x6576_656e_745f_6a6e;

const SELECT_COLUMNS: &str = "stream_type, stream_id, version, sequence, created_at, body";

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    notifier: Arc<watch::Sender<Sequence>>,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        let (notifier, _) = watch::channel(Sequence::start());
        Self {
            pool,
            notifier: Arc::new(notifier),
        }
    }

    /// Connects a pool to `database_url` and wraps it.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<PersistedEvent> {
        Ok(PersistedEvent {
            stream_type: row.try_get("stream_type")?,
            stream_id: StreamId::new(row.try_get::<String, _>("stream_id")?),
            version: Version::new(row.try_get("version")?),
            sequence: Sequence::new(row.try_get("sequence")?),
            created_at: row.try_get("created_at")?,
            body: row.try_get("body")?,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, bodies), fields(count = bodies.len()))]
    async fn persist_events(
        &self,
        stream_type: &str,
        stream_id: &StreamId,
        expected_version: Version,
        bodies: Vec<Vec<u8>>,
    ) -> Result<Version> {
        validate_append(stream_type, stream_id, expected_version)?;
        if bodies.is_empty() {
            return Ok(expected_version);
        }

        // Start a transaction
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let current_version: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM event_journal WHERE stream_type = $1 AND stream_id = $2",
        )
        .bind(stream_type)
        .bind(stream_id.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let actual = Version::new(current_version.unwrap_or(0));
        if actual != expected_version {
            metrics::counter!("event_store_version_conflicts_total").increment(1);
            return Err(EventStoreError::VersionConflict {
                stream_type: stream_type.to_string(),
                stream_id: stream_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let count = bodies.len();
        let mut last_sequence = Sequence::start();
        for (idx, body) in bodies.into_iter().enumerate() {
            let version = expected_version.advance(idx + 1);
            let sequence: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO event_journal (stream_type, stream_id, version, body)
                VALUES ($1, $2, $3, $4)
                RETURNING sequence
                "#,
            )
            .bind(stream_type)
            .bind(stream_id.as_str())
            .bind(version.as_i64())
            .bind(body)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                // A writer that bypassed the advisory lock claimed this version first
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_version")
                {
                    metrics::counter!("event_store_version_conflicts_total").increment(1);
                    return EventStoreError::VersionConflict {
                        stream_type: stream_type.to_string(),
                        stream_id: stream_id.clone(),
                        expected: expected_version,
                        actual: version,
                    };
                }
                EventStoreError::from(e)
            })?;
            last_sequence = Sequence::new(sequence);
        }

        tx.commit().await?;

        metrics::counter!("event_store_events_appended_total").increment(count as u64);
        self.notifier.send_if_modified(|known| {
            if last_sequence > *known {
                *known = last_sequence;
                true
            } else {
                false
            }
        });

        Ok(expected_version.advance(count))
    }

    async fn read_stream(
        &self,
        stream_type: &str,
        stream_id: &StreamId,
        from_version: Version,
    ) -> Result<Vec<PersistedEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM event_journal
            WHERE stream_type = $1 AND stream_id = $2 AND version > $3
            ORDER BY version ASC
            "#
        ))
        .bind(stream_type)
        .bind(stream_id.as_str())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_version(&self, stream_type: &str, stream_id: &StreamId) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM event_journal WHERE stream_type = $1 AND stream_id = $2",
        )
        .bind(stream_type)
        .bind(stream_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(version.map(Version::new).unwrap_or_default())
    }

    async fn read_journal_page(
        &self,
        filter: &JournalFilter,
        after: Sequence,
        limit: usize,
    ) -> Result<Vec<PersistedEvent>> {
        let stream_types: Option<Vec<String>> = filter.selected().map(<[String]>::to_vec);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM event_journal
            WHERE sequence > $1 AND ($2::TEXT[] IS NULL OR stream_type = ANY($2))
            ORDER BY sequence ASC
            LIMIT $3
            "#
        ))
        .bind(after.as_i64())
        .bind(stream_types)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    fn changes(&self) -> watch::Receiver<Sequence> {
        self.notifier.subscribe()
    }
}
