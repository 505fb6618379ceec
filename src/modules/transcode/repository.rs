use super::model::{MediaStatus, ProcessingStatus};
use crate::common::error::{PipelineError, PipelineResult};
use crate::infrastructure::db::pool::DbPool;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

/// Durable per-asset status records.
///
/// `save` is an idempotent upsert that never moves a terminal record back to
/// a live state; only a fresh PENDING submission may replace it.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn save(&self, record: &MediaStatus) -> PipelineResult<()>;

    async fn load(&self, asset_id: Uuid) -> PipelineResult<Option<MediaStatus>>;

    /// Moves PROCESSING records started before `cutoff` to FAILED and returns
    /// them. `None` sweeps every owner.
    async fn fail_stuck(
        &self,
        owner_id: Option<Uuid>,
        cutoff: OffsetDateTime,
    ) -> PipelineResult<Vec<MediaStatus>>;
}

fn accepts_overwrite(existing: &MediaStatus, incoming: &MediaStatus) -> bool {
    !existing.status.is_terminal() || incoming.status == ProcessingStatus::Pending
}

#[derive(Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<Uuid, MediaStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn save(&self, record: &MediaStatus) -> PipelineResult<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        match records.get(&record.asset_id) {
            Some(existing) if !accepts_overwrite(existing, record) => {}
            _ => {
                records.insert(record.asset_id, record.clone());
            }
        }
        Ok(())
    }

    async fn load(&self, asset_id: Uuid) -> PipelineResult<Option<MediaStatus>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&asset_id).cloned())
    }

    async fn fail_stuck(
        &self,
        owner_id: Option<Uuid>,
        cutoff: OffsetDateTime,
    ) -> PipelineResult<Vec<MediaStatus>> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());

        let failed = records
            .values_mut()
            .filter(|r| r.status == ProcessingStatus::Processing)
            .filter(|r| owner_id.is_none_or(|owner| r.owner_id == owner))
            .filter(|r| r.started_at.unwrap_or(r.updated_at) < cutoff)
            .map(|r| {
                r.status = ProcessingStatus::Failed;
                r.eta_seconds = None;
                r.speed = None;
                r.updated_at = now;
                r.clone()
            })
            .collect();
        Ok(failed)
    }
}

#[derive(sqlx::FromRow)]
struct MediaStatusRow {
    asset_id: Uuid,
    owner_id: Uuid,
    filename: String,
    status: String,
    progress: f64,
    eta_seconds: Option<i64>,
    speed: Option<String>,
    started_at: Option<OffsetDateTime>,
    thumbnail_path: Option<String>,
    size_bytes: Option<i64>,
    duration: Option<f64>,
    updated_at: OffsetDateTime,
}

impl TryFrom<MediaStatusRow> for MediaStatus {
    type Error = PipelineError;

    fn try_from(row: MediaStatusRow) -> Result<Self, Self::Error> {
        Ok(MediaStatus {
            asset_id: row.asset_id,
            owner_id: row.owner_id,
            filename: row.filename,
            status: row.status.parse().map_err(PipelineError::Store)?,
            progress: row.progress,
            eta_seconds: row.eta_seconds,
            speed: row.speed,
            started_at: row.started_at,
            thumbnail_path: row.thumbnail_path,
            size_bytes: row.size_bytes,
            duration: row.duration,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "asset_id, owner_id, filename, status, progress, eta_seconds, speed, \
                       started_at, thumbnail_path, size_bytes, duration, updated_at";

pub struct PgStatusStore {
    pool: DbPool,
}

impl PgStatusStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn save(&self, record: &MediaStatus) -> PipelineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO media_processing (
                asset_id, owner_id, filename, status, progress, eta_seconds, speed,
                started_at, thumbnail_path, size_bytes, duration, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (asset_id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                filename = EXCLUDED.filename,
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                eta_seconds = EXCLUDED.eta_seconds,
                speed = EXCLUDED.speed,
                started_at = EXCLUDED.started_at,
                thumbnail_path = EXCLUDED.thumbnail_path,
                size_bytes = EXCLUDED.size_bytes,
                duration = EXCLUDED.duration,
                updated_at = EXCLUDED.updated_at
            WHERE media_processing.status NOT IN ('COMPLETED', 'FAILED')
               OR EXCLUDED.status = 'PENDING'
            "#,
        )
        .bind(record.asset_id)
        .bind(record.owner_id)
        .bind(&record.filename)
        .bind(record.status.as_str())
        .bind(record.progress)
        .bind(record.eta_seconds)
        .bind(&record.speed)
        .bind(record.started_at)
        .bind(&record.thumbnail_path)
        .bind(record.size_bytes)
        .bind(record.duration)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, asset_id: Uuid) -> PipelineResult<Option<MediaStatus>> {
        let row = sqlx::query_as::<_, MediaStatusRow>(&format!(
            "SELECT {COLUMNS} FROM media_processing WHERE asset_id = $1"
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MediaStatus::try_from).transpose()
    }

    async fn fail_stuck(
        &self,
        owner_id: Option<Uuid>,
        cutoff: OffsetDateTime,
    ) -> PipelineResult<Vec<MediaStatus>> {
        let rows = sqlx::query_as::<_, MediaStatusRow>(&format!(
            r#"
            UPDATE media_processing
            SET status = 'FAILED', eta_seconds = NULL, speed = NULL, updated_at = NOW()
            WHERE status = 'PROCESSING'
              AND COALESCE(started_at, updated_at) < $1
              AND ($2::uuid IS NULL OR owner_id = $2)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(cutoff)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MediaStatus::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn record(owner: Uuid, status: ProcessingStatus, started: Option<OffsetDateTime>) -> MediaStatus {
        MediaStatus {
            asset_id: Uuid::new_v4(),
            owner_id: owner,
            filename: "loop.mp4".into(),
            status,
            progress: 42.0,
            eta_seconds: Some(30),
            speed: Some("1.5x".into()),
            started_at: started,
            thumbnail_path: None,
            size_bytes: None,
            duration: Some(60.0),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn terminal_records_ignore_late_progress() {
        let store = MemoryStatusStore::new();
        let mut rec = record(Uuid::new_v4(), ProcessingStatus::Failed, None);
        store.save(&rec).await.unwrap();

        rec.status = ProcessingStatus::Processing;
        rec.progress = 80.0;
        store.save(&rec).await.unwrap();

        let stored = store.load(rec.asset_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Failed);
        assert_eq!(stored.progress, 42.0);
    }

    #[tokio::test]
    async fn resubmission_may_reset_a_terminal_record() {
        let store = MemoryStatusStore::new();
        let mut rec = record(Uuid::new_v4(), ProcessingStatus::Completed, None);
        store.save(&rec).await.unwrap();

        rec.status = ProcessingStatus::Pending;
        rec.progress = 0.0;
        store.save(&rec).await.unwrap();

        let stored = store.load(rec.asset_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Pending);
    }

    #[tokio::test]
    async fn sweep_fails_only_old_processing_records_of_the_owner() {
        let store = MemoryStatusStore::new();
        let owner = Uuid::new_v4();
        let long_ago = OffsetDateTime::now_utc() - Duration::hours(2);

        let stuck = record(owner, ProcessingStatus::Processing, Some(long_ago));
        let fresh = record(owner, ProcessingStatus::Processing, Some(OffsetDateTime::now_utc()));
        let other_owner = record(Uuid::new_v4(), ProcessingStatus::Processing, Some(long_ago));
        let done = record(owner, ProcessingStatus::Completed, Some(long_ago));
        for r in [&stuck, &fresh, &other_owner, &done] {
            store.save(r).await.unwrap();
        }

        let cutoff = OffsetDateTime::now_utc() - Duration::minutes(30);
        let failed = store.fail_stuck(Some(owner), cutoff).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].asset_id, stuck.asset_id);
        assert_eq!(failed[0].progress, 42.0);
        assert_eq!(failed[0].eta_seconds, None);

        assert!(store.fail_stuck(Some(owner), cutoff).await.unwrap().is_empty());

        let everyone = store.fail_stuck(None, cutoff).await.unwrap();
        assert_eq!(everyone.len(), 1);
        assert_eq!(everyone[0].asset_id, other_owner.asset_id);
    }

    #[tokio::test]
    async fn missing_records_load_as_none() {
        let store = MemoryStatusStore::new();
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }
}
