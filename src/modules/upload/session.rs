use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MAX_CHUNKS: u32 = 100_000;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload session {0} not found or expired")]
    NotFound(Uuid),

    #[error("chunk index {index} is out of range (0..{total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("upload is incomplete, missing chunks: {0:?}")]
    Incomplete(Vec<u32>),

    #[error("invalid upload: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
struct UploadSession {
    owner_id: Uuid,
    asset_id: Uuid,
    filename: String,
    content_type: Option<String>,
    duration: Option<f64>,
    total_chunks: u32,
    received: BTreeSet<u32>,
    last_activity: Instant,
}

impl UploadSession {
    fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received.contains(i))
            .collect()
    }
}

pub struct NewUpload {
    pub owner_id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub duration: Option<f64>,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct OpenedUpload {
    pub upload_id: Uuid,
    pub asset_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProgress {
    pub received: u32,
    pub total: u32,
}

/// A fully assembled upload, ready to be handed to the transcoder.
#[derive(Debug, Clone)]
pub struct AssembledUpload {
    pub asset_id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub duration: Option<f64>,
    pub path: PathBuf,
}

/// In-flight chunked uploads. Chunks are staged on disk; sessions idle for
/// longer than the TTL are evicted together with their staged chunks.
#[derive(Clone)]
pub struct UploadSessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, UploadSession>>>,
    staging_dir: PathBuf,
    ttl: Duration,
}

impl UploadSessionStore {
    pub fn new(staging_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            staging_dir: staging_dir.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn open(&self, req: NewUpload) -> Result<OpenedUpload, UploadError> {
        let filename = sanitize_filename(&req.filename)
            .ok_or_else(|| UploadError::Invalid(format!("unusable filename '{}'", req.filename)))?;
        if req.total_chunks == 0 || req.total_chunks > MAX_CHUNKS {
            return Err(UploadError::Invalid(format!(
                "total_chunks must be between 1 and {}",
                MAX_CHUNKS
            )));
        }

        let upload_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();
        tokio::fs::create_dir_all(self.session_dir(upload_id)).await?;

        let session = UploadSession {
            owner_id: req.owner_id,
            asset_id,
            filename,
            content_type: req.content_type,
            duration: req.duration,
            total_chunks: req.total_chunks,
            received: BTreeSet::new(),
            last_activity: Instant::now(),
        };
        self.lock().insert(upload_id, session);

        info!("📤 Upload {} opened for asset {} ({} chunks)", upload_id, asset_id, req.total_chunks);
        Ok(OpenedUpload { upload_id, asset_id })
    }

    /// Stores one chunk. Re-sending a chunk overwrites it.
    pub async fn write_chunk(
        &self,
        upload_id: Uuid,
        index: u32,
        data: &[u8],
    ) -> Result<ChunkProgress, UploadError> {
        {
            let mut sessions = self.lock();
            let session = sessions
                .get_mut(&upload_id)
                .ok_or(UploadError::NotFound(upload_id))?;
            if index >= session.total_chunks {
                return Err(UploadError::ChunkOutOfRange {
                    index,
                    total: session.total_chunks,
                });
            }
            session.last_activity = Instant::now();
        }

        tokio::fs::write(self.chunk_path(upload_id, index), data).await?;

        let mut sessions = self.lock();
        let session = sessions
            .get_mut(&upload_id)
            .ok_or(UploadError::NotFound(upload_id))?;
        session.received.insert(index);
        session.last_activity = Instant::now();
        debug!("chunk {}/{} of upload {} stored", index + 1, session.total_chunks, upload_id);

        Ok(ChunkProgress {
            received: session.received.len() as u32,
            total: session.total_chunks,
        })
    }

    /// Concatenates the staged chunks in order into
    /// `media_dir/<owner>/<asset>-<filename>` and closes the session.
    pub async fn assemble(&self, upload_id: Uuid, media_dir: &Path) -> Result<AssembledUpload, UploadError> {
        let session = {
            let mut sessions = self.lock();
            let session = sessions
                .get(&upload_id)
                .ok_or(UploadError::NotFound(upload_id))?;
            let missing = session.missing();
            if !missing.is_empty() {
                return Err(UploadError::Incomplete(missing));
            }
            sessions
                .remove(&upload_id)
                .ok_or(UploadError::NotFound(upload_id))?
        };

        let owner_dir = media_dir.join(session.owner_id.to_string());
        let path = owner_dir.join(format!("{}-{}", session.asset_id, session.filename));

        // The session is already closed, so a failed assembly cleans up after itself.
        let size_bytes = match self.concat_chunks(upload_id, session.total_chunks, &path).await {
            Ok(size_bytes) => size_bytes,
            Err(e) => {
                warn!("Assembly of upload {} failed: {}", upload_id, e);
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not remove partial upload {}: {}", path.display(), rm);
                    }
                }
                self.remove_staging(upload_id).await;
                return Err(e.into());
            }
        };

        self.remove_staging(upload_id).await;
        info!("📦 Upload {} assembled into {} ({} bytes)", upload_id, path.display(), size_bytes);

        Ok(AssembledUpload {
            asset_id: session.asset_id,
            owner_id: session.owner_id,
            filename: session.filename,
            content_type: session.content_type,
            duration: session.duration,
            path,
        })
    }

    async fn concat_chunks(&self, upload_id: Uuid, total_chunks: u32, path: &Path) -> std::io::Result<u64> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(path).await?;
        let mut size_bytes = 0u64;
        for index in 0..total_chunks {
            let mut part = tokio::fs::File::open(self.chunk_path(upload_id, index)).await?;
            size_bytes += tokio::io::copy(&mut part, &mut out).await?;
        }
        out.flush().await?;
        Ok(size_bytes)
    }

    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    async fn purge_expired_at(&self, now: Instant) -> usize {
        let expired: Vec<Uuid> = {
            let mut sessions = self.lock();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, s)| now.saturating_duration_since(s.last_activity) > self.ttl)
                .map(|(id, _)| *id)
                .collect();
            for id in &ids {
                sessions.remove(id);
            }
            ids
        };

        for id in &expired {
            self.remove_staging(*id).await;
        }
        if !expired.is_empty() {
            info!("🧹 Evicted {} idle upload session(s)", expired.len());
        }
        expired.len()
    }

    pub fn active_sessions(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, UploadSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session_dir(&self, upload_id: Uuid) -> PathBuf {
        self.staging_dir.join(upload_id.to_string())
    }

    fn chunk_path(&self, upload_id: Uuid, index: u32) -> PathBuf {
        self.session_dir(upload_id).join(format!("{:06}.part", index))
    }

    async fn remove_staging(&self, upload_id: Uuid) {
        let dir = self.session_dir(upload_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove staging dir {}: {}", dir.display(), e);
            }
        }
    }
}

/// Keeps only the final path component and replaces anything outside
/// `[A-Za-z0-9._-]` with `_`.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = Path::new(raw.trim()).file_name()?.to_string_lossy().into_owned();
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_upload(owner: Uuid, chunks: u32) -> NewUpload {
        NewUpload {
            owner_id: owner,
            filename: "Spring Promo.mov".into(),
            content_type: Some("video/quicktime".into()),
            duration: None,
            total_chunks: chunks,
        }
    }

    #[tokio::test]
    async fn chunks_are_assembled_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::new(dir.path().join("staging"), Duration::from_secs(60));
        let owner = Uuid::new_v4();
        let opened = store.open(new_upload(owner, 3)).await.unwrap();

        store.write_chunk(opened.upload_id, 2, b"baz").await.unwrap();
        store.write_chunk(opened.upload_id, 0, b"foo").await.unwrap();
        let progress = store.write_chunk(opened.upload_id, 1, b"bar").await.unwrap();
        assert_eq!(progress, ChunkProgress { received: 3, total: 3 });

        let media = dir.path().join("media");
        let done = store.assemble(opened.upload_id, &media).await.unwrap();

        assert_eq!(done.asset_id, opened.asset_id);
        assert_eq!(done.filename, "Spring_Promo.mov");
        assert!(done.path.starts_with(media.join(owner.to_string())));
        assert_eq!(std::fs::read(&done.path).unwrap(), b"foobarbaz");
        assert!(!dir.path().join("staging").join(opened.upload_id.to_string()).exists());
        assert_eq!(store.active_sessions(), 0);
    }

    #[tokio::test]
    async fn incomplete_upload_reports_missing_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::new(dir.path(), Duration::from_secs(60));
        let opened = store.open(new_upload(Uuid::new_v4(), 4)).await.unwrap();
        store.write_chunk(opened.upload_id, 1, b"x").await.unwrap();

        match store.assemble(opened.upload_id, dir.path()).await {
            Err(UploadError::Incomplete(missing)) => assert_eq!(missing, vec![0, 2, 3]),
            other => panic!("unexpected: {other:?}"),
        }
        // The session survives so the client can fill the gaps.
        assert_eq!(store.active_sessions(), 1);
    }

    #[tokio::test]
    async fn failed_assembly_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let store = UploadSessionStore::new(&staging, Duration::from_secs(60));
        let owner = Uuid::new_v4();
        let opened = store.open(new_upload(owner, 2)).await.unwrap();
        store.write_chunk(opened.upload_id, 0, b"foo").await.unwrap();
        store.write_chunk(opened.upload_id, 1, b"bar").await.unwrap();
        std::fs::remove_file(store.chunk_path(opened.upload_id, 1)).unwrap();

        let media = dir.path().join("media");
        let err = store.assemble(opened.upload_id, &media).await.unwrap_err();
        assert!(matches!(err, UploadError::Io(_)));

        assert_eq!(store.active_sessions(), 0);
        assert!(!staging.join(opened.upload_id.to_string()).exists());
        let owner_dir = media.join(owner.to_string());
        let leftovers: Vec<_> = std::fs::read_dir(&owner_dir).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_chunk_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::new(dir.path(), Duration::from_secs(60));
        let opened = store.open(new_upload(Uuid::new_v4(), 2)).await.unwrap();

        let err = store.write_chunk(opened.upload_id, 2, b"x").await.unwrap_err();
        assert!(matches!(err, UploadError::ChunkOutOfRange { index: 2, total: 2 }));
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_with_their_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::new(dir.path(), Duration::from_secs(30));
        let opened = store.open(new_upload(Uuid::new_v4(), 2)).await.unwrap();
        store.write_chunk(opened.upload_id, 0, b"x").await.unwrap();

        assert_eq!(store.purge_expired().await, 0);
        let later = Instant::now() + Duration::from_secs(31);
        assert_eq!(store.purge_expired_at(later).await, 1);

        assert!(!dir.path().join(opened.upload_id.to_string()).exists());
        let err = store.write_chunk(opened.upload_id, 1, b"y").await.unwrap_err();
        assert!(matches!(err, UploadError::NotFound(_)));
    }

    #[tokio::test]
    async fn zero_chunks_or_bad_names_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::new(dir.path(), Duration::from_secs(60));

        let err = store.open(new_upload(Uuid::new_v4(), 0)).await.unwrap_err();
        assert!(matches!(err, UploadError::Invalid(_)));

        let mut bad = new_upload(Uuid::new_v4(), 1);
        bad.filename = "..".into();
        assert!(matches!(store.open(bad).await.unwrap_err(), UploadError::Invalid(_)));
    }

    #[test]
    fn filenames_are_reduced_to_a_safe_basename() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("menu board (v2).mp4").as_deref(), Some("menu_board__v2_.mp4"));
        assert_eq!(sanitize_filename(".hidden.mp4").as_deref(), Some("hidden.mp4"));
        assert_eq!(sanitize_filename("   "), None);
    }
}
