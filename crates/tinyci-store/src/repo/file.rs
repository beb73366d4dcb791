//! File system implementation of BuildRepo.
//!
//! Layout under the store root:
//!
//! ```text
//! index.jsonl          one BuildSummary per line, in creation order
//! {id}/meta.json       latest metadata of the build
//! {id}/build.log       append-only log output
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tinyci_core::{Build, BuildId, BuildStatus, BuildSummary, LogFile, LogSlice};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::locks::PathLocks;
use crate::repo::BuildRepo;
use crate::{StoreError, StoreResult};

/// Persisted form of a build's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: BuildId,
    pub commit_sha: String,
    pub repo_url: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Build> for BuildRecord {
    fn from(build: &Build) -> Self {
        Self {
            id: build.id(),
            commit_sha: build.commit_sha().to_string(),
            repo_url: build.repo_url().to_string(),
            repo_owner: build.repo_owner().to_string(),
            repo_name: build.repo_name().to_string(),
            status: build.status(),
            created_at: build.created_at(),
            started_at: build.started_at(),
            finished_at: build.finished_at(),
        }
    }
}

impl BuildRecord {
    pub fn into_build(self) -> Build {
        Build::rehydrate(
            self.id,
            self.commit_sha,
            self.repo_url,
            self.repo_owner,
            self.repo_name,
            self.status,
            self.created_at,
            self.started_at,
            self.finished_at,
        )
    }
}

/// Build store backed by plain files.
pub struct FileBuildRepo {
    root: PathBuf,
    index_path: PathBuf,
    max_slice_bytes: usize,
    locks: PathLocks,
}

impl FileBuildRepo {
    pub const INDEX_FILE: &'static str = "index.jsonl";
    pub const META_FILE: &'static str = "meta.json";
    pub const LOG_FILE: &'static str = "build.log";
    pub const DEFAULT_MAX_SLICE_BYTES: usize = 64 * 1024;

    /// Open a store rooted at `root`, creating the directory and an empty
    /// index if they do not exist yet.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(StoreError::io(&root))?;
        let root = fs::canonicalize(&root)
            .await
            .map_err(StoreError::io(&root))?;

        let index_path = root.join(Self::INDEX_FILE);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .await
            .map_err(StoreError::io(&index_path))?;
        Self::trim_torn_tail(&index_path).await?;

        debug!(root = %root.display(), "Opened build store");

        Ok(Self {
            root,
            index_path,
            max_slice_bytes: Self::DEFAULT_MAX_SLICE_BYTES,
            locks: PathLocks::new(),
        })
    }

    /// Limit the number of bytes returned by a single log slice.
    pub fn with_max_slice_bytes(mut self, max_slice_bytes: usize) -> Self {
        self.max_slice_bytes = max_slice_bytes.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn build_dir(&self, id: BuildId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Replace `path` with `bytes` so that readers see either the old or the
    /// new content, never a mix. The caller holds the lock for `path`.
    async fn atomic_write_locked(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let mut file = File::create(&tmp).await.map_err(StoreError::io(&tmp))?;
        file.write_all(bytes).await.map_err(StoreError::io(&tmp))?;
        file.sync_all().await.map_err(StoreError::io(&tmp))?;
        drop(file);

        fs::rename(&tmp, path).await.map_err(StoreError::io(path))?;
        Ok(())
    }

    async fn append_line(&self, path: &Path, line: &str) -> StoreResult<()> {
        let _guard = self.locks.lock(path).await;
        Self::append_line_locked(path, line).await
    }

    /// Append an entry to the index. A partial entry left by an interrupted
    /// append is cut off first so it never merges with the new one.
    async fn append_index_entry(&self, entry: &str) -> StoreResult<()> {
        let _guard = self.locks.lock(&self.index_path).await;
        Self::trim_torn_tail(&self.index_path).await?;
        Self::append_line_locked(&self.index_path, entry).await
    }

    /// Truncate `path` after its last newline if it does not end with one.
    async fn trim_torn_tail(path: &Path) -> StoreResult<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(StoreError::io(path))?;
        let len = file.metadata().await.map_err(StoreError::io(path))?.len();
        if len == 0 {
            return Ok(());
        }

        file.seek(SeekFrom::Start(len - 1))
            .await
            .map_err(StoreError::io(path))?;
        let last = file.read_u8().await.map_err(StoreError::io(path))?;
        if last == b'\n' {
            return Ok(());
        }

        let content = fs::read(path).await.map_err(StoreError::io(path))?;
        let keep = content
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        file.set_len(keep as u64)
            .await
            .map_err(StoreError::io(path))?;
        file.sync_all().await.map_err(StoreError::io(path))?;
        warn!(
            path = %path.display(),
            dropped_bytes = len - keep as u64,
            "Removed torn trailing entry"
        );
        Ok(())
    }

    async fn append_line_locked(path: &Path, line: &str) -> StoreResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(StoreError::io(path))?;

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())
            .await
            .map_err(StoreError::io(path))?;
        file.flush().await.map_err(StoreError::io(path))?;
        Ok(())
    }

    async fn is_dir(path: &Path) -> StoreResult<bool> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    async fn file_exists(path: &Path) -> StoreResult<bool> {
        fs::try_exists(path).await.map_err(StoreError::io(path))
    }
}

#[async_trait]
impl BuildRepo for FileBuildRepo {
    async fn save(&self, build: &Build) -> StoreResult<()> {
        let dir = self.build_dir(build.id());
        let meta_path = dir.join(Self::META_FILE);
        let json = serde_json::to_vec_pretty(&BuildRecord::from(build))?;

        match fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(StoreError::Io {
                    path: dir,
                    source: e,
                });
            }
        }

        // Holding the meta lock across the existence check makes "first save"
        // well defined when two writers race on a new build.
        let _guard = self.locks.lock(&meta_path).await;
        let is_new = !Self::file_exists(&meta_path).await?;
        self.atomic_write_locked(&meta_path, &json).await?;

        if is_new {
            let entry = serde_json::to_string(&build.summary())?;
            self.append_index_entry(&entry).await?;
            debug!(build_id = %build.id(), "Indexed new build");
        }

        Ok(())
    }

    async fn append_to_log(&self, id: BuildId, chunk: &str) -> StoreResult<bool> {
        let dir = self.build_dir(id);
        if !Self::is_dir(&dir).await? {
            warn!(build_id = %id, "Dropping log chunk for unknown build");
            return Ok(false);
        }

        self.append_line(&dir.join(Self::LOG_FILE), chunk).await?;
        Ok(true)
    }

    async fn list(&self) -> StoreResult<Vec<BuildSummary>> {
        let file = File::open(&self.index_path)
            .await
            .map_err(StoreError::io(&self.index_path))?;
        let mut lines = BufReader::new(file).lines();

        let mut builds = Vec::new();
        let mut torn: Option<(usize, serde_json::Error)> = None;
        let mut line_no = 0;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(StoreError::io(&self.index_path))?
        {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            // Only the last line may be torn by a crash mid-append.
            if let Some((line, err)) = torn.take() {
                return Err(StoreError::Corrupt {
                    path: self.index_path.clone(),
                    line,
                    message: err.to_string(),
                });
            }
            match serde_json::from_str::<BuildSummary>(&line) {
                Ok(entry) => builds.push(entry),
                Err(e) => torn = Some((line_no, e)),
            }
        }

        if let Some((line, err)) = torn {
            warn!(line, error = %err, "Ignoring torn trailing index entry");
        }

        Ok(builds)
    }

    async fn find_by_id(&self, id: BuildId) -> StoreResult<Option<Build>> {
        let meta_path = self.build_dir(id).join(Self::META_FILE);

        let bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    path: meta_path,
                    source: e,
                });
            }
        };

        let record: BuildRecord = serde_json::from_slice(&bytes)?;
        Ok(Some(record.into_build()))
    }

    async fn get_log(&self, id: BuildId) -> StoreResult<Option<LogFile>> {
        let dir = self.build_dir(id);
        if !Self::is_dir(&dir).await? {
            return Ok(None);
        }

        let log_path = dir.join(Self::LOG_FILE);
        match fs::read(&log_path).await {
            Ok(bytes) => Ok(Some(LogFile {
                content: String::from_utf8_lossy(&bytes).into_owned(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Some(LogFile::default())),
            Err(e) => Err(StoreError::Io {
                path: log_path,
                source: e,
            }),
        }
    }

    async fn get_log_slice(&self, id: BuildId, offset: u64) -> StoreResult<Option<LogSlice>> {
        let dir = self.build_dir(id);
        if !Self::is_dir(&dir).await? {
            return Ok(None);
        }

        let log_path = dir.join(Self::LOG_FILE);
        let mut file = match File::open(&log_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Some(LogSlice {
                    content: String::new(),
                    next_offset: 0,
                    end_reached: true,
                }));
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: log_path,
                    source: e,
                });
            }
        };

        let len = file
            .metadata()
            .await
            .map_err(StoreError::io(&log_path))?
            .len();
        if offset >= len {
            return Ok(Some(LogSlice {
                content: String::new(),
                next_offset: len,
                end_reached: true,
            }));
        }

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(StoreError::io(&log_path))?;
        let mut buf = Vec::with_capacity(self.max_slice_bytes.min((len - offset) as usize));
        (&mut file)
            .take(self.max_slice_bytes as u64)
            .read_to_end(&mut buf)
            .await
            .map_err(StoreError::io(&log_path))?;

        let mut keep = complete_utf8_len(&buf);
        if keep == 0 && !buf.is_empty() {
            // The window is narrower than the first character; widen it to
            // that character so paging still advances.
            let missing = utf8_width(buf[0]).saturating_sub(buf.len());
            (&mut file)
                .take(missing as u64)
                .read_to_end(&mut buf)
                .await
                .map_err(StoreError::io(&log_path))?;
            keep = complete_utf8_len(&buf);
        }
        let next_offset = offset + keep as u64;

        Ok(Some(LogSlice {
            content: String::from_utf8_lossy(&buf[..keep]).into_owned(),
            next_offset,
            end_reached: next_offset >= len,
        }))
    }
}

/// Length of `bytes` without a trailing, incomplete UTF-8 sequence.
///
/// Invalid bytes before the end count as complete; they are decoded lossily.
fn complete_utf8_len(bytes: &[u8]) -> usize {
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(_) => return bytes.len(),
            Err(e) => match e.error_len() {
                Some(invalid) => start += e.valid_up_to() + invalid,
                None => return start + e.valid_up_to(),
            },
        }
    }
}

/// Encoded length of the character starting with `lead`.
fn utf8_width(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}
