//! Sled-backed persistent content backend.

use crate::{split_chunks, BackendError, ChunkStream, Connector, ContentBackend, DEFAULT_CHUNK_SIZE};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sharex_types::{ContentId, EntryMetadata, LocalFile};
use sled::{Db, Tree};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Entry record kept in the `entries` tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    name: String,
    mime_type: String,
    size_bytes: u64,
    chunk_count: u32,
}

/// Persistent backend with two trees: `entries` (cid -> JSON entry) and
/// `chunks` (cid || big-endian chunk index -> bytes).
pub struct SledBackend {
    db: Db,
    entries: Tree,
    chunks: Tree,
    chunk_size: usize,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize) -> Result<Self, BackendError> {
        let db = sled::open(path)?;
        let entries = db.open_tree("entries")?;
        let chunks = db.open_tree("chunks")?;
        Ok(Self {
            db,
            entries,
            chunks,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn flush(&self) -> Result<(), BackendError> {
        self.db.flush()?;
        Ok(())
    }

    fn entry(&self, cid: &ContentId) -> Result<Option<StoredEntry>, BackendError> {
        self.entries
            .get(cid.as_bytes())?
            .map(|value| serde_json::from_slice(&value))
            .transpose()
            .map_err(Into::into)
    }
}

fn chunk_key(cid: &ContentId, index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(cid.as_bytes().len() + 4);
    key.extend_from_slice(cid.as_bytes());
    key.extend_from_slice(&index.to_be_bytes());
    key
}

#[async_trait]
impl ContentBackend for SledBackend {
    async fn add(&self, file: &LocalFile) -> Result<ContentId, BackendError> {
        let cid = ContentId::from_data(&file.data);
        let entry = StoredEntry {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.size_bytes(),
            chunk_count: 0,
        };
        let data = file.data.clone();
        let (db, entries, chunks) = (self.db.clone(), self.entries.clone(), self.chunks.clone());
        let chunk_size = self.chunk_size;
        let key = cid.clone();

        // sled inserts and flushes block on disk I/O.
        tokio::task::spawn_blocking(move || -> Result<(), BackendError> {
            let mut entry = entry;
            for (index, chunk) in split_chunks(&data, chunk_size).enumerate() {
                chunks.insert(chunk_key(&key, index as u32), chunk)?;
                entry.chunk_count += 1;
            }
            // Written last so a reader never sees an entry whose chunks are incomplete.
            entries.insert(key.as_bytes(), serde_json::to_vec(&entry)?)?;
            db.flush()?;
            Ok(())
        })
        .await??;
        Ok(cid)
    }

    async fn cat(&self, cid: &ContentId) -> Result<ChunkStream, BackendError> {
        let entry = self
            .entry(cid)?
            .ok_or_else(|| BackendError::NotFound(cid.clone()))?;

        let chunks = self.chunks.clone();
        let cid = cid.clone();
        Ok(stream::iter(0..entry.chunk_count)
            .map(move |index| match chunks.get(chunk_key(&cid, index)) {
                Ok(Some(chunk)) => Ok(chunk.to_vec()),
                Ok(None) => Err(BackendError::MissingChunk {
                    cid: cid.clone(),
                    index,
                }),
                Err(err) => Err(err.into()),
            })
            .boxed())
    }

    async fn ls(&self, cid: &ContentId) -> Result<Vec<EntryMetadata>, BackendError> {
        Ok(self
            .entry(cid)?
            .map(|entry| {
                vec![EntryMetadata {
                    cid: cid.clone(),
                    name: entry.name,
                    mime_type: entry.mime_type,
                    size_bytes: entry.size_bytes,
                }]
            })
            .unwrap_or_default())
    }
}

/// Opens a [`SledBackend`] at a fixed path on connect.
#[derive(Debug, Clone)]
pub struct SledConnector {
    path: PathBuf,
    chunk_size: usize,
}

impl SledConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

#[async_trait]
impl Connector for SledConnector {
    async fn connect(&self) -> Result<Arc<dyn ContentBackend>, BackendError> {
        let backend = SledBackend::open(&self.path, self.chunk_size)?;
        info!(path = %self.path.display(), "sled content backend opened");
        Ok(Arc::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentStore, ContentStoreError};
    use tempfile::tempdir;

    #[tokio::test]
    async fn content_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let file = LocalFile::new("notes.md", "text/markdown", b"# persisted\n".repeat(50));

        let cid = {
            let backend = SledBackend::open(dir.path(), 64).expect("open");
            let cid = backend.add(&file).await.expect("add");
            backend.flush().expect("flush");
            cid
        };

        let store = ContentStore::new(SledConnector::new(dir.path()).with_chunk_size(64));
        assert_eq!(store.retrieve(&cid).await.expect("retrieve"), file.data);
        let descriptor = store.list(&cid).await.expect("list").expect("entry");
        assert_eq!(descriptor.name, "notes.md");
        assert_eq!(descriptor.size_bytes, file.size_bytes());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_adds_are_all_persisted() {
        let dir = tempdir().expect("tempdir");
        let backend = Arc::new(SledBackend::open(dir.path(), 16).expect("open"));

        let tasks: Vec<_> = (0..8u8)
            .map(|n| {
                let backend = backend.clone();
                tokio::spawn(async move {
                    let file = LocalFile::new(format!("{n}.bin"), "", vec![n; 100]);
                    backend.add(&file).await.map(|cid| (cid, file.data))
                })
            })
            .collect();

        let mut stored = Vec::new();
        for task in tasks {
            stored.push(task.await.expect("join").expect("add"));
        }
        drop(backend);

        let reopened = SledBackend::open(dir.path(), 16).expect("reopen");
        for (cid, data) in stored {
            let stream = reopened.cat(&cid).await.expect("cat");
            assert_eq!(crate::reassemble(stream).await.expect("reassemble"), data);
        }
    }

    #[tokio::test]
    async fn missing_chunk_fails_the_whole_retrieval() {
        let dir = tempdir().expect("tempdir");
        let backend = SledBackend::open(dir.path(), 4).expect("open");
        let file = LocalFile::new("a.bin", "", (0u8..16).collect());
        let cid = backend.add(&file).await.expect("add");

        backend
            .chunks
            .remove(chunk_key(&cid, 2))
            .expect("remove chunk");

        let stream = backend.cat(&cid).await.expect("cat");
        let result = crate::reassemble(stream).await;
        assert!(matches!(
            result,
            Err(BackendError::MissingChunk { index: 2, .. })
        ));
    }

    #[tokio::test]
    async fn connect_fails_when_path_is_a_file() {
        let dir = tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a database").expect("write");

        let store = ContentStore::new(SledConnector::new(blocker.join("db")));
        let err = store
            .retrieve(&ContentId::from_data(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentStoreError::Connect(_)));
    }
}
