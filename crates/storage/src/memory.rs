//! In-memory backend (for testing and ephemeral nodes).

use crate::{split_chunks, BackendError, ChunkStream, Connector, ContentBackend, DEFAULT_CHUNK_SIZE};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use sharex_types::{ContentId, EntryMetadata, LocalFile};
use std::collections::HashMap;
use std::sync::Arc;

struct StoredBlob {
    entry: EntryMetadata,
    chunks: Vec<Vec<u8>>,
}

/// In-memory content backend. Payloads are kept pre-split into chunks so
/// retrieval exercises the same streaming path as persistent backends.
pub struct MemoryBackend {
    chunk_size: usize,
    blobs: RwLock<HashMap<ContentId, Arc<StoredBlob>>>,
}

impl MemoryBackend {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of distinct payloads held.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

#[async_trait]
impl ContentBackend for MemoryBackend {
    async fn add(&self, file: &LocalFile) -> Result<ContentId, BackendError> {
        let cid = ContentId::from_data(&file.data);
        let blob = StoredBlob {
            entry: EntryMetadata {
                cid: cid.clone(),
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                size_bytes: file.size_bytes(),
            },
            chunks: split_chunks(&file.data, self.chunk_size)
                .map(<[u8]>::to_vec)
                .collect(),
        };
        self.blobs.write().insert(cid.clone(), Arc::new(blob));
        Ok(cid)
    }

    async fn cat(&self, cid: &ContentId) -> Result<ChunkStream, BackendError> {
        let blob = self
            .blobs
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(cid.clone()))?;
        let count = blob.chunks.len();
        Ok(stream::iter(0..count)
            .map(move |index| Ok(blob.chunks[index].clone()))
            .boxed())
    }

    async fn ls(&self, cid: &ContentId) -> Result<Vec<EntryMetadata>, BackendError> {
        Ok(self
            .blobs
            .read()
            .get(cid)
            .map(|blob| vec![blob.entry.clone()])
            .unwrap_or_default())
    }
}

/// Connector handing out one shared [`MemoryBackend`].
#[derive(Clone)]
pub struct MemoryConnector {
    backend: Arc<MemoryBackend>,
}

impl MemoryConnector {
    pub fn new(chunk_size: usize) -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new(chunk_size)))
    }

    pub fn with_backend(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> Arc<MemoryBackend> {
        self.backend.clone()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn ContentBackend>, BackendError> {
        Ok(self.backend.clone())
    }
}
