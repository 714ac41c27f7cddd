//! Content-addressed blob store.
//!
//! [`ContentStore`] owns a lazily established connection to a
//! [`ContentBackend`] and exposes store / retrieve / list on top of it.
//! Retrieval drains the backend's chunk stream through [`reassemble`].

pub mod kubo;
pub mod memory;
pub mod reassemble;
pub mod sled_backend;

pub use kubo::{KuboBackend, KuboConnector, DEFAULT_KUBO_API_URL};
pub use memory::{MemoryBackend, MemoryConnector};
pub use reassemble::reassemble;
pub use sled_backend::{SledBackend, SledConnector};

use async_trait::async_trait;
use futures::stream::BoxStream;
use sharex_types::{ContentId, EntryMetadata, FileDescriptor, LocalFile};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Default chunk size used when splitting payloads (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Errors raised by storage backends.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("content {0} not found")]
    NotFound(ContentId),
    #[error("chunk {index} of {cid} is missing")]
    MissingChunk { cid: ContentId, index: u32 },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid storage API response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by [`ContentStore`] operations.
#[derive(thiserror::Error, Debug)]
pub enum ContentStoreError {
    #[error("failed to connect to content backend: {0}")]
    Connect(#[source] BackendError),
    #[error("failed to store blob: {0}")]
    Store(#[source] BackendError),
    #[error("failed to retrieve {cid}: {source}")]
    Retrieve {
        cid: ContentId,
        #[source]
        source: BackendError,
    },
    #[error("failed to list {cid}: {source}")]
    List {
        cid: ContentId,
        #[source]
        source: BackendError,
    },
}

/// Ordered stream of payload chunks.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, BackendError>>;

/// Byte-addressable store reached through an established connection.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Submit a payload together with its declared name and type.
    async fn add(&self, file: &LocalFile) -> Result<ContentId, BackendError>;

    /// Open a chunked read stream for `cid`.
    async fn cat(&self, cid: &ContentId) -> Result<ChunkStream, BackendError>;

    /// Directory entries for `cid`, empty when the store knows nothing about it.
    async fn ls(&self, cid: &ContentId) -> Result<Vec<EntryMetadata>, BackendError>;
}

/// Establishes connections to a backend.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ContentBackend>, BackendError>;
}

/// Content store with a lazily established, memoized backend connection.
///
/// The first operation connects; later operations reuse the handle. A failed
/// connect is not remembered, so the next operation starts over.
pub struct ContentStore {
    connector: Box<dyn Connector>,
    backend: OnceCell<Arc<dyn ContentBackend>>,
}

impl ContentStore {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            backend: OnceCell::new(),
        }
    }

    /// Whether a connection has been established.
    pub fn is_connected(&self) -> bool {
        self.backend.initialized()
    }

    async fn backend(&self) -> Result<&Arc<dyn ContentBackend>, ContentStoreError> {
        self.backend
            .get_or_try_init(|| async {
                debug!("connecting to content backend");
                match self.connector.connect().await {
                    Ok(backend) => {
                        info!("content backend connected");
                        Ok(backend)
                    }
                    Err(err) => {
                        warn!("content backend connect failed: {err}");
                        Err(ContentStoreError::Connect(err))
                    }
                }
            })
            .await
    }

    /// Store `file` and return its content id.
    pub async fn store(&self, file: &LocalFile) -> Result<ContentId, ContentStoreError> {
        let backend = self.backend().await?;
        let cid = backend.add(file).await.map_err(|err| {
            warn!(name = %file.name, "store failed: {err}");
            ContentStoreError::Store(err)
        })?;
        info!(%cid, name = %file.name, size_bytes = file.size_bytes(), "blob stored");
        Ok(cid)
    }

    /// Retrieve the full payload for `cid`. Either the whole buffer or an error.
    pub async fn retrieve(&self, cid: &ContentId) -> Result<Vec<u8>, ContentStoreError> {
        let backend = self.backend().await?;
        let retrieve_err = |source| ContentStoreError::Retrieve {
            cid: cid.clone(),
            source,
        };
        let stream = backend.cat(cid).await.map_err(retrieve_err)?;
        let data = reassemble(stream).await.map_err(retrieve_err)?;
        debug!(%cid, size_bytes = data.len(), "blob retrieved");
        Ok(data)
    }

    /// Fetch the directory-entry metadata for `cid` without its content.
    pub async fn list(&self, cid: &ContentId) -> Result<Option<FileDescriptor>, ContentStoreError> {
        let backend = self.backend().await?;
        let entries = backend
            .ls(cid)
            .await
            .map_err(|source| ContentStoreError::List {
                cid: cid.clone(),
                source,
            })?;
        Ok(entries.into_iter().next().map(FileDescriptor::from_entry))
    }
}

/// Split `data` into chunks of at most `chunk_size` bytes.
pub(crate) fn split_chunks(data: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    data.chunks(chunk_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Connector that fails a configured number of times before delegating.
    struct FlakyConnector {
        failures_left: Mutex<usize>,
        attempts: Arc<AtomicUsize>,
        backend: Arc<MemoryBackend>,
    }

    impl FlakyConnector {
        fn new(failures: usize) -> (Self, Arc<AtomicUsize>) {
            let attempts = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    failures_left: Mutex::new(failures),
                    attempts: attempts.clone(),
                    backend: Arc::new(MemoryBackend::new(4)),
                },
                attempts,
            )
        }
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self) -> Result<Arc<dyn ContentBackend>, BackendError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let mut failures = self.failures_left.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(BackendError::Unavailable("node offline".into()));
            }
            Ok(self.backend.clone())
        }
    }

    fn sample_file() -> LocalFile {
        LocalFile::new("hello.txt", "text/plain", b"0123456789".to_vec())
    }

    #[tokio::test]
    async fn connect_is_memoized() {
        let (connector, attempts) = FlakyConnector::new(0);
        let store = ContentStore::new(connector);
        assert!(!store.is_connected());

        let cid = store.store(&sample_file()).await.expect("store");
        store.retrieve(&cid).await.expect("retrieve");
        store.list(&cid).await.expect("list");

        assert!(store.is_connected());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_connect_is_not_cached() {
        let (connector, attempts) = FlakyConnector::new(1);
        let store = ContentStore::new(connector);

        let err = store.store(&sample_file()).await.unwrap_err();
        assert!(matches!(err, ContentStoreError::Connect(_)));
        assert!(!store.is_connected());

        store.store(&sample_file()).await.expect("second attempt connects");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn store_then_retrieve_returns_original_bytes() {
        let store = ContentStore::new(MemoryConnector::new(3));
        let file = sample_file();

        let cid = store.store(&file).await.expect("store");
        let data = store.retrieve(&cid).await.expect("retrieve");
        assert_eq!(data, file.data);
        assert_eq!(data.len(), 10);
    }

    #[tokio::test]
    async fn list_reports_declared_metadata() {
        let store = ContentStore::new(MemoryConnector::default());
        let file = sample_file();
        let cid = store.store(&file).await.expect("store");

        let descriptor = store.list(&cid).await.expect("list").expect("entry");
        assert_eq!(descriptor.cid(), Some(&cid));
        assert_eq!(descriptor.name, "hello.txt");
        assert_eq!(descriptor.mime_type, "text/plain");
        assert_eq!(descriptor.size_bytes, 10);
    }

    #[tokio::test]
    async fn unknown_content_lists_nothing_and_fails_retrieval() {
        let store = ContentStore::new(MemoryConnector::default());
        let missing = ContentId::from_data(b"never stored");

        assert!(store.list(&missing).await.expect("list").is_none());
        let err = store.retrieve(&missing).await.unwrap_err();
        assert!(matches!(
            err,
            ContentStoreError::Retrieve {
                source: BackendError::NotFound(_),
                ..
            }
        ));
    }

    #[test]
    fn split_chunks_covers_payload() {
        let data = [1u8; 10];
        let sizes: Vec<usize> = split_chunks(&data, 4).map(<[u8]>::len).collect();
        assert_eq!(sizes, [4, 4, 2]);
        assert_eq!(split_chunks(&[], 4).count(), 0);
    }
}
