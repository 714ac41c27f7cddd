//! Upload / download façade over the content store and the archive builder.
//!
//! Uploads never fail outright: the outcome always carries a descriptor, and
//! any failure is reported next to it with the descriptor's content id left
//! unset.

use sharex_files::{archive_folder, ArchiveError, ARCHIVE_MIME_TYPE};
use sharex_storage::{ContentStore, ContentStoreError};
use sharex_types::{ContentId, DescriptorError, FileDescriptor, LocalFile};
use tracing::{info, warn};

#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    #[error("failed to archive folder: {0}")]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Store(#[from] ContentStoreError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// A user selection to upload.
#[derive(Debug, Clone)]
pub enum UploadInput {
    File(LocalFile),
    /// Files of one folder, each carrying its relative path hint.
    Folder(Vec<LocalFile>),
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub error: Option<TransferError>,
    pub descriptor: FileDescriptor,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn cid(&self) -> Option<&ContentId> {
        self.descriptor.cid()
    }

    fn failed(descriptor: FileDescriptor, error: TransferError) -> Self {
        Self {
            error: Some(error),
            descriptor,
        }
    }
}

pub struct TransferService {
    store: ContentStore,
}

impl TransferService {
    pub fn new(store: ContentStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub async fn upload(&self, input: UploadInput) -> UploadOutcome {
        self.upload_with_secret(input, None).await
    }

    /// Upload `input`, recording `secret` on the descriptor when the store
    /// accepted the payload.
    pub async fn upload_with_secret(
        &self,
        input: UploadInput,
        secret: Option<String>,
    ) -> UploadOutcome {
        let blob = match input {
            UploadInput::File(file) => file,
            UploadInput::Folder(files) => {
                let root = root_segment(&files);
                match archive_folder(files) {
                    Ok(archive) => archive,
                    Err(err) => {
                        warn!(%root, "folder upload aborted: {err}");
                        let placeholder =
                            FileDescriptor::with_fields(root, ARCHIVE_MIME_TYPE.to_string(), 0);
                        return UploadOutcome::failed(placeholder, err.into());
                    }
                }
            }
        };

        let mut descriptor = FileDescriptor::pending(&blob);
        let cid = match self.store.store(&blob).await {
            Ok(cid) => cid,
            Err(err) => {
                warn!(name = %blob.name, "upload failed: {err}");
                return UploadOutcome::failed(descriptor, err.into());
            }
        };

        if let Err(err) = descriptor.assign_cid(cid) {
            return UploadOutcome::failed(descriptor, err.into());
        }
        if let Some(secret) = secret {
            descriptor.set_secret(secret);
        }
        info!(
            cid = ?descriptor.cid(),
            name = %descriptor.name,
            size_bytes = descriptor.size_bytes,
            "upload complete"
        );
        UploadOutcome {
            error: None,
            descriptor,
        }
    }

    pub async fn download(&self, cid: &ContentId) -> Result<Vec<u8>, TransferError> {
        Ok(self.store.retrieve(cid).await?)
    }

    pub async fn metadata(&self, cid: &ContentId) -> Result<Option<FileDescriptor>, TransferError> {
        Ok(self.store.list(cid).await?)
    }
}

/// Root folder name of a selection, taken from the first file. Empty when
/// nothing was selected.
fn root_segment(files: &[LocalFile]) -> String {
    files
        .first()
        .and_then(|file| file.segments().next())
        .unwrap_or_default()
        .to_string()
}

/// Public gateway URL for a stored descriptor.
pub fn gateway_link(descriptor: &FileDescriptor, base: &str) -> Option<String> {
    descriptor
        .cid()
        .map(|cid| format!("{}/ipfs/{cid}", base.trim_end_matches('/')))
}
