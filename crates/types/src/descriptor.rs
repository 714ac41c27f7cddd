//! Descriptor records handed back to callers of the transfer surface.

use crate::{ContentId, LocalFile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Errors emitted when mutating a descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor already bound to {existing}, refusing {attempted}")]
    CidAlreadyAssigned {
        existing: ContentId,
        attempted: ContentId,
    },
}

/// Process-local identifier assigned when a descriptor is created, before any
/// content id exists.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    pub fn generate() -> Self {
        LocalId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Single directory entry reported by a store listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub cid: ContentId,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Metadata describing an uploaded (or attempted) file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Content id, absent until the store accepted the payload.
    cid: Option<ContentId>,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
    pub local_id: LocalId,
}

impl FileDescriptor {
    /// Describe `file` before it has been stored.
    pub fn pending(file: &LocalFile) -> Self {
        Self::with_fields(
            file.name.clone(),
            file.mime_type.clone(),
            file.size_bytes(),
        )
    }

    /// Describe a payload by its declared fields.
    pub fn with_fields(name: String, mime_type: String, size_bytes: u64) -> Self {
        Self {
            cid: None,
            name,
            mime_type,
            size_bytes,
            created_at_ms: now_ms(),
            secret: None,
            local_id: LocalId::generate(),
        }
    }

    /// Resurrect a descriptor from a store listing.
    pub fn from_entry(entry: EntryMetadata) -> Self {
        let mut descriptor = Self::with_fields(entry.name, entry.mime_type, entry.size_bytes);
        descriptor.cid = Some(entry.cid);
        descriptor
    }

    pub fn cid(&self) -> Option<&ContentId> {
        self.cid.as_ref()
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// Bind the content id. Binding is write-once: re-binding the same id is a
    /// no-op, a different id is rejected.
    pub fn assign_cid(&mut self, cid: ContentId) -> Result<(), DescriptorError> {
        match &self.cid {
            Some(existing) if *existing == cid => Ok(()),
            Some(existing) => Err(DescriptorError::CidAlreadyAssigned {
                existing: existing.clone(),
                attempted: cid,
            }),
            None => {
                self.cid = Some(cid);
                Ok(())
            }
        }
    }

    /// Attach a share secret. Descriptors without a content id never carry one.
    pub fn set_secret(&mut self, secret: impl Into<String>) {
        if self.cid.is_some() {
            self.secret = Some(secret.into());
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
