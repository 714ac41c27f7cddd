use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Multibase-style prefix marking a BLAKE3-derived identifier.
const BLAKE3_PREFIX: &str = "b3";

/// Errors emitted when parsing content identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentIdError {
    #[error("content id must not be empty")]
    Empty,
    #[error("content id must not contain whitespace or '/'")]
    InvalidCharacter,
}

/// Opaque identifier returned by the content store for a stored payload.
///
/// Callers treat the value as an opaque key. Backends in this workspace derive
/// it from the BLAKE3 digest of the payload, so identical bytes always map to
/// the same identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Derive the identifier for `data`.
    pub fn from_data(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        ContentId(format!("{BLAKE3_PREFIX}{}", hex::encode(digest.as_bytes())))
    }

    /// Parse an identifier received from an external collaborator.
    pub fn parse(value: impl Into<String>) -> Result<Self, ContentIdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ContentIdError::Empty);
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ContentIdError::InvalidCharacter);
        }
        Ok(ContentId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentId::parse(s)
    }
}

impl From<ContentId> for String {
    fn from(value: ContentId) -> Self {
        value.0
    }
}

impl TryFrom<String> for ContentId {
    type Error = ContentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ContentId::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payloads_share_an_id() {
        let a = ContentId::from_data(b"hello world");
        let b = ContentId::from_data(b"hello world");
        let c = ContentId::from_data(b"hello world!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("b3"));
        assert_eq!(a.as_str().len(), 2 + 64);
    }

    #[test]
    fn parse_rejects_empty_and_paths() {
        assert_eq!(ContentId::parse("  "), Err(ContentIdError::Empty));
        assert_eq!(
            ContentId::parse("b3ab/cd"),
            Err(ContentIdError::InvalidCharacter)
        );
        let parsed: ContentId = "bafy123".parse().expect("opaque id");
        assert_eq!(parsed.to_string(), "bafy123");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ContentId::from_data(b"payload");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_str()));
        let restored: ContentId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, id);
    }
}
