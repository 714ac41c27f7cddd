/// Separator used by relative path hints.
pub const PATH_SEPARATOR: char = '/';

/// Fallback MIME type for payloads without a declared type.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A file selected by the user, held in memory together with its relative
/// path hint (e.g. `docs/sub/b.txt` for a folder selection).
#[derive(Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Relative path hint; equals `name` for single-file selections.
    pub path: String,
    /// Final path segment.
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// File contents.
    pub data: Vec<u8>,
}

impl LocalFile {
    /// Build a file from its path hint. The name is the last non-empty segment.
    pub fn new(path: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let path = path.into();
        let name = path
            .rsplit(PATH_SEPARATOR)
            .find(|segment| !segment.is_empty())
            .unwrap_or_default()
            .to_string();
        let mime_type = mime_type.into();
        Self {
            path,
            name,
            mime_type: if mime_type.is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                mime_type
            },
            data,
        }
    }

    /// Path segments, skipping empty ones produced by leading or doubled separators.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path
            .split(PATH_SEPARATOR)
            .filter(|segment| !segment.is_empty())
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

impl std::fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFile")
            .field("path", &self.path)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_last_segment() {
        let file = LocalFile::new("docs/sub/b.txt", "text/plain", b"b".to_vec());
        assert_eq!(file.name, "b.txt");
        assert_eq!(file.segments().collect::<Vec<_>>(), ["docs", "sub", "b.txt"]);
        assert_eq!(file.size_bytes(), 1);
    }

    #[test]
    fn empty_mime_falls_back_to_octet_stream() {
        let file = LocalFile::new("notes", "", Vec::new());
        assert_eq!(file.name, "notes");
        assert_eq!(file.mime_type, DEFAULT_MIME_TYPE);
    }
}
