//! Folder selection -> tree -> single zip archive.
//!
//! A folder upload arrives as a flat list of files carrying relative path
//! hints. [`build_tree`] partitions that list into a [`FolderNode`] tree and
//! [`serialize`] writes every file back out at `root/.../name`, preserving
//! first-seen order so the same input always produces the same archive.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sharex_types::LocalFile;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// MIME type attached to produced archives.
pub const ARCHIVE_MIME_TYPE: &str = "application/zip";

/// Length of the random suffix appended to archive names.
pub const ARCHIVE_SUFFIX_LEN: usize = 32;

/// Archive builder errors.
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("cannot archive an empty file selection")]
    EmptyInput,
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One folder of the selection. Children are owned by their parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub name: String,
    pub files: Vec<LocalFile>,
    pub subfolders: Vec<FolderNode>,
}

impl FolderNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            subfolders: Vec::new(),
        }
    }

    /// Find the direct subfolder called `name`, creating it on first reference.
    fn subfolder_mut(&mut self, name: &str) -> &mut FolderNode {
        let index = match self.subfolders.iter().position(|folder| folder.name == name) {
            Some(index) => index,
            None => {
                self.subfolders.push(FolderNode::new(name));
                self.subfolders.len() - 1
            }
        };
        &mut self.subfolders[index]
    }

    /// Total number of files in this folder and below.
    pub fn file_count(&self) -> usize {
        self.files.len()
            + self
                .subfolders
                .iter()
                .map(FolderNode::file_count)
                .sum::<usize>()
    }

    /// Every file with its full archive path, in emission order: a folder's
    /// own files first, then each subfolder, all in insertion order.
    pub fn entries(&self) -> Vec<(String, &LocalFile)> {
        let mut entries = Vec::with_capacity(self.file_count());
        self.collect_entries(&self.name, &mut entries);
        entries
    }

    fn collect_entries<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a LocalFile)>) {
        for file in &self.files {
            out.push((format!("{prefix}/{}", file.name), file));
        }
        for folder in &self.subfolders {
            folder.collect_entries(&format!("{prefix}/{}", folder.name), out);
        }
    }
}

/// Partition `files` into a folder tree by their path hints.
///
/// The root is named after the first segment of the first file. Each file is
/// placed under the folders named by its middle segments; files without a
/// separator land directly in the root.
pub fn build_tree(files: Vec<LocalFile>) -> Result<FolderNode, ArchiveError> {
    let root_name = files
        .first()
        .ok_or(ArchiveError::EmptyInput)?
        .segments()
        .next()
        .unwrap_or_default()
        .to_string();
    let mut root = FolderNode::new(root_name);

    for file in files {
        let segments: Vec<String> = file.segments().map(str::to_string).collect();
        let mut folder = &mut root;
        if segments.len() > 2 {
            for segment in &segments[1..segments.len() - 1] {
                folder = folder.subfolder_mut(segment);
            }
        }
        folder.files.push(file);
    }

    Ok(root)
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// Write `tree` as a zip archive.
pub fn serialize(tree: &FolderNode) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, file) in tree.entries() {
        writer.start_file(path, entry_options())?;
        writer.write_all(&file.data)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// File entries of an archive as `(path, contents)`, in archive order.
pub fn unpack(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() {
            continue;
        }
        // The declared size comes from the archive itself and is not trusted.
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        entries.push((entry.name().to_string(), data));
    }
    Ok(entries)
}

/// Archive name: the root folder name plus a random alphanumeric suffix, so
/// repeated uploads of same-named folders do not collide.
pub fn archive_name(root: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ARCHIVE_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{root}-{suffix}")
}

/// Build, serialize, and wrap a folder selection as one named blob.
pub fn archive_folder(files: Vec<LocalFile>) -> Result<LocalFile, ArchiveError> {
    let tree = build_tree(files)?;
    let data = serialize(&tree)?;
    let name = archive_name(&tree.name);
    debug!(
        root = %tree.name,
        files = tree.file_count(),
        size_bytes = data.len(),
        "folder archived"
    );
    Ok(LocalFile::new(name, ARCHIVE_MIME_TYPE, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn file(path: &str, contents: &[u8]) -> LocalFile {
        LocalFile::new(path, "text/plain", contents.to_vec())
    }

    #[test]
    fn empty_selection_is_rejected() {
        assert!(matches!(build_tree(Vec::new()), Err(ArchiveError::EmptyInput)));
        assert!(matches!(
            archive_folder(Vec::new()),
            Err(ArchiveError::EmptyInput)
        ));
    }

    #[test]
    fn builds_nested_tree() {
        let tree = build_tree(vec![
            file("docs/a.txt", b"a"),
            file("docs/sub/b.txt", b"b"),
            file("docs/sub/deeper/c.txt", b"c"),
            file("docs/sub/d.txt", b"d"),
        ])
        .expect("tree");

        assert_eq!(tree.name, "docs");
        assert_eq!(tree.files.len(), 1);
        assert_eq!(tree.subfolders.len(), 1);
        let sub = &tree.subfolders[0];
        assert_eq!(sub.name, "sub");
        assert_eq!(
            sub.files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            ["b.txt", "d.txt"]
        );
        assert_eq!(sub.subfolders[0].name, "deeper");
        assert_eq!(tree.file_count(), 4);
    }

    #[test]
    fn root_name_comes_from_first_file_only() {
        let tree = build_tree(vec![file("photos/x.jpg", b"x"), file("other/y.jpg", b"y")])
            .expect("tree");
        assert_eq!(tree.name, "photos");
        let paths: Vec<String> = tree.entries().into_iter().map(|(path, _)| path).collect();
        assert_eq!(paths, ["photos/x.jpg", "photos/y.jpg"]);
    }

    #[test]
    fn flat_paths_land_in_root() {
        let tree = build_tree(vec![file("a.txt", b"a"), file("b.txt", b"b")]).expect("tree");
        assert_eq!(tree.name, "a.txt");
        assert_eq!(tree.files.len(), 2);
        assert!(tree.subfolders.is_empty());
    }

    #[test]
    fn emission_follows_insertion_order() {
        let tree = build_tree(vec![
            file("r/z.txt", b"z"),
            file("r/b/x.txt", b"x"),
            file("r/a.txt", b"a"),
            file("r/a/y.txt", b"y"),
        ])
        .expect("tree");
        let paths: Vec<String> = tree.entries().into_iter().map(|(path, _)| path).collect();
        assert_eq!(paths, ["r/z.txt", "r/a.txt", "r/b/x.txt", "r/a/y.txt"]);
    }

    #[test]
    fn docs_folder_unpacks_to_original_files() {
        let archive = archive_folder(vec![
            file("docs/a.txt", b"alpha"),
            file("docs/sub/b.txt", b"bravo"),
        ])
        .expect("archive");

        assert_eq!(archive.mime_type, ARCHIVE_MIME_TYPE);
        let entries = unpack(&archive.data).expect("unpack");
        assert_eq!(
            entries,
            vec![
                ("docs/a.txt".to_string(), b"alpha".to_vec()),
                ("docs/sub/b.txt".to_string(), b"bravo".to_vec()),
            ]
        );
    }

    #[test]
    fn archive_name_has_random_alphanumeric_suffix() {
        let archive = archive_folder(vec![file("docs/a.txt", b"a")]).expect("archive");
        let suffix = archive
            .name
            .strip_prefix("docs-")
            .expect("root name prefix");
        assert_eq!(suffix.len(), ARCHIVE_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));

        let again = archive_folder(vec![file("docs/a.txt", b"a")]).expect("archive");
        assert_ne!(archive.name, again.name);
    }

    #[test]
    fn serialization_is_deterministic() {
        let files = vec![file("d/a.txt", b"1"), file("d/e/b.txt", b"2")];
        let first = serialize(&build_tree(files.clone()).expect("tree")).expect("zip");
        let second = serialize(&build_tree(files).expect("tree")).expect("zip");
        assert_eq!(first, second);
    }

    #[test]
    fn colliding_paths_fail_to_serialize() {
        let tree = build_tree(vec![file("a/x", b"1"), file("b/x", b"2")]).expect("tree");
        assert!(matches!(serialize(&tree), Err(ArchiveError::Zip(_))));
    }

    /// One stored entry whose central-directory zip64 record declares
    /// `declared` uncompressed bytes.
    fn zip64_with_declared_size(payload: &[u8], declared: u64) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        writer.start_file("big.bin", options).expect("start");
        writer.write_all(payload).expect("write");
        let mut bytes = writer.finish().expect("finish").into_inner();

        let header = bytes
            .windows(4)
            .position(|window| window == b"PK\x01\x02")
            .expect("central directory header");
        let read_u16 = |bytes: &[u8], at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
        let name_len = read_u16(&bytes, header + 28);
        let extra_len = read_u16(&bytes, header + 30);
        bytes[header + 24..header + 28].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut field = header + 46 + name_len;
        let extra_end = field + extra_len;
        while field + 4 <= extra_end {
            let id = read_u16(&bytes, field);
            let len = read_u16(&bytes, field + 2);
            if id == 0x0001 {
                bytes[field + 4..field + 12].copy_from_slice(&declared.to_le_bytes());
                return bytes;
            }
            field += 4 + len;
        }
        panic!("writer emitted no zip64 extra field");
    }

    #[test]
    fn oversized_declared_entry_does_not_preallocate() {
        let payload = b"tiny payload";
        let bytes = zip64_with_declared_size(payload, u64::MAX / 2);

        // Must return rather than reserve the declared size.
        if let Ok(entries) = unpack(&bytes) {
            assert_eq!(entries, vec![("big.bin".to_string(), payload.to_vec())]);
        }
    }

    fn selection() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
        let segment = "[a-d]{1,3}";
        let relative = prop::collection::vec(segment, 1..4).prop_map(|parts| parts.join("/"));
        prop::collection::btree_map(
            relative.prop_map(|path| format!("root/{path}.bin")),
            prop::collection::vec(any::<u8>(), 0..32),
            1..12,
        )
    }

    proptest! {
        #[test]
        fn tree_partitions_and_round_trips(files in selection()) {
            let input: Vec<LocalFile> = files
                .iter()
                .map(|(path, data)| LocalFile::new(path.clone(), "", data.clone()))
                .collect();

            let tree = build_tree(input).expect("tree");
            prop_assert_eq!(tree.file_count(), files.len());

            let unpacked: BTreeMap<String, Vec<u8>> = unpack(&serialize(&tree).expect("zip"))
                .expect("unpack")
                .into_iter()
                .collect();
            prop_assert_eq!(unpacked, files);
        }
    }
}
