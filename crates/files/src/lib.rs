//! Folder archiving for multi-file uploads.

pub mod archive;

pub use archive::{
    archive_folder, archive_name, build_tree, serialize, unpack, ArchiveError, FolderNode,
    ARCHIVE_MIME_TYPE, ARCHIVE_SUFFIX_LEN,
};
