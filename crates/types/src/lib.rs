//! Shared data model for the sharex transfer stack: content identifiers,
//! local file handles, descriptors, and share keys.

pub mod content_id;
pub mod descriptor;
pub mod local_file;
pub mod share;

pub use content_id::*;
pub use descriptor::*;
pub use local_file::*;
pub use share::*;
