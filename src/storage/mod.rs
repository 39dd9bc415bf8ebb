//! On-disk storage: managed cache roots and the blob store inside them

pub mod directory;
pub mod disk;

pub use directory::{DirectoryManager, DirectoryProvider};
pub use disk::{blob_key_for, DiskObjectStore};
