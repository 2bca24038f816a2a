pub mod backend;

pub use backend::{BlobStorage, FileStorage, MemoryStorage, StorageError};
