//! The storage core: path sandboxing, streaming object I/O and metadata
//! derivation over a local directory tree.

pub mod bucket_manager;
pub mod digest;
pub mod metadata_provider;
pub mod object_store;
pub mod path_resolver;
pub mod storage_service;
pub mod walk;

pub use object_store::{ObjectReader, ObjectUpload};
pub use storage_service::{
    LocalFilesystemBackend, SharedStorage, StorageBackend, StorageError, StorageResult, build_backend,
};
