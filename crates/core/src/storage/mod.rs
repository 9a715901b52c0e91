//! Object storage for finished artifacts.
//!
//! The orchestrator only needs a small blob contract: put a staged file under
//! a key, read it back, delete it, and check whether it exists. Every
//! operation is safe to retry; a repeated `put` under the same key replaces
//! the object atomically.

mod config;
mod error;
mod fs_store;
mod traits;
mod types;

pub use config::StorageConfig;
pub use error::StorageError;
pub use fs_store::FsObjectStore;
pub use traits::ObjectStore;
pub use types::{ObjectMeta, StoredObject};
