//! Caching implementations

pub mod cache_service_wrapper;
pub mod file_cache;
pub mod memory_cache;

pub use cache_service_wrapper::{CacheServiceWrapper, CacheSummary};
pub use file_cache::FileTransientStore;
pub use memory_cache::MemoryObjectCache;
