// Response cache module
// Author: kelexine (https://github.com/kelexine)

pub mod key;
pub mod manager;
pub mod models;

pub use key::{cache_key, metadata_value};
pub use manager::ResponseCache;
pub use models::{CacheStats, CachedResponse};
