// Response cache module
// Author: kelexine (https://github.com/kelexine)

pub mod models;
pub mod response;

pub use models::{CacheEntry, CacheStats, CacheTotals, RequestType};
pub use response::{content_hash, derive_cache_key, ResponseCache};
