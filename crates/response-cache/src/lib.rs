//! Content-addressed cache for model call results, partitioned by request identifier.

pub mod cache;
pub mod key;

pub use cache::{CacheStats, ResponseCache};
pub use key::{CacheKey, CacheOp};
