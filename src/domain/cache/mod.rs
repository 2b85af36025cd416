//! Cache domain - result cache keys, entries and policies

mod entry;
mod key;
mod policy;

pub use entry::{approximate_size, CacheEntry, CacheSetOptions, CacheStats};
pub use key::{CacheKeyGenerator, CacheKeyParams, DefaultKeyGenerator};
pub use policy::{CachePolicy, CachePolicyResolver, CacheSettings};
