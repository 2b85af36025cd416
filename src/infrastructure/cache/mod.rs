//! Cache infrastructure - result cache implementation

mod result_cache;

pub use result_cache::{ResultCache, ResultCacheConfig};
