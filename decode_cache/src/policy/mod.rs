//! Ordering structures used by the persistent cache.

pub(crate) mod recency;
