//! Metadata storage layer.
//!
//! The metadata store keeps track of buckets (with their attached policy)
//! and object ownership.  The [`store::MetadataStore`] trait defines the
//! interface; [`memory::MemoryMetadataStore`] is the in-process
//! implementation.

#[cfg(test)]
pub(crate) mod faulty;
pub mod memory;
pub mod store;

/// Current time as an ISO-8601 string with millisecond precision.
pub fn now_iso8601() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
