//! Abstract metadata store trait.
//!
//! The authorization core never persists anything itself; it loads bucket
//! and object records through [`MetadataStore`] and awaits each call once
//! before making a decision.  The trait uses manually desugared async
//! methods (pinned boxed futures) so it stays object safe.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::policy::BucketPolicy;

// ── Record types ───────────────────────────────────────────────────

/// Metadata record for a bucket.
#[derive(Debug, Clone)]
pub struct BucketRecord {
    /// Bucket name.
    pub name: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// Region the bucket was created in.
    pub region: String,
    /// Canonical owner ID.
    pub owner_id: String,
    /// Owner display name.
    pub owner_display: String,
    /// Attached bucket policy.  Replaced wholesale, never edited in place, so
    /// a clone of this record is a consistent snapshot for one evaluation.
    pub policy: Option<Arc<BucketPolicy>>,
}

/// Metadata record for an object.  Only what authorization needs.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    /// Bucket the object belongs to.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Quoted ETag string.
    pub etag: String,
    /// Canonical ID of the object owner.
    pub owner_id: String,
    /// ISO-8601 last-modified timestamp.
    pub last_modified: String,
}

/// Error from [`MetadataStore::create_bucket`] when the name is taken.
/// Stores return it inside `anyhow::Error`; callers find it with
/// `downcast_ref`.
#[derive(Debug, thiserror::Error)]
#[error("Bucket already exists: {0}")]
pub struct BucketExists(pub String);

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
pub trait MetadataStore: Send + Sync + 'static {
    // ── Buckets ─────────────────────────────────────────────────────

    /// Create a new bucket record.  Fails with [`BucketExists`] if the name
    /// is taken.
    fn create_bucket(
        &self,
        record: BucketRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Get a bucket by name.
    fn get_bucket(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<BucketRecord>>> + Send + '_>>;

    /// Check whether a bucket exists.
    fn bucket_exists(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    /// Delete a bucket by name.
    fn delete_bucket(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Attach (`Some`) or clear (`None`) the bucket policy in one swap.
    fn set_bucket_policy(
        &self,
        name: &str,
        policy: Option<Arc<BucketPolicy>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    // ── Objects ─────────────────────────────────────────────────────

    /// Insert or update an object record (upsert).
    fn put_object(
        &self,
        record: ObjectRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Get a single object record.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ObjectRecord>>> + Send + '_>>;

    /// Delete an object record.
    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Count the number of objects in a bucket (for BucketNotEmpty checks).
    fn count_objects(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;
}
