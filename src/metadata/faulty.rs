//! Memory store with switchable faults, for exercising error paths.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::memory::MemoryMetadataStore;
use super::store::{BucketRecord, MetadataStore, ObjectRecord};
use crate::policy::BucketPolicy;

#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    inner: MemoryMetadataStore,
    /// Every `put_object` fails while set.
    pub fail_object_writes: AtomicBool,
    /// The next `get_bucket` reports the bucket as missing, as if a
    /// concurrent create had not landed yet.
    pub hide_next_bucket_lookup: AtomicBool,
}

impl MetadataStore for FaultyStore {
    fn create_bucket(
        &self,
        record: BucketRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        self.inner.create_bucket(record)
    }

    fn get_bucket(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<BucketRecord>>> + Send + '_>> {
        if self.hide_next_bucket_lookup.swap(false, Ordering::SeqCst) {
            return Box::pin(async { Ok(None) });
        }
        self.inner.get_bucket(name)
    }

    fn bucket_exists(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        self.inner.bucket_exists(name)
    }

    fn delete_bucket(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        self.inner.delete_bucket(name)
    }

    fn set_bucket_policy(
        &self,
        name: &str,
        policy: Option<Arc<BucketPolicy>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        self.inner.set_bucket_policy(name, policy)
    }

    fn put_object(
        &self,
        record: ObjectRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        if self.fail_object_writes.load(Ordering::SeqCst) {
            return Box::pin(async { Err(anyhow::anyhow!("object write failed")) });
        }
        self.inner.put_object(record)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ObjectRecord>>> + Send + '_>> {
        self.inner.get_object(bucket, key)
    }

    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        self.inner.delete_object(bucket, key)
    }

    fn count_objects(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        self.inner.count_objects(bucket)
    }
}
