//! BleepStore authorization core.
//!
//! Bucket-policy authorization and the multipart upload lifecycle of an
//! S3-compatible store, together with the bucket, object and multipart
//! operations that route through them.  Transport (HTTP, XML, SigV4) lives
//! in front of this crate; callers hand in an already-authenticated
//! [`identity::Requester`].

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod metadata;
pub mod metrics;
pub mod multipart;
pub mod policy;

use crate::config::Config;
use crate::metadata::memory::MemoryMetadataStore;
use crate::metadata::store::MetadataStore;
use crate::multipart::MultipartCoordinator;

/// Shared state passed to every operation in [`handlers`].
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Bucket, policy and object ownership records.
    pub metadata: Arc<dyn MetadataStore>,
    /// Every upload id issued by this process.
    pub uploads: Arc<MultipartCoordinator>,
}

impl AppState {
    pub fn new(config: Config, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            config,
            metadata,
            uploads: Arc::new(MultipartCoordinator::new()),
        }
    }

    /// State backed by a fresh [`MemoryMetadataStore`].
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryMetadataStore::new()))
    }

    /// Same stores, different configuration.
    pub fn with_config(&self, config: Config) -> Self {
        Self {
            config,
            metadata: Arc::clone(&self.metadata),
            uploads: Arc::clone(&self.uploads),
        }
    }
}
