//! Multipart upload lifecycle.
//!
//! Every upload id ever issued keeps a slot in an append-only arena together
//! with its explicit state:
//!
//! ```text
//! (unknown) --initiate--> Active --abort---------> Aborted
//!                          | ^ ^
//!                          | | +-- put_part
//!                          | +---- cancel_complete --+
//!                          +--begin_complete--> Completing --finish_complete--> Completed
//! ```
//!
//! Slots are never removed, so "never existed" and "existed, now terminal"
//! stay distinguishable and a terminal id can never become active again.
//! Each slot sits behind its own mutex: transitions on one upload are
//! serialized without blocking unrelated uploads.  `Completing` holds the
//! validated parts while the assembled object is recorded, so a failed
//! write can put the upload back to `Active`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use md5::{Digest, Md5};
use tracing::{debug, info};

use crate::config::MultipartConfig;
use crate::errors::S3Error;
use crate::metadata::now_iso8601;
use crate::metadata::store::BucketRecord;
use crate::metrics;

/// Lifecycle state of one upload id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Accepting parts.
    Active,
    /// Parts validated, assembled object not yet recorded.
    Completing,
    /// Cancelled by the client.
    Aborted,
    /// Assembled into an object.
    Completed,
}

/// Metadata record for a single uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    /// Part number (1-based).
    pub part_number: u32,
    /// Size in bytes.
    pub size: u64,
    /// Quoted ETag string (hex MD5 of the part).
    pub etag: String,
    /// ISO-8601 last-modified timestamp.
    pub last_modified: String,
}

/// An upload and the parts accepted so far.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    /// Unique upload identifier.
    pub upload_id: String,
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Canonical ID of the initiator; owns the completed object.
    pub owner_id: String,
    /// ISO-8601 initiation timestamp.
    pub initiated_at: String,
    /// Accepted parts keyed by part number.
    pub parts: BTreeMap<u32, PartRecord>,
}

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    /// Composite ETag, `"<md5 of part md5s>-<count>"`.
    pub etag: String,
    /// Total size of the assembled object.
    pub size: u64,
    /// Owner of the assembled object.
    pub owner_id: String,
}

#[derive(Debug)]
struct UploadSlot {
    upload: MultipartUpload,
    state: UploadState,
}

impl UploadSlot {
    fn is_active_for(&self, bucket: &str, key: &str) -> bool {
        self.state == UploadState::Active && self.upload.bucket == bucket && self.upload.key == key
    }
}

#[derive(Debug, Default)]
struct UploadTable {
    slots: Vec<Arc<Mutex<UploadSlot>>>,
    index: HashMap<String, usize>,
}

/// Owner of every upload id's state.
#[derive(Debug, Default)]
pub struct MultipartCoordinator {
    table: RwLock<UploadTable>,
}

impl MultipartCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new upload for `key` in `bucket`.  The caller has already
    /// checked that the bucket exists.
    pub fn initiate(
        &self,
        bucket: &BucketRecord,
        key: &str,
        owner_id: &str,
    ) -> Result<String, S3Error> {
        let mut table = self
            .table
            .write()
            .map_err(|_| anyhow::anyhow!("upload table lock poisoned"))?;

        let upload_id = loop {
            let candidate = uuid::Uuid::new_v4().simple().to_string();
            if !table.index.contains_key(&candidate) {
                break candidate;
            }
        };

        let slot = UploadSlot {
            upload: MultipartUpload {
                upload_id: upload_id.clone(),
                bucket: bucket.name.clone(),
                key: key.to_string(),
                owner_id: owner_id.to_string(),
                initiated_at: now_iso8601(),
                parts: BTreeMap::new(),
            },
            state: UploadState::Active,
        };
        let position = table.slots.len();
        table.slots.push(Arc::new(Mutex::new(slot)));
        table.index.insert(upload_id.clone(), position);

        info!(bucket = %bucket.name, key, upload_id = %upload_id, "multipart upload initiated");
        metrics::record_transition("initiate");
        Ok(upload_id)
    }

    /// Accept (or replace) one part of an active upload.
    pub fn put_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        content: &[u8],
        config: &MultipartConfig,
    ) -> Result<PartRecord, S3Error> {
        if !(1..=config.max_part_number).contains(&part_number) {
            return Err(S3Error::InvalidArgument {
                message: format!(
                    "Part number must be between 1 and {}, got {part_number}",
                    config.max_part_number
                ),
            });
        }

        let slot = self
            .slot(upload_id)?
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;
        let mut slot = lock_slot(&slot)?;
        if !slot.is_active_for(bucket, key) {
            return Err(S3Error::no_such_upload(upload_id));
        }

        let part = PartRecord {
            part_number,
            size: content.len() as u64,
            etag: format!("\"{}\"", hex::encode(Md5::digest(content))),
            last_modified: now_iso8601(),
        };
        slot.upload.parts.insert(part_number, part.clone());

        debug!(upload_id, part_number, size = part.size, "part accepted");
        metrics::record_transition("part");
        Ok(part)
    }

    /// Abort an upload.
    ///
    /// An active upload is aborted whatever its part count.  An id that does
    /// not resolve to an active upload of this bucket and key is a silent
    /// success only for buckets created in the legacy region while the
    /// legacy flag is off; everywhere else it is `NoSuchUpload`.
    pub fn abort(
        &self,
        bucket: &BucketRecord,
        key: &str,
        upload_id: &str,
        config: &MultipartConfig,
    ) -> Result<(), S3Error> {
        let strict = config.us_east_behavior;

        if let Some(slot) = self.slot(upload_id)? {
            let mut slot = lock_slot(&slot)?;
            if slot.is_active_for(&bucket.name, key) {
                slot.state = UploadState::Aborted;
                let parts = std::mem::take(&mut slot.upload.parts).len();
                info!(bucket = %bucket.name, key, upload_id, parts, "multipart upload aborted");
                metrics::record_transition("abort");
                return Ok(());
            }
        }

        if bucket.region == config.legacy_region && !strict {
            debug!(
                bucket = %bucket.name,
                upload_id,
                "unknown upload in legacy region, abort treated as done"
            );
            metrics::record_transition("abort_noop");
            return Ok(());
        }
        Err(S3Error::no_such_upload(upload_id))
    }

    /// Validate the listed `(part number, etag)` pairs and move the upload to
    /// `Completing`.  Follow with [`finish_complete`](Self::finish_complete)
    /// once the object is recorded, or
    /// [`cancel_complete`](Self::cancel_complete) if recording failed.
    ///
    /// Parts must be listed in ascending order and each must match an
    /// accepted part's ETag (quotes optional).
    pub fn begin_complete(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        requested: &[(u32, String)],
    ) -> Result<CompletedUpload, S3Error> {
        if requested.is_empty() {
            return Err(S3Error::InvalidPart {
                message: "You must specify at least one part".to_string(),
            });
        }
        if requested.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(S3Error::InvalidPartOrder);
        }

        let slot = self
            .slot(upload_id)?
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;
        let mut slot = lock_slot(&slot)?;
        if !slot.is_active_for(bucket, key) {
            return Err(S3Error::no_such_upload(upload_id));
        }

        let mut combined_md5_bytes: Vec<u8> = Vec::with_capacity(requested.len() * 16);
        let mut total_size: u64 = 0;
        for (part_number, requested_etag) in requested {
            let stored = slot
                .upload
                .parts
                .get(part_number)
                .filter(|p| p.etag.trim_matches('"') == requested_etag.trim_matches('"'))
                .ok_or_else(|| S3Error::InvalidPart {
                    message: format!(
                        "Part {part_number} could not be found or its entity tag does not match"
                    ),
                })?;
            let digest = hex::decode(stored.etag.trim_matches('"'))
                .map_err(|e| anyhow::anyhow!("stored part etag is not hex: {e}"))?;
            combined_md5_bytes.extend_from_slice(&digest);
            total_size += stored.size;
        }

        let etag = format!(
            "\"{}-{}\"",
            hex::encode(Md5::digest(&combined_md5_bytes)),
            requested.len()
        );
        slot.state = UploadState::Completing;
        debug!(upload_id, parts = requested.len(), "multipart upload completing");
        Ok(CompletedUpload {
            etag,
            size: total_size,
            owner_id: slot.upload.owner_id.clone(),
        })
    }

    /// `Completing` to `Completed`; the parts are released.
    pub fn finish_complete(&self, upload_id: &str) -> Result<(), S3Error> {
        self.with_completing(upload_id, |slot| {
            slot.state = UploadState::Completed;
            slot.upload.parts.clear();
            info!(
                bucket = %slot.upload.bucket,
                key = %slot.upload.key,
                upload_id,
                "multipart upload completed"
            );
        })?;
        metrics::record_transition("complete");
        Ok(())
    }

    /// `Completing` back to `Active` with every part kept.
    pub fn cancel_complete(&self, upload_id: &str) -> Result<(), S3Error> {
        self.with_completing(upload_id, |slot| slot.state = UploadState::Active)?;
        debug!(upload_id, "multipart completion rolled back");
        Ok(())
    }

    /// Abort every active upload of `bucket`, for bucket deletion.  Returns
    /// how many were aborted.
    pub fn abort_bucket(&self, bucket: &str) -> Result<usize, S3Error> {
        let slots: Vec<_> = self
            .table
            .read()
            .map_err(|_| anyhow::anyhow!("upload table lock poisoned"))?
            .slots
            .clone();

        let mut aborted = 0;
        for slot in &slots {
            let mut slot = lock_slot(slot)?;
            if slot.state == UploadState::Active && slot.upload.bucket == bucket {
                slot.state = UploadState::Aborted;
                slot.upload.parts.clear();
                aborted += 1;
            }
        }
        if aborted > 0 {
            info!(bucket, aborted, "aborted uploads of deleted bucket");
            metrics::record_transition("abort");
        }
        Ok(aborted)
    }

    /// Parts of an active upload, in part-number order.
    pub fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<PartRecord>, S3Error> {
        let slot = self
            .slot(upload_id)?
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;
        let slot = lock_slot(&slot)?;
        if !slot.is_active_for(bucket, key) {
            return Err(S3Error::no_such_upload(upload_id));
        }
        Ok(slot.upload.parts.values().cloned().collect())
    }

    /// Snapshot of an active upload, if any.
    pub fn get(&self, upload_id: &str) -> Result<Option<MultipartUpload>, S3Error> {
        let Some(slot) = self.slot(upload_id)? else {
            return Ok(None);
        };
        let slot = lock_slot(&slot)?;
        Ok((slot.state == UploadState::Active).then(|| slot.upload.clone()))
    }

    /// Current state of an id; `None` if it was never issued.
    pub fn state(&self, upload_id: &str) -> Result<Option<UploadState>, S3Error> {
        match self.slot(upload_id)? {
            Some(slot) => Ok(Some(lock_slot(&slot)?.state)),
            None => Ok(None),
        }
    }

    fn with_completing<T>(
        &self,
        upload_id: &str,
        f: impl FnOnce(&mut UploadSlot) -> T,
    ) -> Result<T, S3Error> {
        let slot = self
            .slot(upload_id)?
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;
        let mut slot = lock_slot(&slot)?;
        if slot.state != UploadState::Completing {
            return Err(anyhow::anyhow!("upload {upload_id} is not completing").into());
        }
        Ok(f(&mut *slot))
    }

    fn slot(&self, upload_id: &str) -> Result<Option<Arc<Mutex<UploadSlot>>>, S3Error> {
        let table = self
            .table
            .read()
            .map_err(|_| anyhow::anyhow!("upload table lock poisoned"))?;
        Ok(table
            .index
            .get(upload_id)
            .map(|&position| Arc::clone(&table.slots[position])))
    }
}

fn lock_slot(slot: &Mutex<UploadSlot>) -> Result<MutexGuard<'_, UploadSlot>, S3Error> {
    slot.lock()
        .map_err(|_| S3Error::InternalError(anyhow::anyhow!("upload slot lock poisoned")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket_in(region: &str) -> BucketRecord {
        BucketRecord {
            name: "b".to_string(),
            created_at: "2026-02-23T00:00:00.000Z".to_string(),
            region: region.to_string(),
            owner_id: "owner".to_string(),
            owner_display: "Owner".to_string(),
            policy: None,
        }
    }

    fn config(us_east_behavior: bool) -> MultipartConfig {
        MultipartConfig::default().with_us_east_behavior(us_east_behavior)
    }

    #[test]
    fn test_initiate_issues_unique_ids() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("us-east-1");
        let a = coord.initiate(&b, "k", "owner").unwrap();
        let c = coord.initiate(&b, "k", "owner").unwrap();
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
        assert_eq!(coord.state(&a).unwrap(), Some(UploadState::Active));
    }

    #[test]
    fn test_put_part_replaces_same_number() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("us-east-1");
        let id = coord.initiate(&b, "k", "owner").unwrap();

        let first = coord.put_part("b", "k", &id, 1, b"first", &config(false)).unwrap();
        let second = coord.put_part("b", "k", &id, 1, b"second!", &config(false)).unwrap();
        assert_ne!(first.etag, second.etag);

        let parts = coord.list_parts("b", "k", &id).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].size, 7);
        assert_eq!(parts[0].etag, second.etag);
    }

    #[test]
    fn test_put_part_etag_is_quoted_md5() {
        let coord = MultipartCoordinator::new();
        let id = coord.initiate(&bucket_in("us-east-1"), "k", "o").unwrap();
        let part = coord.put_part("b", "k", &id, 1, b"", &config(false)).unwrap();
        assert_eq!(part.etag, "\"d41d8cd98f00b204e9800998ecf8427e\"");
    }

    #[test]
    fn test_put_part_rejects_out_of_range_numbers() {
        let coord = MultipartCoordinator::new();
        let id = coord.initiate(&bucket_in("us-east-1"), "k", "o").unwrap();
        for n in [0, 10_001] {
            let err = coord.put_part("b", "k", &id, n, b"x", &config(false)).unwrap_err();
            assert_eq!(err.code(), "InvalidArgument");
        }
    }

    #[test]
    fn test_put_part_requires_active_upload() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("us-east-1");
        let err = coord.put_part("b", "k", "nope", 1, b"x", &config(false)).unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");

        let id = coord.initiate(&b, "k", "o").unwrap();
        let err = coord.put_part("b", "other-key", &id, 1, b"x", &config(false)).unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");

        coord.abort(&b, "k", &id, &config(true)).unwrap();
        let err = coord.put_part("b", "k", &id, 1, b"x", &config(false)).unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");
    }

    #[test]
    fn test_abort_active_upload_succeeds_everywhere() {
        for region in ["us-east-1", "eu-west-1"] {
            for flag in [false, true] {
                let coord = MultipartCoordinator::new();
                let b = bucket_in(region);
                let id = coord.initiate(&b, "k", "o").unwrap();
                coord.put_part("b", "k", &id, 1, b"data", &config(flag)).unwrap();
                coord.abort(&b, "k", &id, &config(flag)).unwrap();
                assert_eq!(coord.state(&id).unwrap(), Some(UploadState::Aborted));
            }
        }
    }

    #[test]
    fn test_abort_zero_part_upload() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("eu-west-1");
        let id = coord.initiate(&b, "k", "o").unwrap();
        coord.abort(&b, "k", &id, &config(true)).unwrap();
        assert!(coord.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_abort_unknown_outside_legacy_region_always_fails() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("eu-west-1");
        for flag in [false, true] {
            let err = coord.abort(&b, "k", "bogus", &config(flag)).unwrap_err();
            assert_eq!(err.code(), "NoSuchUpload");
        }
    }

    #[test]
    fn test_abort_unknown_in_legacy_region_follows_flag() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("us-east-1");
        assert!(coord.abort(&b, "k", "bogus", &config(false)).is_ok());
        let err = coord.abort(&b, "k", "bogus", &config(true)).unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");
    }

    #[test]
    fn test_second_abort_sees_upload_as_gone() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("eu-west-1");
        let id = coord.initiate(&b, "k", "o").unwrap();
        coord.abort(&b, "k", &id, &config(false)).unwrap();
        let err = coord.abort(&b, "k", &id, &config(false)).unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");
        // Terminal, not forgotten.
        assert_eq!(coord.state(&id).unwrap(), Some(UploadState::Aborted));
        assert_eq!(coord.state("bogus").unwrap(), None);
    }

    #[test]
    fn test_complete_builds_composite_etag() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("us-east-1");
        let id = coord.initiate(&b, "k", "initiator").unwrap();
        let p1 = coord.put_part("b", "k", &id, 1, b"hello ", &config(false)).unwrap();
        let p2 = coord.put_part("b", "k", &id, 2, b"world", &config(false)).unwrap();

        let requested = [(1, p1.etag.clone()), (2, p2.etag.trim_matches('"').to_string())];
        let done = coord.begin_complete("b", "k", &id, &requested).unwrap();
        assert_eq!(done.size, 11);
        assert_eq!(done.owner_id, "initiator");
        assert!(done.etag.starts_with('"'));
        assert!(done.etag.ends_with("-2\""));
        assert_eq!(coord.state(&id).unwrap(), Some(UploadState::Completing));

        coord.finish_complete(&id).unwrap();
        assert_eq!(coord.state(&id).unwrap(), Some(UploadState::Completed));
        assert!(coord.finish_complete(&id).is_err());

        let err = coord.abort(&b, "k", &id, &config(true)).unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");
    }

    #[test]
    fn test_complete_validates_parts() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("us-east-1");
        let id = coord.initiate(&b, "k", "o").unwrap();
        let p1 = coord.put_part("b", "k", &id, 1, b"a", &config(false)).unwrap();
        let p2 = coord.put_part("b", "k", &id, 2, b"b", &config(false)).unwrap();

        let err = coord
            .begin_complete("b", "k", &id, &[(2, p2.etag.clone()), (1, p1.etag.clone())])
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPartOrder");

        let err = coord
            .begin_complete("b", "k", &id, &[(1, p1.etag.clone()), (3, p2.etag.clone())])
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPart");

        let err = coord
            .begin_complete("b", "k", &id, &[(1, p2.etag.clone())])
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPart");

        let err = coord.begin_complete("b", "k", &id, &[]).unwrap_err();
        assert_eq!(err.code(), "InvalidPart");

        // Failed completions leave the upload usable.
        assert_eq!(coord.state(&id).unwrap(), Some(UploadState::Active));
    }

    #[test]
    fn test_cancelled_completion_keeps_parts() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("eu-west-1");
        let id = coord.initiate(&b, "k", "o").unwrap();
        let p1 = coord.put_part("b", "k", &id, 1, b"a", &config(false)).unwrap();

        coord.begin_complete("b", "k", &id, &[(1, p1.etag.clone())]).unwrap();
        // Neither parts nor aborts are accepted mid-completion.
        let err = coord.put_part("b", "k", &id, 2, b"b", &config(false)).unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");

        coord.cancel_complete(&id).unwrap();
        assert_eq!(coord.state(&id).unwrap(), Some(UploadState::Active));
        assert_eq!(coord.list_parts("b", "k", &id).unwrap(), vec![p1.clone()]);
        assert!(coord.cancel_complete(&id).is_err());

        coord.begin_complete("b", "k", &id, &[(1, p1.etag)]).unwrap();
        coord.finish_complete(&id).unwrap();
        assert_eq!(coord.state(&id).unwrap(), Some(UploadState::Completed));
    }

    #[test]
    fn test_abort_bucket_aborts_only_its_active_uploads() {
        let coord = MultipartCoordinator::new();
        let b = bucket_in("eu-west-1");
        let mut other = bucket_in("eu-west-1");
        other.name = "other".to_string();

        let first = coord.initiate(&b, "k1", "o").unwrap();
        let second = coord.initiate(&b, "k2", "o").unwrap();
        let done = coord.initiate(&b, "k3", "o").unwrap();
        let part = coord.put_part("b", "k3", &done, 1, b"x", &config(false)).unwrap();
        coord.begin_complete("b", "k3", &done, &[(1, part.etag)]).unwrap();
        coord.finish_complete(&done).unwrap();
        let elsewhere = coord.initiate(&other, "k1", "o").unwrap();

        assert_eq!(coord.abort_bucket("b").unwrap(), 2);
        assert_eq!(coord.state(&first).unwrap(), Some(UploadState::Aborted));
        assert_eq!(coord.state(&second).unwrap(), Some(UploadState::Aborted));
        assert_eq!(coord.state(&done).unwrap(), Some(UploadState::Completed));
        assert_eq!(coord.state(&elsewhere).unwrap(), Some(UploadState::Active));
        assert_eq!(coord.abort_bucket("b").unwrap(), 0);
    }

    #[test]
    fn test_concurrent_abort_and_put_part_leave_one_terminal_state() {
        let coord = Arc::new(MultipartCoordinator::new());
        let b = bucket_in("eu-west-1");
        let id = coord.initiate(&b, "k", "o").unwrap();

        let mut handles = Vec::new();
        for n in 1..=8u32 {
            let coord = Arc::clone(&coord);
            let id = id.clone();
            handles.push(std::thread::spawn(move || {
                coord
                    .put_part("b", "k", &id, n, b"chunk", &MultipartConfig::default())
                    .map(|_| ())
            }));
        }
        let aborts: Vec<_> = (0..4)
            .map(|_| {
                let coord = Arc::clone(&coord);
                let id = id.clone();
                let b = b.clone();
                std::thread::spawn(move || coord.abort(&b, "k", &id, &MultipartConfig::default()))
            })
            .collect();

        for h in handles {
            if let Err(err) = h.join().unwrap() {
                assert_eq!(err.code(), "NoSuchUpload");
            }
        }
        let succeeded = aborts
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(coord.state(&id).unwrap(), Some(UploadState::Aborted));
        assert!(coord.list_parts("b", "k", &id).is_err());
    }
}
