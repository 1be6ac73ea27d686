//! Object-level operations.  Only ownership and ETag are tracked; object
//! bodies belong to the storage layer behind this crate.

use std::sync::Arc;

use md5::{Digest, Md5};
use tracing::{debug, Instrument};

use super::{authorize_object, existing_owner, load_bucket, op_span};
use crate::errors::S3Error;
use crate::identity::Requester;
use crate::metadata::now_iso8601;
use crate::metadata::store::ObjectRecord;
use crate::policy::actions;
use crate::AppState;

/// Quoted hex MD5 of `body`, the single-part ETag form.
pub fn compute_etag(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(body)))
}

/// Write an object.  The requester becomes its owner.
pub async fn put_object(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    key: &str,
    body: &[u8],
) -> Result<ObjectRecord, S3Error> {
    async {
        let record = load_bucket(&state, bucket).await?;
        let current_owner = existing_owner(&state, bucket, key).await?;
        authorize_object(
            &record,
            key,
            current_owner.as_deref(),
            actions::PUT_OBJECT,
            requester,
        )?;

        let object = ObjectRecord {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: body.len() as u64,
            etag: compute_etag(body),
            owner_id: requester.canonical_id.clone(),
            last_modified: now_iso8601(),
        };
        state.metadata.put_object(object.clone()).await?;
        debug!(key, size = object.size, etag = %object.etag, "object stored");
        Ok(object)
    }
    .instrument(op_span("PutObject", bucket))
    .await
}

/// Object metadata, checked against `s3:GetObject`.
///
/// Authorization runs before the existence check so a caller without read
/// access cannot discover which keys exist.
pub async fn head_object(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    key: &str,
) -> Result<ObjectRecord, S3Error> {
    async {
        let record = load_bucket(&state, bucket).await?;
        let object = state.metadata.get_object(bucket, key).await?;
        let owner = object.as_ref().map(|o| o.owner_id.as_str());
        authorize_object(&record, key, owner, actions::GET_OBJECT, requester)?;

        object.ok_or_else(|| S3Error::NoSuchKey {
            key: key.to_string(),
        })
    }
    .instrument(op_span("HeadObject", bucket))
    .await
}

/// Delete an object.  Deleting a missing key succeeds.
pub async fn delete_object(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    key: &str,
) -> Result<(), S3Error> {
    async {
        let record = load_bucket(&state, bucket).await?;
        let object = state.metadata.get_object(bucket, key).await?;
        let owner = object.as_ref().map(|o| o.owner_id.as_str());
        authorize_object(&record, key, owner, actions::DELETE_OBJECT, requester)?;

        if object.is_some() {
            state.metadata.delete_object(bucket, key).await?;
            debug!(key, "object deleted");
        }
        Ok(())
    }
    .instrument(op_span("DeleteObject", bucket))
    .await
}
