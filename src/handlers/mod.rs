//! S3 operations routed through the authorization core.
//!
//! Each operation runs inside an `s3_op` span carrying the operation name,
//! bucket and a fresh request id, loads the bucket, and authorizes before
//! touching any state.  A missing bucket is `NoSuchBucket` for bucket and
//! object operations and `PreconditionFailed` for multipart operations.

use tracing::{debug, info_span, Span};

use crate::errors::{generate_request_id, S3Error};
use crate::identity::Requester;
use crate::metadata::store::BucketRecord;
use crate::policy::{is_bucket_authorized, is_object_authorized};
use crate::AppState;

pub mod bucket;
pub mod multipart;
pub mod object;

/// Span for one operation.
pub(crate) fn op_span(op: &'static str, bucket: &str) -> Span {
    info_span!("s3_op", op, bucket, request_id = %generate_request_id())
}

/// Load a bucket record or fail with `NoSuchBucket`.
pub(crate) async fn load_bucket(state: &AppState, bucket: &str) -> Result<BucketRecord, S3Error> {
    state
        .metadata
        .get_bucket(bucket)
        .await?
        .ok_or_else(|| S3Error::NoSuchBucket {
            bucket: bucket.to_string(),
        })
}

/// Load the bucket an upload targets.  Its existence is a precondition of
/// the upload path, so a missing bucket is `PreconditionFailed`.
pub(crate) async fn load_upload_bucket(
    state: &AppState,
    bucket: &str,
) -> Result<BucketRecord, S3Error> {
    state
        .metadata
        .get_bucket(bucket)
        .await?
        .ok_or(S3Error::PreconditionFailed)
}

/// Owner of the object currently stored at `key`, if any.
pub(crate) async fn existing_owner(
    state: &AppState,
    bucket: &str,
    key: &str,
) -> Result<Option<String>, S3Error> {
    Ok(state
        .metadata
        .get_object(bucket, key)
        .await?
        .map(|o| o.owner_id))
}

pub(crate) fn authorize_bucket(
    record: &BucketRecord,
    action: &str,
    requester: &Requester,
) -> Result<(), S3Error> {
    if is_bucket_authorized(record, action, requester, &Span::current()) {
        return Ok(());
    }
    debug!(action, requester = %requester.canonical_id, "access denied");
    Err(S3Error::access_denied(action))
}

pub(crate) fn authorize_object(
    record: &BucketRecord,
    key: &str,
    object_owner: Option<&str>,
    action: &str,
    requester: &Requester,
) -> Result<(), S3Error> {
    if is_object_authorized(record, key, object_owner, action, requester, &Span::current()) {
        return Ok(());
    }
    debug!(action, key, requester = %requester.canonical_id, "access denied");
    Err(S3Error::access_denied(action))
}
