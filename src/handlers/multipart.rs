//! Multipart upload operations.
//!
//! Authorization happens here; the lifecycle itself lives in
//! [`crate::multipart::MultipartCoordinator`].  Writes (initiate, part,
//! complete) authorize like `PutObject`: against the owner of the object
//! already stored at the key, or the bucket owner when there is none.  Abort
//! and part listing act on the upload, so their fallback is the bucket owner.
//!
//! The bucket must exist before any upload operation; a missing one is
//! `PreconditionFailed`.

use std::sync::Arc;

use tracing::{warn, Instrument};

use super::{authorize_object, existing_owner, load_upload_bucket, op_span};
use crate::errors::S3Error;
use crate::identity::Requester;
use crate::metadata::now_iso8601;
use crate::metadata::store::ObjectRecord;
use crate::multipart::PartRecord;
use crate::policy::actions;
use crate::AppState;

/// Start an upload and return its id.
pub async fn create_multipart_upload(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    key: &str,
) -> Result<String, S3Error> {
    async {
        let record = load_upload_bucket(&state, bucket).await?;
        let current_owner = existing_owner(&state, bucket, key).await?;
        authorize_object(
            &record,
            key,
            current_owner.as_deref(),
            actions::PUT_OBJECT,
            requester,
        )?;
        state.uploads.initiate(&record, key, &requester.canonical_id)
    }
    .instrument(op_span("CreateMultipartUpload", bucket))
    .await
}

/// Upload one part.  Re-sending a part number replaces the earlier part.
pub async fn upload_part(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: u32,
    body: &[u8],
) -> Result<PartRecord, S3Error> {
    async {
        let record = load_upload_bucket(&state, bucket).await?;
        let current_owner = existing_owner(&state, bucket, key).await?;
        authorize_object(
            &record,
            key,
            current_owner.as_deref(),
            actions::PUT_OBJECT,
            requester,
        )?;
        state.uploads.put_part(
            bucket,
            key,
            upload_id,
            part_number,
            body,
            &state.config.multipart,
        )
    }
    .instrument(op_span("UploadPart", bucket))
    .await
}

/// Parts accepted so far, in part-number order.
pub async fn list_parts(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Result<Vec<PartRecord>, S3Error> {
    async {
        let record = load_upload_bucket(&state, bucket).await?;
        authorize_object(&record, key, None, actions::LIST_MULTIPART_UPLOAD_PARTS, requester)?;
        state.uploads.list_parts(bucket, key, upload_id)
    }
    .instrument(op_span("ListParts", bucket))
    .await
}

/// Abort an upload.
///
/// Denied requests fail with `AccessDenied` before the upload is looked up.
/// Whether an unknown id is an error depends on the bucket's region and
/// `multipart.us_east_behavior`.
pub async fn abort_multipart_upload(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Result<(), S3Error> {
    async {
        let record = load_upload_bucket(&state, bucket).await?;
        authorize_object(&record, key, None, actions::ABORT_MULTIPART_UPLOAD, requester)?;
        state
            .uploads
            .abort(&record, key, upload_id, &state.config.multipart)
    }
    .instrument(op_span("AbortMultipartUpload", bucket))
    .await
}

/// Assemble the listed parts into an object owned by the upload initiator.
///
/// The upload only becomes `Completed` once the object is recorded; if the
/// store write fails the upload stays active with all its parts.
pub async fn complete_multipart_upload(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    key: &str,
    upload_id: &str,
    parts: &[(u32, String)],
) -> Result<ObjectRecord, S3Error> {
    async {
        let record = load_upload_bucket(&state, bucket).await?;
        let current_owner = existing_owner(&state, bucket, key).await?;
        authorize_object(
            &record,
            key,
            current_owner.as_deref(),
            actions::PUT_OBJECT,
            requester,
        )?;

        let done = state.uploads.begin_complete(bucket, key, upload_id, parts)?;
        let object = ObjectRecord {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: done.size,
            etag: done.etag,
            owner_id: done.owner_id,
            last_modified: now_iso8601(),
        };
        if let Err(e) = state.metadata.put_object(object.clone()).await {
            warn!(upload_id, error = %e, "recording completed object failed");
            state.uploads.cancel_complete(upload_id)?;
            return Err(e.into());
        }
        state.uploads.finish_complete(upload_id)?;
        Ok(object)
    }
    .instrument(op_span("CompleteMultipartUpload", bucket))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handlers::bucket::{create_bucket, put_bucket_policy};
    use crate::multipart::UploadState;

    const OWNER: &str = "owner-id";

    fn owner() -> Requester {
        Requester::new(OWNER)
    }

    fn config(us_east_behavior: bool) -> Config {
        let mut config = Config::default();
        config.multipart.us_east_behavior = us_east_behavior;
        config
    }

    async fn state_with_bucket(region: Option<&str>, us_east_behavior: bool) -> Arc<AppState> {
        let state = Arc::new(AppState::in_memory(config(us_east_behavior)));
        create_bucket(state.clone(), &owner(), "bkt", region).await.unwrap();
        state
    }

    /// Legacy-region bucket `bkt` with upload `U` on key `k` holding part 1.
    async fn legacy_scenario(us_east_behavior: bool) -> (Arc<AppState>, String) {
        let state = state_with_bucket(None, us_east_behavior).await;
        let upload_id = create_multipart_upload(state.clone(), &owner(), "bkt", "k")
            .await
            .unwrap();
        upload_part(state.clone(), &owner(), "bkt", "k", &upload_id, 1, b"part one")
            .await
            .unwrap();
        (state, upload_id)
    }

    #[tokio::test]
    async fn test_legacy_bucket_bogus_abort_follows_flag() {
        let (strict, _) = legacy_scenario(true).await;
        let err = abort_multipart_upload(strict.clone(), &owner(), "bkt", "k", "bogus")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");

        let lenient = Arc::new(strict.with_config(config(false)));
        abort_multipart_upload(lenient, &owner(), "bkt", "k", "bogus")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_legacy_bucket_real_abort_succeeds_with_either_flag() {
        for flag in [true, false] {
            let (state, upload_id) = legacy_scenario(flag).await;
            abort_multipart_upload(state.clone(), &owner(), "bkt", "k", &upload_id)
                .await
                .unwrap();
            assert_eq!(
                state.uploads.state(&upload_id).unwrap(),
                Some(UploadState::Aborted)
            );
        }
    }

    #[tokio::test]
    async fn test_regional_bucket_bogus_abort_fails_with_either_flag() {
        for flag in [true, false] {
            let state = state_with_bucket(Some("eu-west-1"), flag).await;
            let err = abort_multipart_upload(state, &owner(), "bkt", "k", "bogus")
                .await
                .unwrap_err();
            assert_eq!(err.code(), "NoSuchUpload");
        }
    }

    #[tokio::test]
    async fn test_abort_denied_before_upload_lookup() {
        let state = state_with_bucket(Some("eu-west-1"), false).await;
        let err = abort_multipart_upload(state, &Requester::new("stranger"), "bkt", "k", "bogus")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AccessDenied");
    }

    #[tokio::test]
    async fn test_missing_bucket_fails_upload_precondition() {
        let state = Arc::new(AppState::in_memory(Config::default()));
        let err = create_multipart_upload(state.clone(), &owner(), "ghost", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::PreconditionFailed));

        let err = abort_multipart_upload(state, &owner(), "ghost", "k", "bogus")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PreconditionFailed");
        assert_eq!(err.status_code(), http::StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn test_overwrite_authorized_alike_on_single_and_multipart_paths() {
        let state = state_with_bucket(Some("eu-west-1"), false).await;
        let writer = Requester::new("writer");
        let grant = r#"{"Statement":[{"Effect":"Allow","Principal":{"CanonicalUser":"writer"},"Action":"s3:PutObject","Resource":"arn:aws:s3:::bkt/*"}]}"#;
        put_bucket_policy(state.clone(), &owner(), "bkt", grant).await.unwrap();
        crate::handlers::object::put_object(state.clone(), &writer, "bkt", "k", b"v1")
            .await
            .unwrap();
        crate::handlers::bucket::delete_bucket_policy(state.clone(), &owner(), "bkt")
            .await
            .unwrap();

        // Without a policy the stored object's owner decides on both paths.
        assert!(
            crate::handlers::object::put_object(state.clone(), &writer, "bkt", "k", b"v2")
                .await
                .is_ok()
        );
        let upload_id = create_multipart_upload(state.clone(), &writer, "bkt", "k")
            .await
            .unwrap();
        let part = upload_part(state.clone(), &writer, "bkt", "k", &upload_id, 1, b"v3")
            .await
            .unwrap();
        complete_multipart_upload(
            state.clone(),
            &writer,
            "bkt",
            "k",
            &upload_id,
            &[(1, part.etag)],
        )
        .await
        .unwrap();

        let single = crate::handlers::object::put_object(state.clone(), &owner(), "bkt", "k", b"x")
            .await
            .unwrap_err();
        let multi = create_multipart_upload(state, &owner(), "bkt", "k")
            .await
            .unwrap_err();
        assert_eq!(single.code(), "AccessDenied");
        assert_eq!(multi.code(), "AccessDenied");
    }

    #[tokio::test]
    async fn test_failed_object_write_leaves_upload_retryable() {
        use crate::metadata::faulty::FaultyStore;
        use std::sync::atomic::Ordering;

        let store = Arc::new(FaultyStore::default());
        let state = Arc::new(AppState::new(config(true), store.clone()));
        create_bucket(state.clone(), &owner(), "bkt", None).await.unwrap();
        let upload_id = create_multipart_upload(state.clone(), &owner(), "bkt", "k")
            .await
            .unwrap();
        let part = upload_part(state.clone(), &owner(), "bkt", "k", &upload_id, 1, b"data")
            .await
            .unwrap();
        let requested = [(1, part.etag.clone())];

        store.fail_object_writes.store(true, Ordering::SeqCst);
        let err = complete_multipart_upload(state.clone(), &owner(), "bkt", "k", &upload_id, &requested)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InternalError");
        assert_eq!(
            state.uploads.state(&upload_id).unwrap(),
            Some(UploadState::Active)
        );
        assert_eq!(
            list_parts(state.clone(), &owner(), "bkt", "k", &upload_id)
                .await
                .unwrap(),
            vec![part]
        );
        assert!(state.metadata.get_object("bkt", "k").await.unwrap().is_none());

        store.fail_object_writes.store(false, Ordering::SeqCst);
        complete_multipart_upload(state.clone(), &owner(), "bkt", "k", &upload_id, &requested)
            .await
            .unwrap();
        assert_eq!(
            state.uploads.state(&upload_id).unwrap(),
            Some(UploadState::Completed)
        );
        assert!(state.metadata.get_object("bkt", "k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_policy_grants_abort_to_other_principal() {
        let state = state_with_bucket(Some("eu-west-1"), false).await;
        let doc = r#"{"Statement":[{"Effect":"Allow","Principal":{"CanonicalUser":"helper"},"Action":["s3:AbortMultipartUpload","s3:ListMultipartUploadParts"],"Resource":"arn:aws:s3:::bkt/*"}]}"#;
        put_bucket_policy(state.clone(), &owner(), "bkt", doc).await.unwrap();

        let upload_id = create_multipart_upload(state.clone(), &owner(), "bkt", "k")
            .await
            .unwrap();
        let helper = Requester::new("helper");
        assert!(list_parts(state.clone(), &helper, "bkt", "k", &upload_id)
            .await
            .unwrap()
            .is_empty());
        let err = upload_part(state.clone(), &helper, "bkt", "k", &upload_id, 1, b"x")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AccessDenied");

        abort_multipart_upload(state, &helper, "bkt", "k", &upload_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_complete_creates_object_owned_by_initiator() {
        let state = state_with_bucket(None, false).await;
        let upload_id = create_multipart_upload(state.clone(), &owner(), "bkt", "big")
            .await
            .unwrap();
        let p1 = upload_part(state.clone(), &owner(), "bkt", "big", &upload_id, 1, b"aaaa")
            .await
            .unwrap();
        let p2 = upload_part(state.clone(), &owner(), "bkt", "big", &upload_id, 2, b"bb")
            .await
            .unwrap();

        let object = complete_multipart_upload(
            state.clone(),
            &owner(),
            "bkt",
            "big",
            &upload_id,
            &[(1, p1.etag), (2, p2.etag)],
        )
        .await
        .unwrap();
        assert_eq!(object.size, 6);
        assert_eq!(object.owner_id, OWNER);
        assert!(object.etag.ends_with("-2\""));

        let stored = state.metadata.get_object("bkt", "big").await.unwrap().unwrap();
        assert_eq!(stored.etag, object.etag);

        // A completed upload is gone for abort purposes; legacy lenient mode
        // still reports success.
        abort_multipart_upload(state.clone(), &owner(), "bkt", "big", &upload_id)
            .await
            .unwrap();
        assert_eq!(
            state.uploads.state(&upload_id).unwrap(),
            Some(UploadState::Completed)
        );
    }

    #[tokio::test]
    async fn test_upload_part_after_abort() {
        let (state, upload_id) = legacy_scenario(false).await;
        abort_multipart_upload(state.clone(), &owner(), "bkt", "k", &upload_id)
            .await
            .unwrap();
        let err = upload_part(state, &owner(), "bkt", "k", &upload_id, 2, b"late")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");
    }
}
