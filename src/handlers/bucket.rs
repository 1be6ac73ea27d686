//! Bucket-level operations: lifecycle and policy attachment.

use std::sync::Arc;

use tracing::{info, warn, Instrument};

use super::{authorize_bucket, load_bucket, op_span};
use crate::errors::S3Error;
use crate::identity::Requester;
use crate::metadata::now_iso8601;
use crate::metadata::store::{BucketExists, BucketRecord};
use crate::policy::actions;
use crate::policy::resource::first_invalid_resource;
use crate::policy::BucketPolicy;
use crate::AppState;

// -- Bucket name validation ---------------------------------------------------

/// Validate that a bucket name conforms to S3 naming rules.
///
/// - 3-63 characters of lowercase letters, digits, hyphens and periods
/// - begins and ends with a letter or digit
/// - not formatted as an IPv4 address
/// - no `xn--` prefix, no `-s3alias` or `--ol-s3` suffix
pub fn validate_bucket_name(name: &str) -> Result<(), S3Error> {
    let is_edge = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = name.as_bytes();

    let valid = (3..=63).contains(&bytes.len())
        && bytes
            .iter()
            .all(|b| is_edge(b) || *b == b'-' || *b == b'.')
        && bytes.first().is_some_and(is_edge)
        && bytes.last().is_some_and(is_edge)
        && !looks_like_ip(name)
        && !name.starts_with("xn--")
        && !name.ends_with("-s3alias")
        && !name.ends_with("--ol-s3");

    if valid {
        Ok(())
    } else {
        Err(S3Error::InvalidBucketName {
            name: name.to_string(),
        })
    }
}

/// Whether `s` is a dotted-quad IPv4 address such as `192.168.5.4`.
fn looks_like_ip(s: &str) -> bool {
    s.split('.').count() == 4 && s.split('.').all(|octet| octet.parse::<u8>().is_ok())
}

// -- Operations ---------------------------------------------------------------

/// Create a bucket owned by `requester`.
///
/// `location` is the requested region; an absent or empty constraint means
/// the configured default region.  Re-creating a bucket you already own is
/// a success in the legacy region and `BucketAlreadyOwnedByYou` elsewhere;
/// a bucket owned by someone else is `BucketAlreadyExists`.
pub async fn create_bucket(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    location: Option<&str>,
) -> Result<BucketRecord, S3Error> {
    async {
        validate_bucket_name(bucket)?;

        let region = location
            .filter(|l| !l.is_empty())
            .unwrap_or(&state.config.server.region)
            .to_string();

        if let Some(existing) = state.metadata.get_bucket(bucket).await? {
            return recreate_outcome(&state, existing, requester);
        }

        let record = BucketRecord {
            name: bucket.to_string(),
            created_at: now_iso8601(),
            region,
            owner_id: requester.canonical_id.clone(),
            owner_display: requester.canonical_id.clone(),
            policy: None,
        };
        if let Err(e) = state.metadata.create_bucket(record.clone()).await {
            // Lost a race with a concurrent create of the same name.
            if e.downcast_ref::<BucketExists>().is_some() {
                if let Some(existing) = state.metadata.get_bucket(bucket).await? {
                    return recreate_outcome(&state, existing, requester);
                }
            }
            return Err(e.into());
        }
        info!(region = %record.region, owner = %record.owner_id, "bucket created");
        Ok(record)
    }
    .instrument(op_span("CreateBucket", bucket))
    .await
}

/// Outcome of creating a bucket that already exists.
fn recreate_outcome(
    state: &AppState,
    existing: BucketRecord,
    requester: &Requester,
) -> Result<BucketRecord, S3Error> {
    if existing.owner_id != requester.canonical_id {
        return Err(S3Error::BucketAlreadyExists {
            bucket: existing.name,
        });
    }
    if existing.region == state.config.multipart.legacy_region {
        return Ok(existing);
    }
    Err(S3Error::BucketAlreadyOwnedByYou {
        bucket: existing.name,
    })
}

/// Delete an empty bucket.  Its in-progress uploads are aborted so a bucket
/// later created under the same name starts without them.
pub async fn delete_bucket(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
) -> Result<(), S3Error> {
    async {
        let record = load_bucket(&state, bucket).await?;
        authorize_bucket(&record, actions::DELETE_BUCKET, requester)?;

        if state.metadata.count_objects(bucket).await? > 0 {
            return Err(S3Error::BucketNotEmpty {
                bucket: bucket.to_string(),
            });
        }

        state.metadata.delete_bucket(bucket).await?;
        let aborted_uploads = state.uploads.abort_bucket(bucket)?;
        info!(aborted_uploads, "bucket deleted");
        Ok(())
    }
    .instrument(op_span("DeleteBucket", bucket))
    .await
}

/// Attach a policy document, replacing any previous one.
///
/// The document must parse and every resource must be the bucket ARN or
/// `<bucket ARN>/*`; otherwise nothing is stored.
pub async fn put_bucket_policy(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
    body: &str,
) -> Result<(), S3Error> {
    async {
        let record = load_bucket(&state, bucket).await?;
        authorize_bucket(&record, actions::PUT_BUCKET_POLICY, requester)?;

        let policy = BucketPolicy::parse(body).inspect_err(|e| {
            warn!(error = %e, "rejected malformed bucket policy");
        })?;
        if let Some(resource) = first_invalid_resource(bucket, &policy) {
            warn!(resource, "rejected bucket policy with foreign resource");
            return Err(S3Error::InvalidPolicyResource {
                resource: resource.to_string(),
            });
        }

        let statements = policy.statements.len();
        state
            .metadata
            .set_bucket_policy(bucket, Some(Arc::new(policy)))
            .await?;
        info!(statements, "bucket policy replaced");
        Ok(())
    }
    .instrument(op_span("PutBucketPolicy", bucket))
    .await
}

/// The attached policy document, exactly as submitted.
pub async fn get_bucket_policy(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
) -> Result<String, S3Error> {
    async {
        let record = load_bucket(&state, bucket).await?;
        authorize_bucket(&record, actions::GET_BUCKET_POLICY, requester)?;

        record
            .policy
            .map(|p| p.as_json().to_string())
            .ok_or_else(|| S3Error::NoSuchBucketPolicy {
                bucket: bucket.to_string(),
            })
    }
    .instrument(op_span("GetBucketPolicy", bucket))
    .await
}

/// Detach the policy.  Deleting an absent policy succeeds.
pub async fn delete_bucket_policy(
    state: Arc<AppState>,
    requester: &Requester,
    bucket: &str,
) -> Result<(), S3Error> {
    async {
        let record = load_bucket(&state, bucket).await?;
        authorize_bucket(&record, actions::DELETE_BUCKET_POLICY, requester)?;

        state.metadata.set_bucket_policy(bucket, None).await?;
        info!("bucket policy removed");
        Ok(())
    }
    .instrument(op_span("DeleteBucketPolicy", bucket))
    .await
}

// -- Tests --------------------------------------------------------------------
