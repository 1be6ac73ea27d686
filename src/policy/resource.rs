//! Resource validation for policies about to be attached to a bucket.

use super::document::BucketPolicy;

/// ARN prefix shared by every S3 bucket and object resource.
pub const S3_ARN_PREFIX: &str = "arn:aws:s3:::";

/// ARN of a bucket.
pub fn bucket_arn(bucket: &str) -> String {
    format!("{S3_ARN_PREFIX}{bucket}")
}

/// ARN of an object inside a bucket.
pub fn object_arn(bucket: &str, key: &str) -> String {
    format!("{S3_ARN_PREFIX}{bucket}/{key}")
}

/// Check that every statement of `policy` only names `bucket_name` itself or
/// all of its objects.
///
/// Accepted resources are exactly `arn:aws:s3:::<bucket>` and
/// `arn:aws:s3:::<bucket>/*`.  A statement with no resources, a bare bucket
/// name, or any other bucket's ARN fails the whole policy.
pub fn validate_policy_resource(bucket_name: &str, policy: &BucketPolicy) -> bool {
    first_invalid_resource(bucket_name, policy).is_none()
}

/// The first resource that fails validation, or `None` if all pass.  An
/// empty resource list is reported as the empty string.
pub fn first_invalid_resource<'a>(bucket_name: &str, policy: &'a BucketPolicy) -> Option<&'a str> {
    for stmt in &policy.statements {
        if stmt.resources.is_empty() {
            return Some("");
        }
        if let Some(bad) = stmt
            .resources
            .iter()
            .find(|r| !is_valid_resource(bucket_name, r))
        {
            return Some(bad);
        }
    }
    None
}

fn is_valid_resource(bucket_name: &str, resource: &str) -> bool {
    match resource.strip_prefix(S3_ARN_PREFIX) {
        Some(rest) => rest == bucket_name || rest.strip_suffix("/*") == Some(bucket_name),
        None => false,
    }
}
