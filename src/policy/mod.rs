//! Bucket policy authorization.
//!
//! - [`document`]: parsing and normalizing IAM-style policy JSON.
//! - [`resource`]: checking a policy's resources against its bucket.
//! - [`matcher`]: deciding whether one statement applies to a request.
//! - [`evaluator`]: combining statements with deny-override and the
//!   owner-only fallback.

pub mod document;
pub mod evaluator;
pub mod matcher;
pub mod resource;

pub use document::{BucketPolicy, Effect, PolicyStatement, Principal};
pub use evaluator::{is_bucket_authorized, is_object_authorized, PolicyDecision};
pub use resource::validate_policy_resource;

/// Action identifiers used by the operations in this crate.
pub mod actions {
    pub const DELETE_BUCKET: &str = "s3:DeleteBucket";
    pub const GET_BUCKET_POLICY: &str = "s3:GetBucketPolicy";
    pub const PUT_BUCKET_POLICY: &str = "s3:PutBucketPolicy";
    pub const DELETE_BUCKET_POLICY: &str = "s3:DeleteBucketPolicy";
    pub const GET_OBJECT: &str = "s3:GetObject";
    pub const PUT_OBJECT: &str = "s3:PutObject";
    pub const DELETE_OBJECT: &str = "s3:DeleteObject";
    pub const ABORT_MULTIPART_UPLOAD: &str = "s3:AbortMultipartUpload";
    pub const LIST_MULTIPART_UPLOAD_PARTS: &str = "s3:ListMultipartUploadParts";
}
