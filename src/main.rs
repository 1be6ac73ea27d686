//! bleepstore-authz -- offline bucket policy checks.
//!
//! `check-policy` validates a policy document against a bucket the same way
//! `PutBucketPolicy` does; `evaluate` runs one authorization decision and
//! prints `allow` or `deny`.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Span};

use bleepstore_authz::config::{Config, LoggingConfig};
use bleepstore_authz::handlers::bucket;
use bleepstore_authz::identity::Requester;
use bleepstore_authz::metadata::now_iso8601;
use bleepstore_authz::metadata::store::BucketRecord;
use bleepstore_authz::policy::{is_bucket_authorized, is_object_authorized, BucketPolicy};
use bleepstore_authz::AppState;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "bleepstore-authz",
    version,
    about = "Bucket policy validation and evaluation"
)]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a policy and check its resources against a bucket.
    CheckPolicy {
        /// Target bucket name.
        #[arg(long)]
        bucket: String,
        /// Path to the policy JSON document.
        #[arg(long)]
        policy: String,
    },
    /// Decide whether a principal may perform an action.
    Evaluate {
        /// Bucket name.
        #[arg(long)]
        bucket: String,
        /// Canonical id of the bucket owner.
        #[arg(long)]
        owner: String,
        /// Path to the policy JSON document; omit for no policy.
        #[arg(long)]
        policy: Option<String>,
        /// Canonical id of the requester.
        #[arg(long)]
        principal: String,
        /// Account identity of the requester (account id, root or user ARN).
        #[arg(long)]
        arn: Option<String>,
        /// Action, e.g. `s3:GetObject`.
        #[arg(long)]
        action: String,
        /// Object key; makes this an object-level decision.
        #[arg(long)]
        key: Option<String>,
        /// Canonical id of the object owner, when the object exists.
        #[arg(long)]
        object_owner: Option<String>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => bleepstore_authz::config::load_config(path)?,
        None => Config::default(),
    };
    init_tracing(&config.logging);
    bleepstore_authz::metrics::describe_metrics();

    match cli.command {
        Command::CheckPolicy { bucket, policy } => check_policy(config, &bucket, &policy).await,
        Command::Evaluate {
            bucket,
            owner,
            policy,
            principal,
            arn,
            action,
            key,
            object_owner,
        } => {
            let policy = policy.as_deref().map(read_policy).transpose()?;
            let record = BucketRecord {
                name: bucket,
                created_at: now_iso8601(),
                region: config.server.region.clone(),
                owner_display: owner.clone(),
                owner_id: owner,
                policy: policy.map(Arc::new),
            };
            let requester = match arn {
                Some(arn) => Requester::new(principal).with_arn(arn),
                None => Requester::new(principal),
            };
            let span = Span::current();
            let allowed = match &key {
                Some(key) => is_object_authorized(
                    &record,
                    key,
                    object_owner.as_deref(),
                    &action,
                    &requester,
                    &span,
                ),
                None => is_bucket_authorized(&record, &action, &requester, &span),
            };
            println!("{}", if allowed { "allow" } else { "deny" });
            Ok(())
        }
    }
}

/// Run the document through `PutBucketPolicy` against a scratch bucket.
async fn check_policy(config: Config, bucket_name: &str, path: &str) -> anyhow::Result<()> {
    let body = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let state = Arc::new(AppState::in_memory(config));
    let owner = Requester::new("policy-check");

    bucket::create_bucket(state.clone(), &owner, bucket_name, None).await?;
    bucket::put_bucket_policy(state, &owner, bucket_name, &body).await?;
    info!(bucket = bucket_name, "policy accepted");
    println!("ok");
    Ok(())
}

fn read_policy(path: &str) -> anyhow::Result<BucketPolicy> {
    let body = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    Ok(BucketPolicy::parse(&body)?)
}
