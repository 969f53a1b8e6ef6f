pub mod memory;
pub mod s3;

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::Result;
use common::config::StorageSettings;

pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// `None` once the store has no more pages.
    pub next_token: Option<String>,
}

/// Read-only view of an object store shared by every fetch worker.
///
/// `get_object` reports missing objects as [`common::Error::NotFound`],
/// permission problems as [`common::Error::AccessDenied`], timeouts as
/// [`common::Error::Timeout`] and anything else as
/// [`common::Error::Storage`].
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;
}

#[derive(Clone, Debug)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl From<&StorageSettings> for S3Config {
    fn from(settings: &StorageSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            region: settings.region.clone(),
            access_key: settings.access_key.clone(),
            secret_key: settings.secret_key.clone(),
        }
    }
}

/// Builds an S3 client. Static credentials are used when both keys are
/// configured, otherwise the default AWS provider chain applies.
pub async fn create_s3_client(config: &S3Config) -> S3Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        loader = loader.credentials_provider(credentials);
    }

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let shared = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(config.endpoint.is_some())
        .build();

    S3Client::from_conf(s3_config)
}
