//! S3-backed implementation of `scheduler_core::ports::ObjectStoreGateway`.

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as AwsS3Client;
use chrono::{DateTime, Utc};
use scheduler_core::error::SchedulerError;
use scheduler_core::ports::{ObjectStoreGateway, PresignedUrl};
use std::time::Duration;

/// Configuration for the S3 object-store gateway.
#[derive(Debug, Clone)]
pub struct S3GatewayConfig {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    pub presign_ttl_seconds: u64,
}

impl S3GatewayConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            force_path_style: false,
            presign_ttl_seconds: 900,
        }
    }
}

/// Object-store gateway backed by AWS S3 (or an S3-compatible endpoint).
#[derive(Clone)]
pub struct S3Gateway {
    client: AwsS3Client,
    config: S3GatewayConfig,
}

impl S3Gateway {
    pub async fn new(config: S3GatewayConfig) -> Result<Self, SchedulerError> {
        let region_provider = if let Some(region) = &config.region {
            RegionProviderChain::first_try(Region::new(region.clone()))
        } else {
            RegionProviderChain::default_provider()
        };

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = AwsS3Client::from_conf(builder.build());

        Ok(Self { client, config })
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.presign_ttl_seconds)
    }

    fn expires_at(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(self.config.presign_ttl_seconds as i64)
    }
}

#[async_trait::async_trait]
impl ObjectStoreGateway for S3Gateway {
    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), SchedulerError> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(bytes.to_vec().into())
            .send()
            .await
            .map_err(|e| SchedulerError::Internal(format!("s3 put_object {key}: {e}")))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, SchedulerError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SchedulerError::Internal(format!("s3 get_object {key}: {e}")))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| SchedulerError::Internal(format!("s3 get_object body {key}: {e}")))?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn presign_put(&self, key: &str) -> Result<PresignedUrl, SchedulerError> {
        let presign_config = PresigningConfig::expires_in(self.ttl())
            .map_err(|e| SchedulerError::Internal(format!("invalid presign ttl: {e}")))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| SchedulerError::Internal(format!("s3 presign_put {key}: {e}")))?;

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            expires_at: self.expires_at(),
        })
    }

    async fn presign_get(&self, key: &str) -> Result<PresignedUrl, SchedulerError> {
        let presign_config = PresigningConfig::expires_in(self.ttl())
            .map_err(|e| SchedulerError::Internal(format!("invalid presign ttl: {e}")))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| SchedulerError::Internal(format!("s3 presign_get {key}: {e}")))?;

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            expires_at: self.expires_at(),
        })
    }

    async fn delete_object(&self, key: &str) {
        if let Err(e) = self
            .client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            tracing::warn!(key, error = %e, "best-effort object-store cleanup failed");
        }
    }
}

/// In-memory object store used for `--dev` mode and tests. Never persists
/// across process restarts.
pub mod dev {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    pub struct InMemoryObjectStore {
        objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl InMemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait::async_trait]
    impl ObjectStoreGateway for InMemoryObjectStore {
        async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), SchedulerError> {
            self.objects
                .lock()
                .await
                .insert(key.to_string(), bytes.to_vec());
            Ok(())
        }

        async fn get_object(&self, key: &str) -> Result<Vec<u8>, SchedulerError> {
            self.objects
                .lock()
                .await
                .get(key)
                .cloned()
                .ok_or_else(|| SchedulerError::Internal(format!("no such object: {key}")))
        }

        async fn presign_put(&self, key: &str) -> Result<PresignedUrl, SchedulerError> {
            Ok(PresignedUrl {
                url: format!("dev://put/{key}"),
                expires_at: Utc::now() + chrono::Duration::seconds(900),
            })
        }

        async fn presign_get(&self, key: &str) -> Result<PresignedUrl, SchedulerError> {
            Ok(PresignedUrl {
                url: format!("dev://get/{key}"),
                expires_at: Utc::now() + chrono::Duration::seconds(900),
            })
        }

        async fn delete_object(&self, key: &str) {
            self.objects.lock().await.remove(key);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn put_then_presign_get_roundtrips_key() {
            let store = InMemoryObjectStore::new();
            store.put_object("jobs/abc/program", b"payload").await.unwrap();
            let url = store.presign_get("jobs/abc/program").await.unwrap();
            assert!(url.url.contains("jobs/abc/program"));
        }

        #[tokio::test]
        async fn delete_object_is_idempotent() {
            let store = InMemoryObjectStore::new();
            store.delete_object("missing").await;
            store.delete_object("missing").await;
        }
    }
}
