//! SSM-backed loader for the backend catalog document (SPEC_FULL §4.5).
//!
//! The catalog TOML is stored as a single SSM parameter; `reload()` re-reads
//! it so an operator can roll out a new catalog without restarting the
//! control plane.

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_ssm::config::Region;
use aws_sdk_ssm::Client as AwsSsmClient;
use scheduler_core::error::SchedulerError;
use scheduler_core::ports::CatalogSource;

#[derive(Debug, Clone)]
pub struct SsmParamStoreConfig {
    pub parameter_name: String,
    pub region: Option<String>,
}

impl SsmParamStoreConfig {
    pub fn new(parameter_name: impl Into<String>) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            region: None,
        }
    }
}

/// Fetches the catalog TOML document from AWS Systems Manager Parameter
/// Store.
#[derive(Clone)]
pub struct SsmParamStore {
    client: AwsSsmClient,
    parameter_name: String,
}

impl SsmParamStore {
    pub async fn new(config: SsmParamStoreConfig) -> Result<Self, SchedulerError> {
        let region_provider = if let Some(region) = &config.region {
            RegionProviderChain::first_try(Region::new(region.clone()))
        } else {
            RegionProviderChain::default_provider()
        };
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        let client = AwsSsmClient::new(&aws_config);

        Ok(Self {
            client,
            parameter_name: config.parameter_name,
        })
    }

    /// Fetch the current catalog document text.
    pub async fn fetch(&self) -> Result<String, SchedulerError> {
        let response = self
            .client
            .get_parameter()
            .name(&self.parameter_name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| {
                SchedulerError::BackendUnavailable(format!(
                    "ssm get_parameter {}: {e}",
                    self.parameter_name
                ))
            })?;

        response
            .parameter
            .and_then(|p| p.value)
            .ok_or_else(|| {
                SchedulerError::Internal(format!(
                    "ssm parameter {} has no value",
                    self.parameter_name
                ))
            })
    }
}

#[async_trait::async_trait]
impl CatalogSource for SsmParamStore {
    async fn fetch(&self) -> Result<String, SchedulerError> {
        SsmParamStore::fetch(self).await
    }
}

/// File-backed loader used for `--dev` mode and tests: reads the catalog
/// TOML straight off disk, re-reading on every `fetch()` call.
pub mod dev {
    use super::*;
    use std::path::PathBuf;

    #[derive(Clone)]
    pub struct FileParamStore {
        path: PathBuf,
    }

    impl FileParamStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub async fn fetch(&self) -> Result<String, SchedulerError> {
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| {
                    SchedulerError::Internal(format!(
                        "read catalog file {}: {e}",
                        self.path.display()
                    ))
                })
        }
    }

    #[async_trait::async_trait]
    impl CatalogSource for FileParamStore {
        async fn fetch(&self) -> Result<String, SchedulerError> {
            FileParamStore::fetch(self).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Write;

        #[tokio::test]
        async fn reads_catalog_file_contents() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "[backends.ibmq]\nstatus = \"active\"").unwrap();
            let store = FileParamStore::new(file.path());
            let contents = store.fetch().await.unwrap();
            assert!(contents.contains("ibmq"));
        }

        #[tokio::test]
        async fn missing_file_is_an_error() {
            let store = FileParamStore::new("/nonexistent/catalog.toml");
            assert!(store.fetch().await.is_err());
        }
    }
}
