//! DynamoDB-backed implementation of `scheduler_core::ports::RecordStore`.
//!
//! Job records are stored as a single JSON blob under a `record` attribute,
//! keyed by `job_id`, with a numeric `version` attribute mirrored out of the
//! blob so the conditional write can target it directly. This keeps the
//! schema to one attribute we actually query on and avoids projecting every
//! `JobRecord` field into its own column.

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as AwsDynamoClient;
use scheduler_core::error::SchedulerError;
use scheduler_core::model::{JobRecord, JobStatus};
use scheduler_core::ports::RecordStore;

#[derive(Debug, Clone)]
pub struct DynamoGatewayConfig {
    pub table_name: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl DynamoGatewayConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            region: None,
            endpoint: None,
        }
    }
}

#[derive(Clone)]
pub struct DynamoRecordStore {
    client: AwsDynamoClient,
    table_name: String,
}

impl DynamoRecordStore {
    pub async fn new(config: DynamoGatewayConfig) -> Result<Self, SchedulerError> {
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
        let client = AwsDynamoClient::new(&aws_config);

        Ok(Self {
            client,
            table_name: config.table_name,
        })
    }

    fn encode(record: &JobRecord) -> Result<String, SchedulerError> {
        serde_json::to_string(record)
            .map_err(|e| SchedulerError::Internal(format!("encode job record: {e}")))
    }

    fn decode(blob: &str) -> Result<JobRecord, SchedulerError> {
        serde_json::from_str(blob)
            .map_err(|e| SchedulerError::Internal(format!("decode job record: {e}")))
    }
}

#[async_trait::async_trait]
impl RecordStore for DynamoRecordStore {
    async fn create(&self, record: JobRecord) -> Result<(), SchedulerError> {
        let blob = Self::encode(&record)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("job_id", AttributeValue::S(record.job_id.clone()))
            .item("version", AttributeValue::N(record.version.to_string()))
            .item("record", AttributeValue::S(blob))
            .condition_expression("attribute_not_exists(job_id)")
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("ConditionalCheckFailed") {
                    SchedulerError::Internal(format!("job {} already exists", record.job_id))
                } else {
                    SchedulerError::BackendUnavailable(format!("dynamodb put_item: {e}"))
                }
            })?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, SchedulerError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("job_id", AttributeValue::S(job_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| SchedulerError::BackendUnavailable(format!("dynamodb get_item: {e}")))?;

        let Some(item) = response.item else {
            return Ok(None);
        };
        let blob = item
            .get("record")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| SchedulerError::Internal(format!("job {job_id} missing record attribute")))?;

        Ok(Some(Self::decode(blob)?))
    }

    async fn compare_and_swap(
        &self,
        job_id: &str,
        expected_version: u64,
        new_record: JobRecord,
    ) -> Result<bool, SchedulerError> {
        let blob = Self::encode(&new_record)?;
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("job_id", AttributeValue::S(job_id.to_string()))
            .item("version", AttributeValue::N(new_record.version.to_string()))
            .item("record", AttributeValue::S(blob))
            .condition_expression("version = :expected")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().contains("ConditionalCheckFailed") => Ok(false),
            Err(e) => Err(SchedulerError::BackendUnavailable(format!(
                "dynamodb conditional put_item: {e}"
            ))),
        }
    }

    /// Full-table scan, decoding and filtering client-side. The sweeper
    /// runs off the request path and RUNNING jobs are a small fraction of
    /// the table, so this avoids maintaining a secondary status index.
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, SchedulerError> {
        let mut matches = Vec::new();
        let mut last_key = None;

        loop {
            let mut request = self.client.scan().table_name(&self.table_name);
            if let Some(key) = last_key.clone() {
                request = request.set_exclusive_start_key(Some(key));
            }
            let response = request
                .send()
                .await
                .map_err(|e| SchedulerError::BackendUnavailable(format!("dynamodb scan: {e}")))?;

            for item in response.items.unwrap_or_default() {
                if let Some(blob) = item.get("record").and_then(|v| v.as_s().ok()) {
                    let record = Self::decode(blob)?;
                    if record.status == status {
                        matches.push(record);
                    }
                }
            }

            last_key = response.last_evaluated_key;
            if last_key.is_none() {
                break;
            }
        }

        Ok(matches)
    }
}

/// In-memory record store used for `--dev` mode and tests.
pub mod dev {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    pub struct InMemoryRecordStore {
        records: Arc<Mutex<HashMap<String, JobRecord>>>,
    }

    impl InMemoryRecordStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait::async_trait]
    impl RecordStore for InMemoryRecordStore {
        async fn create(&self, record: JobRecord) -> Result<(), SchedulerError> {
            let mut records = self.records.lock().await;
            if records.contains_key(&record.job_id) {
                return Err(SchedulerError::Internal(format!(
                    "job {} already exists",
                    record.job_id
                )));
            }
            records.insert(record.job_id.clone(), record);
            Ok(())
        }

        async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, SchedulerError> {
            Ok(self.records.lock().await.get(job_id).cloned())
        }

        async fn compare_and_swap(
            &self,
            job_id: &str,
            expected_version: u64,
            new_record: JobRecord,
        ) -> Result<bool, SchedulerError> {
            let mut records = self.records.lock().await;
            match records.get(job_id) {
                Some(current) if current.version == expected_version => {
                    records.insert(job_id.to_string(), new_record);
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Err(SchedulerError::NotFound(job_id.to_string())),
            }
        }

        async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, SchedulerError> {
            Ok(self
                .records
                .lock()
                .await
                .values()
                .filter(|r| r.status == status)
                .cloned()
                .collect())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use scheduler_core::model::JobSettings;
        use scheduler_core::role::Role;

        fn sample(job_id: &str) -> JobRecord {
            JobRecord::new(
                job_id.to_string(),
                "tok".to_string(),
                Role::Developer,
                "req".to_string(),
                "canon".to_string(),
                "program/ref".to_string(),
                128,
                JobSettings::default(),
                false,
                chrono::Utc::now(),
            )
        }

        #[tokio::test]
        async fn create_rejects_duplicate_job_id() {
            let store = InMemoryRecordStore::new();
            store.create(sample("job-1")).await.unwrap();
            assert!(store.create(sample("job-1")).await.is_err());
        }

        #[tokio::test]
        async fn cas_fails_on_version_mismatch() {
            let store = InMemoryRecordStore::new();
            store.create(sample("job-1")).await.unwrap();
            let mut updated = sample("job-1");
            updated.version = 99;
            let ok = store.compare_and_swap("job-1", 99, updated).await.unwrap();
            assert!(!ok);
        }

        #[tokio::test]
        async fn cas_succeeds_on_matching_version() {
            let store = InMemoryRecordStore::new();
            store.create(sample("job-1")).await.unwrap();
            let mut updated = sample("job-1");
            updated.version = 2;
            let ok = store.compare_and_swap("job-1", 1, updated).await.unwrap();
            assert!(ok);
        }
    }
}
