//! Concrete implementations of `scheduler_core::ports` against AWS: S3 for
//! the object store, DynamoDB for the record store, SSM for the catalog
//! document, and an HTTP client for the token-info service. Each module
//! also carries an in-memory/file-backed `dev` variant for `--dev` mode and
//! for tests that would otherwise need real AWS credentials.

pub mod object_store;
pub mod param_store;
pub mod record_store;
pub mod token;

pub use object_store::{S3Gateway, S3GatewayConfig};
pub use param_store::{SsmParamStore, SsmParamStoreConfig};
pub use record_store::{DynamoGatewayConfig, DynamoRecordStore};
pub use token::{HttpTokenService, TokenServiceConfig};
