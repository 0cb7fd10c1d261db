//! DynamoDB client module.
//!
//! [`Db`] pairs a [`Transport`] with the [`RetryPolicy`] used for every
//! call. The transport is normally the SDK [`Client`], built from a
//! [`ClientConfig`] that supports several credential sources:
//! - Environment variables
//! - Hardcoded credentials
//! - AWS profiles

use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::operation::create_table::CreateTableInput;
use aws_sdk_dynamodb::types::TableStatus;
use aws_sdk_dynamodb::Client;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{Error, Result, TransportError, TransportErrorKind};
use crate::retry::{with_retry_until, RetryPolicy};
use crate::table_operations::CreateTable;
use crate::value::Marshal;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The calls the crate makes against DynamoDB.
pub trait Transport: Send + Sync {
    /// Submit a prepared CreateTable request.
    fn create_table(
        &self,
        input: CreateTableInput,
    ) -> impl Future<Output = std::result::Result<(), TransportError>> + Send;

    /// Current status of a table. `None` while the table is not visible yet.
    fn table_status(
        &self,
        table: &str,
    ) -> impl Future<Output = std::result::Result<Option<TableStatus>, TransportError>> + Send;
}

impl Transport for Client {
    async fn create_table(&self, input: CreateTableInput) -> std::result::Result<(), TransportError> {
        self.create_table()
            .set_table_name(input.table_name)
            .set_attribute_definitions(input.attribute_definitions)
            .set_key_schema(input.key_schema)
            .set_local_secondary_indexes(input.local_secondary_indexes)
            .set_global_secondary_indexes(input.global_secondary_indexes)
            .set_billing_mode(input.billing_mode)
            .set_provisioned_throughput(input.provisioned_throughput)
            .set_stream_specification(input.stream_specification)
            .set_sse_specification(input.sse_specification)
            .set_tags(input.tags)
            .set_table_class(input.table_class)
            .set_deletion_protection_enabled(input.deletion_protection_enabled)
            .send()
            .await?;
        Ok(())
    }

    async fn table_status(
        &self,
        table: &str,
    ) -> std::result::Result<Option<TableStatus>, TransportError> {
        match self.describe_table().table_name(table).send().await {
            Ok(response) => Ok(response
                .table()
                .and_then(|description| description.table_status())
                .cloned()),
            Err(e) => {
                let err = TransportError::from(e);
                if err.kind() == TransportErrorKind::TableNotFound {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// Settings for building the SDK client.
///
/// Credentials are picked in order of priority:
/// 1. Hardcoded credentials (access_key, secret_key, session_token)
/// 2. AWS profile from ~/.aws/credentials
/// 3. Default credential chain (environment, instance profile, etc.)
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub region: Option<String>,
    /// Custom endpoint for local testing (localstack, moto, DynamoDB Local).
    pub endpoint_url: Option<String>,
    pub profile: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
}

impl ClientConfig {
    /// The region the client ends up in: explicit, then `AWS_REGION`, then
    /// `AWS_DEFAULT_REGION`, then `us-east-1`.
    pub fn resolved_region(&self) -> String {
        self.region.clone().unwrap_or_else(|| {
            std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|_| "us-east-1".to_string())
        })
    }
}

/// Build the AWS SDK DynamoDB client with the given configuration.
pub async fn build_client(config: ClientConfig) -> Client {
    let region_provider = RegionProviderChain::first_try(config.region.map(Region::new))
        .or_default_provider()
        .or_else("us-east-1");

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    // Credentials priority: hardcoded > profile > env/default chain
    if let (Some(ak), Some(sk)) = (config.access_key, config.secret_key) {
        let creds = Credentials::new(ak, sk, config.session_token, None, "dynamo-mapper-hardcoded");
        config_loader = config_loader.credentials_provider(creds);
    } else if let Some(profile_name) = config.profile {
        let profile_provider = ProfileFileCredentialsProvider::builder()
            .profile_name(&profile_name)
            .build();
        config_loader = config_loader.credentials_provider(profile_provider);
    }

    let sdk_config = config_loader.load().await;

    let mut dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config);

    if let Some(url) = config.endpoint_url {
        dynamo_config = dynamo_config.endpoint_url(url);
    }

    Client::from_conf(dynamo_config.build())
}

/// Entry point for table operations.
#[derive(Debug, Clone)]
pub struct Db<T = Client> {
    transport: T,
    retry: RetryPolicy,
}

impl Db<Client> {
    pub fn new(client: Client) -> Self {
        Self::with_transport(client)
    }

    /// Build an SDK client from `config` and wrap it.
    pub async fn connect(config: ClientConfig) -> Self {
        debug!(region = %config.resolved_region(), endpoint = ?config.endpoint_url, "connecting to DynamoDB");
        Self::new(build_client(config).await)
    }
}

impl<T: Transport> Db<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used by every call.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Begin creating table `name` with keys and indexes taken from the
    /// annotations of `example`.
    pub fn create_table(&self, name: impl Into<String>, example: &dyn Marshal) -> CreateTable<'_, T> {
        CreateTable::new(self, name, example)
    }

    /// Poll until `table` is ACTIVE.
    ///
    /// A table that is not visible yet is polled again. The wait is bounded
    /// by the retry policy's timeout.
    pub async fn wait_until_active(&self, table: &str, cancel: &CancellationToken) -> Result<()> {
        self.wait_until_active_by(table, self.retry.deadline(), cancel)
            .await
    }

    /// Poll until `table` is ACTIVE or `deadline` passes. Each status call
    /// retries against the same deadline.
    pub async fn wait_until_active_by(
        &self,
        table: &str,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let status = with_retry_until(&self.retry, deadline, cancel, || {
                self.transport.table_status(table)
            })
            .await?;
            if status == Some(TableStatus::Active) {
                debug!(table, "table is active");
                return Ok(());
            }
            debug!(table, status = ?status, "waiting for table");

            if let Some(deadline) = deadline {
                if Instant::now() + POLL_INTERVAL > deadline {
                    return Err(Error::DeadlineExceeded);
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Canceled),
                _ = sleep(POLL_INTERVAL) => {}
            }
        }
    }
}
