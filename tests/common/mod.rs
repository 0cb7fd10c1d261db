#![allow(dead_code)]

use aws_sdk_dynamodb::operation::create_table::CreateTableInput;
use dynamo_mapper::{TableStatus, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::{Mutex, Once};
use tracing_subscriber::EnvFilter;

/// Install a test subscriber once per binary. Filter with `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Records every CreateTable request and replays scripted failures and
/// table statuses.
#[derive(Default)]
pub struct MockTransport {
    pub requests: Mutex<Vec<CreateTableInput>>,
    pub failures: Mutex<VecDeque<TransportError>>,
    pub statuses: Mutex<VecDeque<Option<TableStatus>>>,
}

impl MockTransport {
    pub fn failing_with(failures: Vec<TransportError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            ..Self::default()
        }
    }

    pub fn with_statuses(statuses: Vec<Option<TableStatus>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    async fn create_table(&self, input: CreateTableInput) -> Result<(), TransportError> {
        self.requests.lock().unwrap().push(input);
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn table_status(&self, _table: &str) -> Result<Option<TableStatus>, TransportError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Some(TableStatus::Active)))
    }
}
