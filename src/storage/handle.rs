use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task;
use tokio::time::timeout;

use super::database::MeterDatabase;
use super::error::StorageError;

/// Transient store failure. SQLite errors, worker panics, and elapsed
/// deadlines all collapse into this one value so callers apply a single
/// fail-open/fail-silent policy.
#[derive(Debug, Error)]
#[error("store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

/// Async access to the blocking SQLite store. Calls run on the blocking
/// thread pool under a bounded deadline; nothing on the serving path ever
/// waits on the store longer than the configured timeout.
#[derive(Clone)]
pub struct StoreHandle {
    database: Arc<MeterDatabase>,
    deadline: Duration,
}

impl StoreHandle {
    pub fn new(database: Arc<MeterDatabase>, deadline: Duration) -> Self {
        Self { database, deadline }
    }

    pub fn database(&self) -> Arc<MeterDatabase> {
        Arc::clone(&self.database)
    }

    pub async fn run<T, F>(&self, op: F) -> Result<T, StoreUnavailable>
    where
        T: Send + 'static,
        F: FnOnce(&MeterDatabase) -> Result<T, StorageError> + Send + 'static,
    {
        let database = Arc::clone(&self.database);
        let call = task::spawn_blocking(move || op(&database));

        match timeout(self.deadline, call).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(StoreUnavailable(err.to_string())),
            Ok(Err(join_err)) => Err(StoreUnavailable(join_err.to_string())),
            Err(_) => Err(StoreUnavailable(format!(
                "store call exceeded {}ms deadline",
                self.deadline.as_millis()
            ))),
        }
    }
}
