use crate::{
    error::ConnectionError,
    retry::{RetryDisposition, RetryError, RetryPolicy},
};
use connectors::{
    error::StoreError,
    store::{Connector, DocumentStore},
};
use mobc::{Manager, Pool, async_trait};
use std::{ops::Deref, sync::Arc, time::Duration};
use tracing::{info, warn};

/// Opens and health-checks sessions for the pool.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
}

#[async_trait]
impl Manager for SessionManager {
    type Connection = Arc<dyn DocumentStore>;
    type Error = StoreError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.connector.connect().await
    }

    async fn check(&self, conn: Self::Connection) -> Result<Self::Connection, Self::Error> {
        conn.ping().await?;
        Ok(conn)
    }
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Upper bound on sessions checked out at once.
    pub max_sessions: u64,
    pub acquire_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            max_sessions: 8,
            acquire_timeout: Duration::from_secs(30),
            retry: RetryPolicy::for_connection(),
        }
    }
}

/// A checked-out session. Returned to the pool when dropped, whatever the
/// exit path of the holder.
pub struct Session(mobc::Connection<SessionManager>);

impl Deref for Session {
    type Target = dyn DocumentStore;

    fn deref(&self) -> &Self::Target {
        &**self.0
    }
}

/// Run-scoped pool of database sessions.
pub struct ConnectionManager {
    pool: Pool<SessionManager>,
    retry: RetryPolicy,
    endpoint: String,
}

impl From<mobc::Error<StoreError>> for ConnectionError {
    fn from(err: mobc::Error<StoreError>) -> Self {
        match err {
            mobc::Error::Inner(inner) => ConnectionError::Store(inner),
            mobc::Error::Timeout => ConnectionError::Timeout,
            mobc::Error::BadConn => ConnectionError::BadConnection,
            mobc::Error::PoolClosed => ConnectionError::PoolClosed,
        }
    }
}

pub fn classify_connection_error(err: &ConnectionError) -> RetryDisposition {
    match err {
        ConnectionError::Store(store) if store.is_retryable() => RetryDisposition::Retry,
        ConnectionError::Store(_) => RetryDisposition::Stop,
        ConnectionError::Timeout | ConnectionError::BadConnection => RetryDisposition::Retry,
        ConnectionError::PoolClosed | ConnectionError::Exhausted { .. } => RetryDisposition::Stop,
    }
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, settings: PoolSettings) -> Self {
        let endpoint = connector.describe();
        let max_sessions = settings.max_sessions.max(1);
        let pool = Pool::builder()
            .max_open(max_sessions)
            .max_idle(max_sessions)
            .get_timeout(Some(settings.acquire_timeout))
            .build(SessionManager { connector });

        ConnectionManager {
            pool,
            retry: settings.retry,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Checks a session out of the pool, retrying transient failures with
    /// backoff.
    pub async fn acquire(&self) -> Result<Session, ConnectionError> {
        let result = self
            .retry
            .run_observed(
                || async { self.pool.get().await.map_err(ConnectionError::from) },
                classify_connection_error,
                |err, attempt, delay| {
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Session acquisition failed, retrying"
                    );
                },
            )
            .await;

        match result {
            Ok(conn) => Ok(Session(conn)),
            Err(RetryError::Fatal { error, attempts: 1 }) => Err(error),
            Err(err) => {
                let attempts = err.attempts();
                Err(ConnectionError::Exhausted {
                    attempts,
                    source: Box::new(err.into_inner()),
                })
            }
        }
    }

    /// Acquires a session and pings the server through it.
    pub async fn verify(&self) -> Result<(), ConnectionError> {
        let session = self.acquire().await?;
        session.ping().await?;
        info!(endpoint = %self.endpoint, "Connection verified");
        Ok(())
    }

    /// Tears the pool down. Sessions still checked out are closed when
    /// their holders drop them.
    pub fn shutdown(self) {
        drop(self.pool);
        info!(endpoint = %self.endpoint, "Connection pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::memory::{InMemoryStore, MemoryConnector};

    fn settings(max_sessions: u64, attempts: u32) -> PoolSettings {
        PoolSettings {
            max_sessions,
            acquire_timeout: Duration::from_secs(1),
            retry: RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(5)),
        }
    }

    #[tokio::test]
    async fn test_acquire_retries_transient_connect_failures() {
        let connector =
            Arc::new(MemoryConnector::new(Arc::new(InMemoryStore::new())).failing_first(2));
        let manager = ConnectionManager::new(connector.clone(), settings(2, 5));

        let session = manager.acquire().await.unwrap();
        session.ping().await.unwrap();
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_acquire_gives_up_after_max_attempts() {
        let connector =
            Arc::new(MemoryConnector::new(Arc::new(InMemoryStore::new())).failing_first(10));
        let manager = ConnectionManager::new(connector, settings(2, 3));

        match manager.acquire().await {
            Err(ConnectionError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("acquire should fail"),
        }
    }

    #[tokio::test]
    async fn test_released_sessions_are_reused() {
        let connector = Arc::new(MemoryConnector::new(Arc::new(InMemoryStore::new())));
        let manager = ConnectionManager::new(connector.clone(), settings(1, 1));

        for _ in 0..3 {
            let session = manager.acquire().await.unwrap();
            drop(session);
        }
        assert_eq!(connector.connects(), 1);
        manager.shutdown();
    }
}
