use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal { error: E, attempts: u32 },
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded { error: E, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::AttemptsExceeded { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn error(&self) -> &E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::AttemptsExceeded { error, .. } => error,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::AttemptsExceeded { error, .. } => error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// Preset for establishing sessions (more attempts, slower backoff).
    pub fn for_connection() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Executes the operation with the configured retry policy.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        op: F,
        classify: Classifier,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        self.run_observed(op, classify, |_, _, _| {}).await
    }

    /// Like [`RetryPolicy::run`], calling `on_retry(error, attempt, delay)`
    /// before each backoff sleep.
    pub async fn run_observed<F, Fut, T, E, Classifier, OnRetry>(
        &self,
        mut op: F,
        classify: Classifier,
        mut on_retry: OnRetry,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
        OnRetry: FnMut(&E, u32, Duration),
    {
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    let attempts = attempt + 1;
                    match classify(&error) {
                        RetryDisposition::Stop => {
                            return Err(RetryError::Fatal { error, attempts });
                        }
                        RetryDisposition::Retry => {
                            if attempts >= self.max_attempts {
                                return Err(RetryError::AttemptsExceeded { error, attempts });
                            }

                            let delay = self.backoff_delay(attempt);
                            on_retry(&error, attempts, delay);
                            sleep(delay).await;
                            attempt += 1;
                        }
                    }
                }
            }
        }
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
