use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{PortalError, Result};
use crate::store::RecordStore;
use crate::table::{Row, Table, content_fingerprint, row_values, without_trailing_blank_rows};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 200;
const DEFAULT_MAX_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Exponential delay before retry number `attempt` (0-based), capped at
    /// `max_delay`, plus up to 50% random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = (capped.as_millis() as u64) / 2;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Wraps a store with bounded retry on transient failures.
///
/// Loads are retried freely. A write is only re-sent after a fresh load shows
/// the earlier attempt did not land, so a replace is never layered on top of
/// itself and an append is never doubled.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RecordStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn backoff(&self, op: &str, table: &str, attempt: u32, err: &PortalError) {
        let delay = self.policy.delay_for(attempt);
        warn!(op, table, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "transient store failure, retrying");
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    fn last_attempt(&self, attempt: u32) -> bool {
        attempt + 1 >= self.policy.max_attempts.max(1)
    }
}

impl<S: RecordStore> RecordStore for RetryingStore<S> {
    fn load(&self, table: &str) -> Result<Table> {
        let mut attempt = 0;
        loop {
            match self.inner.load(table) {
                Ok(loaded) => return Ok(loaded),
                Err(err) if err.is_transient() && !self.last_attempt(attempt) => {
                    self.backoff("load", table, attempt, &err);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn replace_all(&self, table: &str, header: &[String], rows: &[Row]) -> Result<()> {
        // A reload never returns trailing blank rows, so they cannot count.
        let intended = content_fingerprint(header, without_trailing_blank_rows(rows));
        let mut attempt = 0;
        loop {
            let err = match self.inner.replace_all(table, header, rows) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && !self.last_attempt(attempt) => err,
                Err(err) => return Err(err),
            };
            self.backoff("replace_all", table, attempt, &err);
            attempt += 1;

            let Ok(current) = self.inner.load(table) else {
                return Err(err);
            };
            if current.header == header && current.fingerprint() == intended {
                debug!(table, "replace already applied before failure was reported");
                return Ok(());
            }
        }
    }

    fn append(&self, table: &str, values: &[String]) -> Result<()> {
        let before = self.inner.load(table).map(|t| t.len()).ok();
        let mut attempt = 0;
        loop {
            let err = match self.inner.append(table, values) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && !self.last_attempt(attempt) => err,
                Err(err) => return Err(err),
            };
            let Some(expected_len) = before else {
                return Err(err);
            };
            self.backoff("append", table, attempt, &err);
            attempt += 1;

            let Ok(current) = self.inner.load(table) else {
                return Err(err);
            };
            if current.len() == expected_len + 1
                && current
                    .rows
                    .last()
                    .is_some_and(|last| appended_matches(&current.header, last, values))
            {
                debug!(table, "append already applied before failure was reported");
                return Ok(());
            }
            if current.len() != expected_len {
                return Err(err);
            }
        }
    }
}

fn appended_matches(header: &[String], row: &Row, values: &[String]) -> bool {
    let stored = row_values(header, row);
    let mut sent: Vec<String> = values.iter().take(header.len()).cloned().collect();
    sent.resize(header.len(), String::new());
    stored == sent
}
