//! Text fragments decoded from a streaming response body.
//!
//! [`FragmentStream`] owns the read-retry policy so the assembler only ever
//! sees decoded text. The sequence is lazy, finite and cannot be restarted:
//! once it returns `None` it keeps returning `None`.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::HospitalError;

/// Raw body chunks as delivered by a transport.
pub type ByteStream = BoxStream<'static, Result<Bytes, HospitalError>>;

/// How many consecutive read failures are retried, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        RetryPolicy {
            max_retries: config.read_retries,
            backoff: config.retry_backoff(),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

pub struct FragmentStream {
    inner: ByteStream,
    policy: RetryPolicy,
    cancel: CancellationToken,
    /// Bytes of a UTF-8 sequence split across chunks.
    pending: Vec<u8>,
    chunks_read: usize,
    consecutive_failures: u32,
    retries_used: u32,
    finished: bool,
}

impl FragmentStream {
    pub fn new(inner: ByteStream, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        FragmentStream {
            inner,
            policy,
            cancel,
            pending: Vec::new(),
            chunks_read: 0,
            consecutive_failures: 0,
            retries_used: 0,
            finished: false,
        }
    }

    /// Next decoded fragment, or `None` when the body ended, retries ran out,
    /// or the request was cancelled.
    pub async fn next_fragment(&mut self) -> Option<String> {
        loop {
            if self.finished {
                return None;
            }

            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(chunks = self.chunks_read, "fragment stream cancelled");
                    self.finished = true;
                    return None;
                }
                item = self.inner.next() => item,
            };

            match item {
                Some(Ok(bytes)) => {
                    self.chunks_read += 1;
                    self.consecutive_failures = 0;
                    let text = self.decode(&bytes);
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
                Some(Err(e)) => {
                    // An abort surfaces as a read error too; retrying it would
                    // only delay the shutdown the caller asked for.
                    if matches!(e, HospitalError::Aborted) || self.cancel.is_cancelled() {
                        self.finished = true;
                        return None;
                    }
                    if self.consecutive_failures >= self.policy.max_retries {
                        warn!(
                            error = %e,
                            retries = self.consecutive_failures,
                            "read failed after retries, ending stream early"
                        );
                        self.finished = true;
                        return self.flush();
                    }
                    self.consecutive_failures += 1;
                    self.retries_used += 1;
                    let delay = self.policy.delay_for(self.consecutive_failures);
                    warn!(
                        error = %e,
                        attempt = self.consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        "read failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            self.finished = true;
                            return None;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    self.finished = true;
                    return self.flush();
                }
            }
        }
    }

    pub fn chunks_read(&self) -> usize {
        self.chunks_read
    }

    pub fn retries_used(&self) -> u32 {
        self.retries_used
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(tail)
    }
}
