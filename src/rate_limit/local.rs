use super::store::{WindowBatch, WindowOutcome, WindowStore};
use super::types::WindowTimestamp;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Sorted set of `(score, member)` plus the key's expiry
#[derive(Debug, Default)]
struct WindowEntries {
    entries: BTreeSet<(i64, String)>,
    /// Score at which the whole key expires
    expires_at: i64,
}

/// In-process window store.
///
/// Mirrors the Redis script semantics (purge, check all, record all,
/// expire) under a single lock. Only consistent within one process; use
/// it for tests and single-instance development.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    windows: Mutex<HashMap<String, WindowEntries>>,
    transactions: AtomicU64,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of check-and-record transactions served
    pub fn transactions(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }

    /// Live entries under `key` as of `now`
    pub async fn count(&self, key: &str, now: WindowTimestamp) -> usize {
        let windows = self.windows.lock().await;
        match windows.get(key) {
            Some(window) if window.expires_at > now.score() => window.entries.len(),
            _ => 0,
        }
    }

    /// Number of keys currently held
    pub async fn active_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn check_and_record(&self, batch: &WindowBatch) -> Result<WindowOutcome> {
        self.transactions.fetch_add(1, Ordering::Relaxed);

        let now = batch.now.score();
        let mut windows = self.windows.lock().await;

        // Expired keys are dropped, as Redis does with EXPIRE
        windows.retain(|_, window| window.expires_at > now);

        let mut binding = 0;
        let mut min_remaining: Option<u64> = None;
        let mut binding_reset = 0;

        for (index, spec) in batch.windows.iter().enumerate() {
            let window_micros = spec.window_secs as i64 * WindowTimestamp::MICROS_PER_SEC;
            let cutoff = now - window_micros;

            let (count, oldest) = match windows.get_mut(&spec.key) {
                Some(window) => {
                    window.entries = window.entries.split_off(&(cutoff + 1, String::new()));
                    let oldest = window.entries.first().map(|(score, _)| *score);
                    (window.entries.len() as u64, oldest)
                }
                None => (0, None),
            };

            if count >= spec.max_requests as u64 {
                let retry_after = oldest
                    .map(|oldest| {
                        let micros = oldest + window_micros - now;
                        (micros + WindowTimestamp::MICROS_PER_SEC - 1) / WindowTimestamp::MICROS_PER_SEC
                    })
                    .unwrap_or(spec.window_secs as i64);

                debug!(key = %spec.key, count, "Window full");
                return Ok(WindowOutcome {
                    limited: true,
                    binding: index,
                    remaining: 0,
                    reset_after: retry_after.max(1) as u64,
                });
            }

            let remaining = spec.max_requests as u64 - count - 1;
            if min_remaining.map_or(true, |min| remaining < min) {
                min_remaining = Some(remaining);
                binding = index;
                binding_reset = spec.window_secs;
            }
        }

        for spec in &batch.windows {
            let window = windows.entry(spec.key.clone()).or_default();
            window.entries.insert((now, batch.member.clone()));
            window.expires_at = now + spec.window_secs as i64 * WindowTimestamp::MICROS_PER_SEC;
        }

        Ok(WindowOutcome {
            limited: false,
            binding,
            remaining: min_remaining.unwrap_or(0),
            reset_after: binding_reset,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
