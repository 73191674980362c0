use super::lua_scripts::SLIDING_WINDOW_SCRIPT;
use super::store::{WindowBatch, WindowOutcome, WindowStore};
use crate::config::RedisConfig;
use crate::error::{GateError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::time::Duration;
use tracing::{debug, error, info};

/// Redis-backed window store.
///
/// The connection manager is multiplexed and cloned per call, so
/// concurrent evaluations never wait on each other in-process.
#[derive(Clone)]
pub struct RedisWindowStore {
    /// Redis connection manager
    connection: ConnectionManager,
    /// Sliding window script, loaded once and invoked by SHA
    script: Script,
    /// How long a request waits for a verdict
    timeout: Duration,
}

impl RedisWindowStore {
    /// Connect to Redis
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| GateError::Config(format!("Invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client).await?;

        info!("Connected to Redis rate limit store");

        Ok(Self {
            connection,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn check_and_record(&self, batch: &WindowBatch) -> Result<WindowOutcome> {
        let script = self.script.clone();
        let owned = batch.clone();
        let mut connection = self.connection.clone();

        // Spawned so a cancelled request cannot abandon the script midway
        let task = tokio::spawn(async move {
            let mut invocation = script.prepare_invoke();
            invocation.arg(owned.now.score()).arg(&owned.member);
            for window in &owned.windows {
                invocation
                    .key(&window.key)
                    .arg(window.window_secs)
                    .arg(window.max_requests);
            }
            invocation
                .invoke_async::<_, Vec<i64>>(&mut connection)
                .await
        });

        let reply = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(reply))) => reply,
            Ok(Ok(Err(e))) => {
                error!(error = %e, "Redis error during rate limit check");
                return Err(e.into());
            }
            Ok(Err(e)) => {
                error!(error = %e, "Rate limit script task failed");
                return Err(GateError::StoreUnavailable(e.to_string()));
            }
            Err(_) => {
                error!(timeout_ms = self.timeout.as_millis() as u64, "Rate limit check timed out");
                return Err(GateError::StoreUnavailable(format!(
                    "no reply within {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        let outcome = parse_reply(&reply, batch.windows.len())?;
        debug!(
            limited = outcome.limited,
            binding = outcome.binding,
            remaining = outcome.remaining,
            reset_after = outcome.reset_after,
            "Sliding window script evaluated"
        );
        Ok(outcome)
    }

    async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await?;
        Ok(())
    }
}

/// Decode `[limited, binding (1-based), remaining, reset_after]`
fn parse_reply(reply: &[i64], windows: usize) -> Result<WindowOutcome> {
    let [limited, binding, remaining, reset_after] = reply else {
        return Err(GateError::StoreUnavailable(format!(
            "unexpected script reply: {:?}",
            reply
        )));
    };

    let binding = usize::try_from(*binding)
        .ok()
        .and_then(|index| index.checked_sub(1))
        .filter(|index| *index < windows)
        .ok_or_else(|| {
            GateError::StoreUnavailable(format!("script reported unknown rule {}", binding))
        })?;

    Ok(WindowOutcome {
        limited: *limited == 1,
        binding,
        remaining: (*remaining).max(0) as u64,
        reset_after: (*reset_after).max(0) as u64,
    })
}
