// Processor defaults (no magic values)
use std::time::Duration;

/// Poll interval when the queue has no due work (30s)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Jobs claimed and run concurrently per tick
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Per-job handler timeout (10 minutes)
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Linear retry backoff unit (60s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 60 * 1000;

/// Sleep after a failed tick before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);
