//! Store-wide defaults.

/// Extension appended to the task ID to form a record file name.
pub const DEFAULT_FILE_EXTENSION: &str = ".json";

/// Default TTL applied when an execution policy omits one (1 hour).
pub const DEFAULT_TTL_MS: u64 = 3_600_000;

/// Default number of lock acquisition attempts before giving up.
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 10;

/// Default delay between lock acquisition attempts, in milliseconds.
pub const DEFAULT_LOCK_RETRY_DELAY_MS: u64 = 50;
