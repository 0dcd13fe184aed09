use std::env;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Limits and timings for multipart upload sessions
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Highest accepted part number (default: 10,000)
    pub max_parts: u32,

    /// Minimum size of every part except the last one (default: 5 MiB)
    pub min_part_size: u64,

    /// Maximum size of a single part (default: 5 GiB)
    pub max_part_size: u64,

    /// Maximum size announced at init (default: 5 TiB)
    pub max_declared_size: u64,

    /// Idle time after which an unfinished session is aborted (default: 24h)
    pub session_ttl_secs: u64,

    /// How long completed/aborted sessions stay queryable (default: 1h)
    pub terminal_retention_secs: u64,

    /// Interval between expiry sweeps (default: 1h)
    pub sweep_interval_secs: u64,

    /// Maximum sessions inspected per sweep (default: 100)
    pub sweep_batch_size: u64,

    /// Upper bound for a single object-store call (default: 300s)
    pub backend_timeout_secs: u64,

    /// Object store backend: "s3" or "memory" (default: "s3")
    pub storage_backend: String,

    /// Session database, in-memory sessions when unset
    pub database_url: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_parts: 10_000,
            min_part_size: 5 * MIB,
            max_part_size: 5 * 1024 * MIB,
            max_declared_size: 5 * 1024 * 1024 * MIB,
            session_ttl_secs: 24 * 3600,
            terminal_retention_secs: 3600,
            sweep_interval_secs: 3600,
            sweep_batch_size: 100,
            backend_timeout_secs: 300,
            storage_backend: "s3".to_string(),
            database_url: None,
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_parts: parse_var("MAX_PARTS").unwrap_or(default.max_parts),
            min_part_size: parse_var("MIN_PART_SIZE").unwrap_or(default.min_part_size),
            max_part_size: parse_var("MAX_PART_SIZE").unwrap_or(default.max_part_size),
            max_declared_size: parse_var("MAX_DECLARED_SIZE")
                .unwrap_or(default.max_declared_size),
            session_ttl_secs: parse_var("SESSION_TTL_SECS").unwrap_or(default.session_ttl_secs),
            terminal_retention_secs: parse_var("TERMINAL_RETENTION_SECS")
                .unwrap_or(default.terminal_retention_secs),
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS")
                .unwrap_or(default.sweep_interval_secs),
            sweep_batch_size: parse_var("SWEEP_BATCH_SIZE").unwrap_or(default.sweep_batch_size),
            backend_timeout_secs: parse_var("BACKEND_TIMEOUT_SECS")
                .unwrap_or(default.backend_timeout_secs),
            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or(default.storage_backend),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
        }
    }

    /// Local setup: in-memory object store and sessions, short sweeps
    pub fn development() -> Self {
        Self {
            sweep_interval_secs: 60,
            backend_timeout_secs: 30,
            storage_backend: "memory".to_string(),
            database_url: None,
            ..Self::default()
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.terminal_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// Bound for a composition of `part_count` parts: one backend window per
    /// part plus one for the final request.
    pub fn compose_timeout(&self, part_count: usize) -> Duration {
        let windows = u32::try_from(part_count.saturating_add(1)).unwrap_or(u32::MAX);
        self.backend_timeout().saturating_mul(windows)
    }

    /// Request body limit for part uploads, clamped to the address space
    pub fn part_body_limit(&self) -> usize {
        usize::try_from(self.max_part_size).unwrap_or(usize::MAX)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
