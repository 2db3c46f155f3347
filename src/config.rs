// Configuration module for mlens
// Reads from environment variables with sensible defaults

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Read connection pool size (MLENS_POOL_SIZE)
    pub pool_size: u32,

    /// Read connection pool minimum idle connections (MLENS_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Worker threads for metric evaluation; 0 = host parallelism
    /// (MLENS_WORKERS)
    pub workers: usize,

    /// Maximum byte length of an error-marker tooltip
    /// (MLENS_ERROR_TOOLTIP_MAX)
    pub error_tooltip_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_min_idle: 2,
            workers: 0,
            error_tooltip_max: 200,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("MLENS_POOL_SIZE") {
            if let Ok(parsed) = val.parse() {
                config.pool_size = parsed;
            } else {
                eprintln!(
                    "mlens: Warning: Invalid MLENS_POOL_SIZE value: {}, using default: {}",
                    val, config.pool_size
                );
            }
        }

        if let Ok(val) = env::var("MLENS_POOL_MIN_IDLE") {
            if let Ok(parsed) = val.parse() {
                config.pool_min_idle = parsed;
            } else {
                eprintln!(
                    "mlens: Warning: Invalid MLENS_POOL_MIN_IDLE value: {}, using default: {}",
                    val, config.pool_min_idle
                );
            }
        }

        if let Ok(val) = env::var("MLENS_WORKERS") {
            if let Ok(parsed) = val.parse() {
                config.workers = parsed;
            } else {
                eprintln!(
                    "mlens: Warning: Invalid MLENS_WORKERS value: {}, using default: {}",
                    val, config.workers
                );
            }
        }

        if let Ok(val) = env::var("MLENS_ERROR_TOOLTIP_MAX") {
            if let Ok(parsed) = val.parse() {
                config.error_tooltip_max = parsed;
            } else {
                eprintln!(
                    "mlens: Warning: Invalid MLENS_ERROR_TOOLTIP_MAX value: {}, using default: {}",
                    val, config.error_tooltip_max
                );
            }
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }

    /// Effective worker count for the evaluation pool.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}
