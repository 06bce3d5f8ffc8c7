use std::env;

/// Configuration for benchmarks, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Redis URL (from REDIS_URL env var, defaults to localhost)
    pub redis_url: String,

    /// Images per inserted feed (from FEED_SIZE env var, defaults to 50)
    pub feed_size: usize,

    /// Sample size for benchmarks (from BENCH_SAMPLE_SIZE env var, defaults to 100)
    pub sample_size: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            feed_size: env::var("FEED_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            sample_size: env::var("BENCH_SAMPLE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
        }
    }
}

impl BenchConfig {
    pub fn new() -> Self {
        let config = Self::default();
        eprintln!("Benchmark Configuration:");
        eprintln!("  Redis URL: {}", config.redis_url);
        eprintln!("  Feed Size: {}", config.feed_size);
        eprintln!("  Sample Size: {}", config.sample_size);
        config
    }
}
