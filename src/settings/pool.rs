use clap::Parser;
use serde::{Deserialize, Serialize};

/// Worker count of the IO preset pool.
pub const DEFAULT_IO_THREADS: usize = 8;

fn default_io_threads() -> usize {
    DEFAULT_IO_THREADS
}

#[derive(Parser, Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Compute pool workers (0 = hardware concurrency)
    #[arg(long = "compute-threads", id = "compute-threads", default_value_t = 0)]
    #[serde(default)]
    pub compute_threads: usize,

    /// IO pool workers (0 = hardware concurrency)
    #[arg(long = "io-threads", id = "io-threads", default_value_t = DEFAULT_IO_THREADS)]
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,

    /// Extra workers that only run leaf tasks
    #[arg(long = "leaf-reserve", id = "leaf-reserve", default_value_t = 0)]
    #[serde(default)]
    pub leaf_reserve: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            compute_threads: 0,
            io_threads: DEFAULT_IO_THREADS,
            leaf_reserve: 0,
        }
    }
}
