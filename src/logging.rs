//! Console logging setup.
//!
//! Records are written as `[HH:MM:SS.mmm] LEVEL - target: message`.
//! `RUST_LOG` still overrides the level passed to [`init`].

use crate::error::Result;
use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

fn builder(level: LevelFilter) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level.as_str()));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] {} - {}: {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder
}

/// Installs the global logger.
///
/// # Arguments
///
/// * `level` - Default level when `RUST_LOG` is unset
///
/// # Returns
///
/// * `Result<()>` - Fails if another logger is already installed
pub fn init(level: LevelFilter) -> Result<()> {
    builder(level).try_init()?;
    Ok(())
}

/// Installs a test-friendly logger once; later calls do nothing.
pub fn init_for_tests() {
    let _ = builder(LevelFilter::Info).is_test(true).try_init();
}
