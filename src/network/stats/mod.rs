pub mod gate_stats;
pub mod util;

pub use gate_stats::{GateStats, GateStatsRecorder};
