use std::time::Duration;

/// Executor tunables
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | ESCPOS_WRITE_DEADLINE_MS | 10000 | upper bound for one transport write |
/// | ESCPOS_DRAIN_DELAY_MS | 100 | pause after a job when `disconnectAfterPrint` is set |
///
/// ```ignore
/// ESCPOS_WRITE_DEADLINE_MS=3000 cargo run --example print_receipt
/// ```
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// A write that takes longer than this surfaces as a timeout
    pub write_deadline_ms: u64,
    /// Time given to the printer to empty its buffer after a job
    pub drain_delay_ms: u64,
}

impl ExecutorSettings {
    /// Load settings from the environment, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            write_deadline_ms: std::env::var("ESCPOS_WRITE_DEADLINE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(10_000),
            drain_delay_ms: std::env::var("ESCPOS_DRAIN_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        }
    }

    /// Override the timing values, mostly for tests
    pub fn with_overrides(write_deadline_ms: u64, drain_delay_ms: u64) -> Self {
        Self {
            write_deadline_ms,
            drain_delay_ms,
        }
    }

    pub fn write_deadline(&self) -> Duration {
        Duration::from_millis(self.write_deadline_ms)
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_env()
    }
}
