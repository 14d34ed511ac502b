//! Logging setup for the `log` facade, backed by `env_logger`.
//!
//! Levels used across the crate:
//!
//! - `warn!`  - legal but suspicious setups (a stage no level selects)
//! - `info!`  - computation phases (ready, steady, run, finalize)
//! - `debug!` - per-multistage scheduling and block plans
//! - `trace!` - per-block cache fills, flushes and barriers
//!
//! `RUST_LOG=gridstencil::exec=trace gridstencil run plan.toml` shows the
//! executor in detail.

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging at `Warn`. Subsequent calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level. Subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {} - {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from `RUST_LOG`, defaulting to `warn`.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests; safe to call from every test.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test();
        init_test();
        init_test();
    }
}
