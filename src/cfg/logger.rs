// SPDX-License-Identifier: AGPL-3.0-or-later

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cfg::Config;

/// Installs the process-wide `tracing` subscriber.
///
/// The shim is loaded via `LD_PRELOAD` into an arbitrary host process, so
/// unlike `iscsi-client-rs::cfg::logger::init_logger` there is no log file,
/// no rotation, and no JSON framing to configure: everything goes to stderr
/// as compact text, gated by an `EnvFilter` built from `AMPCCL_LOG_LEVEL`
/// (or `AMPCCL_DEBUG`, whichever asks for more).
///
/// Safe to call more than once; every call after the first is a no-op.
pub fn init_logger(config: &Config) {
    let directive = if config.debug {
        "debug"
    } else {
        config.log_level.as_env_filter_directive()
    };

    let env_filter = EnvFilter::try_from_env("AMPCCL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(directive));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    // Ignore the error: a second call (e.g. from a test harness that also
    // installs a subscriber) must not panic the host process.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
