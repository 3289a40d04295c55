/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

fn filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Install a global subscriber that logs to `stderr` and respects `RUST_LOG`.
///
/// Logs go to `stderr` so they never interleave with the reports written to `stdout`. If
/// the environment variable is not set, the "info" level is used.
///
/// Returns an error if a global subscriber was already installed.
pub fn init_subscriber() -> anyhow::Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Create a subscriber for tests.
///
/// The returned guard only installs the subscriber for the current thread, allowing test
/// threads to have non-conflicting subscribers.
pub fn init_test_subscriber() -> tracing::subscriber::DefaultGuard {
    let fmt_layer = fmt::layer().with_target(true).with_test_writer();

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt_layer)
        .set_default()
}
