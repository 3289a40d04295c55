/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

mod app;
mod backend;
mod bench;
mod config;
mod datatype;
mod output;

fn main() -> anyhow::Result<()> {
    ccbench_core::utils::tracing::init_subscriber()?;
    let app = app::App::parse();
    let mut output = output::default();
    app.run(&mut output)
}
