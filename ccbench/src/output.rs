/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Reports go to `stdout` and progress bars to `stderr`.
pub fn default() -> DefaultOutput {
    DefaultOutput(std::io::stdout())
}

/// Where the binary writes its reports and draws its progress bars.
///
/// Commands print through `&mut dyn Output` so tests can capture the text in memory.
pub trait Output {
    fn sink(&mut self) -> &mut dyn std::io::Write;
    fn draw_target(&self) -> ProgressDrawTarget;

    /// A progress bar counting `len` benchmark batches.
    fn batch_progress(&self, len: usize) -> anyhow::Result<ProgressBar> {
        let style = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} batches {msg}",
        )?;
        Ok(ProgressBar::with_draw_target(Some(len as u64), self.draw_target()).with_style(style))
    }
}

/// This allows `&mut dyn Output` to be used as the receiver of the `write!` macro.
impl std::io::Write for &mut dyn Output {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.sink().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.sink().flush()
    }
}

#[derive(Debug)]
pub struct DefaultOutput(std::io::Stdout);

impl Output for DefaultOutput {
    fn sink(&mut self) -> &mut dyn std::io::Write {
        &mut self.0
    }

    fn draw_target(&self) -> ProgressDrawTarget {
        ProgressDrawTarget::stderr()
    }
}

/// Captures everything written in a buffer and hides progress bars.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Memory(Vec<u8>);

#[cfg(test)]
impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The captured text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

#[cfg(test)]
impl Output for Memory {
    fn sink(&mut self) -> &mut dyn std::io::Write {
        &mut self.0
    }

    fn draw_target(&self) -> ProgressDrawTarget {
        ProgressDrawTarget::hidden()
    }
}

///////////
// Tests //
///////////
