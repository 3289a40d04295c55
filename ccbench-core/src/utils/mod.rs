/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

pub mod fmt;
pub mod microseconds;
pub mod percentiles;
pub mod tracing;

pub use microseconds::MicroSeconds;
pub use percentiles::{CannotBeEmpty, PercentileMethod, Percentiles};
