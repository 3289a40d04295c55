/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

pub mod groundtruth;
pub mod results;
pub mod vectors;

pub use groundtruth::{GroundTruth, GroundTruthBatch, GroundTruthError};
pub use results::{ResultsFormatError, read_results, read_results_file, write_results, write_results_file};
pub use vectors::{Metadata, ReadBinError, VectorSet, read_metadata};
