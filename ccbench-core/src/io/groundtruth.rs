/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! The batched ground truth format.
//!
//! ```text
//! num_queries: i32, k: i32, num_batches: i32
//! repeated num_batches times:
//!     base_size: i32
//!     ids:       num_queries * k x u32 (row-major per query)
//!     distances: num_queries * k x f32
//! ```
//!
//! `base_size` is the number of points in the index the batch was computed against and
//! lines up with the insertion offset recorded for search results.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use thiserror::Error;

use crate::{collect::GroundTruthEntry, index::Tag};

#[derive(Debug, Error)]
pub enum GroundTruthError {
    #[error(
        "invalid ground truth header: num_queries = {num_queries}, k = {k}, \
         num_batches = {num_batches} (all must be positive)"
    )]
    InvalidHeader {
        num_queries: i32,
        k: i32,
        num_batches: i32,
    },
    #[error("ground truth batch {batch} is truncated")]
    Truncated { batch: usize },
    #[error("ground truth batch {batch} has a negative base size {base_size}")]
    NegativeBaseSize { batch: usize, base_size: i32 },
    #[error("expected {expected} ids and distances per batch, got {ids} ids and {distances} distances")]
    BatchShape {
        expected: usize,
        ids: usize,
        distances: usize,
    },
    #[error("ground truth dimensions overflow the 32-bit header")]
    TooLarge,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Ground truth for every query at one insertion offset.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthBatch {
    pub base_size: usize,
    pub ids: Vec<Tag>,
    pub distances: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    num_queries: usize,
    k: usize,
    batches: Vec<GroundTruthBatch>,
}

fn read_i32<R: Read>(reader: &mut R) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

impl GroundTruth {
    pub fn new(num_queries: usize, k: usize) -> Self {
        Self {
            num_queries,
            k,
            batches: Vec::new(),
        }
    }

    pub fn num_queries(&self) -> usize {
        self.num_queries
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn batches(&self) -> &[GroundTruthBatch] {
        &self.batches
    }

    /// Append a batch computed against an index holding `base_size` points.
    pub fn push_batch(
        &mut self,
        base_size: usize,
        ids: Vec<Tag>,
        distances: Vec<f32>,
    ) -> Result<(), GroundTruthError> {
        let expected = self.num_queries * self.k;
        if ids.len() != expected || distances.len() != expected {
            return Err(GroundTruthError::BatchShape {
                expected,
                ids: ids.len(),
                distances: distances.len(),
            });
        }
        self.batches.push(GroundTruthBatch {
            base_size,
            ids,
            distances,
        });
        Ok(())
    }

    pub fn load<R: Read>(reader: &mut R) -> Result<Self, GroundTruthError> {
        let num_queries = read_i32(reader)?;
        let k = read_i32(reader)?;
        let num_batches = read_i32(reader)?;
        if num_queries <= 0 || k <= 0 || num_batches <= 0 {
            return Err(GroundTruthError::InvalidHeader {
                num_queries,
                k,
                num_batches,
            });
        }

        let mut this = Self::new(num_queries as usize, k as usize);
        let count = this.num_queries * this.k;
        for batch in 0..num_batches as usize {
            let truncated = |err: std::io::Error| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => GroundTruthError::Truncated { batch },
                _ => GroundTruthError::Io(err),
            };

            let base_size = read_i32(reader).map_err(truncated)?;
            if base_size < 0 {
                return Err(GroundTruthError::NegativeBaseSize { batch, base_size });
            }

            let mut ids = vec![0 as Tag; count];
            reader
                .read_exact(bytemuck::cast_slice_mut::<Tag, u8>(&mut ids))
                .map_err(truncated)?;
            let mut distances = vec![0.0f32; count];
            reader
                .read_exact(bytemuck::cast_slice_mut::<f32, u8>(&mut distances))
                .map_err(truncated)?;

            this.batches.push(GroundTruthBatch {
                base_size: base_size as usize,
                ids,
                distances,
            });
        }

        tracing::debug!(
            num_queries = this.num_queries,
            k = this.k,
            num_batches = this.batches.len(),
            "loaded ground truth"
        );
        Ok(this)
    }

    pub fn load_file(path: &Path) -> Result<Self, GroundTruthError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::load(&mut reader)
    }

    pub fn save<W: Write>(&self, writer: &mut W) -> Result<(), GroundTruthError> {
        let to_i32 = |v: usize| i32::try_from(v).map_err(|_| GroundTruthError::TooLarge);
        writer.write_all(&to_i32(self.num_queries)?.to_le_bytes())?;
        writer.write_all(&to_i32(self.k)?.to_le_bytes())?;
        writer.write_all(&to_i32(self.batches.len())?.to_le_bytes())?;
        for batch in &self.batches {
            writer.write_all(&to_i32(batch.base_size)?.to_le_bytes())?;
            writer.write_all(bytemuck::cast_slice::<Tag, u8>(&batch.ids))?;
            writer.write_all(bytemuck::cast_slice::<f32, u8>(&batch.distances))?;
        }
        Ok(())
    }

    pub fn save_file(&self, path: &Path) -> Result<(), GroundTruthError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Flatten into one entry per `(base_size, query)` pair, carrying distances.
    pub fn entries(&self) -> Vec<GroundTruthEntry> {
        let k = self.k;
        self.batches
            .iter()
            .flat_map(|batch| {
                (0..self.num_queries).map(move |q| {
                    let range = q * k..(q + 1) * k;
                    GroundTruthEntry::with_distances(
                        batch.base_size,
                        q,
                        batch.ids[range.clone()].to_vec(),
                        batch.distances[range].to_vec(),
                    )
                })
            })
            // Batch shapes are validated on construction.
            .filter_map(Result::ok)
            .collect()
    }
}

///////////
// Tests //
///////////
