/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Aligned loading of vectors in the binary point format.
//!
//! The format is:
//! - 8-byte header
//!   - `npoints` (i32 LE)
//!   - `dim` (i32 LE)
//! - Payload: `npoints × dim` elements of `T`, tightly packed in row-major order.
//!
//! Rows are loaded into a buffer whose stride is `dim` rounded up to a multiple of 8, with
//! the tail of each row zeroed. The padding is never exposed through [`VectorSet::row`].

use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom, Write},
    path::Path,
};

use thiserror::Error;

const HEADER_BYTES: u64 = 8;

/// Round `dim` up to the next multiple of 8.
pub fn aligned_dim(dim: usize) -> usize {
    (dim + 7) & !7
}

/// The 8-byte header at the start of a vector file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub npoints: usize,
    pub dim: usize,
}

impl Metadata {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ReadBinError> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let npoints = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let dim = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if npoints < 0 || dim < 0 {
            return Err(ReadBinError::NegativeHeader { npoints, dim });
        }
        Ok(Self {
            npoints: npoints as usize,
            dim: dim as usize,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), ReadBinError> {
        let npoints = i32::try_from(self.npoints).map_err(|_| ReadBinError::TooLarge)?;
        let dim = i32::try_from(self.dim).map_err(|_| ReadBinError::TooLarge)?;
        writer.write_all(&npoints.to_le_bytes())?;
        writer.write_all(&dim.to_le_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ReadBinError {
    #[error("header holds negative values: npoints = {npoints}, dim = {dim}")]
    NegativeHeader { npoints: i32, dim: i32 },
    #[error(
        "file size mismatch: header describes {npoints} points of dimension {dim} \
         ({expected} bytes with a {type_size}-byte element type) but the file holds {actual} bytes"
    )]
    SizeMismatch {
        npoints: usize,
        dim: usize,
        type_size: usize,
        expected: u64,
        actual: u64,
    },
    #[error("vector dimensions overflow the header's 32-bit fields")]
    TooLarge,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read only the header of the vector file at `path`.
pub fn read_metadata(path: &Path) -> Result<Metadata, ReadBinError> {
    let mut file = File::open(path)?;
    Metadata::read(&mut file)
}

/// A dense set of vectors stored with an aligned row stride.
#[derive(Debug, Clone)]
pub struct VectorSet<T> {
    npoints: usize,
    dim: usize,
    stride: usize,
    data: Vec<T>,
}

impl<T> VectorSet<T>
where
    T: bytemuck::Pod,
{
    /// Build a set from rows of equal length `dim`.
    ///
    /// # Panics
    ///
    /// Panics if any row does not have exactly `dim` elements.
    pub fn from_rows<'a, I>(dim: usize, rows: I) -> Self
    where
        I: IntoIterator<Item = &'a [T]>,
    {
        let stride = aligned_dim(dim);
        let mut data = Vec::new();
        let mut npoints = 0;
        for row in rows {
            assert_eq!(row.len(), dim, "row {} has the wrong dimension", npoints);
            data.extend_from_slice(row);
            data.resize(data.len() + (stride - dim), T::zeroed());
            npoints += 1;
        }
        Self {
            npoints,
            dim,
            stride,
            data,
        }
    }

    /// Load an entire vector file, validating its size against the header.
    pub fn load<R>(reader: &mut R) -> Result<Self, ReadBinError>
    where
        R: Read + Seek,
    {
        let Metadata { npoints, dim } = Metadata::read(reader)?;
        let type_size = std::mem::size_of::<T>();

        let actual = reader.seek(SeekFrom::End(0))?;
        let expected = (npoints as u64)
            .checked_mul(dim as u64)
            .and_then(|n| n.checked_mul(type_size as u64))
            .and_then(|n| n.checked_add(HEADER_BYTES));
        if expected != Some(actual) {
            return Err(ReadBinError::SizeMismatch {
                npoints,
                dim,
                type_size,
                expected: expected.unwrap_or(u64::MAX),
                actual,
            });
        }
        reader.seek(SeekFrom::Start(HEADER_BYTES))?;

        let stride = aligned_dim(dim);
        let mut data = vec![T::zeroed(); npoints * stride];
        if dim != 0 {
            for row in data.chunks_exact_mut(stride) {
                reader.read_exact(bytemuck::cast_slice_mut::<T, u8>(&mut row[..dim]))?;
            }
        }

        Ok(Self {
            npoints,
            dim,
            stride,
            data,
        })
    }

    /// Load the vector file at `path`.
    pub fn load_file(path: &Path) -> Result<Self, ReadBinError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::load(&mut reader)
    }

    /// Write the set in the unpadded on-disk format.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<(), ReadBinError> {
        Metadata {
            npoints: self.npoints,
            dim: self.dim,
        }
        .write(writer)?;
        for i in 0..self.npoints {
            writer.write_all(bytemuck::cast_slice::<T, u8>(self.row(i)))?;
        }
        Ok(())
    }
}

impl<T> VectorSet<T> {
    pub fn len(&self) -> usize {
        self.npoints
    }

    pub fn is_empty(&self) -> bool {
        self.npoints == 0
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The row stride, `dim` rounded up to a multiple of 8.
    pub fn aligned_dim(&self) -> usize {
        self.stride
    }

    /// Return the `i`-th vector without its padding.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn row(&self, i: usize) -> &[T] {
        let start = i * self.stride;
        &self.data[start..start + self.dim]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[T]> + '_ {
        (0..self.npoints).map(move |i| self.row(i))
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    fn raw_file(npoints: i32, dim: i32, payload: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&npoints.to_le_bytes());
        bytes.extend_from_slice(&dim.to_le_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice(payload));
        bytes
    }

    #[test]
    fn aligned_dims() {
        assert_eq!(aligned_dim(0), 0);
        assert_eq!(aligned_dim(1), 8);
        assert_eq!(aligned_dim(8), 8);
        assert_eq!(aligned_dim(9), 16);
        assert_eq!(aligned_dim(128), 128);
    }

    #[test]
    fn load_pads_rows() {
        let payload: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let mut cursor = Cursor::new(raw_file(2, 3, &payload));
        let set = VectorSet::<f32>::load(&mut cursor).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.dim(), 3);
        assert_eq!(set.aligned_dim(), 8);
        assert_eq!(set.row(0), &[0.0, 1.0, 2.0]);
        assert_eq!(set.row(1), &[3.0, 4.0, 5.0]);
        assert_eq!(set.rows().len(), 2);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        // One element short.
        let mut cursor = Cursor::new(raw_file(2, 3, &[0.0; 5]));
        let err = VectorSet::<f32>::load(&mut cursor).unwrap_err();
        match err {
            ReadBinError::SizeMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 8 + 24);
                assert_eq!(actual, 8 + 20);
            }
            other => panic!("unexpected error: {}", other),
        }

        // Trailing bytes are rejected too.
        let mut cursor = Cursor::new(raw_file(1, 3, &[0.0; 4]));
        assert!(matches!(
            VectorSet::<f32>::load(&mut cursor),
            Err(ReadBinError::SizeMismatch { .. })
        ));

        // Element size matters: the same bytes are valid as `u8` only with a matching header.
        let mut cursor = Cursor::new(raw_file(2, 3, &[0.0; 6]));
        assert!(VectorSet::<u8>::load(&mut cursor).is_err());
    }

    #[test]
    fn negative_header() {
        let mut cursor = Cursor::new(raw_file(-1, 3, &[]));
        assert!(matches!(
            VectorSet::<f32>::load(&mut cursor),
            Err(ReadBinError::NegativeHeader { npoints: -1, dim: 3 })
        ));
    }

    #[test]
    fn truncated_header() {
        let mut cursor = Cursor::new(vec![1u8, 0, 0]);
        assert!(matches!(
            VectorSet::<f32>::load(&mut cursor),
            Err(ReadBinError::Io(_))
        ));
    }

    #[test]
    fn save_and_load_file() {
        let rows: [&[i8]; 3] = [&[1, -2, 3, -4, 5, -6, 7, -8, 9], &[0; 9], &[-1; 9]];
        let set = VectorSet::from_rows(9, rows);
        assert_eq!(set.aligned_dim(), 16);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.i8bin");
        {
            let mut file = File::create(&path).unwrap();
            set.save(&mut file).unwrap();
        }

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8 + 27);
        assert_eq!(read_metadata(&path).unwrap(), Metadata { npoints: 3, dim: 9 });

        let loaded = VectorSet::<i8>::load_file(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        for i in 0..3 {
            assert_eq!(loaded.row(i), rows[i]);
        }
    }
}
