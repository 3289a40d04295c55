/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Plain text persistence of search results.
//!
//! ```text
//! batch 100
//! 3
//! 12 5 88
//! 7
//! 4 19 2
//!
//! batch 200
//! ...
//! ```
//!
//! Each batch starts with a `batch <offset>` line followed by pairs of lines: the query
//! index and the space separated result tags (possibly empty). Batches are separated by a
//! single blank line.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use thiserror::Error;

use crate::{collect::SearchResult, index::Tag};

#[derive(Debug, Error)]
pub enum ResultsFormatError {
    #[error("line {line}: expected \"batch <offset>\" before any query")]
    MissingBatchHeader { line: usize },
    #[error("line {line}: could not parse {what} from {text:?}")]
    Parse {
        line: usize,
        what: &'static str,
        text: String,
    },
    #[error("line {line}: query {query} has no tag line")]
    MissingTags { line: usize, query: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Write `results` grouped by insertion offset.
///
/// Results are expected to be sorted by offset (see
/// [`crate::collect::ResultCollector::finish`]). A new batch header is started whenever the
/// offset changes.
pub fn write_results<W: Write>(writer: &mut W, results: &[SearchResult]) -> std::io::Result<()> {
    let mut current: Option<usize> = None;
    for result in results {
        if current != Some(result.insertion_offset()) {
            if current.is_some() {
                writeln!(writer)?;
            }
            writeln!(writer, "batch {}", result.insertion_offset())?;
            current = Some(result.insertion_offset());
        }

        writeln!(writer, "{}", result.query_index())?;
        let mut tags = result.tags().iter();
        if let Some(first) = tags.next() {
            write!(writer, "{}", first)?;
            for tag in tags {
                write!(writer, " {}", tag)?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn write_results_file(path: &Path, results: &[SearchResult]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_results(&mut writer, results)?;
    writer.flush()
}

fn parse<T: std::str::FromStr>(
    text: &str,
    line: usize,
    what: &'static str,
) -> Result<T, ResultsFormatError> {
    text.trim().parse().map_err(|_| ResultsFormatError::Parse {
        line,
        what,
        text: text.to_string(),
    })
}

/// Read results written by [`write_results`].
pub fn read_results<R: BufRead>(reader: R) -> Result<Vec<SearchResult>, ResultsFormatError> {
    let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));
    let mut results = Vec::new();
    let mut offset: Option<usize> = None;

    while let Some((number, line)) = lines.next() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("batch") {
            offset = Some(parse(rest, number, "batch offset")?);
            continue;
        }

        let offset = offset.ok_or(ResultsFormatError::MissingBatchHeader { line: number })?;
        let query: usize = parse(trimmed, number, "query index")?;

        // The tag line follows the query line directly, even when it is empty.
        let (tag_number, tag_line) = lines.next().ok_or(ResultsFormatError::MissingTags {
            line: number,
            query,
        })?;
        let tags = tag_line?
            .split_whitespace()
            .map(|t| parse::<Tag>(t, tag_number, "tag"))
            .collect::<Result<Vec<_>, _>>()?;

        results.push(SearchResult::new(offset, query, tags));
    }
    Ok(results)
}

pub fn read_results_file(path: &Path) -> Result<Vec<SearchResult>, ResultsFormatError> {
    read_results(BufReader::new(File::open(path)?))
}

///////////
// Tests //
///////////
