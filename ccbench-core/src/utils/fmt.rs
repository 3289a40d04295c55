/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::fmt::{Display, Write};

/// A right-aligned text table with a fixed set of columns.
///
/// Cells are rendered eagerly when a row is pushed so that the table owns plain strings
/// and can be sized once when displayed.
#[derive(Debug, Clone)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I>(header: I) -> Self
    where
        I: IntoIterator<Item: Display>,
    {
        Self {
            header: header.into_iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn ncols(&self) -> usize {
        self.header.len()
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    /// Append a row. Missing trailing cells render as blanks.
    ///
    /// # Panics
    ///
    /// Panics if the row has more cells than the table has columns.
    pub fn push_row<I>(&mut self, cells: I)
    where
        I: IntoIterator<Item: Display>,
    {
        let row: Vec<String> = cells.into_iter().map(|c| c.to_string()).collect();
        if row.len() > self.ncols() {
            panic!(
                "row has {} cells but the table only has {} columns",
                row.len(),
                self.ncols()
            );
        }
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.header.iter().map(|h| h.len()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }
        widths
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const SEP: &str = ",   ";

        if self.ncols() == 0 {
            return Ok(());
        }

        let widths = self.widths();
        let total: usize = widths.iter().sum::<usize>() + (widths.len() - 1) * SEP.len();

        let write_line = |f: &mut std::fmt::Formatter<'_>, cells: &[String]| -> std::fmt::Result {
            let mut line = String::new();
            for (col, width) in widths.iter().enumerate() {
                let cell = cells.get(col).map(String::as_str).unwrap_or("");
                write!(line, "{:>width$}", cell)?;
                if col + 1 != widths.len() {
                    line.push_str(SEP);
                }
            }
            writeln!(f, "{}", line)
        };

        write_line(f, &self.header)?;
        writeln!(f, "{:=>total$}", "")?;
        for row in &self.rows {
            write_line(f, row)?;
        }
        Ok(())
    }
}

////////////
// Banner //
////////////

pub struct Banner<'a>(&'a str);

impl<'a> Banner<'a> {
    pub fn new(message: &'a str) -> Self {
        Self(message)
    }
}

impl Display for Banner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = format!("# {} #", self.0);
        let len = st.len();
        writeln!(f, "{:#>len$}", "")?;
        writeln!(f, "{}", st)?;
        writeln!(f, "{:#>len$}", "")?;
        Ok(())
    }
}

///////////
// Tests //
///////////
