//! Line-oriented stream formats shared by every pipeline stage.
//!
//! All on-disk streams are whitespace-delimited plain text with one record
//! per line. A blank line, or a line with fewer fields than the record
//! needs, ends meaningful input without error; a full-width line with an
//! unparseable field is a [`FormatError`]. Readers stop at the first short
//! line, mirroring how the pipeline's producers terminate their output.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::linkage::AssignmentRow;
use crate::types::{Point, SimilarityEdge};

/// Errors raised while reading or writing the pipeline's text streams.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A stream could not be opened or created.
    #[error("failed to open `{path}`: {source}")]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// Reading from an open stream failed.
    #[error("failed to read `{path}`: {source}")]
    Read {
        /// Path being read.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// Writing to an open stream failed.
    #[error("failed to write `{path}`: {source}")]
    Write {
        /// Path being written.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// A full-width line held a field that would not parse.
    #[error("`{path}` line {line}: malformed field `{field}`")]
    Malformed {
        /// Path being read.
        path: PathBuf,
        /// One-based line number of the offending record.
        line: usize,
        /// The field that failed to parse.
        field: String,
    },
}

impl FormatError {
    fn read(path: &Path, source: io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    fn malformed(path: &Path, line: usize, field: &str) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            line,
            field: field.to_owned(),
        }
    }
}

/// Opens `path` for buffered reading.
///
/// # Errors
/// Returns [`FormatError::Open`] when the file cannot be opened.
pub fn open_reader(path: &Path) -> Result<BufReader<File>, FormatError> {
    File::open(path).map(BufReader::new).map_err(|source| FormatError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Creates `path` for buffered writing, truncating any existing file.
///
/// # Errors
/// Returns [`FormatError::Open`] when the file cannot be created.
pub fn create_writer(path: &Path) -> Result<BufWriter<File>, FormatError> {
    File::create(path).map(BufWriter::new).map_err(|source| FormatError::Open {
        path: path.to_path_buf(),
        source,
    })
}

// Splits one raw line into exactly three fields. `None` ends the stream.
fn three_fields(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), Some(third)) => Some((first, second, third)),
        _ => None,
    }
}

// Splits one raw line into exactly two fields. `None` ends the stream.
fn two_fields(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(first), Some(second)) => Some((first, second)),
        _ => None,
    }
}

fn parse_field<T: std::str::FromStr>(
    raw: &str,
    path: &Path,
    line: usize,
) -> Result<T, FormatError> {
    raw.parse().map_err(|_| FormatError::malformed(path, line, raw))
}

/// Visits every `(name, name, weight)` record of a raw similarity stream.
///
/// # Errors
/// Returns [`FormatError`] on I/O failure or a malformed weight field.
pub fn for_each_raw_similarity<E, F>(path: &Path, mut visit: F) -> Result<(), E>
where
    E: From<FormatError>,
    F: FnMut(&str, &str, f32) -> Result<(), E>,
{
    let reader = open_reader(path)?;
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FormatError::read(path, source))?;
        let Some((left, right, raw_weight)) = three_fields(&line) else {
            break;
        };
        let weight: f32 = parse_field(raw_weight, path, index + 1)?;
        visit(left, right, weight)?;
    }
    Ok(())
}

/// Visits every `(id, id, weight)` record of an id-normalized stream.
///
/// # Errors
/// Returns [`FormatError`] on I/O failure or a malformed field, or the
/// caller's error when `visit` fails.
pub fn for_each_edge<E, F>(path: &Path, mut visit: F) -> Result<(), E>
where
    E: From<FormatError>,
    F: FnMut(SimilarityEdge) -> Result<(), E>,
{
    let reader = open_reader(path)?;
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FormatError::read(path, source))?;
        let Some((raw_source, raw_target, raw_weight)) = three_fields(&line) else {
            break;
        };
        let source = parse_field(raw_source, path, index + 1)?;
        let target = parse_field(raw_target, path, index + 1)?;
        let weight = parse_field(raw_weight, path, index + 1)?;
        visit(SimilarityEdge::new(source, target, weight))?;
    }
    Ok(())
}

/// Reads a string-keyed coordinate stream into `(name, point)` rows.
///
/// # Errors
/// Returns [`FormatError`] on I/O failure or a malformed coordinate.
pub fn read_named_coordinates(path: &Path) -> Result<Vec<(String, Point)>, FormatError> {
    let reader = open_reader(path)?;
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FormatError::read(path, source))?;
        let Some((name, raw_x, raw_y)) = three_fields(&line) else {
            break;
        };
        let x = parse_field(raw_x, path, index + 1)?;
        let y = parse_field(raw_y, path, index + 1)?;
        rows.push((name.to_owned(), Point::new(x, y)));
    }
    Ok(rows)
}

/// Reads an id-keyed coordinate stream into `(id, point)` rows.
///
/// # Errors
/// Returns [`FormatError`] on I/O failure or a malformed field.
pub fn read_indexed_coordinates(path: &Path) -> Result<Vec<(usize, Point)>, FormatError> {
    let reader = open_reader(path)?;
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FormatError::read(path, source))?;
        let Some((raw_id, raw_x, raw_y)) = three_fields(&line) else {
            break;
        };
        let id = parse_field(raw_id, path, index + 1)?;
        let x = parse_field(raw_x, path, index + 1)?;
        let y = parse_field(raw_y, path, index + 1)?;
        rows.push((id, Point::new(x, y)));
    }
    Ok(rows)
}

/// Reads a cluster assignment stream into [`AssignmentRow`]s. The first
/// field is parsed as a dense node id, which is what every consumer of an
/// assignment stream works with; interior pipeline levels label nodes
/// with their integer ids.
///
/// # Errors
/// Returns [`FormatError`] on I/O failure or a malformed field.
pub fn read_assignments(path: &Path) -> Result<Vec<AssignmentRow>, FormatError> {
    let reader = open_reader(path)?;
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FormatError::read(path, source))?;
        let Some((raw_node, raw_cluster, raw_importance)) = three_fields(&line) else {
            break;
        };
        let node = parse_field(raw_node, path, index + 1)?;
        let cluster = parse_field(raw_cluster, path, index + 1)?;
        let importance = parse_field(raw_importance, path, index + 1)?;
        rows.push(AssignmentRow {
            node,
            cluster,
            importance,
        });
    }
    Ok(rows)
}

/// Reads a catalog stream (`name \t id`) into `(id, name)` pairs.
///
/// # Errors
/// Returns [`FormatError`] on I/O failure or a malformed id field.
pub fn read_catalog_pairs(path: &Path) -> Result<Vec<(usize, String)>, FormatError> {
    let reader = open_reader(path)?;
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FormatError::read(path, source))?;
        let Some((name, raw_id)) = two_fields(&line) else {
            break;
        };
        let id = parse_field(raw_id, path, index + 1)?;
        rows.push((id, name.to_owned()));
    }
    Ok(rows)
}

/// Something that accepts id-normalized edge records, either a tabular
/// writer or an in-memory vector for tests.
pub trait EdgeSink {
    /// Records one edge.
    ///
    /// # Errors
    /// Returns [`io::Error`] when the underlying sink fails.
    fn record(&mut self, edge: SimilarityEdge) -> io::Result<()>;
}

impl EdgeSink for Vec<SimilarityEdge> {
    fn record(&mut self, edge: SimilarityEdge) -> io::Result<()> {
        self.push(edge);
        Ok(())
    }
}

/// Writes edge records as tab-separated lines.
#[derive(Debug)]
pub struct TabularEdgeWriter<W: Write> {
    inner: W,
}

impl<W: Write> TabularEdgeWriter<W> {
    /// Wraps a writer.
    #[must_use]
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    /// Returns [`io::Error`] when the flush fails.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> EdgeSink for TabularEdgeWriter<W> {
    fn record(&mut self, edge: SimilarityEdge) -> io::Result<()> {
        writeln!(self.inner, "{}\t{}\t{}", edge.source, edge.target, edge.weight)
    }
}

/// Something that accepts id-keyed coordinate records.
pub trait CoordSink {
    /// Records one coordinate.
    ///
    /// # Errors
    /// Returns [`io::Error`] when the underlying sink fails.
    fn record(&mut self, node: usize, position: Point) -> io::Result<()>;
}

impl CoordSink for Vec<(usize, Point)> {
    fn record(&mut self, node: usize, position: Point) -> io::Result<()> {
        self.push((node, position));
        Ok(())
    }
}

/// Writes coordinate records as tab-separated lines.
#[derive(Debug)]
pub struct TabularCoordWriter<W: Write> {
    inner: W,
}

impl<W: Write> TabularCoordWriter<W> {
    /// Wraps a writer.
    #[must_use]
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    /// Returns [`io::Error`] when the flush fails.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> CoordSink for TabularCoordWriter<W> {
    fn record(&mut self, node: usize, position: Point) -> io::Result<()> {
        writeln!(self.inner, "{node}\t{}\t{}", position.x, position.y)
    }
}
