//! The collective read protocol.
//!
//! Each step of a [`CollectiveRead`] is one broadcast from the origin
//! worker. The origin reads (or fails), then sends either the descriptors of
//! the batch it holds, an end marker, or its error. Every other worker
//! follows the message: it builds zero-length placeholder columns, stops, or
//! raises the same error. Workers therefore always take the same number of
//! steps, whatever happens on the origin.

use std::fmt;

use lss_core::{Column, ColumnDescr, ErrorInfo, LssError, ORIGIN_RANK};
use serde::{Deserialize, Serialize};

use crate::comm::{Communicator, CommunicatorExt};
use crate::source::DataSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Step {
    Batch(Vec<ColumnDescr>),
    Done,
    Failed(LssError),
}

/// One batch of a collective read: the requested columns, in request order,
/// all with the same number of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Batch {
    /// Pairs names with columns.
    pub fn new(names: Vec<String>, columns: Vec<Column>) -> Self {
        Self { names, columns }
    }

    /// Number of rows; zero on workers other than the origin.
    pub fn rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Column names in request order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Columns in request order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .map(|idx| &self.columns[idx])
    }

    /// Descriptors of the columns, in request order.
    pub fn descrs(&self) -> Vec<ColumnDescr> {
        self.columns.iter().map(Column::descr).collect()
    }

    /// Consumes the batch, returning the columns.
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

#[derive(Debug)]
enum Mode {
    Full,
    Chunked {
        rows: usize,
        cursor: usize,
        total: Option<usize>,
        emitted: bool,
    },
}

/// Iterator over the batches of a collective read.
///
/// Every worker must drive the iterator to the end, since each call to
/// `next` is a synchronisation point. Dropping it early on one worker only
/// blocks its peers.
pub struct CollectiveRead<'a> {
    source: &'a dyn DataSource,
    comm: &'a dyn Communicator,
    names: Vec<String>,
    mode: Mode,
    finished: bool,
    step: usize,
}

impl fmt::Debug for CollectiveRead<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectiveRead")
            .field("source", &self.source)
            .field("rank", &self.comm.rank())
            .field("names", &self.names)
            .field("mode", &self.mode)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'a> CollectiveRead<'a> {
    pub(crate) fn new(
        source: &'a dyn DataSource,
        comm: &'a dyn Communicator,
        names: Vec<String>,
        chunk: Option<usize>,
    ) -> Self {
        let mode = match chunk {
            Some(rows) => Mode::Chunked {
                rows,
                cursor: 0,
                total: None,
                emitted: false,
            },
            None => Mode::Full,
        };
        Self {
            source,
            comm,
            names,
            mode,
            finished: false,
            step: 0,
        }
    }

    fn origin_step(&mut self) -> Result<Option<Vec<Column>>, LssError> {
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        let columns = match &mut self.mode {
            Mode::Full => self.source.read_all(&names)?,
            Mode::Chunked {
                rows,
                cursor,
                total,
                emitted,
            } => {
                let size = match *total {
                    Some(size) => size,
                    None => *total.insert(self.source.size()?),
                };
                if *cursor >= size && *emitted {
                    return Ok(None);
                }
                let stop = (*cursor + *rows).min(size);
                let columns = self.source.read_range(&names, *cursor, stop)?;
                *cursor = stop;
                *emitted = true;
                columns
            }
        };
        check_batch(&self.names, &columns)?;
        Ok(Some(columns))
    }
}

fn check_batch(names: &[String], columns: &[Column]) -> Result<(), LssError> {
    if columns.len() != names.len() {
        return Err(LssError::Shape(
            ErrorInfo::new("read-column-count", "source returned the wrong number of columns")
                .with_context("expected", names.len().to_string())
                .with_context("actual", columns.len().to_string()),
        ));
    }
    let rows = columns.first().map(Column::len).unwrap_or(0);
    for (name, column) in names.iter().zip(columns) {
        if column.len() != rows {
            return Err(LssError::Shape(
                ErrorInfo::new("read-ragged-batch", "columns of one batch differ in length")
                    .with_context("column", name.clone())
                    .with_context("expected", rows.to_string())
                    .with_context("actual", column.len().to_string()),
            ));
        }
    }
    Ok(())
}

impl Iterator for CollectiveRead<'_> {
    type Item = Result<Batch, LssError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let is_origin = self.comm.rank() == ORIGIN_RANK;
        let mut local = None;
        let message = if is_origin {
            Some(match self.origin_step() {
                Ok(Some(columns)) => {
                    let descrs = columns.iter().map(Column::descr).collect();
                    local = Some(columns);
                    Step::Batch(descrs)
                }
                Ok(None) => Step::Done,
                Err(err) => Step::Failed(err),
            })
        } else {
            None
        };

        let agreed: Step = match self.comm.broadcast(ORIGIN_RANK, message.as_ref()) {
            Ok(step) => step,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };
        self.step += 1;

        match agreed {
            Step::Batch(descrs) => {
                tracing::debug!(
                    rank = self.comm.rank(),
                    step = self.step,
                    columns = descrs.len(),
                    "collective read step"
                );
                if matches!(self.mode, Mode::Full) {
                    self.finished = true;
                }
                let columns =
                    local.unwrap_or_else(|| descrs.iter().map(Column::empty).collect());
                Some(Ok(Batch::new(self.names.clone(), columns)))
            }
            Step::Done => {
                self.finished = true;
                None
            }
            Step::Failed(err) => {
                tracing::debug!(rank = self.comm.rank(), step = self.step, error = %err, "collective read failed");
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
