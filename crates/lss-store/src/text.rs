//! Self-describing text tables for binned results.
//!
//! ```text
//! # lss-binned: 1
//! # dims: 2
//! # edges: [[0.0,0.5,1.0],[0.0,1.0,2.0,3.0]]
//! # metadata: {"a":1.0,"b":"x"}
//! # columns: ["power","modes"]
//! # dtypes: ["f8","i8"]
//! # shape: [2,3]
//! 0 0 1.25 4
//! 0 1 0.5 7
//! ...
//! ```
//!
//! Header values are JSON. Each data row holds the bin index along every
//! axis followed by one value per column, bins in row-major order. Floats are
//! printed in their shortest exact form, so reading a table back restores
//! every value bit for bit.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use lss_core::{Column, DType, ErrorInfo, LssError};
use lss_plugin::{ArgKind, ArgSchema, ArgSpec, ArgValue, ParsedArgs, Plugin};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::result::{BinnedResult, Metadata};
use crate::sink::Sink;
use crate::storage::{MeasurementStorage, MeasurementStorages, StorageConfig};

const FORMAT_TAG: &str = "lss-binned";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
enum TextFormatError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("missing header field '{0}'")]
    MissingHeader(&'static str),
    #[error("unsupported format version {0}")]
    Version(u32),
    #[error("expected {expected} data rows, found {found}")]
    RowCount { expected: usize, found: usize },
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TextFormatError> for LssError {
    fn from(err: TextFormatError) -> Self {
        let code = match &err {
            TextFormatError::Malformed { .. } => "text-malformed",
            TextFormatError::MissingHeader(_) => "text-missing-header",
            TextFormatError::Version(_) => "text-version",
            TextFormatError::RowCount { .. } => "text-row-count",
            TextFormatError::Io(_) => "text-io",
        };
        match err {
            TextFormatError::Io(io) => LssError::Io(ErrorInfo::new(code, io.to_string())),
            other => LssError::Serde(ErrorInfo::new(code, other.to_string())),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, LssError> {
    serde_json::to_string(value)
        .map_err(|err| LssError::Serde(ErrorInfo::new("text-encode", err.to_string())))
}

fn from_json<T: DeserializeOwned>(line: usize, raw: &str) -> Result<T, TextFormatError> {
    serde_json::from_str(raw).map_err(|err| TextFormatError::Malformed {
        line,
        reason: err.to_string(),
    })
}

/// Serialises `result` as a text table.
pub fn write_binned<W: Write>(writer: &mut W, result: &BinnedResult) -> Result<(), LssError> {
    let dtypes: Vec<DType> = result.values().iter().map(Column::dtype).collect();
    let mut out = String::new();
    out.push_str(&format!("# {FORMAT_TAG}: {FORMAT_VERSION}\n"));
    out.push_str(&format!("# dims: {}\n", result.dims()));
    out.push_str(&format!("# edges: {}\n", to_json(&result.edges())?));
    out.push_str(&format!("# metadata: {}\n", to_json(result.metadata())?));
    out.push_str(&format!("# columns: {}\n", to_json(&result.names())?));
    out.push_str(&format!("# dtypes: {}\n", to_json(&dtypes)?));
    out.push_str(&format!("# shape: {}\n", to_json(&result.bin_counts())?));

    let counts = result.bin_counts();
    let texts: Vec<Vec<String>> = result.values().iter().map(Column::to_text_values).collect();
    let bins: usize = counts.iter().product();
    let mut index = vec![0usize; counts.len()];
    for bin in 0..bins {
        let mut fields: Vec<&str> = Vec::with_capacity(index.len() + texts.len());
        let labels: Vec<String> = index.iter().map(usize::to_string).collect();
        fields.extend(labels.iter().map(String::as_str));
        fields.extend(texts.iter().map(|values| values[bin].as_str()));
        out.push_str(&fields.join(" "));
        out.push('\n');
        advance(&mut index, &counts);
    }
    writer
        .write_all(out.as_bytes())
        .map_err(|err| LssError::Io(ErrorInfo::new("text-write", err.to_string())))
}

// Row-major increment of a multi-index.
fn advance(index: &mut [usize], counts: &[usize]) {
    for axis in (0..index.len()).rev() {
        index[axis] += 1;
        if index[axis] < counts[axis] {
            return;
        }
        index[axis] = 0;
    }
}

/// Parses a table written by [`write_binned`].
pub fn read_binned<R: BufRead>(reader: R) -> Result<BinnedResult, LssError> {
    parse_table(reader)
}

/// Reads a table from a file.
pub fn read_binned_path(path: &Path) -> Result<BinnedResult, LssError> {
    let file = File::open(path).map_err(|err| LssError::io("text-open", path.display(), err))?;
    read_binned(BufReader::new(file))
}

fn parse_table<R: BufRead>(reader: R) -> Result<BinnedResult, LssError> {
    let mut header: BTreeMap<String, (usize, String)> = BTreeMap::new();
    let mut rows: Vec<(usize, String)> = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(TextFormatError::from)?;
        let number = idx + 1;
        if let Some(rest) = line.strip_prefix('#') {
            let (key, value) = rest.split_once(':').ok_or(TextFormatError::Malformed {
                line: number,
                reason: "header line without ':'".into(),
            })?;
            header.insert(key.trim().to_string(), (number, value.trim().to_string()));
        } else if !line.trim().is_empty() {
            rows.push((number, line));
        }
    }

    fn field<T: DeserializeOwned>(
        header: &BTreeMap<String, (usize, String)>,
        key: &'static str,
    ) -> Result<T, TextFormatError> {
        let (line, raw) = header.get(key).ok_or(TextFormatError::MissingHeader(key))?;
        from_json(*line, raw)
    }

    let version: u32 = field(&header, FORMAT_TAG)?;
    if version != FORMAT_VERSION {
        return Err(TextFormatError::Version(version).into());
    }
    let dims: usize = field(&header, "dims")?;
    let edges: Vec<Vec<f64>> = field(&header, "edges")?;
    let metadata: Metadata = field(&header, "metadata")?;
    let names: Vec<String> = field(&header, "columns")?;
    let dtypes: Vec<DType> = field(&header, "dtypes")?;
    let shape: Vec<usize> = field(&header, "shape")?;
    if edges.len() != dims || shape.len() != dims || dtypes.len() != names.len() {
        return Err(TextFormatError::Malformed {
            line: 0,
            reason: "header fields disagree on dims or column count".into(),
        }
        .into());
    }

    let bins: usize = shape.iter().product();
    if rows.len() != bins {
        return Err(TextFormatError::RowCount {
            expected: bins,
            found: rows.len(),
        }
        .into());
    }
    let mut tokens: Vec<Vec<&str>> = vec![Vec::with_capacity(bins); names.len()];
    let mut index = vec![0usize; dims];
    for (number, row) in &rows {
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() != dims + names.len() {
            return Err(TextFormatError::Malformed {
                line: *number,
                reason: format!("expected {} fields, found {}", dims + names.len(), fields.len()),
            }
            .into());
        }
        let labels_match = fields[..dims]
            .iter()
            .zip(&index)
            .all(|(label, expected)| label.parse::<usize>().ok() == Some(*expected));
        if !labels_match {
            return Err(TextFormatError::Malformed {
                line: *number,
                reason: format!("bin labels out of order, expected {index:?}"),
            }
            .into());
        }
        for (column, value) in tokens.iter_mut().zip(&fields[dims..]) {
            column.push(*value);
        }
        advance(&mut index, &shape);
    }

    let values = dtypes
        .iter()
        .zip(&tokens)
        .map(|(dtype, column)| Column::from_text_values(*dtype, &shape, column))
        .collect::<Result<Vec<Column>, LssError>>()?;
    BinnedResult::new(edges, names, values, metadata)
}

/// Text table writer for results with `D` bin axes.
#[derive(Debug)]
pub struct BinnedTextStorage<const D: usize> {
    config: StorageConfig,
}

impl<const D: usize> BinnedTextStorage<D> {
    /// Creates a writer bound to `sink`.
    pub fn new(sink: Sink) -> Self {
        Self {
            config: StorageConfig { sink },
        }
    }
}

impl<const D: usize> MeasurementStorage for BinnedTextStorage<D> {
    fn dims(&self) -> usize {
        D
    }

    fn sink(&self) -> &Sink {
        &self.config.sink
    }

    fn write_result(&self, result: &BinnedResult) -> Result<(), LssError> {
        let mut guard = self.open()?;
        write_binned(&mut guard, result)?;
        guard.finish()?;
        tracing::info!(
            sink = %self.config.sink,
            dims = D,
            columns = result.names().len(),
            "wrote binned result"
        );
        Ok(())
    }
}

impl<const D: usize> Plugin<MeasurementStorages> for BinnedTextStorage<D> {
    const KEY: &'static str = match D {
        1 => "1d",
        2 => "2d",
        _ => "3d",
    };

    fn declare_schema(schema: &mut ArgSchema) {
        schema
            .set_description(match D {
                1 => "text table of a result binned along one axis",
                2 => "text table of a result binned along two axes",
                _ => "text table of a result binned along three axes",
            })
            .add(
                ArgSpec::positional("path", ArgKind::Path)
                    .default_value(ArgValue::Path("-".into()))
                    .help("output file; '-' or empty for standard output"),
            );
    }

    fn construct(args: &ParsedArgs) -> Result<Box<dyn MeasurementStorage>, LssError> {
        Ok(Box::new(BinnedTextStorage::<D> {
            config: StorageConfig::from_args(args)?,
        }))
    }
}
