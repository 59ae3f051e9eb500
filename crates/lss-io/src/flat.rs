use std::path::PathBuf;
use std::sync::OnceLock;

use lss_core::{Column, ColumnDescr, DType, ErrorInfo, LssError};
use lss_plugin::{ArgKind, ArgSchema, ArgSpec, ArgValue, ParsedArgs, Plugin};
use ndarray::{ArrayD, IxDyn};

use crate::binary::{BinaryFile, BinaryOptions};
use crate::source::{DataSource, DataSources};

/// Layout used when no `-columns` option is given.
pub const DEFAULT_LAYOUT: &str = "Position[3],Velocity[3]";

/// Name of the computed unit-weight column.
pub const WEIGHT_COLUMN: &str = "Weight";

/// Parses a layout such as `Position[3],Velocity[3],Mass` into field names
/// and per-row widths; a bare name is a scalar field.
pub fn parse_layout(raw: &str) -> Result<Vec<(String, Option<usize>)>, String> {
    let mut fields: Vec<(String, Option<usize>)> = Vec::new();
    for entry in raw.split(',').map(str::trim) {
        let (name, width) = match entry.split_once('[') {
            Some((name, rest)) => {
                let digits = rest
                    .strip_suffix(']')
                    .ok_or_else(|| format!("unterminated width in '{entry}'"))?;
                let width: usize = digits
                    .trim()
                    .parse()
                    .map_err(|_| format!("width '{digits}' of '{name}' is not an integer"))?;
                if width == 0 {
                    return Err(format!("field '{name}' has zero width"));
                }
                (name.trim(), Some(width))
            }
            None => (entry, None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid field name '{name}'"));
        }
        if fields.iter().any(|(existing, _)| existing == name) {
            return Err(format!("field '{name}' listed twice"));
        }
        fields.push((name.to_string(), width));
    }
    Ok(fields)
}

fn layout_arg(raw: &str) -> Result<ArgValue, String> {
    parse_layout(raw).map(|_| ArgValue::Str(raw.to_string()))
}

/// Configuration of a [`FlatSource`], populated from the connection string.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatConfig {
    /// File to read.
    pub path: PathBuf,
    /// Element type shared by every field.
    pub dtype: DType,
    /// Field names and widths, in file order.
    pub layout: Vec<(String, Option<usize>)>,
    /// Row count; inferred from the file length when absent.
    pub size: Option<usize>,
    /// Bytes to skip before the first field.
    pub header: u64,
    /// Rows per batch for chunked reads.
    pub bunchsize: Option<usize>,
}

impl FlatConfig {
    /// Builds the configuration from parsed arguments.
    pub fn from_args(args: &ParsedArgs) -> Result<Self, LssError> {
        let raw_layout: String = args.get("columns")?;
        let layout = parse_layout(&raw_layout).map_err(|message| {
            LssError::SchemaValidation(
                ErrorInfo::new("schema-invalid-value", message)
                    .with_context("plugin", args.key())
                    .with_context("argument", "columns"),
            )
        })?;
        let header: usize = args.get("header")?;
        Ok(Self {
            path: args.get("path")?,
            dtype: args.get("dtype")?,
            layout,
            size: args.get_opt("size")?,
            header: header as u64,
            bunchsize: args.get_opt("bunchsize")?,
        })
    }

    /// Field descriptors of the file layout.
    pub fn fields(&self) -> Vec<(String, ColumnDescr)> {
        self.layout
            .iter()
            .map(|(name, width)| {
                let descr = match width {
                    Some(width) => ColumnDescr::vector(self.dtype, *width),
                    None => ColumnDescr::scalar(self.dtype),
                };
                (name.clone(), descr)
            })
            .collect()
    }
}

/// A columnar binary file whose fields all share one element type.
///
/// Besides the stored fields it provides a computed `Weight` column of ones
/// unless the file stores a field of that name.
#[derive(Debug)]
pub struct FlatSource {
    config: FlatConfig,
    file: OnceLock<BinaryFile>,
}

impl FlatSource {
    /// Creates the source; the file is validated on first use.
    pub fn new(config: FlatConfig) -> Self {
        Self {
            config,
            file: OnceLock::new(),
        }
    }

    /// Configuration of the source.
    pub fn config(&self) -> &FlatConfig {
        &self.config
    }

    fn file(&self) -> Result<&BinaryFile, LssError> {
        if let Some(file) = self.file.get() {
            return Ok(file);
        }
        let options = BinaryOptions {
            header_size: self.config.header,
            size: self.config.size,
            offsets: None,
        };
        let opened = BinaryFile::open(&self.config.path, &self.config.fields(), &options)?;
        Ok(self.file.get_or_init(|| opened))
    }

    fn computed_weight(&self) -> bool {
        !self.config.layout.iter().any(|(name, _)| name == WEIGHT_COLUMN)
    }
}

impl DataSource for FlatSource {
    fn columns(&self) -> Vec<(String, ColumnDescr)> {
        let mut columns = self.config.fields();
        if self.computed_weight() {
            columns.push((WEIGHT_COLUMN.to_string(), ColumnDescr::scalar(DType::F8)));
        }
        columns
    }

    fn size(&self) -> Result<usize, LssError> {
        Ok(self.file()?.size())
    }

    fn read_all(&self, columns: &[&str]) -> Result<Vec<Column>, LssError> {
        let size = self.size()?;
        self.read_range(columns, 0, size)
    }

    fn chunk_rows(&self) -> Option<usize> {
        self.config.bunchsize
    }

    fn read_range(&self, columns: &[&str], start: usize, stop: usize) -> Result<Vec<Column>, LssError> {
        let file = self.file()?;
        columns
            .iter()
            .map(|name| {
                if *name == WEIGHT_COLUMN && self.computed_weight() {
                    if start > stop || stop > file.size() {
                        return Err(LssError::Shape(
                            ErrorInfo::new("binary-range", "row range out of bounds")
                                .with_context("range", format!("{start}..{stop}"))
                                .with_context("size", file.size().to_string()),
                        ));
                    }
                    Ok(Column::F8(ArrayD::ones(IxDyn(&[stop - start]))))
                } else {
                    file.read_rows(name, start, stop)
                }
            })
            .collect()
    }
}

impl Plugin<DataSources> for FlatSource {
    const KEY: &'static str = "flat";

    fn declare_schema(schema: &mut ArgSchema) {
        schema
            .set_description("read columns from a flat binary file, one block per field")
            .add(ArgSpec::positional("path", ArgKind::Path).help("the file to read"))
            .add(ArgSpec::positional("dtype", ArgKind::DType).help("element type of every field"))
            .add(
                ArgSpec::option(
                    "columns",
                    ArgKind::Custom {
                        metavar: "LAYOUT",
                        parse: layout_arg,
                    },
                )
                .default_value(ArgValue::Str(DEFAULT_LAYOUT.into()))
                .help("field names and widths, in file order"),
            )
            .add(ArgSpec::option("size", ArgKind::Int).help("number of rows; inferred when omitted"))
            .add(
                ArgSpec::option("header", ArgKind::Int)
                    .default_value(ArgValue::Int(0))
                    .help("bytes to skip before the data"),
            )
            .add(ArgSpec::option("bunchsize", ArgKind::Int).help("rows per batch for chunked reads"));
    }

    fn construct(args: &ParsedArgs) -> Result<Box<dyn DataSource>, LssError> {
        Ok(Box::new(FlatSource::new(FlatConfig::from_args(args)?)))
    }
}
