use std::fmt;
use std::sync::{OnceLock, RwLock};

use lss_core::{Column, ColumnDescr, ErrorInfo, LssError};
use lss_plugin::{Connected, ExtensionPoint, PluginRegistry};

use crate::collective::CollectiveRead;
use crate::comm::Communicator;
use crate::flat::FlatSource;
use crate::uniform::UniformSource;

/// A supplier of particle-like records.
///
/// Implementations describe their columns without touching storage and read
/// data on request. Consumers never call the read methods directly; they go
/// through [`read`](#method.read), which runs the collective protocol on top
/// of them.
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Every column the source can produce, with its descriptor.
    ///
    /// This must not touch storage and must return the same answer on every
    /// worker.
    fn columns(&self) -> Vec<(String, ColumnDescr)>;

    /// Number of rows. Only called on the origin worker.
    fn size(&self) -> Result<usize, LssError>;

    /// Reads whole columns, in request order. Only called on the origin
    /// worker.
    fn read_all(&self, columns: &[&str]) -> Result<Vec<Column>, LssError>;

    /// Rows per batch for sources that read in chunks; `None` reads the
    /// whole source in one batch.
    fn chunk_rows(&self) -> Option<usize> {
        None
    }

    /// Reads rows `start..stop` of the requested columns.
    fn read_range(&self, columns: &[&str], start: usize, stop: usize) -> Result<Vec<Column>, LssError> {
        self.read_all(columns)?
            .iter()
            .map(|column| column.slice_rows(start, stop))
            .collect()
    }
}

impl dyn DataSource + '_ {
    /// Descriptor of a column, if the source provides it.
    pub fn describe_column(&self, name: &str) -> Option<ColumnDescr> {
        self.columns()
            .into_iter()
            .find_map(|(column, descr)| (column == name).then_some(descr))
    }

    /// Checks a column request against [`DataSource::columns`].
    ///
    /// Runs locally on every worker before any collective call, so a bad
    /// request fails identically everywhere.
    pub fn validate_request(&self, columns: &[&str]) -> Result<Vec<ColumnDescr>, LssError> {
        let available = self.columns();
        columns
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find_map(|(column, descr)| (column == name).then(|| descr.clone()))
                    .ok_or_else(|| {
                        let names: Vec<&str> = available.iter().map(|(n, _)| n.as_str()).collect();
                        LssError::UnknownColumn(
                            ErrorInfo::new(
                                "source-unknown-column",
                                format!("column '{name}' is not provided by the data source"),
                            )
                            .with_context("column", *name)
                            .with_context("available", names.join(", ")),
                        )
                    })
            })
            .collect()
    }

    /// Collectively reads `columns` across the team behind `comm`.
    ///
    /// Every worker must call this with the same arguments. Only the origin
    /// worker touches storage; the others receive zero-length columns with
    /// the agreed dtype and row shape. With `full` set, or when the source
    /// does not read in chunks, the iterator yields exactly one batch.
    pub fn read<'a>(
        &'a self,
        columns: &[&str],
        comm: &'a dyn Communicator,
        full: bool,
    ) -> Result<CollectiveRead<'a>, LssError> {
        self.validate_request(columns)?;
        let chunk = if full {
            None
        } else {
            self.chunk_rows().filter(|rows| *rows > 0)
        };
        Ok(CollectiveRead::new(
            self,
            comm,
            columns.iter().map(|name| name.to_string()).collect(),
            chunk,
        ))
    }
}

/// The data source plugin family.
#[derive(Debug)]
pub struct DataSources;

impl ExtensionPoint for DataSources {
    const FAMILY: &'static str = "DataSource";
    type Object = dyn DataSource;

    fn registry() -> &'static RwLock<PluginRegistry<Self>> {
        static REGISTRY: OnceLock<RwLock<PluginRegistry<DataSources>>> = OnceLock::new();
        REGISTRY.get_or_init(|| RwLock::new(PluginRegistry::new()))
    }
}

/// A data source together with the connection string it was opened from.
pub type SourceHandle = Connected<dyn DataSource>;

/// Registers the builtin sources (`flat`, `uniform`) once per process.
pub fn register_builtin_sources() -> Result<(), LssError> {
    static BUILTINS: OnceLock<Result<(), LssError>> = OnceLock::new();
    BUILTINS
        .get_or_init(|| {
            DataSources::register::<FlatSource>()?;
            DataSources::register::<UniformSource>()?;
            Ok(())
        })
        .clone()
}

/// Opens a data source from a `key:arg:...` connection string.
pub fn open(connection: &str) -> Result<SourceHandle, LssError> {
    register_builtin_sources()?;
    DataSources::open(connection)
}
