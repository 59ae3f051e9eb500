use std::fmt;
use std::sync::{OnceLock, RwLock};

use lss_core::{Column, ErrorInfo, LssError};
use lss_plugin::{Connected, ExtensionPoint, ParsedArgs, PluginRegistry};

use crate::result::{BinnedResult, Metadata};
use crate::sink::{Sink, SinkGuard};
use crate::text::BinnedTextStorage;

/// A writer of binned results with a fixed number of bin axes.
///
/// Only the origin worker writes; by the time a result reaches storage it
/// has already been reduced onto that worker.
pub trait MeasurementStorage: Send + Sync + fmt::Debug {
    /// Number of bin axes the writer accepts.
    fn dims(&self) -> usize;

    /// Where results go.
    fn sink(&self) -> &Sink;

    /// Serialises an already validated result.
    fn write_result(&self, result: &BinnedResult) -> Result<(), LssError>;

    /// Opens the sink for one write; see [`SinkGuard`].
    fn open(&self) -> Result<SinkGuard, LssError> {
        self.sink().open()
    }
}

impl dyn MeasurementStorage + '_ {
    /// Validates the parts of a result and writes it.
    pub fn write(
        &self,
        edges: Vec<Vec<f64>>,
        names: &[&str],
        values: Vec<Column>,
        metadata: Metadata,
    ) -> Result<BinnedResult, LssError> {
        let names = names.iter().map(|name| name.to_string()).collect();
        let result = BinnedResult::new(edges, names, values, metadata)?;
        self.check_dims(&result)?;
        self.write_result(&result)?;
        Ok(result)
    }

    /// Fails unless `result` has the number of axes this writer handles.
    pub fn check_dims(&self, result: &BinnedResult) -> Result<(), LssError> {
        if result.dims() == self.dims() {
            return Ok(());
        }
        Err(LssError::Shape(
            ErrorInfo::new("storage-dims", "result dimensionality does not match the writer")
                .with_context("writer", self.dims().to_string())
                .with_context("result", result.dims().to_string()),
        ))
    }
}

/// The measurement storage plugin family, keyed `1d`, `2d` and `3d`.
#[derive(Debug)]
pub struct MeasurementStorages;

impl ExtensionPoint for MeasurementStorages {
    const FAMILY: &'static str = "MeasurementStorage";
    type Object = dyn MeasurementStorage;

    fn registry() -> &'static RwLock<PluginRegistry<Self>> {
        static REGISTRY: OnceLock<RwLock<PluginRegistry<MeasurementStorages>>> = OnceLock::new();
        REGISTRY.get_or_init(|| RwLock::new(PluginRegistry::new()))
    }
}

/// Configuration shared by the builtin writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Output destination.
    pub sink: Sink,
}

impl StorageConfig {
    /// Builds the configuration from parsed arguments.
    pub fn from_args(args: &ParsedArgs) -> Result<Self, LssError> {
        let path: std::path::PathBuf = args.get("path")?;
        Ok(Self {
            sink: Sink::parse(path),
        })
    }
}

/// Registers the builtin text writers once per process.
pub fn register_builtin_storage() -> Result<(), LssError> {
    static BUILTINS: OnceLock<Result<(), LssError>> = OnceLock::new();
    BUILTINS
        .get_or_init(|| {
            MeasurementStorages::register::<BinnedTextStorage<1>>()?;
            MeasurementStorages::register::<BinnedTextStorage<2>>()?;
            MeasurementStorages::register::<BinnedTextStorage<3>>()?;
            Ok(())
        })
        .clone()
}

/// Resolves the writer for `dim` (`"1d"`, `"2d"` or `"3d"`) bound to `path`.
///
/// `"-"` and the empty path select the standard output. The path is passed
/// as a single token, so it may contain `:`.
pub fn new(dim: &str, path: &str) -> Result<Box<dyn MeasurementStorage>, LssError> {
    register_builtin_storage()?;
    MeasurementStorages::build(dim, &[path.to_string()])
}

/// Opens a writer from a `dim:path` connection string.
pub fn open(connection: &str) -> Result<Connected<dyn MeasurementStorage>, LssError> {
    register_builtin_storage()?;
    MeasurementStorages::open(connection)
}
