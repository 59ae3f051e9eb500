//! Measurement storage for binned statistics.
//!
//! Writers are plugins of the [`MeasurementStorages`] family, selected by
//! the number of bin axes (`1d`, `2d`, `3d`) through [`new`]. Each writer
//! owns a [`Sink`], opened for the duration of a single write.

mod result;
mod sink;
mod storage;
mod text;

pub use result::{BinnedResult, MetaValue, Metadata};
pub use sink::{Sink, SinkGuard};
pub use storage::{
    new, open, register_builtin_storage, MeasurementStorage, MeasurementStorages, StorageConfig,
};
pub use text::{read_binned, read_binned_path, write_binned, BinnedTextStorage};
