#![deny(missing_docs)]
#![doc = "Core error, dtype and column types shared by the LSS plugin, I/O and storage crates."]

pub mod column;
pub mod dtype;
pub mod errors;
pub mod rng;

pub use column::{Column, ColumnDescr};
pub use dtype::DType;
pub use errors::{ErrorInfo, LssError};
pub use rng::{derive_stream_seed, ColumnStream};

/// Rank of the worker that owns backing storage and receives reductions.
pub const ORIGIN_RANK: usize = 0;
