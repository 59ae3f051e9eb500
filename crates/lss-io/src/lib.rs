//! Data sources and the collective read protocol.
//!
//! A [`DataSource`] is opened from a connection string through the
//! [`DataSources`] plugin family and read collectively by a team of workers
//! connected by a [`Communicator`]. Only the origin worker touches storage;
//! the other workers receive correctly typed, zero-length columns.

mod binary;
mod collective;
mod comm;
mod flat;
mod source;
mod uniform;

pub use binary::{write_binary, BinaryFile, BinaryOptions};
pub use collective::{Batch, CollectiveRead};
pub use comm::{run_spmd, Communicator, CommunicatorExt, SelfComm, ThreadComm};
pub use flat::{parse_layout, FlatConfig, FlatSource, DEFAULT_LAYOUT, WEIGHT_COLUMN};
pub use source::{open, register_builtin_sources, DataSource, DataSources, SourceHandle};
pub use uniform::{UniformConfig, UniformSource};
