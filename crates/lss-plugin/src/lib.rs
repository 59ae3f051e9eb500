//! Extension points for the LSS toolkit.
//!
//! A family of plugins (data sources, measurement writers, ...) implements
//! [`ExtensionPoint`]; each concrete plugin implements [`Plugin`] for that
//! family and is enrolled by an explicit `register` call at startup. Plugins
//! are then built from colon separated connection strings such as
//! `flat:/data/halos.bin:f8:-size:1024`, whose tokens are validated by the
//! plugin's own [`ArgSchema`].

mod connection;
mod registry;
mod schema;

pub use connection::{instantiate, parse_connection, Connected};
pub use registry::{Constructor, ExtensionPoint, Plugin, PluginRegistry, Registration};
pub use schema::{
    parse_box_size, ArgKind, ArgSchema, ArgSpec, ArgValue, CustomParser, FromArg, ParsedArgs,
};
