use std::fmt;
use std::ops::{Deref, DerefMut};

use lss_core::errors::{ErrorInfo, LssError};

use crate::registry::{ExtensionPoint, PluginRegistry};

/// Splits `key:tok1:tok2:...` into the plugin key and the raw tokens.
///
/// Tokens are returned verbatim, including empty ones, so a connection may
/// deliberately pass an empty argument.
pub fn parse_connection(connection: &str) -> Result<(String, Vec<String>), LssError> {
    if connection.is_empty() {
        return Err(LssError::MalformedConnection(ErrorInfo::new(
            "connection-empty",
            "connection string is empty",
        )));
    }
    let mut words = connection.split(':');
    let key = words.next().unwrap_or_default();
    if key.is_empty() {
        return Err(LssError::MalformedConnection(
            ErrorInfo::new("connection-empty-key", "connection string has no plugin key")
                .with_context("connection", connection)
                .with_hint("connection strings look like key:arg1:arg2"),
        ));
    }
    Ok((key.to_string(), words.map(str::to_string).collect()))
}

/// A plugin object together with the connection string it was built from.
///
/// Equality is literal equality of the origin strings: two connections that
/// describe the same data with different spellings compare unequal.
pub struct Connected<T: ?Sized> {
    origin: String,
    inner: Box<T>,
}

impl<T: ?Sized> Connected<T> {
    /// Wraps an object built from `origin`.
    pub fn new(origin: impl Into<String>, inner: Box<T>) -> Self {
        Self {
            origin: origin.into(),
            inner,
        }
    }

    /// The connection string this object was built from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Drops the origin and returns the object.
    pub fn into_inner(self) -> Box<T> {
        self.inner
    }
}

impl<T: ?Sized> Deref for Connected<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> DerefMut for Connected<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: ?Sized> PartialEq for Connected<T> {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin
    }
}

impl<T: ?Sized> Eq for Connected<T> {}

impl<T: ?Sized> fmt::Debug for Connected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Connected").field(&self.origin).finish()
    }
}

/// Resolves the key of `connection` in `registry`, runs the remaining tokens
/// through the plugin schema and builds the object.
pub fn instantiate<E: ExtensionPoint>(
    registry: &PluginRegistry<E>,
    connection: &str,
) -> Result<Connected<E::Object>, LssError> {
    let (key, tokens) = parse_connection(connection)?;
    let registration = registry.resolve(&key)?;
    let object = registration.build(&tokens)?;
    tracing::debug!(family = E::FAMILY, %key, tokens = tokens.len(), "instantiated plugin");
    Ok(Connected::new(connection, object))
}
