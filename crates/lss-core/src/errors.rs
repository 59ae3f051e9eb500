//! Structured error types shared across LSS crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`LssError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (plugin keys, column names, sizes, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    // Always serialized: the collective layer encodes errors with bincode,
    // which cannot skip fields.
    #[serde(default)]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for the LSS toolkit.
///
/// The type is `Clone + Serialize` so that an error raised on the origin
/// worker can be broadcast and re-raised verbatim on every other worker.
/// Variants are externally tagged: the broadcast uses bincode, which cannot
/// decode internally or adjacently tagged enums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum LssError {
    /// A plugin key is already registered within its family.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(ErrorInfo),
    /// A connection string references a key that no plugin registered.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(ErrorInfo),
    /// A connection string is empty or otherwise unparsable.
    #[error("malformed connection: {0}")]
    MalformedConnection(ErrorInfo),
    /// A plugin argument schema rejected a token.
    #[error("schema validation: {0}")]
    SchemaValidation(ErrorInfo),
    /// A requested column is not provided by the data source.
    #[error("unknown column: {0}")]
    UnknownColumn(ErrorInfo),
    /// Filesystem and stream failures.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Serialization and wire encoding failures.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Failures of the collective communication layer.
    #[error("collective error: {0}")]
    Collective(ErrorInfo),
    /// Array shape or dtype mismatches.
    #[error("shape error: {0}")]
    Shape(ErrorInfo),
}

impl LssError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            LssError::DuplicateRegistration(info)
            | LssError::UnknownPlugin(info)
            | LssError::MalformedConnection(info)
            | LssError::SchemaValidation(info)
            | LssError::UnknownColumn(info)
            | LssError::Io(info)
            | LssError::Serde(info)
            | LssError::Collective(info)
            | LssError::Shape(info) => info,
        }
    }

    /// Stable class name reported by the command line front end.
    pub fn class(&self) -> &'static str {
        match self {
            LssError::DuplicateRegistration(_) => "DuplicateRegistrationError",
            LssError::UnknownPlugin(_) => "UnknownPluginError",
            LssError::MalformedConnection(_) => "MalformedConnectionError",
            LssError::SchemaValidation(_) => "SchemaValidationError",
            LssError::UnknownColumn(_) => "UnknownColumnError",
            LssError::Io(_) => "IoError",
            LssError::Serde(_) => "SerdeError",
            LssError::Collective(_) => "CollectiveError",
            LssError::Shape(_) => "ShapeError",
        }
    }

    /// Wraps an I/O error, recording the path it occurred on.
    pub fn io(code: &str, path: impl Display, err: std::io::Error) -> Self {
        LssError::Io(ErrorInfo::new(code, err.to_string()).with_context("path", path.to_string()))
    }
}
