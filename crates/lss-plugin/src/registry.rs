use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lss_core::errors::{ErrorInfo, LssError};

use crate::connection::{instantiate, Connected};
use crate::schema::{ArgSchema, ParsedArgs};

/// Constructor stored for a registered plugin.
pub type Constructor<E> =
    fn(&ParsedArgs) -> Result<Box<<E as ExtensionPoint>::Object>, LssError>;

/// A plugin family: every plugin of the family builds the same kind of
/// object, and the family owns exactly one process-wide registry.
///
/// Implementors hold the registry in a function-local
/// `OnceLock<RwLock<PluginRegistry<Self>>>`, which creates it lazily on the
/// first registration or lookup and keeps it for the life of the process.
pub trait ExtensionPoint: Sized + 'static {
    /// Family name used in diagnostics and help output.
    const FAMILY: &'static str;

    /// Object built by the plugins of this family.
    type Object: ?Sized;

    /// The process-wide registry of this family.
    fn registry() -> &'static RwLock<PluginRegistry<Self>>;

    /// Registers plugin `P` in the process-wide registry.
    fn register<P: Plugin<Self>>() -> Result<(), LssError> {
        let registration = Registration::of::<P>()?;
        write_registry::<Self>().register(registration)
    }

    /// Help text of every plugin registered in the process-wide registry.
    fn describe() -> String {
        read_registry::<Self>().describe()
    }

    /// Keys registered in the process-wide registry, sorted.
    fn keys() -> Vec<String> {
        read_registry::<Self>().keys()
    }

    /// Builds a plugin object from a `key:arg:...` connection string.
    fn open(connection: &str) -> Result<Connected<Self::Object>, LssError> {
        instantiate(&read_registry::<Self>(), connection)
    }

    /// Builds plugin `key` from tokens that were never part of a connection
    /// string, so they may themselves contain `:`.
    fn build(key: &str, tokens: &[String]) -> Result<Box<Self::Object>, LssError> {
        let object = read_registry::<Self>().resolve(key)?.build(tokens)?;
        tracing::debug!(family = Self::FAMILY, %key, "built plugin");
        Ok(object)
    }
}

// Registration is write-once per key; a panic while holding the lock cannot
// leave a half-inserted entry behind, so poisoned guards are recovered.
fn read_registry<E: ExtensionPoint>() -> RwLockReadGuard<'static, PluginRegistry<E>> {
    E::registry().read().unwrap_or_else(|poisoned| {
        tracing::warn!(family = E::FAMILY, "recovering poisoned plugin registry");
        PoisonError::into_inner(poisoned)
    })
}

fn write_registry<E: ExtensionPoint>() -> RwLockWriteGuard<'static, PluginRegistry<E>> {
    E::registry().write().unwrap_or_else(|poisoned| {
        tracing::warn!(family = E::FAMILY, "recovering poisoned plugin registry");
        PoisonError::into_inner(poisoned)
    })
}

/// A concrete plugin of family `E`.
pub trait Plugin<E: ExtensionPoint> {
    /// Key selecting the plugin as the first token of a connection string.
    const KEY: &'static str;

    /// Declares constructor arguments; runs once, at registration.
    fn declare_schema(schema: &mut ArgSchema);

    /// Builds the object from validated arguments.
    fn construct(args: &ParsedArgs) -> Result<Box<E::Object>, LssError>;

    /// Runs right after the plugin has been stored in the registry, for
    /// example to append an argument group shared by several plugins.
    fn post_register(_schema: &mut ArgSchema) {}
}

/// One registry entry.
pub struct Registration<E: ExtensionPoint> {
    key: String,
    schema: ArgSchema,
    constructor: Constructor<E>,
    hook: fn(&mut ArgSchema),
}

impl<E: ExtensionPoint> Registration<E> {
    /// Entry for plugin `P`, with its schema declared and validated.
    pub fn of<P: Plugin<E>>() -> Result<Self, LssError> {
        let mut schema = ArgSchema::new(P::KEY);
        P::declare_schema(&mut schema);
        schema.validate()?;
        Ok(Self {
            key: P::KEY.to_string(),
            schema,
            constructor: P::construct,
            hook: P::post_register,
        })
    }

    /// Entry assembled from parts, for plugins that are not types.
    pub fn from_parts(schema: ArgSchema, constructor: Constructor<E>) -> Result<Self, LssError> {
        schema.validate()?;
        Ok(Self {
            key: schema.key().to_string(),
            schema,
            constructor,
            hook: |_| {},
        })
    }

    /// Plugin key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Argument schema.
    pub fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    /// Parses `tokens` with the schema and runs the constructor.
    pub fn build(&self, tokens: &[String]) -> Result<Box<E::Object>, LssError> {
        let args = self.schema.parse(tokens)?;
        (self.constructor)(&args)
    }
}

impl<E: ExtensionPoint> fmt::Debug for Registration<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("family", &E::FAMILY)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Key to plugin map of one family.
pub struct PluginRegistry<E: ExtensionPoint> {
    entries: BTreeMap<String, Registration<E>>,
}

impl<E: ExtensionPoint> Default for PluginRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ExtensionPoint> fmt::Debug for PluginRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("family", &E::FAMILY)
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E: ExtensionPoint> PluginRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Stores `registration`, then runs its post-registration hook.
    ///
    /// A key that is already present is rejected; entries are never
    /// overwritten.
    pub fn register(&mut self, registration: Registration<E>) -> Result<(), LssError> {
        if self.entries.contains_key(&registration.key) {
            return Err(LssError::DuplicateRegistration(
                ErrorInfo::new(
                    "plugin-duplicate",
                    format!("plugin '{}' is already registered", registration.key),
                )
                .with_context("family", E::FAMILY)
                .with_context("key", registration.key.clone()),
            ));
        }
        let key = registration.key.clone();
        let entry = self.entries.entry(key.clone()).or_insert(registration);
        (entry.hook)(&mut entry.schema);
        tracing::debug!(family = E::FAMILY, key = %key, "registered plugin");
        Ok(())
    }

    /// Looks up the entry registered under `key`.
    pub fn resolve(&self, key: &str) -> Result<&Registration<E>, LssError> {
        self.entries.get(key).ok_or_else(|| {
            let choices = self.keys().join(", ");
            LssError::UnknownPlugin(
                ErrorInfo::new("plugin-unknown", format!("no {} plugin named '{key}'", E::FAMILY))
                    .with_context("family", E::FAMILY)
                    .with_context("choices", choices.clone())
                    .with_hint(format!("valid keys: {choices}")),
            )
        })
    }

    /// Concatenated help of every registered plugin, in key order.
    pub fn describe(&self) -> String {
        if self.entries.is_empty() {
            return format!("No available {} plugins", E::FAMILY);
        }
        self.entries
            .values()
            .map(|entry| entry.schema.format_help())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
