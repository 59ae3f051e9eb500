//! Typed argument schemas for plugin constructors.
//!
//! Every plugin declares an [`ArgSchema`] once, when it is registered. The
//! tokens of a connection string (everything after the plugin key) are run
//! through a `clap` command built from that schema, which performs all
//! coercion and validation and hands back [`ParsedArgs`]. Plugins then
//! populate an explicit configuration struct from the parsed values with
//! [`ParsedArgs::get`].
//!
//! Token grammar, one connection-string token per command line word:
//!
//! * positional arguments are filled in declaration order;
//! * options are spelled `-name value`, `--name value` or `-name=value`;
//! * flags are spelled `-name` and take no value.
//!
//! Numeric arguments accept values starting with `-`, so `-2.5` and `-inf`
//! stay values.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Write as _};
use std::path::PathBuf;

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Arg, ArgAction, ArgMatches, Command};
use lss_core::{DType, ErrorInfo, LssError};

const HELP_TEMPLATE: &str = "usage: {usage}\n{about-with-newline}\n{all-args}";

/// Parser for [`ArgKind::Custom`] arguments.
pub type CustomParser = fn(&str) -> Result<ArgValue, String>;

/// Value type accepted by one argument.
#[derive(Debug, Clone)]
pub enum ArgKind {
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Free-form string.
    Str,
    /// Filesystem path.
    Path,
    /// Boolean switch without a value.
    Flag,
    /// One string out of a fixed set.
    Choice(Vec<String>),
    /// One float, or three whitespace separated floats.
    BoxSize,
    /// Element type code such as `f8`.
    DType,
    /// Comma separated list of names.
    List,
    /// Plugin specific parser.
    Custom {
        /// Placeholder shown in usage lines.
        metavar: &'static str,
        /// Conversion from the raw token.
        parse: CustomParser,
    },
}

impl ArgKind {
    fn metavar(&self) -> String {
        match self {
            ArgKind::Int => "INT".into(),
            ArgKind::Float => "FLOAT".into(),
            ArgKind::Str => "STR".into(),
            ArgKind::Path => "PATH".into(),
            ArgKind::Flag => String::new(),
            ArgKind::Choice(choices) => format!("{{{}}}", choices.join(",")),
            ArgKind::BoxSize => "BOXSIZE".into(),
            ArgKind::DType => "DTYPE".into(),
            ArgKind::List => "NAMES".into(),
            ArgKind::Custom { metavar, .. } => (*metavar).to_string(),
        }
    }

    fn takes_hyphen_values(&self) -> bool {
        matches!(self, ArgKind::Int | ArgKind::Float | ArgKind::BoxSize)
    }

    /// Converts one raw token; flags never reach this.
    fn parse_value(&self, raw: &str) -> Result<ArgValue, String> {
        match self {
            ArgKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| format!("'{raw}' is not an integer")),
            ArgKind::Float => raw
                .trim()
                .parse::<f64>()
                .map(ArgValue::Float)
                .map_err(|_| format!("'{raw}' is not a number")),
            ArgKind::Str => Ok(ArgValue::Str(raw.to_string())),
            ArgKind::Path => Ok(ArgValue::Path(PathBuf::from(raw))),
            ArgKind::Flag => Err(format!("'{raw}' given to a flag")),
            ArgKind::Choice(choices) => {
                if choices.iter().any(|choice| choice == raw) {
                    Ok(ArgValue::Str(raw.to_string()))
                } else {
                    Err(format!("choose from {}", choices.join(", ")))
                }
            }
            ArgKind::BoxSize => parse_box_size(raw).map(ArgValue::BoxSize),
            ArgKind::DType => raw
                .parse::<DType>()
                .map(ArgValue::DType)
                .map_err(|err| err.info().message.clone()),
            ArgKind::List => Ok(ArgValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            ArgKind::Custom { parse, .. } => parse(raw),
        }
    }
}

/// A coerced argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value (also used for choices).
    Str(String),
    /// Path value.
    Path(PathBuf),
    /// Flag value.
    Bool(bool),
    /// Box size along each axis.
    BoxSize([f64; 3]),
    /// Element type.
    DType(DType),
    /// List of names.
    List(Vec<String>),
}

impl Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Float(v) => write!(f, "{v}"),
            ArgValue::Str(v) => f.write_str(v),
            ArgValue::Path(v) => write!(f, "{}", v.display()),
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::BoxSize([x, y, z]) => write!(f, "{x} {y} {z}"),
            ArgValue::DType(v) => write!(f, "{v}"),
            ArgValue::List(v) => f.write_str(&v.join(",")),
        }
    }
}

/// Parses a box size given either as one float or as three whitespace
/// separated floats.
pub fn parse_box_size(raw: &str) -> Result<[f64; 3], String> {
    let sizes = raw
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| format!("'{token}' is not a number"))
        })
        .collect::<Result<Vec<f64>, String>>()?;
    match sizes.as_slice() {
        [size] => Ok([*size; 3]),
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(format!(
            "expected one or three box sizes, got {}",
            sizes.len()
        )),
    }
}

/// Declaration of one constructor argument.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    name: String,
    kind: ArgKind,
    help: String,
    default: Option<ArgValue>,
    positional: bool,
    required: bool,
}

impl ArgSpec {
    /// A required positional argument.
    pub fn positional(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            help: String::new(),
            default: None,
            positional: true,
            required: true,
        }
    }

    /// An optional `-name value` argument.
    pub fn option(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            help: String::new(),
            default: None,
            positional: false,
            required: false,
        }
    }

    /// A `-name` switch, false unless given.
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ArgKind::Flag,
            help: String::new(),
            default: Some(ArgValue::Bool(false)),
            positional: false,
            required: false,
        }
    }

    /// Sets the help text.
    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = text.into();
        self
    }

    /// Sets a default, which also makes the argument optional.
    pub fn default_value(mut self, value: ArgValue) -> Self {
        self.default = Some(value);
        self.required = false;
        self
    }

    /// Makes an option mandatory.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Argument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value type.
    pub fn kind(&self) -> &ArgKind {
        &self.kind
    }

    /// Default value, if any.
    pub fn default(&self) -> Option<&ArgValue> {
        self.default.as_ref()
    }

    /// Whether the argument is filled positionally.
    pub fn is_positional(&self) -> bool {
        self.positional
    }

    /// Whether the argument must be supplied.
    pub fn is_required(&self) -> bool {
        self.required
    }

    fn to_arg(&self) -> Arg {
        let arg = Arg::new(self.name.clone()).help(self.help.clone());
        if let ArgKind::Flag = self.kind {
            return arg.long(self.name.clone()).action(ArgAction::SetTrue);
        }
        let arg = if self.positional {
            arg.value_name(self.name.clone())
        } else {
            arg.long(self.name.clone()).value_name(self.kind.metavar())
        };
        let arg = match &self.kind {
            ArgKind::Choice(choices) => arg.value_parser(
                PossibleValuesParser::new(choices.iter().cloned()).map(ArgValue::Str),
            ),
            kind => {
                let kind = kind.clone();
                arg.value_parser(move |raw: &str| kind.parse_value(raw))
            }
        };
        let arg = arg
            .action(ArgAction::Set)
            .allow_hyphen_values(self.kind.takes_hyphen_values());
        match &self.default {
            Some(default) => arg.default_value(default.to_string()),
            None => arg.required(self.required),
        }
    }
}

/// Ordered argument declarations of one plugin.
#[derive(Debug, Clone)]
pub struct ArgSchema {
    key: String,
    description: String,
    args: Vec<ArgSpec>,
}

impl ArgSchema {
    /// Creates an empty schema for the plugin registered under `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            args: Vec::new(),
        }
    }

    /// Plugin key the schema belongs to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// One paragraph shown under the usage line.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Replaces the description.
    pub fn set_description(&mut self, text: impl Into<String>) -> &mut Self {
        self.description = text.into();
        self
    }

    /// Appends an argument declaration.
    pub fn add(&mut self, spec: ArgSpec) -> &mut Self {
        self.args.push(spec);
        self
    }

    /// Declared arguments in order.
    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    /// Looks up a declaration by name.
    pub fn get(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|spec| spec.name == name)
    }

    /// Checks that names are unique and that no required positional follows
    /// an optional one.
    pub fn validate(&self) -> Result<(), LssError> {
        for (idx, spec) in self.args.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(self.schema_error("schema-empty-name", "argument without a name"));
            }
            if self.args[..idx].iter().any(|other| other.name == spec.name) {
                return Err(LssError::SchemaValidation(
                    ErrorInfo::new("schema-duplicate-argument", "argument declared twice")
                        .with_context("plugin", self.key.clone())
                        .with_context("argument", spec.name.clone()),
                ));
            }
        }
        let mut seen_optional = false;
        for spec in self.args.iter().filter(|spec| spec.positional) {
            if spec.required && seen_optional {
                return Err(LssError::SchemaValidation(
                    ErrorInfo::new(
                        "schema-positional-order",
                        "required positional argument follows an optional one",
                    )
                    .with_context("plugin", self.key.clone())
                    .with_context("argument", spec.name.clone()),
                ));
            }
            seen_optional |= !spec.required;
        }
        Ok(())
    }

    /// Coerces connection-string tokens into typed values.
    pub fn parse(&self, tokens: &[String]) -> Result<ParsedArgs, LssError> {
        self.validate()?;
        let words: Vec<String> = tokens.iter().map(|token| self.spell_long(token)).collect();
        let matches = self
            .command()
            .try_get_matches_from(words)
            .map_err(|err| self.rejected(&err))?;

        let mut values = BTreeMap::new();
        for spec in &self.args {
            if let Some(value) = self.extract(&matches, spec)? {
                values.insert(spec.name.clone(), value);
            }
        }
        Ok(ParsedArgs {
            key: self.key.clone(),
            values,
        })
    }

    /// The `clap` command enforcing this schema.
    fn command(&self) -> Command {
        let command = Command::new(self.key.clone())
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .override_usage(self.usage())
            .help_template(HELP_TEMPLATE)
            .args(self.args.iter().map(ArgSpec::to_arg));
        if self.description.is_empty() {
            command
        } else {
            command.about(self.description.clone())
        }
    }

    // Options are declared as `--name`; the single dash spelling of a
    // declared option is rewritten so clap does not split it into shorts.
    fn spell_long(&self, token: &str) -> String {
        if let Some(body) = token.strip_prefix('-').filter(|body| !body.starts_with('-')) {
            let name = body.split_once('=').map_or(body, |(name, _)| name);
            if self.args.iter().any(|spec| !spec.positional && spec.name == name) {
                return format!("-{token}");
            }
        }
        token.to_string()
    }

    fn extract(&self, matches: &ArgMatches, spec: &ArgSpec) -> Result<Option<ArgValue>, LssError> {
        let found = match spec.kind {
            ArgKind::Flag => matches
                .try_get_one::<bool>(&spec.name)
                .map(|value| value.map(|set| ArgValue::Bool(*set))),
            _ => matches
                .try_get_one::<ArgValue>(&spec.name)
                .map(|value| value.cloned()),
        };
        found.map_err(|err| {
            LssError::SchemaValidation(
                ErrorInfo::new("schema-wrong-type", err.to_string())
                    .with_context("plugin", self.key.clone())
                    .with_context("argument", spec.name.clone()),
            )
        })
    }

    fn rejected(&self, err: &clap::Error) -> LssError {
        let code = match err.kind() {
            ErrorKind::MissingRequiredArgument => "schema-missing-argument",
            ErrorKind::InvalidValue if is_missing_value(err) => "schema-missing-value",
            ErrorKind::InvalidValue | ErrorKind::ValueValidation | ErrorKind::NoEquals => {
                "schema-invalid-value"
            }
            _ => "schema-unrecognized",
        };
        let rendered = err.to_string();
        let message = rendered.lines().next().unwrap_or_default();
        let mut info = ErrorInfo::new(code, message.trim_start_matches("error: "))
            .with_context("plugin", self.key.clone());
        if let Some(ContextValue::String(argument)) = err.get(ContextKind::InvalidArg) {
            info = info.with_context("argument", argument.clone());
        }
        LssError::SchemaValidation(info.with_hint(self.usage()))
    }

    /// Colon separated usage line.
    pub fn usage(&self) -> String {
        let mut usage = self.key.clone();
        for spec in &self.args {
            let metavar = spec.kind.metavar();
            let piece = if spec.positional {
                format!(":{}", spec.name)
            } else if matches!(spec.kind, ArgKind::Flag) {
                format!(":-{}", spec.name)
            } else {
                format!(":-{}:{metavar}", spec.name)
            };
            if spec.required {
                usage.push_str(&piece);
            } else {
                let _ = write!(usage, "[{piece}]");
            }
        }
        usage
    }

    /// Usage line, description and one block per argument.
    pub fn format_help(&self) -> String {
        if self.validate().is_err() {
            return format!("usage: {}\n", self.usage());
        }
        self.command().render_help().to_string()
    }

    fn schema_error(&self, code: &str, message: &str) -> LssError {
        LssError::SchemaValidation(
            ErrorInfo::new(code, message).with_context("plugin", self.key.clone()),
        )
    }
}

// clap reports an option cut off at the end of the tokens as an empty
// invalid value.
fn is_missing_value(err: &clap::Error) -> bool {
    matches!(err.get(ContextKind::InvalidValue), Some(ContextValue::String(raw)) if raw.is_empty())
}

/// Typed extraction of one [`ArgValue`].
pub trait FromArg: Sized {
    /// Name of the expected kind, used in error messages.
    const EXPECTED: &'static str;

    /// Converts the value, or returns `None` when the kinds do not match.
    fn from_arg(value: &ArgValue) -> Option<Self>;
}

impl FromArg for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromArg for usize {
    const EXPECTED: &'static str = "non-negative integer";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Int(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FromArg for u64 {
    const EXPECTED: &'static str = "non-negative integer";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FromArg for f64 {
    const EXPECTED: &'static str = "number";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Float(v) => Some(*v),
            ArgValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl FromArg for bool {
    const EXPECTED: &'static str = "flag";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromArg for String {
    const EXPECTED: &'static str = "string";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromArg for PathBuf {
    const EXPECTED: &'static str = "path";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Path(v) => Some(v.clone()),
            ArgValue::Str(v) => Some(PathBuf::from(v)),
            _ => None,
        }
    }
}

impl FromArg for [f64; 3] {
    const EXPECTED: &'static str = "box size";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::BoxSize(v) => Some(*v),
            ArgValue::Float(v) => Some([*v; 3]),
            _ => None,
        }
    }
}

impl FromArg for DType {
    const EXPECTED: &'static str = "dtype";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::DType(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromArg for Vec<String> {
    const EXPECTED: &'static str = "list";

    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::List(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Values produced by [`ArgSchema::parse`], keyed by argument name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedArgs {
    key: String,
    values: BTreeMap<String, ArgValue>,
}

impl ParsedArgs {
    /// Empty argument set for `key`; values are added with [`ParsedArgs::with`].
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: BTreeMap::new(),
        }
    }

    /// Adds or replaces one value.
    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Plugin key the values were parsed for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw value of an argument.
    pub fn raw(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Typed value of an argument that must be present.
    pub fn get<T: FromArg>(&self, name: &str) -> Result<T, LssError> {
        self.get_opt(name)?.ok_or_else(|| {
            LssError::SchemaValidation(
                ErrorInfo::new("schema-missing-argument", format!("argument '{name}' is missing"))
                    .with_context("plugin", self.key.clone()),
            )
        })
    }

    /// Typed value of an argument that may be absent.
    pub fn get_opt<T: FromArg>(&self, name: &str) -> Result<Option<T>, LssError> {
        match self.values.get(name) {
            None => Ok(None),
            Some(value) => T::from_arg(value).map(Some).ok_or_else(|| {
                LssError::SchemaValidation(
                    ErrorInfo::new(
                        "schema-wrong-type",
                        format!("argument '{name}' is not a {}", T::EXPECTED),
                    )
                    .with_context("plugin", self.key.clone())
                    .with_context("value", value.to_string()),
                )
            }),
        }
    }
}
