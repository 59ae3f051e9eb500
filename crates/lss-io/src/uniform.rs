use lss_core::{Column, ColumnDescr, ColumnStream, DType, ErrorInfo, LssError};
use lss_plugin::{ArgKind, ArgSchema, ArgSpec, ArgValue, ParsedArgs, Plugin};
use ndarray::{ArrayD, IxDyn};

use crate::source::{DataSource, DataSources};

/// Configuration of a [`UniformSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct UniformConfig {
    /// Number of particles.
    pub n: usize,
    /// Side lengths of the periodic box.
    pub box_size: [f64; 3],
    /// Catalog seed.
    pub seed: u64,
    /// Float type of `Position` and `Velocity`.
    pub dtype: DType,
    /// Velocity components are drawn from `[-max_speed, max_speed)`.
    pub max_speed: f64,
}

impl UniformConfig {
    /// Builds the configuration from parsed arguments.
    pub fn from_args(args: &ParsedArgs) -> Result<Self, LssError> {
        let invalid = |argument: &str, message: String| {
            LssError::SchemaValidation(
                ErrorInfo::new("schema-invalid-value", message)
                    .with_context("plugin", args.key())
                    .with_context("argument", argument),
            )
        };
        let config = Self {
            n: args.get("N")?,
            box_size: args.get("BoxSize")?,
            seed: args.get("seed")?,
            dtype: args.get("dtype")?,
            max_speed: args.get("max_speed")?,
        };
        if !config.dtype.is_float() {
            return Err(invalid("dtype", format!("'{}' is not a float type", config.dtype)));
        }
        if config.box_size.iter().any(|side| !side.is_finite() || *side <= 0.0) {
            return Err(invalid("BoxSize", "box sides must be positive".into()));
        }
        if !config.max_speed.is_finite() || config.max_speed < 0.0 {
            return Err(invalid("max_speed", "max_speed must be non-negative".into()));
        }
        Ok(config)
    }
}

/// Particles placed uniformly at random in a periodic box.
///
/// Each column draws from its own seeded stream, so the values of a column
/// do not depend on which other columns are requested.
#[derive(Debug)]
pub struct UniformSource {
    config: UniformConfig,
}

impl UniformSource {
    /// Creates the source.
    pub fn new(config: UniformConfig) -> Self {
        Self { config }
    }

    fn vectors(&self, label: &str, scale: impl Fn(usize, f64) -> f64) -> Result<Column, LssError> {
        let n = self.config.n;
        let mut stream = ColumnStream::new(self.config.seed, label);
        let values: Vec<f64> = stream
            .uniform(n * 3, 0.0, 1.0)
            .into_iter()
            .enumerate()
            .map(|(idx, unit)| scale(idx % 3, unit))
            .collect();
        let shape = IxDyn(&[n, 3]);
        let shape_error = |err: ndarray::ShapeError| {
            LssError::Shape(ErrorInfo::new("uniform-shape", err.to_string()))
        };
        match self.config.dtype {
            DType::F4 => ArrayD::from_shape_vec(shape, values.iter().map(|v| *v as f32).collect())
                .map(Column::F4)
                .map_err(shape_error),
            _ => ArrayD::from_shape_vec(shape, values)
                .map(Column::F8)
                .map_err(shape_error),
        }
    }

    fn generate(&self, name: &str) -> Result<Column, LssError> {
        match name {
            "Position" => {
                let box_size = self.config.box_size;
                self.vectors("Position", |axis, unit| unit * box_size[axis])
            }
            "Velocity" => {
                let speed = self.config.max_speed;
                self.vectors("Velocity", |_, unit| (2.0 * unit - 1.0) * speed)
            }
            "ID" => Ok(Column::I8(
                ArrayD::from_shape_vec(IxDyn(&[self.config.n]), (0..self.config.n as i64).collect())
                    .map_err(|err| LssError::Shape(ErrorInfo::new("uniform-shape", err.to_string())))?,
            )),
            other => Err(LssError::UnknownColumn(
                ErrorInfo::new("source-unknown-column", format!("column '{other}' is not generated"))
                    .with_context("column", other),
            )),
        }
    }
}

impl DataSource for UniformSource {
    fn columns(&self) -> Vec<(String, ColumnDescr)> {
        vec![
            ("Position".into(), ColumnDescr::vector(self.config.dtype, 3)),
            ("Velocity".into(), ColumnDescr::vector(self.config.dtype, 3)),
            ("ID".into(), ColumnDescr::scalar(DType::I8)),
        ]
    }

    fn size(&self) -> Result<usize, LssError> {
        Ok(self.config.n)
    }

    fn read_all(&self, columns: &[&str]) -> Result<Vec<Column>, LssError> {
        columns.iter().map(|name| self.generate(name)).collect()
    }
}

impl Plugin<DataSources> for UniformSource {
    const KEY: &'static str = "uniform";

    fn declare_schema(schema: &mut ArgSchema) {
        schema
            .set_description("particles placed uniformly at random in a periodic box")
            .add(ArgSpec::positional("N", ArgKind::Int).help("number of particles"))
            .add(ArgSpec::positional("BoxSize", ArgKind::BoxSize).help("one side length, or three"))
            .add(
                ArgSpec::option("seed", ArgKind::Int)
                    .default_value(ArgValue::Int(42))
                    .help("catalog seed"),
            )
            .add(
                ArgSpec::option("dtype", ArgKind::DType)
                    .default_value(ArgValue::DType(DType::F8))
                    .help("float type of Position and Velocity"),
            )
            .add(
                ArgSpec::option("max_speed", ArgKind::Float)
                    .default_value(ArgValue::Float(1.0))
                    .help("bound on each velocity component"),
            );
    }

    fn construct(args: &ParsedArgs) -> Result<Box<dyn DataSource>, LssError> {
        Ok(Box::new(UniformSource::new(UniformConfig::from_args(args)?)))
    }
}
