//! Typed n-dimensional columns exchanged between sources, algorithms and
//! storage writers.

use ndarray::{ArrayD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::errors::{ErrorInfo, LssError};

/// Per-row description of a column: element type plus the shape of a single
/// row (the shape without its leading axis).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescr {
    /// Element type.
    pub dtype: DType,
    /// Shape of one row; empty for scalar columns.
    pub trailing: Vec<usize>,
}

impl ColumnDescr {
    /// Creates a descriptor from an element type and row shape.
    pub fn new(dtype: DType, trailing: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            trailing: trailing.into(),
        }
    }

    /// Descriptor of a column holding one scalar per row.
    pub fn scalar(dtype: DType) -> Self {
        Self::new(dtype, Vec::new())
    }

    /// Descriptor of a column holding a `width`-vector per row.
    pub fn vector(dtype: DType, width: usize) -> Self {
        Self::new(dtype, vec![width])
    }

    /// Number of elements in one row.
    pub fn row_elements(&self) -> usize {
        self.trailing.iter().product()
    }

    /// Number of bytes in one row.
    pub fn row_bytes(&self) -> usize {
        self.row_elements() * self.dtype.itemsize()
    }

    /// Full array shape for `rows` rows.
    pub fn shape_for(&self, rows: usize) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.trailing.len() + 1);
        shape.push(rows);
        shape.extend_from_slice(&self.trailing);
        shape
    }
}

/// An owned array whose leading axis indexes rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// `f4` data.
    F4(ArrayD<f32>),
    /// `f8` data.
    F8(ArrayD<f64>),
    /// `i4` data.
    I4(ArrayD<i32>),
    /// `i8` data.
    I8(ArrayD<i64>),
    /// `u4` data.
    U4(ArrayD<u32>),
    /// `u8` data.
    U8(ArrayD<u64>),
}

macro_rules! each_column {
    ($column:expr, $arr:ident => $body:expr) => {
        match $column {
            Column::F4($arr) => $body,
            Column::F8($arr) => $body,
            Column::I4($arr) => $body,
            Column::I8($arr) => $body,
            Column::U4($arr) => $body,
            Column::U8($arr) => $body,
        }
    };
}

macro_rules! map_column {
    ($column:expr, $arr:ident => $body:expr) => {
        match $column {
            Column::F4($arr) => Column::F4($body),
            Column::F8($arr) => Column::F8($body),
            Column::I4($arr) => Column::I4($body),
            Column::I8($arr) => Column::I8($body),
            Column::U4($arr) => Column::U4($body),
            Column::U8($arr) => Column::U8($body),
        }
    };
}

macro_rules! by_dtype {
    ($dtype:expr, $ty:ident => $body:expr) => {
        match $dtype {
            DType::F4 => {
                type $ty = f32;
                Column::F4($body)
            }
            DType::F8 => {
                type $ty = f64;
                Column::F8($body)
            }
            DType::I4 => {
                type $ty = i32;
                Column::I4($body)
            }
            DType::I8 => {
                type $ty = i64;
                Column::I8($body)
            }
            DType::U4 => {
                type $ty = u32;
                Column::U4($body)
            }
            DType::U8 => {
                type $ty = u64;
                Column::U8($body)
            }
        }
    };
}

macro_rules! impl_from_array {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<ArrayD<$ty>> for Column {
                fn from(array: ArrayD<$ty>) -> Self {
                    Column::$variant(array)
                }
            }
        )*
    };
}

impl_from_array!(f32 => F4, f64 => F8, i32 => I4, i64 => I8, u32 => U4, u64 => U8);

/// Element conversions needed to move column data through byte and text
/// encodings.
trait Element: Copy + std::str::FromStr {
    const SIZE: usize;
    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut Vec<u8>);
    fn to_text(self) -> String;
}

macro_rules! impl_element {
    ($($ty:ty, $size:expr, $fmt:literal);* $(;)?) => {
        $(
            impl Element for $ty {
                const SIZE: usize = $size;

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; $size];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn to_text(self) -> String {
                    format!($fmt, self)
                }
            }
        )*
    };
}

// `{:?}` on floats prints the shortest representation that parses back to
// the identical bit pattern.
impl_element!(
    f32, 4, "{:?}";
    f64, 8, "{:?}";
    i32, 4, "{}";
    i64, 8, "{}";
    u32, 4, "{}";
    u64, 8, "{}";
);

fn decode_le<T: Element>(bytes: &[u8], shape: &[usize]) -> Result<ArrayD<T>, LssError> {
    let values: Vec<T> = bytes.chunks_exact(T::SIZE).map(T::read_le).collect();
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(shape_error)
}

fn parse_text<T: Element>(tokens: &[&str], shape: &[usize]) -> Result<ArrayD<T>, LssError> {
    let values = tokens
        .iter()
        .map(|token| {
            token.parse::<T>().map_err(|_| {
                LssError::Serde(
                    ErrorInfo::new("column-parse", "failed to parse column value")
                        .with_context("token", *token),
                )
            })
        })
        .collect::<Result<Vec<T>, LssError>>()?;
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(shape_error)
}

fn shape_error(err: ndarray::ShapeError) -> LssError {
    LssError::Shape(ErrorInfo::new("column-shape", err.to_string()))
}

fn mismatch(expected: &ColumnDescr, actual: &ColumnDescr) -> LssError {
    LssError::Shape(
        ErrorInfo::new("column-mismatch", "columns disagree on dtype or row shape")
            .with_context("expected", format!("{} {:?}", expected.dtype, expected.trailing))
            .with_context("actual", format!("{} {:?}", actual.dtype, actual.trailing)),
    )
}

impl Column {
    /// Zero-filled column with `rows` rows.
    pub fn zeros(descr: &ColumnDescr, rows: usize) -> Column {
        let shape = descr.shape_for(rows);
        by_dtype!(descr.dtype, T => ArrayD::<T>::zeros(IxDyn(&shape)))
    }

    /// Zero-length column carrying the dtype and row shape of `descr`.
    pub fn empty(descr: &ColumnDescr) -> Column {
        Column::zeros(descr, 0)
    }

    /// Element type of the column.
    pub fn dtype(&self) -> DType {
        match self {
            Column::F4(_) => DType::F4,
            Column::F8(_) => DType::F8,
            Column::I4(_) => DType::I4,
            Column::I8(_) => DType::I8,
            Column::U4(_) => DType::U4,
            Column::U8(_) => DType::U8,
        }
    }

    /// Full array shape, leading axis first.
    pub fn shape(&self) -> &[usize] {
        each_column!(self, arr => arr.shape())
    }

    /// Number of rows (length of the leading axis).
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row descriptor of this column.
    pub fn descr(&self) -> ColumnDescr {
        let trailing = self.shape().get(1..).unwrap_or_default().to_vec();
        ColumnDescr::new(self.dtype(), trailing)
    }

    /// Copies rows `start..stop` into a new column.
    pub fn slice_rows(&self, start: usize, stop: usize) -> Result<Column, LssError> {
        let len = self.len();
        if start > stop || stop > len {
            return Err(LssError::Shape(
                ErrorInfo::new("column-slice", "row range out of bounds")
                    .with_context("range", format!("{start}..{stop}"))
                    .with_context("rows", len.to_string()),
            ));
        }
        Ok(map_column!(self, arr => arr
            .slice_axis(Axis(0), Slice::from(start..stop))
            .to_owned()))
    }

    /// Concatenates columns along the row axis.
    ///
    /// Every part must share the dtype and row shape of the first one.
    pub fn concat(parts: &[Column]) -> Result<Column, LssError> {
        let first = parts.first().ok_or_else(|| {
            LssError::Shape(ErrorInfo::new("column-concat", "nothing to concatenate"))
        })?;
        let descr = first.descr();
        for part in parts {
            let other = part.descr();
            if other != descr {
                return Err(mismatch(&descr, &other));
            }
        }
        macro_rules! concat_as {
            ($variant:ident) => {{
                let views: Vec<_> = parts
                    .iter()
                    .filter_map(|part| match part {
                        Column::$variant(arr) => Some(arr.view()),
                        _ => None,
                    })
                    .collect();
                Column::$variant(ndarray::concatenate(Axis(0), &views).map_err(shape_error)?)
            }};
        }
        Ok(match first {
            Column::F4(_) => concat_as!(F4),
            Column::F8(_) => concat_as!(F8),
            Column::I4(_) => concat_as!(I4),
            Column::I8(_) => concat_as!(I8),
            Column::U4(_) => concat_as!(U4),
            Column::U8(_) => concat_as!(U8),
        })
    }

    /// Decodes `rows` little-endian rows laid out as described by `descr`.
    pub fn from_le_bytes(descr: &ColumnDescr, rows: usize, bytes: &[u8]) -> Result<Column, LssError> {
        let expected = rows * descr.row_bytes();
        if bytes.len() != expected {
            return Err(LssError::Shape(
                ErrorInfo::new("column-bytes", "byte count does not match column shape")
                    .with_context("expected", expected.to_string())
                    .with_context("actual", bytes.len().to_string()),
            ));
        }
        let shape = descr.shape_for(rows);
        Ok(by_dtype!(descr.dtype, T => decode_le::<T>(bytes, &shape)?))
    }

    /// Encodes the column as little-endian bytes in row-major order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        each_column!(self, arr => {
            let mut out = Vec::with_capacity(arr.len() * self.dtype().itemsize());
            for value in arr.iter() {
                value.write_le(&mut out);
            }
            out
        })
    }

    /// Text rendering of every element in row-major order.
    pub fn to_text_values(&self) -> Vec<String> {
        each_column!(self, arr => arr.iter().map(|value| value.to_text()).collect())
    }

    /// Parses text tokens produced by [`Column::to_text_values`].
    pub fn from_text_values(dtype: DType, shape: &[usize], tokens: &[&str]) -> Result<Column, LssError> {
        let expected: usize = shape.iter().product();
        if tokens.len() != expected {
            return Err(LssError::Shape(
                ErrorInfo::new("column-text", "token count does not match column shape")
                    .with_context("expected", expected.to_string())
                    .with_context("actual", tokens.len().to_string()),
            ));
        }
        Ok(by_dtype!(dtype, T => parse_text::<T>(tokens, shape)?))
    }

    /// Converts every element to `f64`.
    pub fn to_f64(&self) -> ArrayD<f64> {
        each_column!(self, arr => arr.mapv(|value| value as f64))
    }
}
