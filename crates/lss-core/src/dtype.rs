//! Numeric element types understood by sources and storage writers.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, LssError};

/// Element type of a [`Column`](crate::Column).
///
/// Codes follow the familiar `<kind><itemsize>` spelling (`f8`, `i4`, ...).
/// On-disk data is always little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit float.
    #[serde(rename = "f4")]
    F4,
    /// 64-bit float.
    #[serde(rename = "f8")]
    F8,
    /// 32-bit signed integer.
    #[serde(rename = "i4")]
    I4,
    /// 64-bit signed integer.
    #[serde(rename = "i8")]
    I8,
    /// 32-bit unsigned integer.
    #[serde(rename = "u4")]
    U4,
    /// 64-bit unsigned integer.
    #[serde(rename = "u8")]
    U8,
}

impl DType {
    /// All supported element types.
    pub const ALL: [DType; 6] = [
        DType::F4,
        DType::F8,
        DType::I4,
        DType::I8,
        DType::U4,
        DType::U8,
    ];

    /// Number of bytes occupied by one element.
    pub fn itemsize(self) -> usize {
        match self {
            DType::F4 | DType::I4 | DType::U4 => 4,
            DType::F8 | DType::I8 | DType::U8 => 8,
        }
    }

    /// Short code (`f8`, `i4`, ...).
    pub fn code(self) -> &'static str {
        match self {
            DType::F4 => "f4",
            DType::F8 => "f8",
            DType::I4 => "i4",
            DType::I8 => "i8",
            DType::U4 => "u4",
            DType::U8 => "u8",
        }
    }

    /// Whether the type is a floating point type.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F4 | DType::F8)
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DType {
    type Err = LssError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let code = trimmed
            .strip_prefix('<')
            .or_else(|| trimmed.strip_prefix('='))
            .unwrap_or(trimmed);
        let dtype = match code {
            "f4" | "float32" => DType::F4,
            "f8" | "float64" | "float" => DType::F8,
            "i4" | "int32" => DType::I4,
            "i8" | "int64" | "int" => DType::I8,
            "u4" | "uint32" => DType::U4,
            "u8" | "uint64" => DType::U8,
            _ => {
                return Err(LssError::SchemaValidation(
                    ErrorInfo::new("dtype-parse", format!("unsupported dtype '{raw}'"))
                        .with_hint("use one of f4, f8, i4, i8, u4, u8 (little-endian)"),
                ))
            }
        };
        Ok(dtype)
    }
}
