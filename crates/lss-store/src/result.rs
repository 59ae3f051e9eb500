use std::collections::BTreeMap;
use std::fmt;

use lss_core::{Column, ErrorInfo, LssError};
use serde::{Deserialize, Serialize};

/// Scalar metadata value stored next to a binned table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float; must be finite to be stored.
    Float(f64),
    /// String.
    Str(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(v) => write!(f, "{v}"),
            MetaValue::Int(v) => write!(f, "{v}"),
            MetaValue::Float(v) => write!(f, "{v:?}"),
            MetaValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

/// Free-form key/value metadata of a result.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A binned statistic: bin edges for one to three axes, named value columns
/// shaped like the bin grid, and scalar metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedResult {
    edges: Vec<Vec<f64>>,
    names: Vec<String>,
    values: Vec<Column>,
    metadata: Metadata,
}

fn invalid(code: &str, message: &str, context: &[(&str, String)]) -> LssError {
    let info = context
        .iter()
        .fold(ErrorInfo::new(code, message), |info, (key, value)| {
            info.with_context(*key, value.clone())
        });
    LssError::Shape(info)
}

impl BinnedResult {
    /// Validates and assembles a result.
    ///
    /// Every value column must have shape `[edges[0].len() - 1, ...]`, names
    /// must be unique and metadata floats finite.
    pub fn new(
        edges: Vec<Vec<f64>>,
        names: Vec<String>,
        values: Vec<Column>,
        metadata: Metadata,
    ) -> Result<Self, LssError> {
        if !(1..=3).contains(&edges.len()) {
            return Err(invalid(
                "binned-dims",
                "a result has one to three bin axes",
                &[("dims", edges.len().to_string())],
            ));
        }
        for (axis, axis_edges) in edges.iter().enumerate() {
            if axis_edges.len() < 2 {
                return Err(invalid(
                    "binned-edges",
                    "every axis needs at least two edges",
                    &[("axis", axis.to_string())],
                ));
            }
            if axis_edges.iter().any(|edge| !edge.is_finite()) {
                return Err(invalid(
                    "binned-edges",
                    "bin edges must be finite",
                    &[("axis", axis.to_string())],
                ));
            }
        }
        if names.len() != values.len() {
            return Err(invalid(
                "binned-columns",
                "one name is needed per value column",
                &[
                    ("names", names.len().to_string()),
                    ("columns", values.len().to_string()),
                ],
            ));
        }
        for (idx, name) in names.iter().enumerate() {
            if name.is_empty() || names[..idx].contains(name) {
                return Err(invalid(
                    "binned-names",
                    "column names must be unique and non-empty",
                    &[("name", name.clone())],
                ));
            }
        }
        let counts: Vec<usize> = edges.iter().map(|axis| axis.len() - 1).collect();
        for (name, column) in names.iter().zip(&values) {
            if column.shape() != counts.as_slice() {
                return Err(invalid(
                    "binned-shape",
                    "value column does not match the bin grid",
                    &[
                        ("column", name.clone()),
                        ("shape", format!("{:?}", column.shape())),
                        ("bins", format!("{counts:?}")),
                    ],
                ));
            }
        }
        for (key, value) in &metadata {
            if key.is_empty() {
                return Err(LssError::Serde(ErrorInfo::new(
                    "binned-metadata",
                    "metadata keys must be non-empty",
                )));
            }
            if matches!(value, MetaValue::Float(v) if !v.is_finite()) {
                return Err(LssError::Serde(
                    ErrorInfo::new("binned-metadata", "metadata floats must be finite")
                        .with_context("key", key.clone()),
                ));
            }
        }
        Ok(Self {
            edges,
            names,
            values,
            metadata,
        })
    }

    /// Number of bin axes.
    pub fn dims(&self) -> usize {
        self.edges.len()
    }

    /// Number of bins along each axis.
    pub fn bin_counts(&self) -> Vec<usize> {
        self.edges.iter().map(|axis| axis.len() - 1).collect()
    }

    /// Bin edges per axis.
    pub fn edges(&self) -> &[Vec<f64>] {
        &self.edges
    }

    /// Value column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Value columns, in name order.
    pub fn values(&self) -> &[Column] {
        &self.values
    }

    /// Looks up a value column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .map(|idx| &self.values[idx])
    }

    /// Metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
