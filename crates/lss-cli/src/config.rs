use std::fs;
use std::path::Path;

use lss_core::{ErrorInfo, LssError};
use serde::{Deserialize, Serialize};

/// Upper bound on `bins.pow(axes)`, the number of histogram cells.
pub const MAX_GRID_CELLS: usize = 1 << 28;

/// Settings of a `histogram` run, read from TOML. Every field has a default
/// so a file only needs the parts it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Size of the worker team.
    pub workers: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    pub source: SourceSection,
    pub binning: BinningSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// Connection string of the data source.
    pub connection: String,
    /// Column to histogram.
    pub column: String,
    /// Read the source in one batch even if it supports chunks.
    pub full: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningSection {
    /// Number of leading row components binned, one axis each.
    pub axes: usize,
    pub bins: usize,
    /// Lower and upper edge shared by every axis.
    pub range: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Output file; `-` writes to standard output.
    pub path: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            log_filter: None,
            source: SourceSection::default(),
            binning: BinningSection::default(),
            output: OutputSection::default(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            connection: "uniform:1000:1.0".to_string(),
            column: "Position".to_string(),
            full: false,
        }
    }
}

impl Default for BinningSection {
    fn default() -> Self {
        Self {
            axes: 1,
            bins: 10,
            range: [0.0, 1.0],
        }
    }
}

impl BinningSection {
    /// Number of grid cells, or `None` if it does not fit in `usize`.
    pub fn cells(&self) -> Option<usize> {
        u32::try_from(self.axes)
            .ok()
            .and_then(|axes| self.bins.checked_pow(axes))
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            path: "-".to_string(),
        }
    }
}

impl RunConfig {
    /// Parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, LssError> {
        let contents =
            fs::read_to_string(path).map_err(|err| LssError::io("config-read", path.display(), err))?;
        toml::from_str(&contents).map_err(|err| {
            LssError::Serde(
                ErrorInfo::new("config-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Rejects settings no run could satisfy.
    pub fn validate(&self) -> Result<(), LssError> {
        let invalid = |code: &str, message: &str| {
            Err(LssError::SchemaValidation(ErrorInfo::new(code, message)))
        };
        if self.workers == 0 {
            return invalid("config-workers", "at least one worker is required");
        }
        if !(1..=3).contains(&self.binning.axes) {
            return invalid("config-axes", "binning.axes must be 1, 2 or 3");
        }
        if self.binning.bins == 0 {
            return invalid("config-bins", "binning.bins must be positive");
        }
        match self.binning.cells() {
            Some(cells) if cells <= MAX_GRID_CELLS => {}
            _ => return invalid("config-grid", "binning.bins ^ binning.axes exceeds the grid limit"),
        }
        let [lo, hi] = self.binning.range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return invalid("config-range", "binning.range must be finite and increasing");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            workers = 4

            [binning]
            bins = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.binning.bins, 32);
        assert_eq!(config.binning.axes, 1);
        assert_eq!(config.source, SourceSection::default());
        assert_eq!(config.output.path, "-");
        config.validate().unwrap();
    }

    #[test]
    fn invalid_range_is_rejected() {
        let mut config = RunConfig::default();
        config.binning.range = [1.0, 1.0];
        assert_eq!(config.validate().unwrap_err().info().code, "config-range");
        config.binning.range = [0.0, 1.0];
        config.binning.axes = 4;
        assert_eq!(config.validate().unwrap_err().info().code, "config-axes");
    }

    #[test]
    fn oversized_grids_are_rejected() {
        let mut config = RunConfig::default();
        config.binning.axes = 3;
        config.binning.bins = usize::MAX / 2;
        assert_eq!(config.binning.cells(), None);
        assert_eq!(config.validate().unwrap_err().info().code, "config-grid");

        config.binning.bins = 1 << 10;
        assert_eq!(config.binning.cells(), Some(1 << 30));
        assert_eq!(config.validate().unwrap_err().info().code, "config-grid");

        config.binning.bins = 1 << 9;
        config.validate().unwrap();
    }
}
