use std::path::PathBuf;

use clap::Args;
use lss_core::{Column, ErrorInfo, LssError, ORIGIN_RANK};
use lss_io::{
    register_builtin_sources, run_spmd, Communicator, CommunicatorExt, SourceHandle, ThreadComm,
};
use lss_store::{register_builtin_storage, MetaValue, Metadata};
use ndarray::{ArrayD, IxDyn};

use crate::config::RunConfig;

#[derive(Args, Debug)]
pub struct HistogramArgs {
    /// TOML run configuration; flags below override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Source connection string
    #[arg(long)]
    pub source: Option<String>,
    /// Column to bin
    #[arg(long)]
    pub column: Option<String>,
    /// Read the whole source in one batch
    #[arg(long)]
    pub full: bool,
    /// Worker team size
    #[arg(long)]
    pub workers: Option<usize>,
    /// Number of leading row components to bin (1 to 3)
    #[arg(long)]
    pub axes: Option<usize>,
    /// Bins per axis
    #[arg(long)]
    pub bins: Option<usize>,
    /// Lower and upper edge of every axis
    #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
    pub range: Option<Vec<f64>>,
    /// Output path; `-` for standard output
    #[arg(long, short)]
    pub output: Option<String>,
}

impl HistogramArgs {
    /// Loads the configuration file, if any, and applies flag overrides.
    pub fn resolve(&self) -> Result<RunConfig, LssError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(source) = &self.source {
            config.source.connection = source.clone();
        }
        if let Some(column) = &self.column {
            config.source.column = column.clone();
        }
        config.source.full |= self.full;
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(axes) = self.axes {
            config.binning.axes = axes;
        }
        if let Some(bins) = self.bins {
            config.binning.bins = bins;
        }
        if let Some([lo, hi]) = self.range.as_deref() {
            config.binning.range = [*lo, *hi];
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Regular grid of `axes` axes sharing one range.
#[derive(Debug, Clone, PartialEq)]
struct Grid {
    axes: usize,
    bins: usize,
    lo: f64,
    hi: f64,
}

impl Grid {
    fn from_config(config: &RunConfig) -> Self {
        let [lo, hi] = config.binning.range;
        Self {
            axes: config.binning.axes,
            bins: config.binning.bins,
            lo,
            hi,
        }
    }

    fn edges(&self) -> Vec<Vec<f64>> {
        let axis: Vec<f64> = (0..=self.bins)
            .map(|idx| self.lo + (self.hi - self.lo) * idx as f64 / self.bins as f64)
            .collect();
        vec![axis; self.axes]
    }

    fn cells(&self) -> Result<usize, LssError> {
        u32::try_from(self.axes)
            .ok()
            .and_then(|axes| self.bins.checked_pow(axes))
            .ok_or_else(|| {
                LssError::Shape(
                    ErrorInfo::new("histogram-grid", "grid has more cells than fit in memory")
                        .with_context("axes", self.axes.to_string())
                        .with_context("bins", self.bins.to_string()),
                )
            })
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.bins; self.axes]
    }

    // The upper edge belongs to the last bin; NaN and values outside the
    // range are dropped.
    fn bin(&self, value: f64) -> Option<usize> {
        if !(self.lo..=self.hi).contains(&value) {
            return None;
        }
        let scaled = (value - self.lo) / (self.hi - self.lo) * self.bins as f64;
        Some((scaled as usize).min(self.bins - 1))
    }

    /// Row-major cell of a point, if every coordinate is in range.
    fn cell(&self, point: impl Iterator<Item = f64>) -> Option<usize> {
        point
            .take(self.axes)
            .try_fold(0usize, |cell, value| Some(cell * self.bins + self.bin(value)?))
    }
}

/// Adds the rows of `column` to `counts`.
fn accumulate(grid: &Grid, column: &Column, counts: &mut [u64]) {
    let values = column.to_f64();
    if values.ndim() == 0 {
        return;
    }
    for row in values.outer_iter() {
        if let Some(cell) = grid.cell(row.iter().copied()) {
            counts[cell] += 1;
        }
    }
}

fn check_column(source: &SourceHandle, config: &RunConfig) -> Result<(), LssError> {
    let name = config.source.column.as_str();
    let descr = source.validate_request(&[name])?.remove(0);
    let components = match descr.trailing.as_slice() {
        [] => 1,
        [width] => *width,
        _ => 0,
    };
    if components < config.binning.axes {
        return Err(LssError::Shape(
            ErrorInfo::new("histogram-axes", "column has fewer components than binned axes")
                .with_context("column", name)
                .with_context("trailing", format!("{:?}", descr.trailing))
                .with_context("axes", config.binning.axes.to_string()),
        ));
    }
    Ok(())
}

// Runs on every member of the team; only the origin writes.
fn histogram_rank(
    source: &SourceHandle,
    config: &RunConfig,
    grid: &Grid,
    comm: &ThreadComm,
) -> Result<(), LssError> {
    let column = config.source.column.as_str();
    let cells = grid.cells()?;
    let mut counts = vec![0u64; cells];
    let mut rows = 0usize;
    for batch in source.read(&[column], comm, config.source.full)? {
        let batch = batch?;
        rows += batch.rows();
        for values in batch.columns() {
            accumulate(grid, values, &mut counts);
        }
    }
    tracing::debug!(rank = comm.rank(), rows, "local histogram done");

    let Some(parts) = comm.gather(ORIGIN_RANK, &(rows as u64, counts))? else {
        return Ok(());
    };
    let mut total = vec![0u64; cells];
    let mut total_rows = 0u64;
    for (part_rows, part) in parts {
        total_rows += part_rows;
        for (sum, count) in total.iter_mut().zip(part) {
            *sum += count;
        }
    }
    let binned = ArrayD::from_shape_vec(IxDyn(&grid.shape()), total)
        .map_err(|err| LssError::Shape(ErrorInfo::new("histogram-shape", err.to_string())))?;

    let mut metadata = Metadata::new();
    metadata.insert("source".into(), MetaValue::from(source.origin()));
    metadata.insert("column".into(), MetaValue::from(column));
    metadata.insert("rows".into(), MetaValue::Int(total_rows as i64));
    metadata.insert("workers".into(), MetaValue::Int(comm.size() as i64));
    let storage = lss_store::new(&format!("{}d", grid.axes), &config.output.path)?;
    storage.write(grid.edges(), &["counts"], vec![Column::U8(binned)], metadata)?;
    tracing::info!(rows = total_rows, output = %storage.sink(), "histogram written");
    Ok(())
}

pub fn run(config: &RunConfig) -> Result<(), LssError> {
    register_builtin_sources()?;
    register_builtin_storage()?;
    let source = lss_io::open(&config.source.connection)?;
    check_column(&source, config)?;
    let grid = Grid::from_config(config);
    tracing::info!(
        source = %source.origin(),
        workers = config.workers,
        axes = grid.axes,
        bins = grid.bins,
        "starting histogram"
    );
    run_spmd(config.workers, |comm| histogram_rank(&source, config, &grid, comm))
        .into_iter()
        .collect()
}
