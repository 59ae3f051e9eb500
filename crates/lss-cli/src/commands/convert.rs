use std::path::PathBuf;

use clap::Args;
use lss_core::{Column, ColumnDescr, LssError};
use lss_io::{write_binary, DataSource, SelfComm};

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Source connection string
    pub connection: String,
    /// Output file
    pub output: PathBuf,
    /// Columns to copy, comma separated; defaults to every column
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Zero bytes written before the first column
    #[arg(long, default_value_t = 0)]
    pub header: usize,
}

pub fn run(args: &ConvertArgs) -> Result<(), LssError> {
    let source = lss_io::open(&args.connection)?;
    let names: Vec<String> = if args.columns.is_empty() {
        source.columns().into_iter().map(|(name, _)| name).collect()
    } else {
        args.columns.clone()
    };
    let requested: Vec<&str> = names.iter().map(String::as_str).collect();

    let comm = SelfComm;
    let mut columns: Vec<Column> = Vec::new();
    for batch in source.read(&requested, &comm, true)? {
        columns = batch?.into_columns();
    }
    let refs: Vec<&Column> = columns.iter().collect();
    let bytes = write_binary(&args.output, &vec![0u8; args.header], &refs)?;
    let rows = columns.first().map_or(0, Column::len);
    tracing::info!(output = %args.output.display(), rows, bytes, "converted source");

    println!("wrote {rows} rows, {bytes} bytes to {}", args.output.display());
    let descrs: Vec<ColumnDescr> = columns.iter().map(Column::descr).collect();
    if let Some(connection) = flat_connection(args, &names, &descrs) {
        println!("read back with: {connection}");
    }
    Ok(())
}

// A flat connection exists only for a single dtype and rows of rank <= 1.
fn flat_connection(args: &ConvertArgs, names: &[String], descrs: &[ColumnDescr]) -> Option<String> {
    let dtype = descrs.first()?.dtype;
    let mut layout = Vec::with_capacity(names.len());
    for (name, descr) in names.iter().zip(descrs) {
        if descr.dtype != dtype {
            return None;
        }
        match descr.trailing.as_slice() {
            [] => layout.push(name.clone()),
            [width] => layout.push(format!("{name}[{width}]")),
            _ => return None,
        }
    }
    Some(format!(
        "flat:{}:{}:-columns:{}:-header:{}",
        args.output.display(),
        dtype.code(),
        layout.join(","),
        args.header
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lss_core::DType;

    fn args() -> ConvertArgs {
        ConvertArgs {
            connection: "uniform:4:1.0".into(),
            output: PathBuf::from("out.bin"),
            columns: Vec::new(),
            header: 16,
        }
    }

    #[test]
    fn connection_is_suggested_for_uniform_dtypes() {
        let names = vec!["Position".to_string(), "Mass".to_string()];
        let descrs = vec![ColumnDescr::vector(DType::F8, 3), ColumnDescr::scalar(DType::F8)];
        assert_eq!(
            flat_connection(&args(), &names, &descrs).as_deref(),
            Some("flat:out.bin:f8:-columns:Position[3],Mass:-header:16")
        );
    }

    #[test]
    fn mixed_dtypes_have_no_flat_connection() {
        let names = vec!["Position".to_string(), "ID".to_string()];
        let descrs = vec![ColumnDescr::vector(DType::F8, 3), ColumnDescr::scalar(DType::I8)];
        assert_eq!(flat_connection(&args(), &names, &descrs), None);
    }
}
