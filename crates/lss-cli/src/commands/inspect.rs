use clap::Args;
use lss_core::LssError;
use lss_io::DataSource;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Source connection string, e.g. `flat:particles.bin:f4`
    pub connection: String,
}

pub fn run(args: &InspectArgs) -> Result<(), LssError> {
    let source = lss_io::open(&args.connection)?;
    println!("source: {}", source.origin());
    println!("rows: {}", source.size()?);
    match source.chunk_rows() {
        Some(rows) if rows > 0 => println!("chunk: {rows} rows"),
        _ => println!("chunk: whole source"),
    }
    for (name, descr) in source.columns() {
        println!("  {name:<12} {} {:?}", descr.dtype.code(), descr.trailing);
    }
    Ok(())
}
