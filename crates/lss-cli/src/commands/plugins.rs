use clap::{Args, ValueEnum};
use lss_core::LssError;
use lss_io::{register_builtin_sources, DataSources};
use lss_plugin::ExtensionPoint;
use lss_store::{register_builtin_storage, MeasurementStorages};

#[derive(Args, Debug)]
pub struct PluginsArgs {
    /// Only list one plugin family
    #[arg(long, value_enum)]
    pub family: Option<Family>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Sources,
    Storage,
}

pub fn run(args: &PluginsArgs) -> Result<(), LssError> {
    register_builtin_sources()?;
    register_builtin_storage()?;
    let mut sections = Vec::new();
    if args.family != Some(Family::Storage) {
        sections.push(section::<DataSources>());
    }
    if args.family != Some(Family::Sources) {
        sections.push(section::<MeasurementStorages>());
    }
    println!("{}", sections.join("\n"));
    Ok(())
}

fn section<E: ExtensionPoint>() -> String {
    format!("== {} ==\n{}", E::FAMILY, E::describe())
}
