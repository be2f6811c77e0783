use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use vfarc::property::{generate_property_list, PROPERTY_LIST_FILE};
use vfarc::VfsPack;

#[derive(Parser)]
#[command(
    name = "property-generator",
    version,
    about = "Convert tab-delimited property files into PropertyList.json"
)]
struct Cli {
    /// Directory walked recursively for .pra/.prb/.prd/.pre/.prt files
    property_folder: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = VfsPack::initialize() {
        eprintln!("VFS initialization failed: {e}");
        return ExitCode::FAILURE;
    }
    info!("VFS property generator started");

    let _ = std::fs::remove_file(PROPERTY_LIST_FILE);
    match generate_property_list(&cli.property_folder, Path::new(PROPERTY_LIST_FILE)) {
        Ok(entries) => {
            info!(entries, "property list created");
            println!("Property list successfully created!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "property list can not be created");
            ExitCode::FAILURE
        }
    }
}
