use std::path::PathBuf;

use clap::{error::ErrorKind, Parser};
use tracing::error;

use fegrid::{
    config,
    datatypes::ModelMetadata,
    report, FeGrid, FegridError, KijDumpObserver, ProgressObserver, StiffnessAssembler,
};

/// Assembles the global stiffness matrix of the 2D Poisson operator over the
/// interior nodes of a triangular mesh
#[derive(Parser, Debug)]
#[command(name = "fegrid", version, long_about = None)]
struct Cli {
    /// Common prefix of the .node and .elem files, without extension
    prefix: String,

    /// Json input file with a metadata object
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Isotropic conductivity K; overrides the input file
    #[arg(short = 'k', long)]
    conductivity: Option<f64>,

    /// Overwrite this file with each element's B^T C block
    #[arg(long, num_args = 0..=1, default_missing_value = "kijdump.bin")]
    dump_kij: Option<PathBuf>,

    /// Write the assembled matrix as text
    #[arg(long, num_args = 0..=1, default_missing_value = "GlobalKMatrixFile.txt")]
    dump_matrix: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn run(cli: &Cli) -> Result<(), FegridError> {
    let mut metadata = match &cli.config {
        Some(path) => config::load(path)?,
        None => ModelMetadata::default(),
    };
    if let Some(conductivity) = cli.conductivity {
        metadata.conductivity = conductivity;
        config::validate_metadata(&metadata)?;
    }

    let grid = FeGrid::load_prefix(&cli.prefix, &metadata)?;

    let mut assembler =
        StiffnessAssembler::new(&grid, &metadata).add_observer(ProgressObserver::new());
    if let Some(path) = &cli.dump_kij {
        assembler = assembler.add_observer(KijDumpObserver::new(path));
    }
    let global = assembler.run()?;

    report::print_report(&report::analyze(&global));

    if let Some(path) = &cli.dump_matrix {
        report::write_matrix_text(&global, path)?;
    }

    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = fegrid::logging::init(&cli.log_level) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1);
    }
}
