use std::path::PathBuf;

use clap::{error::ErrorKind, Parser};
use tracing::{error, info};

use fegrid::{
    heat1d::{HeatRod, HeatSolution, DEFAULT_ALPHA, DEFAULT_STEPS, DEFAULT_TOLERANCE},
    FegridError,
};

/// Explicit 1D heat diffusion on a rod with zero temperature at both ends
#[derive(Parser, Debug)]
#[command(name = "heat1d", version, long_about = None, allow_negative_numbers = true)]
struct Cli {
    /// Rod length
    length: f64,

    /// Time step
    time_step: f64,

    /// Space step
    space_step: f64,

    /// Thermal diffusivity
    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    alpha: f64,

    /// Maximum number of time steps
    #[arg(long, default_value_t = DEFAULT_STEPS)]
    steps: usize,

    /// Stop once no value changes by more than this in one step
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Write the rod coordinates to this binary file
    #[arg(long)]
    grid_out: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn run(cli: &Cli) -> Result<(), FegridError> {
    let mut rod = HeatRod::new(cli.length, cli.space_step, cli.time_step, cli.alpha)?;
    info!(
        "rod of length {} with {} grid points, diffusion number {:.4}",
        cli.length,
        rod.coordinates().len(),
        rod.diffusion_number()
    );

    if let Some(path) = &cli.grid_out {
        rod.domain().write_binary(path)?;
    }

    let solution = HeatSolution {
        num_steps: cli.steps,
        tolerance: cli.tolerance,
    };
    solution.apply_boundary_conditions(&mut rod);
    let taken = solution.iterate(&mut rod);
    info!("finished after {taken} time steps");
    solution.print_results(&rod);

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
