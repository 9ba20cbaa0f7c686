//! Fovea command-line interface.
//!
//! Batch operations on Design-Intent documents:
//! ```sh
//! fovea-cli expand design.json
//! fovea-cli evaluate design.json requirements.json --wavelengths=0.4861,0.5876,0.6563
//! fovea-cli trace design.json --field=0,3.5 --pattern=annular --rays=21
//! ```
//!
//! Exit codes: 0 success, 1 fatal validation issue, 2 ray-trace failure
//! rate above the threshold, 3 I/O or configuration error.

mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fovea-cli")]
#[command(about = "Fovea: lens-design evaluation core")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a Design-Intent document into the flat surface table.
    Expand {
        /// Path to the design JSON document.
        design: PathBuf,
    },
    /// Score a requirements list against a design.
    Evaluate {
        /// Path to the design JSON document.
        design: PathBuf,
        /// Path to the requirements JSON array.
        requirements: PathBuf,
        /// Wavelengths in µm; the first is primary.
        #[arg(long, value_delimiter = ',', default_value = "0.5876")]
        wavelengths: Vec<f64>,
        /// Field angles (infinite conjugate, degrees) or object heights
        /// (finite, mm), one `x,y` pair per field.
        #[arg(long = "field", value_name = "X,Y")]
        fields: Vec<String>,
        /// Report progress between requirements on stderr.
        #[arg(long)]
        progress: bool,
        /// Failed-operand fraction above which the run exits with code 2.
        #[arg(long, default_value_t = 0.5)]
        max_failure_rate: f64,
    },
    /// Trace a ray bundle and print the image-plane hits.
    Trace {
        /// Path to the design JSON document.
        design: PathBuf,
        /// Field angle (infinite conjugate, degrees) or object height
        /// (finite, mm) as `x,y`.
        #[arg(long, default_value = "0,0", value_name = "X,Y")]
        field: String,
        /// Pupil pattern: cross, annular, or grid.
        #[arg(long, default_value = "annular")]
        pattern: String,
        /// Sampling density (arm samples, rings, or grid side).
        #[arg(long, default_value_t = 5)]
        rays: usize,
        /// Wavelengths in µm.
        #[arg(long, value_delimiter = ',', default_value = "0.5876")]
        wavelengths: Vec<f64>,
        /// Maximum Zernike radial order for the wavefront summary.
        #[arg(long, default_value_t = 6)]
        max_order: usize,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Expand { design } => runner::expand(&design),
        Commands::Evaluate {
            design,
            requirements,
            wavelengths,
            fields,
            progress,
            max_failure_rate,
        } => runner::evaluate(
            &design,
            &requirements,
            &wavelengths,
            &fields,
            progress,
            max_failure_rate,
        ),
        Commands::Trace {
            design,
            field,
            pattern,
            rays,
            wavelengths,
            max_order,
        } => runner::trace_bundle(&design, &field, &pattern, rays, &wavelengths, max_order),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(3)
        }
    }
}
