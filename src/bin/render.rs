#![cfg(not(tarpaulin_include))]

use dashboard::pipeline::{ChartOutcome, Pipeline};
use dashboard::settings::Settings;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

// Regenerate one user's chart from the command line
fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} <username> <filename> [config.toml]", args[0]);
        eprintln!("  <filename> is the stored upload name inside the uploads directory");
        return Ok(ExitCode::from(2));
    }

    let config_path = args.get(3).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    let pipeline = Pipeline::from_settings(&settings);

    match pipeline.run(&args[1], Some(args[2].as_str())) {
        ChartOutcome::ArtifactReady {
            path,
            plots,
            skipped,
            ..
        } => {
            println!("Created chart at {}", path.display());
            for plot in plots {
                println!("  drawn: {}", plot);
            }
            for skip in skipped {
                println!("  {}", skip);
            }
            Ok(ExitCode::SUCCESS)
        }
        ChartOutcome::NoData => {
            println!("No chartable data in {}", args[2]);
            Ok(ExitCode::from(1))
        }
        ChartOutcome::GenerationFailed => {
            println!("Chart generation failed for {}", args[2]);
            Ok(ExitCode::FAILURE)
        }
    }
}
