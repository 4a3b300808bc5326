// The end to end demo pipeline: dummy datasets, the fine-tuning walkthrough
// and the simulated metrics, run once then repeated.
//
// Metrics lines are appended to logs/training_metrics.log by default.
use std::path::PathBuf;

use clap::Parser;
use diffusers_demo::pipeline::{main_pipeline, run_complete_pipeline_multiple_times};
use diffusers_demo::utils::{header, init_logging};
use diffusers_demo::Config;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// A JSON configuration file, missing fields keep their default value.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// The number of repeated runs after the first one.
    #[arg(long, default_value_t = 2)]
    iterations: usize,

    /// Multiplier for the pauses between steps, 0 disables them.
    #[arg(long)]
    pacing: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(pacing) = args.pacing {
        config.pacing = pacing;
        config.validate()?;
    }
    config.set_seed();
    config.log_summary();

    let mut rng = config.rng();
    header("GENAI PROJECT PIPELINE STARTED");
    main_pipeline(&config, &mut rng)?;
    run_complete_pipeline_multiple_times(&config, args.iterations, &mut rng)?;
    header("GENAI PROJECT PIPELINE FINISHED");
    Ok(())
}
