// Prompt to image web page.
//
// The Stable Diffusion weights are resolved as for the generate demo. When
// they cannot be loaded the page still works and answers every prompt with a
// placeholder image.
use std::path::PathBuf;

use clap::Parser;
use diffusers_demo::generation::{GenerationWorker, ImageGenerator, StableDiffusion};
use diffusers_demo::ui::{run_server, AppState};
use diffusers_demo::utils::init_logging;
use diffusers_demo::Config;
use tracing::warn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// A JSON configuration file, missing fields keep their default value.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// The address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// The port to listen on, `PORT` or 7860 when unset.
    #[arg(long)]
    port: Option<u16>,

    /// Skip loading the model and always serve the placeholder.
    #[arg(long)]
    no_model: bool,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    config.log_summary();

    let generator: Option<Box<dyn ImageGenerator + Send + Sync>> = if args.no_model {
        None
    } else {
        let model_config = config.clone();
        match GenerationWorker::spawn(move || StableDiffusion::load(&model_config)) {
            Ok(worker) => Some(Box::new(worker)),
            Err(err) => {
                warn!("model unavailable, serving placeholders: {err:#}");
                None
            }
        }
    };

    let state = AppState::from_config(&config, generator)?;
    let port = args.port.unwrap_or_else(Config::port);
    actix_web::rt::System::new().block_on(run_server(state, &args.host, port))?;
    Ok(())
}
