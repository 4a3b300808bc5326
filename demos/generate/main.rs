// Stable Diffusion generation from the command line.
//
// The CLIP vocabulary has to be downloaded first:
//
// mkdir -p data && cd data
// wget https://github.com/openai/CLIP/raw/main/clip/bpe_simple_vocab_16e6.txt.gz
// gunzip bpe_simple_vocab_16e6.txt.gz
//
// The clip, vae and unet weights are fetched from the Hugging Face hub repo set
// in the configuration (stabilityai/stable-diffusion-2, fp16 revision) unless
// local safetensors files are configured. Set HF_TOKEN for gated models.
use std::path::PathBuf;

use clap::Parser;
use diffusers_demo::generation::{
    generate_image_verbose, generate_multiple_images, prompt_filename, save_image,
    StableDiffusion,
};
use diffusers_demo::utils::init_logging;
use diffusers_demo::Config;

const DEFAULT_PROMPTS: [&str; 4] = [
    "A sunset over a mountain lake",
    "A futuristic city with flying cars",
    "A medieval knight standing under rain",
    "A cat sitting on a pile of books",
];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// A JSON configuration file, missing fields keep their default value.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// The prompt to be used for image generation.
    #[arg(long, default_value = "A wizard casting a spell in an ancient library")]
    prompt: String,

    /// Additional prompts, saved as generated_image_<n>.png. The default list
    /// is used when none is given.
    #[arg(long)]
    prompts: Vec<String>,

    /// The number of steps to run the diffusion for.
    #[arg(long)]
    n_steps: Option<usize>,

    /// When set, use the CPU for the listed devices, can be 'all', 'unet', 'clip', etc.
    /// Multiple values can be set.
    #[arg(long)]
    cpu: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(n_steps) = args.n_steps {
        config.steps = n_steps;
    }
    config.cpu.extend(args.cpu);
    config.validate()?;

    let model = StableDiffusion::load(&config)?;

    let image = generate_image_verbose(&model, &args.prompt, &config, true)?;
    save_image(&image, &prompt_filename(&args.prompt)?, &config)?;

    let prompts: Vec<String> = if args.prompts.is_empty() {
        DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect()
    } else {
        args.prompts
    };
    generate_multiple_images(&model, &prompts, &config)?;
    Ok(())
}
