//! # Run configuration
//!
//! A flat record built once at process start: device placement, seed, model
//! identifiers, hyperparameters and filesystem paths. It can be read from a
//! JSON file where any missing field keeps its default value.
use std::path::{Path, PathBuf};

use diffusers::utils::DeviceSetup;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::utils::file_open;

pub const DEFAULT_PORT: u16 = 7860;

/// The Stable Diffusion architecture matching the weights of `model_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StableDiffusionVersion {
    #[serde(rename = "v1-5")]
    V1_5,
    #[serde(rename = "v2-1")]
    V2_1,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Components forced to run on the CPU: 'all', 'clip', 'vae' or 'unet'.
    /// Everything else uses the accelerator when one is available.
    pub cpu: Vec<String>,
    pub seed: u64,

    // Image generation.
    pub model_id: String,
    pub revision: String,
    pub sd_version: StableDiffusionVersion,
    pub steps: usize,
    /// Final (width, height) of generated images.
    pub image_size: (u32, u32),
    pub guidance_scale: f64,
    /// The size of the sliced attention, `None` disables slicing.
    pub sliced_attention_size: Option<i64>,

    // Prompt generation.
    pub prompt_model_id: String,
    pub prompt_dataset_size: usize,
    pub prompt_max_length: usize,

    // Fine-tuning.
    pub batch_size: usize,
    pub learning_rate: f64,
    pub num_epochs: usize,

    // Paths.
    pub dataset_path: PathBuf,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub vocab_file: PathBuf,
    pub clip_weights: Option<PathBuf>,
    pub vae_weights: Option<PathBuf>,
    pub unet_weights: Option<PathBuf>,
    pub font_file: Option<PathBuf>,

    /// Multiplier applied to the pacing sleeps between steps, 0 disables them.
    pub pacing: f64,
    /// Hugging Face token, `HF_TOKEN` is used when unset.
    pub hf_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cpu: vec![],
            seed: 42,
            model_id: "stabilityai/stable-diffusion-2".to_string(),
            revision: "fp16".to_string(),
            sd_version: StableDiffusionVersion::V2_1,
            steps: 35,
            image_size: (400, 400),
            guidance_scale: 9.,
            sliced_attention_size: None,
            prompt_model_id: "gpt2".to_string(),
            prompt_dataset_size: 6,
            prompt_max_length: 12,
            batch_size: 2,
            learning_rate: 5e-6,
            num_epochs: 3,
            dataset_path: PathBuf::from("./data/text_image_pairs"),
            output_dir: PathBuf::from("./output"),
            logs_dir: PathBuf::from("./logs"),
            vocab_file: PathBuf::from("data/bpe_simple_vocab_16e6.txt"),
            clip_weights: None,
            vae_weights: None,
            unet_weights: None,
            font_file: None,
            pacing: 1.,
            hf_token: None,
        }
    }
}

impl Config {
    /// Reads a JSON configuration file and validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = file_open(path.as_ref())?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// The file configuration when a path is given, the defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::Config(msg.to_string()));
        if self.batch_size == 0 {
            return fail("batch_size must be positive");
        }
        if self.num_epochs == 0 {
            return fail("num_epochs must be positive");
        }
        if self.steps == 0 {
            return fail("steps must be positive");
        }
        if self.image_size.0 == 0 || self.image_size.1 == 0 {
            return fail("image_size dimensions must be positive");
        }
        if !(self.learning_rate > 0.) {
            return fail("learning_rate must be positive");
        }
        if !(self.guidance_scale >= 0.) {
            return fail("guidance_scale must not be negative");
        }
        if !(self.pacing >= 0.) {
            return fail("pacing must not be negative");
        }
        Ok(())
    }

    /// Seeds the tensor library's global generator.
    pub fn set_seed(&self) {
        tch::manual_seed(self.seed as i64);
    }

    /// The random generator of a whole run, shuffling and simulated metrics
    /// draw from it. Create it once per process.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    pub fn device_setup(&self) -> DeviceSetup {
        DeviceSetup::new(self.cpu.clone())
    }

    pub fn hf_token(&self) -> Option<String> {
        self.hf_token.clone().or_else(|| std::env::var("HF_TOKEN").ok())
    }

    /// The web UI port, taken from `PORT` when set.
    pub fn port() -> u16 {
        std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT)
    }

    pub fn log_summary(&self) {
        let devices = self.device_setup();
        info!("Using configuration:");
        info!("Device: {:?}", devices.get("unet"));
        info!("Seed: {}", self.seed);
        info!("Image Size: {:?}", self.image_size);
        info!("Batch Size: {}", self.batch_size);
        info!("Learning Rate: {}", self.learning_rate);
        info!("Epochs: {}", self.num_epochs);
    }
}
