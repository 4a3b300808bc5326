//! # Image generation
//!
//! Text-to-image generation is delegated to a pretrained Stable Diffusion
//! pipeline from the `diffusers` crate. This module only drives it: turning
//! the decoded tensors into images, saving them and running the model on a
//! dedicated thread for the web UI.
use std::path::PathBuf;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tch::{Device, Kind, Tensor};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Error;
use crate::utils::ensure_dir;

pub mod stable_diffusion;
pub mod weights;
pub mod worker;

pub use stable_diffusion::StableDiffusion;
pub use worker::GenerationWorker;

/// Anything able to turn a prompt into an RGB image.
pub trait ImageGenerator {
    fn generate(&self, prompt: &str) -> anyhow::Result<RgbImage>;
}

/// Converts a uint8 tensor of shape [3, h, w] or [1, 3, h, w] to an image.
pub fn tensor_to_image(tensor: &Tensor) -> anyhow::Result<RgbImage> {
    let tensor = match tensor.size().as_slice() {
        [1, 3, _, _] => tensor.squeeze_dim(0),
        [3, _, _] => tensor.shallow_clone(),
        size => anyhow::bail!("unexpected image tensor shape {size:?}"),
    };
    let tensor =
        tensor.to_device(Device::Cpu).to_kind(Kind::Uint8).permute([1, 2, 0]).contiguous();
    let size = tensor.size();
    let (height, width) = (size[0] as usize, size[1] as usize);
    let numel = tensor.numel();
    let mut hwc = vec![0u8; numel];
    tensor.f_copy_data(&mut hwc, numel)?;
    RgbImage::from_raw(width as u32, height as u32, hwc)
        .ok_or_else(|| anyhow::anyhow!("image buffer does not match {width}x{height}"))
}

/// Resizes to `size` (width, height) unless the image already has it.
pub fn resize_to(image: RgbImage, size: (u32, u32)) -> RgbImage {
    if image.dimensions() == size {
        image
    } else {
        imageops::resize(&image, size.0, size.1, FilterType::Lanczos3)
    }
}

/// A filesystem-safe png file name derived from the prompt.
pub fn prompt_filename(prompt: &str) -> anyhow::Result<String> {
    let re = regex::Regex::new(r"[^a-z0-9]+")?;
    let lower = prompt.to_lowercase();
    let slug: String = re.replace_all(&lower, "_").trim_matches('_').chars().take(64).collect();
    let slug = if slug.is_empty() { "image".to_string() } else { slug };
    Ok(format!("{slug}.png"))
}

/// Writes the image under the output directory, returning its path.
pub fn save_image(image: &RgbImage, filename: &str, config: &Config) -> crate::Result<PathBuf> {
    ensure_dir(&config.output_dir)?;
    let path = config.output_dir.join(filename);
    image.save(&path).map_err(|source| Error::Image { path: path.clone(), source })?;
    info!("Saved image to {}", path.display());
    Ok(path)
}

pub fn generate_image<G: ImageGenerator + ?Sized>(
    generator: &G,
    prompt: &str,
) -> anyhow::Result<RgbImage> {
    info!("Generating image for prompt: {prompt}");
    let image = generator.generate(prompt)?;
    info!("Image generation complete.");
    Ok(image)
}

pub fn generate_and_save<G: ImageGenerator + ?Sized>(
    generator: &G,
    prompt: &str,
    filename: &str,
    config: &Config,
) -> anyhow::Result<PathBuf> {
    info!("Starting generate_and_save workflow...");
    let image = generate_image(generator, prompt)?;
    let path = save_image(&image, filename, config)?;
    info!("generate_and_save workflow complete.");
    Ok(path)
}

/// Saves one image per prompt as `generated_image_{n}.png`, n starting at 1.
pub fn generate_multiple_images<G: ImageGenerator + ?Sized, S: AsRef<str>>(
    generator: &G,
    prompts: &[S],
    config: &Config,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(prompts.len());
    for (index, prompt) in prompts.iter().enumerate() {
        info!("Generating image {}/{}", index + 1, prompts.len());
        let image = generate_image(generator, prompt.as_ref())?;
        paths.push(save_image(&image, &format!("generated_image_{}.png", index + 1), config)?);
        info!("Image {} complete.", index + 1);
    }
    Ok(paths)
}

pub fn generate_image_verbose<G: ImageGenerator + ?Sized>(
    generator: &G,
    prompt: &str,
    config: &Config,
    verbose: bool,
) -> anyhow::Result<RgbImage> {
    if verbose {
        info!(
            "Using model: {} with guidance scale {}",
            config.model_id, config.guidance_scale
        );
        info!("Generating for prompt: {prompt}");
    }
    let image = generate_image(generator, prompt)?;
    if verbose {
        info!("Generation completed.");
    } else {
        debug!("Generation completed.");
    }
    Ok(image)
}
