// Text-to-image with a pretrained Stable Diffusion pipeline.
//
// The CLIP text transformer, the VAE, the UNet and the DDIM scheduler all
// come from the diffusers crate, this only wires them together with
// classifier-free guidance.
use diffusers::{
    models::{unet_2d, vae},
    pipelines::stable_diffusion::StableDiffusionConfig,
    transformers::clip,
    utils::DeviceSetup,
};
use image::RgbImage;
use tch::{nn::Module, Device, Kind, Tensor};
use tracing::{debug, info};

use super::weights::{path_str, WeightFiles};
use super::{resize_to, tensor_to_image, ImageGenerator};
use crate::config::{Config, StableDiffusionVersion};

const VAE_SCALE: f64 = 0.18215;

pub fn sd_config(config: &Config) -> StableDiffusionConfig {
    let sliced_attention_size = config.sliced_attention_size;
    match config.sd_version {
        StableDiffusionVersion::V1_5 => {
            StableDiffusionConfig::v1_5(sliced_attention_size, None, None)
        }
        StableDiffusionVersion::V2_1 => {
            StableDiffusionConfig::v2_1(sliced_attention_size, None, None)
        }
    }
}

pub struct StableDiffusion {
    sd_config: StableDiffusionConfig,
    devices: DeviceSetup,
    tokenizer: clip::Tokenizer,
    text_model: clip::ClipTextTransformer,
    vae: vae::AutoEncoderKL,
    unet: unet_2d::UNet2DConditionModel,
    n_steps: usize,
    guidance_scale: f64,
    output_size: (u32, u32),
}

impl StableDiffusion {
    /// Resolves the weights then builds every component on its device. The
    /// global seed is set once here so that successive generations differ
    /// but a run is reproducible.
    pub fn load(config: &Config) -> anyhow::Result<Self> {
        info!("Initializing Stable Diffusion pipeline...");
        tch::maybe_init_cuda();
        debug!("Cuda available: {}", tch::Cuda::is_available());
        debug!("Cudnn available: {}", tch::Cuda::cudnn_is_available());

        let sd_config = sd_config(config);
        let weights = WeightFiles::resolve(config)?;
        let devices = config.device_setup();

        let tokenizer = clip::Tokenizer::create(&weights.vocab, &sd_config.clip)?;
        info!("Building the Clip transformer.");
        let text_model =
            sd_config.build_clip_transformer(path_str(&weights.clip)?, devices.get("clip"))?;
        info!("Building the autoencoder.");
        let vae = sd_config.build_vae(path_str(&weights.vae)?, devices.get("vae"))?;
        info!("Building the unet.");
        let unet = sd_config.build_unet(path_str(&weights.unet)?, devices.get("unet"), 4)?;
        config.set_seed();
        info!("Model loaded and moved to device.");

        Ok(Self {
            sd_config,
            devices,
            tokenizer,
            text_model,
            vae,
            unet,
            n_steps: config.steps,
            guidance_scale: config.guidance_scale,
            output_size: config.image_size,
        })
    }

    fn token_tensor(&self, text: &str) -> anyhow::Result<Tensor> {
        let tokens = self.tokenizer.encode(text)?;
        let tokens: Vec<i64> = tokens.into_iter().map(|x| x as i64).collect();
        Ok(Tensor::from_slice(&tokens).view((1, -1)).to(self.devices.get("clip")))
    }

    /// Unconditional then conditional embeddings, stacked on the batch dim.
    fn text_embeddings(&self, prompt: &str) -> anyhow::Result<Tensor> {
        let tokens = self.token_tensor(prompt)?;
        let uncond_tokens = self.token_tensor("")?;
        let text_embeddings = self.text_model.forward(&tokens);
        let uncond_embeddings = self.text_model.forward(&uncond_tokens);
        Ok(Tensor::cat(&[uncond_embeddings, text_embeddings], 0).to(self.devices.get("unet")))
    }

    /// Runs the diffusion loop, returning a uint8 tensor [1, 3, h, w] on the cpu.
    pub fn generate_tensor(&self, prompt: &str) -> anyhow::Result<Tensor> {
        let _no_grad_guard = tch::no_grad_guard();
        let scheduler = self.sd_config.build_scheduler(self.n_steps);
        let text_embeddings = self.text_embeddings(prompt)?;

        let mut latents = Tensor::randn(
            [1, 4, self.sd_config.height / 8, self.sd_config.width / 8],
            (Kind::Float, self.devices.get("unet")),
        );
        latents *= scheduler.init_noise_sigma();

        let n_timesteps = scheduler.timesteps().len();
        for (timestep_index, &timestep) in scheduler.timesteps().iter().enumerate() {
            debug!("Timestep {}/{n_timesteps}", timestep_index + 1);
            let latent_model_input = Tensor::cat(&[&latents, &latents], 0);
            let latent_model_input = scheduler.scale_model_input(latent_model_input, timestep);
            let noise_pred =
                self.unet.forward(&latent_model_input, timestep as f64, &text_embeddings);
            let noise_pred = noise_pred.chunk(2, 0);
            let (noise_pred_uncond, noise_pred_text) = (&noise_pred[0], &noise_pred[1]);
            let noise_pred =
                noise_pred_uncond + (noise_pred_text - noise_pred_uncond) * self.guidance_scale;
            latents = scheduler.step(&noise_pred, timestep, &latents);
        }

        let latents = latents.to(self.devices.get("vae"));
        let image = self.vae.decode(&(&latents / VAE_SCALE));
        let image = (image / 2 + 0.5).clamp(0., 1.).to_device(Device::Cpu);
        Ok((image * 255.).to_kind(Kind::Uint8))
    }
}

impl ImageGenerator for StableDiffusion {
    fn generate(&self, prompt: &str) -> anyhow::Result<RgbImage> {
        let image = tensor_to_image(&self.generate_tensor(prompt)?)?;
        Ok(resize_to(image, self.output_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_sizes() {
        let v1 = Config { sd_version: StableDiffusionVersion::V1_5, ..Config::default() };
        let v2 = Config { sd_version: StableDiffusionVersion::V2_1, ..Config::default() };
        assert_eq!((sd_config(&v1).width, sd_config(&v1).height), (512, 512));
        assert_eq!((sd_config(&v2).width, sd_config(&v2).height), (768, 768));
    }
}
