//! Locating the pretrained weights.
//!
//! Each component uses its configured local file when present; otherwise the
//! standard file of the Hugging Face repository `model_id` is fetched (and
//! cached) at the configured revision. The CLIP vocabulary is not part of
//! these repositories and has to be available locally.
use std::path::{Path, PathBuf};

use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use tracing::info;

use crate::config::Config;

pub const CLIP_FILE: &str = "text_encoder/model.safetensors";
pub const VAE_FILE: &str = "vae/diffusion_pytorch_model.safetensors";
pub const UNET_FILE: &str = "unet/diffusion_pytorch_model.safetensors";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightFiles {
    pub vocab: PathBuf,
    pub clip: PathBuf,
    pub vae: PathBuf,
    pub unet: PathBuf,
}

impl WeightFiles {
    pub fn resolve(config: &Config) -> anyhow::Result<Self> {
        if !config.vocab_file.is_file() {
            anyhow::bail!(
                "missing CLIP vocabulary {:?}, download bpe_simple_vocab_16e6.txt from the openai/CLIP repository",
                config.vocab_file
            )
        }
        let mut hub = None;
        let clip = local_or_hub(config.clip_weights.as_deref(), CLIP_FILE, &mut hub, config)?;
        let vae = local_or_hub(config.vae_weights.as_deref(), VAE_FILE, &mut hub, config)?;
        let unet = local_or_hub(config.unet_weights.as_deref(), UNET_FILE, &mut hub, config)?;
        Ok(Self { vocab: config.vocab_file.clone(), clip, vae, unet })
    }
}

fn local_or_hub(
    local: Option<&Path>,
    remote: &str,
    hub: &mut Option<ApiRepo>,
    config: &Config,
) -> anyhow::Result<PathBuf> {
    if let Some(path) = local.filter(|p| p.is_file()) {
        return Ok(path.to_path_buf());
    }
    let repo = match hub.take() {
        Some(repo) => repo,
        None => hub_repo(config)?,
    };
    info!("Fetching {remote} from {} ({})", config.model_id, config.revision);
    let path = repo.get(remote)?;
    *hub = Some(repo);
    Ok(path)
}

fn hub_repo(config: &Config) -> anyhow::Result<ApiRepo> {
    let api = ApiBuilder::new().with_token(config.hf_token()).build()?;
    Ok(api.repo(Repo::with_revision(
        config.model_id.clone(),
        RepoType::Model,
        config.revision.clone(),
    )))
}

/// The weight loaders of `diffusers` take string paths.
pub(crate) fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str().ok_or_else(|| anyhow::anyhow!("non utf-8 path {path:?}"))
}
