//! # Text/image pair datasets
//!
//! Pairs of captions and image paths, loaded lazily into normalized CHW
//! tensors and grouped into batches by a small data loader.
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tch::{Kind, Tensor};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

const DEMO_BATCH_SIZE: usize = 4;
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextImagePair {
    pub text: String,
    pub image_path: PathBuf,
}

impl TextImagePair {
    pub fn new(text: impl Into<String>, image_path: impl Into<PathBuf>) -> Self {
        Self { text: text.into(), image_path: image_path.into() }
    }
}

/// Resizes to a fixed size then maps each channel from [0, 1] to [-1, 1]
/// (mean 0.5, std 0.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransform {
    pub width: u32,
    pub height: u32,
}

impl ImageTransform {
    pub fn from_config(config: &Config) -> Self {
        let (width, height) = config.image_size;
        Self { width, height }
    }

    pub fn apply(&self, image: &RgbImage) -> Result<Tensor> {
        let resized = imageops::resize(image, self.width, self.height, FilterType::Lanczos3);
        Ok((to_tensor(&resized)? - 0.5) / 0.5)
    }
}

/// Converts an RGB image to a float tensor of shape [3, height, width] with
/// values in [0, 1].
pub fn to_tensor(image: &RgbImage) -> Result<Tensor> {
    let (width, height) = image.dimensions();
    let tensor = Tensor::f_from_data_size(
        image.as_raw(),
        &[height as i64, width as i64, 3],
        Kind::Uint8,
    )?;
    Ok(tensor.permute([2, 0, 1]).to_kind(Kind::Float) / 255.)
}

pub struct Sample {
    pub text: String,
    pub image: Tensor,
}

pub struct TextImageDataset {
    pairs: Vec<TextImagePair>,
    transform: Option<ImageTransform>,
}

impl TextImageDataset {
    pub fn new(pairs: Vec<TextImagePair>, transform: Option<ImageTransform>) -> Self {
        Self { pairs, transform }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[TextImagePair] {
        &self.pairs
    }

    /// Opens the image of the pair at `index`, converted to RGB and
    /// transformed when a transform is set.
    pub fn get(&self, index: usize) -> Result<Sample> {
        let pair = self
            .pairs
            .get(index)
            .ok_or(Error::IndexOutOfRange { index, len: self.pairs.len() })?;
        let image = image::open(&pair.image_path)
            .map_err(|source| Error::Image { path: pair.image_path.clone(), source })?
            .to_rgb8();
        let image = match &self.transform {
            Some(transform) => transform.apply(&image)?,
            None => to_tensor(&image)?,
        };
        Ok(Sample { text: pair.text.clone(), image })
    }
}

pub struct Batch {
    pub texts: Vec<String>,
    /// Shape [batch, 3, height, width].
    pub images: Tensor,
}

pub struct DataLoader {
    dataset: TextImageDataset,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl DataLoader {
    pub fn new(
        dataset: TextImageDataset,
        batch_size: usize,
        shuffle: bool,
        rng: StdRng,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        Ok(Self { dataset, batch_size, shuffle, rng })
    }

    /// The number of batches, the last one may be partial.
    pub fn len(&self) -> usize {
        (self.dataset.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn dataset(&self) -> &TextImageDataset {
        &self.dataset
    }

    /// Dataset indices grouped per batch, reshuffled on each call when
    /// shuffling is enabled.
    pub fn batch_indices(&mut self) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }
        indices.chunks(self.batch_size).map(|c| c.to_vec()).collect()
    }

    pub fn batches(&mut self) -> Batches<'_> {
        let chunks = self.batch_indices().into_iter();
        Batches { dataset: &self.dataset, chunks }
    }
}

pub struct Batches<'a> {
    dataset: &'a TextImageDataset,
    chunks: std::vec::IntoIter<Vec<usize>>,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        Some(collate(self.dataset, &chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

fn collate(dataset: &TextImageDataset, indices: &[usize]) -> Result<Batch> {
    if indices.is_empty() {
        return Err(Error::EmptyDataset);
    }
    let mut texts = Vec::with_capacity(indices.len());
    let mut images = Vec::with_capacity(indices.len());
    for &index in indices {
        let sample = dataset.get(index)?;
        texts.push(sample.text);
        images.push(sample.image);
    }
    let images = Tensor::f_stack(&images, 0)?;
    Ok(Batch { texts, images })
}

pub fn dummy_pairs() -> Vec<TextImagePair> {
    vec![
        TextImagePair::new("A cat sleeping on a couch", "./data/images/cat1.jpg"),
        TextImagePair::new("A dog running in a park", "./data/images/dog1.jpg"),
        TextImagePair::new("A mountain with snow", "./data/images/mountain1.jpg"),
    ]
}

pub fn extended_dummy_pairs() -> Vec<TextImagePair> {
    vec![
        TextImagePair::new("A sunset at the beach", "./data/images/sunset1.jpg"),
        TextImagePair::new("A forest with tall trees", "./data/images/forest1.jpg"),
        TextImagePair::new("A city skyline at night", "./data/images/city1.jpg"),
        TextImagePair::new("A cute puppy playing", "./data/images/puppy1.jpg"),
        TextImagePair::new("A delicious pizza", "./data/images/pizza1.jpg"),
    ]
}

/// Wraps the pairs in a dataset using the configured image transform. The
/// loader's shuffling rng is seeded from `rng`, so successive loaders built
/// from the same run rng shuffle differently.
pub fn create_dataloader(
    pairs: Vec<TextImagePair>,
    batch_size: usize,
    shuffle: bool,
    config: &Config,
    rng: &mut StdRng,
) -> Result<DataLoader> {
    let dataset = TextImageDataset::new(pairs, Some(ImageTransform::from_config(config)));
    DataLoader::new(dataset, batch_size, shuffle, StdRng::seed_from_u64(rng.gen()))
}

/// Basic and extended dummy pairs together.
pub fn default_dataloader(config: &Config, rng: &mut StdRng) -> Result<DataLoader> {
    let mut pairs = dummy_pairs();
    pairs.extend(extended_dummy_pairs());
    let n_pairs = pairs.len();
    let loader = create_dataloader(pairs, config.batch_size, true, config, rng)?;
    info!("Loaded {n_pairs} text-image pairs.");
    Ok(loader)
}

pub fn demo_dataloader(config: &Config, rng: &mut StdRng) -> Result<DataLoader> {
    let pairs = extended_dummy_pairs();
    let n_pairs = pairs.len();
    let loader = create_dataloader(pairs, DEMO_BATCH_SIZE, true, config, rng)?;
    info!("Demo dataloader with {n_pairs} items created.");
    Ok(loader)
}

/// Collects the images of `dir` with their captions, read from a `.txt` file
/// sharing the image's stem. Images without a caption file use their stem,
/// underscores replaced by spaces.
pub fn load_pairs_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<TextImagePair>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut images = vec![];
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_image {
            images.push(path);
        }
    }
    images.sort();

    let mut pairs = Vec::with_capacity(images.len());
    for image_path in images {
        let caption_path = image_path.with_extension("txt");
        let text = if caption_path.is_file() {
            std::fs::read_to_string(&caption_path)
                .map_err(|e| Error::io(&caption_path, e))?
                .trim()
                .to_string()
        } else {
            let stem = image_path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            stem.replace('_', " ")
        };
        debug!("pair {:?}: {text}", image_path);
        pairs.push(TextImagePair { text, image_path });
    }
    Ok(pairs)
}
