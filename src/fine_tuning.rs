//! # Fine-tuning workflow
//!
//! A walkthrough of the fine-tuning loop: epochs and batches are scheduled
//! and reported but no gradient step is taken, no optimizer state is kept and
//! no checkpoint is written.
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::config::Config;
use crate::dataset::{create_dataloader, default_dataloader, load_pairs_from_dir, DataLoader};
use crate::error::Result;
use crate::utils::pause;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineTuneReport {
    pub epochs: usize,
    pub batches_per_epoch: usize,
    pub samples_per_epoch: usize,
}

impl FineTuneReport {
    pub fn total_steps(&self) -> usize {
        self.epochs * self.batches_per_epoch
    }
}

pub struct FineTuner<'a> {
    config: &'a Config,
}

impl<'a> FineTuner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Schedules the batches of every epoch. Images are never loaded.
    pub fn run(&self, loader: &mut DataLoader) -> FineTuneReport {
        let config = self.config;
        info!(
            "Fine-tuning {} for {} epochs, batch size {}, learning rate {}",
            config.model_id,
            config.num_epochs,
            loader.batch_size(),
            config.learning_rate
        );
        let mut batches_per_epoch = 0;
        for epoch in 1..=config.num_epochs {
            let batches = loader.batch_indices();
            batches_per_epoch = batches.len();
            for (batch_index, batch) in batches.iter().enumerate() {
                debug!(
                    "epoch {epoch} batch {}/{batches_per_epoch}: samples {batch:?}",
                    batch_index + 1
                );
            }
            info!("Epoch {epoch}/{} complete ({batches_per_epoch} batches)", config.num_epochs);
            pause(config, 0.5);
        }
        let report = FineTuneReport {
            epochs: config.num_epochs,
            batches_per_epoch,
            samples_per_epoch: loader.dataset().len(),
        };
        info!("Fine-tuning finished after {} steps", report.total_steps());
        report
    }
}

/// Fine-tuning on the pairs found in `dataset_path`, or on the default dummy
/// dataset when that directory does not exist.
pub fn full_fine_tuning_workflow(config: &Config, rng: &mut StdRng) -> Result<FineTuneReport> {
    let mut loader = if config.dataset_path.is_dir() {
        let pairs = load_pairs_from_dir(&config.dataset_path)?;
        info!("Loaded {} text-image pairs from {}", pairs.len(), config.dataset_path.display());
        create_dataloader(pairs, config.batch_size, true, config, rng)?
    } else {
        default_dataloader(config, rng)?
    };
    Ok(FineTuner::new(config).run(&mut loader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    /// A config whose dataset directory does not exist.
    fn test_config(dir: &Path) -> Config {
        Config { pacing: 0., dataset_path: dir.join("missing"), ..Config::default() }
    }

    #[test]
    fn workflow_walks_all_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { num_epochs: 2, batch_size: 3, ..test_config(dir.path()) };
        let report = full_fine_tuning_workflow(&config, &mut config.rng()).unwrap();
        assert_eq!(
            report,
            FineTuneReport { epochs: 2, batches_per_epoch: 3, samples_per_epoch: 8 }
        );
        assert_eq!(report.total_steps(), 6);
    }

    #[test]
    fn dataset_directory_is_used_when_present() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            image::RgbImage::new(2, 2).save(dir.path().join(name)).unwrap();
        }
        let config = Config {
            pacing: 0.,
            num_epochs: 1,
            dataset_path: dir.path().to_path_buf(),
            ..Config::default()
        };
        let report = full_fine_tuning_workflow(&config, &mut config.rng()).unwrap();
        assert_eq!(report.samples_per_epoch, 3);
        assert_eq!(report.batches_per_epoch, 2);
    }

    #[test]
    fn default_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let report = full_fine_tuning_workflow(&config, &mut config.rng()).unwrap();
        assert_eq!(report.epochs, 3);
        assert_eq!(report.batches_per_epoch, 4);
    }
}
