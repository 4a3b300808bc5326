//! # Main pipeline
//!
//! The fixed sequence run by the `pipeline` demo: load the datasets, run the
//! fine-tuning workflow, log the simulated evaluation metrics.
use rand::rngs::StdRng;
use tracing::info;

use crate::config::Config;
use crate::dataset::{default_dataloader, demo_dataloader};
use crate::error::Result;
use crate::fine_tuning::{full_fine_tuning_workflow, FineTuneReport};
use crate::metrics::{simulate_metrics_logging, EvaluationReport};
use crate::utils::{header, pause};

pub const DEFAULT_ITERATIONS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub default_batches: usize,
    pub demo_batches: usize,
    pub fine_tuning: FineTuneReport,
    pub evaluation: EvaluationReport,
}

/// One pass of the pipeline. `rng` is the run rng from [`Config::rng`],
/// shared across passes so each one shuffles and draws anew.
pub fn main_pipeline(config: &Config, rng: &mut StdRng) -> Result<PipelineReport> {
    header("Starting Main Pipeline");

    info!("Loading dataset using default_dataloader()...");
    let default_loader = default_dataloader(config, rng)?;
    pause(config, 0.5);

    info!("Loading additional dataset using demo_dataloader() for visualization...");
    let demo_loader = demo_dataloader(config, rng)?;
    pause(config, 0.5);

    info!("Starting fine-tuning workflow");
    let fine_tuning = full_fine_tuning_workflow(config, rng)?;
    pause(config, 0.5);

    info!("Calculating and logging evaluation metrics");
    let evaluation = simulate_metrics_logging(config, rng)?;
    pause(config, 0.5);

    header("Main Pipeline Execution Complete");
    info!("Model pipeline executed successfully");
    Ok(PipelineReport {
        default_batches: default_loader.len(),
        demo_batches: demo_loader.len(),
        fine_tuning,
        evaluation,
    })
}

pub fn run_complete_pipeline_multiple_times(
    config: &Config,
    iterations: usize,
    rng: &mut StdRng,
) -> Result<Vec<PipelineReport>> {
    header("Running Complete Pipeline Multiple Times");
    let mut reports = Vec::with_capacity(iterations);
    for iteration in 1..=iterations {
        info!("Iteration {iteration}/{iterations} of Pipeline Execution");
        reports.push(main_pipeline(config, rng)?);
        pause(config, 1.);
    }
    header("All Pipeline Executions Completed");
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::LOG_FILE_NAME;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            pacing: 0.,
            logs_dir: dir.join("logs"),
            dataset_path: dir.join("no_dataset"),
            ..Config::default()
        }
    }

    fn log_lines(config: &Config) -> Vec<String> {
        let log = std::fs::read_to_string(config.logs_dir.join(LOG_FILE_NAME)).unwrap();
        log.lines().map(str::to_string).collect()
    }

    #[test]
    fn single_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let report = main_pipeline(&config, &mut config.rng()).unwrap();
        assert_eq!(report.default_batches, 4);
        assert_eq!(report.demo_batches, 2);
        assert_eq!(report.fine_tuning.epochs, 3);
        assert_eq!(log_lines(&config).len(), 2);
    }

    #[test]
    fn repeated_runs_log_fresh_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut rng = config.rng();
        let reports = run_complete_pipeline_multiple_times(&config, DEFAULT_ITERATIONS, &mut rng)
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert_ne!(reports[0].evaluation, reports[1].evaluation);

        let lines = log_lines(&config);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("FID: ") && lines[2].starts_with("FID: "));
        assert_ne!(lines[0], lines[2]);
    }
}
