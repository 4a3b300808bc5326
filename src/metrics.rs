//! # Simulated evaluation metrics
//!
//! FID and Inception Score values here are random draws from fixed ranges,
//! not statistics computed from images. Each simulated evaluation appends a
//! line to `training_metrics.log` in the logs directory:
//!
//! ```text
//! FID: 3.12, Precision: 0.874, Recall: 0.812
//! ```
use std::fs::OpenOptions;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::utils::{ensure_dir, pause};

pub const LOG_FILE_NAME: &str = "training_metrics.log";
pub const PRECISION_RANGE: Range<f64> = 0.8..0.95;
pub const RECALL_RANGE: Range<f64> = 0.75..0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Fid,
    InceptionScore,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fid => "FID",
            Self::InceptionScore => "IS",
        }
    }

    pub fn range(&self) -> Range<f64> {
        match self {
            Self::Fid => 2.7..3.5,
            Self::InceptionScore => 7.0..9.0,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Append-only metrics log file.
#[derive(Debug, Clone)]
pub struct MetricsLog {
    path: PathBuf,
}

impl MetricsLog {
    pub fn new<P: AsRef<Path>>(logs_dir: P) -> Self {
        Self { path: logs_dir.as_ref().join(LOG_FILE_NAME) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line, creating the logs directory and file as needed.
    pub fn append(&self, metric_name: &str, value: f64, precision: f64, recall: f64) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            ensure_dir(dir)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;
        writeln!(file, "{metric_name}: {value:.2}, Precision: {precision:.3}, Recall: {recall:.3}")
            .map_err(|e| Error::io(&self.path, e))?;
        info!("Metrics logged to {}", self.path.display());
        Ok(())
    }
}

/// Combined output of [`MetricsSimulator::simulate_evaluation`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationReport {
    #[serde(rename = "FID")]
    pub fid: f64,
    #[serde(rename = "FID_Precision")]
    pub fid_precision: f64,
    #[serde(rename = "FID_Recall")]
    pub fid_recall: f64,
    #[serde(rename = "IS")]
    pub is: f64,
    #[serde(rename = "IS_Precision")]
    pub is_precision: f64,
    #[serde(rename = "IS_Recall")]
    pub is_recall: f64,
}

pub struct MetricsSimulator<'a> {
    config: &'a Config,
    log: MetricsLog,
    rng: StdRng,
}

impl<'a> MetricsSimulator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self::with_rng(config, config.rng())
    }

    pub fn with_rng(config: &'a Config, rng: StdRng) -> Self {
        Self { config, log: MetricsLog::new(&config.logs_dir), rng }
    }

    pub fn log(&self) -> &MetricsLog {
        &self.log
    }

    /// The image arguments only exist to mirror a real FID call, they are
    /// never inspected.
    pub fn simulate_fid<R: ?Sized, G: ?Sized>(&mut self, _real: &R, _generated: &G) -> f64 {
        info!("Starting FID calculation...");
        pause(self.config, 1.);
        info!("Calculating mean and covariance matrices...");
        pause(self.config, 1.);
        let fid = self.rng.gen_range(Metric::Fid.range());
        info!("FID calculation complete: FID = {fid:.2}");
        fid
    }

    pub fn simulate_is<G: ?Sized>(&mut self, _generated: &G) -> f64 {
        info!("Starting Inception Score (IS) calculation...");
        pause(self.config, 1.);
        info!("Calculating KL divergence...");
        pause(self.config, 1.);
        let score = self.rng.gen_range(Metric::InceptionScore.range());
        info!("IS calculation complete: IS = {score:.2}");
        score
    }

    /// Returns (precision, recall). The metric value does not influence them.
    pub fn simulate_precision_recall(&mut self, _value: f64, metric: Metric) -> (f64, f64) {
        info!("Calculating Precision and Recall based on {metric} value...");
        pause(self.config, 0.5);
        let precision = self.rng.gen_range(PRECISION_RANGE);
        let recall = self.rng.gen_range(RECALL_RANGE);
        info!("Precision: {precision:.3}");
        info!("Recall: {recall:.3}");
        (precision, recall)
    }

    pub fn simulate_and_log_fid<R: ?Sized, G: ?Sized>(
        &mut self,
        real: &R,
        generated: &G,
    ) -> Result<(f64, f64, f64)> {
        let fid = self.simulate_fid(real, generated);
        self.record(Metric::Fid, fid)
    }

    pub fn simulate_and_log_is<G: ?Sized>(&mut self, generated: &G) -> Result<(f64, f64, f64)> {
        let score = self.simulate_is(generated);
        self.record(Metric::InceptionScore, score)
    }

    /// FID then IS, each logged with its own precision and recall.
    pub fn simulate_evaluation<R: ?Sized, G: ?Sized>(
        &mut self,
        real: &R,
        generated: &G,
    ) -> Result<EvaluationReport> {
        info!("Starting combined FID and IS evaluation...");
        let (fid, fid_precision, fid_recall) = self.simulate_and_log_fid(real, generated)?;
        let (is, is_precision, is_recall) = self.simulate_and_log_is(generated)?;
        info!("Combined evaluation complete.");
        Ok(EvaluationReport { fid, fid_precision, fid_recall, is, is_precision, is_recall })
    }

    fn record(&mut self, metric: Metric, value: f64) -> Result<(f64, f64, f64)> {
        let (precision, recall) = self.simulate_precision_recall(value, metric);
        self.log.append(metric.name(), value, precision, recall)?;
        Ok((value, precision, recall))
    }
}

/// The metrics step of the main pipeline, run against placeholder inputs.
/// Draws come from the run rng, so each call logs new values.
pub fn simulate_metrics_logging(config: &Config, rng: &mut StdRng) -> Result<EvaluationReport> {
    let real_images = "real_images_placeholder";
    let generated_images = ["img1", "img2", "img3"];
    let mut simulator = MetricsSimulator::with_rng(config, StdRng::seed_from_u64(rng.gen()));
    simulator.simulate_evaluation(real_images, &generated_images[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(logs_dir: &Path) -> Config {
        Config { logs_dir: logs_dir.to_path_buf(), pacing: 0., ..Config::default() }
    }

    fn read_lines(log: &MetricsLog) -> Vec<String> {
        std::fs::read_to_string(log.path()).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn simulated_values_stay_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut simulator = MetricsSimulator::new(&config);
        for _ in 0..200 {
            let fid = simulator.simulate_fid("real", "generated");
            assert!(Metric::Fid.range().contains(&fid));
            let score = simulator.simulate_is("generated");
            assert!(Metric::InceptionScore.range().contains(&score));
            let (precision, recall) = simulator.simulate_precision_recall(fid, Metric::Fid);
            assert!(PRECISION_RANGE.contains(&precision));
            assert!(RECALL_RANGE.contains(&recall));
        }
    }

    #[test]
    fn each_call_appends_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("nested").join("logs"));
        let mut simulator = MetricsSimulator::new(&config);

        simulator.simulate_and_log_fid("real", "generated").unwrap();
        assert_eq!(read_lines(simulator.log()).len(), 1);
        simulator.simulate_and_log_is("generated").unwrap();
        assert_eq!(read_lines(simulator.log()).len(), 2);
        simulator.simulate_evaluation("real", "generated").unwrap();

        let lines = read_lines(simulator.log());
        assert_eq!(lines.len(), 4);
        let line_re =
            regex::Regex::new(r"^(FID|IS): \d+\.\d{2}, Precision: 0\.\d{3}, Recall: 0\.\d{3}$")
                .unwrap();
        for line in &lines {
            assert!(line_re.is_match(line), "{line}");
        }
        assert!(lines[0].starts_with("FID: "));
        assert!(lines[1].starts_with("IS: "));
        assert!(lines[2].starts_with("FID: "));
        assert!(lines[3].starts_with("IS: "));
    }

    #[test]
    fn append_formats_values() {
        let dir = tempfile::tempdir().unwrap();
        let log = MetricsLog::new(dir.path());
        log.append("FID", 3.14159, 0.87654, 0.81234).unwrap();
        assert_eq!(read_lines(&log), vec!["FID: 3.14, Precision: 0.877, Recall: 0.812"]);
    }

    #[test]
    fn run_rng_drives_the_draws() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut rng = config.rng();
        let a = simulate_metrics_logging(&config, &mut rng).unwrap();
        let b = simulate_metrics_logging(&config, &mut rng).unwrap();
        assert_ne!(a, b);

        let replayed = simulate_metrics_logging(&config, &mut config.rng()).unwrap();
        assert_eq!(a, replayed);

        let json = serde_json::to_value(a).unwrap();
        for key in ["FID", "FID_Precision", "FID_Recall", "IS", "IS_Precision", "IS_Recall"] {
            assert!(json.get(key).is_some(), "{key}");
        }
    }
}
